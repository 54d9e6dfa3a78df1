//! Core types: volumes, capabilities, conditions, and health.
//!
//! These types form the data model shared by the driver client, the platform
//! path resolution, and the `rkvc` probe.  They are [`Serialize`] so that
//! probe reports can be emitted as JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Opaque, driver-specific identifier for a volume (the CSI volume handle).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct VolumeId(pub String);

impl VolumeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Volume
// ---------------------------------------------------------------------------

/// One attached volume as seen by the cluster.
///
/// A `Volume` is only built once its [`VolumeId`] has been resolved from the
/// backing PersistentVolume, so `volume_id` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    /// CSI driver responsible for this volume.
    pub driver_name: String,
    /// Node the volume is attached to.
    pub node: String,
    /// Name of the backing PersistentVolume.
    pub persistent_volume: String,
    /// Driver-specific volume handle.
    pub volume_id: VolumeId,
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (pv={}, driver={}, node={})",
            self.volume_id, self.persistent_volume, self.driver_name, self.node
        )
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Node service RPC capability advertised by `NodeGetCapabilities`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeCapability {
    Unknown,
    StageUnstageVolume,
    GetVolumeStats,
    ExpandVolume,
    /// The node service can report volume conditions.
    VolumeCondition,
    SingleNodeMultiWriter,
    VolumeMountGroup,
    /// A capability this build does not know about.
    Other(i32),
}

impl From<i32> for NodeCapability {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::StageUnstageVolume,
            2 => Self::GetVolumeStats,
            3 => Self::ExpandVolume,
            4 => Self::VolumeCondition,
            5 => Self::SingleNodeMultiWriter,
            6 => Self::VolumeMountGroup,
            other => Self::Other(other),
        }
    }
}

/// Memoized answer to "does this driver report volume conditions?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CapabilitySupport {
    /// Not negotiated yet.
    Unknown = 0,
    Supported = 1,
    Unsupported = 2,
}

impl CapabilitySupport {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Supported,
            2 => Self::Unsupported,
            _ => Self::Unknown,
        }
    }

    pub(crate) fn from_supported(supported: bool) -> Self {
        if supported {
            Self::Supported
        } else {
            Self::Unsupported
        }
    }
}

// ---------------------------------------------------------------------------
// Condition & health
// ---------------------------------------------------------------------------

/// Driver-reported condition of a volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeCondition {
    /// `true` when the volume does not operate normally.
    pub abnormal: bool,
    /// Free-form description from the driver.
    #[serde(default)]
    pub message: String,
}

/// Request for `NodeGetVolumeStats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeStatsRequest {
    pub volume_id: VolumeId,
    /// Staging or publish path; may be empty when none was found.
    pub volume_path: String,
}

/// Relevant part of a `NodeGetVolumeStats` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeStats {
    /// `None` when the driver did not fill in the condition.
    pub condition: Option<VolumeCondition>,
}

/// Tri-state health outcome of one volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unhealthy,
    /// The query failed or the driver cannot report conditions.
    Unknown,
}

impl From<bool> for Health {
    fn from(healthy: bool) -> Self {
        if healthy {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        })
    }
}

// ---------------------------------------------------------------------------
// Plugin info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginInfo {
    /// Plugin name, e.g. `"rbd.csi.ceph.com"`.
    pub name: String,
    /// Vendor-provided version string.
    pub vendor_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_id_display() {
        let id = VolumeId("vol-abc".into());
        assert_eq!(id.to_string(), "vol-abc");
    }

    #[test]
    fn node_capability_from_wire() {
        assert_eq!(NodeCapability::from(1), NodeCapability::StageUnstageVolume);
        assert_eq!(NodeCapability::from(4), NodeCapability::VolumeCondition);
        assert_eq!(NodeCapability::from(42), NodeCapability::Other(42));
    }

    #[test]
    fn health_from_bool_and_display() {
        assert_eq!(Health::from(true), Health::Healthy);
        assert_eq!(Health::from(false).to_string(), "unhealthy");
        assert_eq!(
            serde_json::to_string(&Health::Unknown).expect("serialize"),
            "\"unknown\""
        );
    }

    #[test]
    fn volume_serializes_handle_as_string() {
        let vol = Volume {
            driver_name: "d1".into(),
            node: "node-01".into(),
            persistent_volume: "pv-a".into(),
            volume_id: VolumeId("vol-123".into()),
        };
        let json = serde_json::to_value(&vol).expect("serialize");
        assert_eq!(json["volume_id"], "vol-123");
    }
}
