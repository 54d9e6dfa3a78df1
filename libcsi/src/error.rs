//! CSI error types.
//!
//! All errors in the `libcsi` crate are represented by the [`CsiError`] enum,
//! which derives [`thiserror::Error`].  Callers that probe many volumes are
//! expected to log these per volume and carry on; none of them is meant to
//! abort a whole run.

use thiserror::Error;

/// Unified error type for CSI driver operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CsiError {
    /// The driver's control socket could not be reached.
    #[error("failed to connect to endpoint {endpoint}: {reason}")]
    Connection {
        /// Endpoint that was dialled, e.g. `unix:///var/lib/kubelet/plugins/<driver>/csi.sock`.
        endpoint: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The driver does not advertise the `VOLUME_CONDITION` node capability.
    #[error("driver {driver:?} does not support VOLUME_CONDITION")]
    Unsupported {
        /// Name of the driver.
        driver: String,
    },

    /// A gRPC call failed at the transport or status level.
    #[error("failed to call {rpc}: {reason}")]
    Call {
        /// Name of the RPC, e.g. `NodeGetVolumeStats`.
        rpc: &'static str,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The driver replied without a volume condition.
    #[error("volume condition of {volume_id} unknown")]
    ConditionUnknown {
        /// Volume that was queried.
        volume_id: String,
    },

    /// The driver behind the socket reported a different name.
    #[error("driver identity mismatch: expected {expected:?}, got {actual:?}")]
    IdentityMismatch {
        /// Name the socket was looked up for.
        expected: String,
        /// Name reported by `GetPluginInfo`.
        actual: String,
    },

    /// The mount table could not be inspected.
    #[error("failed to inspect mounts for {path}: {reason}")]
    Mount {
        /// Path that was being checked.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The plugin answered `Probe` with `ready = false`.
    #[error("driver {driver:?} is not ready")]
    NotReady {
        /// Name of the driver.
        driver: String,
    },
}

impl CsiError {
    /// Create a [`CsiError::Call`] for `rpc` from anything that implements
    /// [`std::fmt::Display`].
    pub fn call<E: std::fmt::Display>(rpc: &'static str, e: E) -> Self {
        Self::Call {
            rpc,
            reason: e.to_string(),
        }
    }

    /// Create a [`CsiError::Connection`] for `endpoint`.
    pub fn connection<E: std::fmt::Display>(endpoint: impl Into<String>, e: E) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: e.to_string(),
        }
    }
}
