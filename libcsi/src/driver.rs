//! Health queries against one CSI driver.
//!
//! A [`DriverClient`] owns the connection to a single driver and amortizes
//! capability negotiation across every volume of that driver: the
//! `NodeGetCapabilities` answer is memoized for the client's lifetime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::node::CsiNode;
use crate::platform::Platform;
use crate::transport::GrpcClient;
use crate::types::{CapabilitySupport, Health, NodeCapability, VolumeId, VolumeStatsRequest};

/// Options applied when dialling a driver.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Deadline for the dial and for every call.
    pub timeout: Option<Duration>,
    /// Require `GetPluginInfo` to report the driver's own name and `Probe`
    /// to report ready.
    pub verify_identity: bool,
}

/// Client for one driver, generic over the RPC implementation so tests can
/// substitute an in-memory node service.
pub struct DriverClient<C> {
    name: String,
    rpc: C,
    platform: Arc<dyn Platform>,
    support: AtomicU8,
}

impl DriverClient<GrpcClient> {
    /// Dial the socket `platform` reports for `driver`.
    ///
    /// A failed dial is returned as [`CsiError::Connection`] and is not
    /// retried.
    #[instrument(skip(platform, options))]
    pub async fn connect(
        driver: &str,
        platform: Arc<dyn Platform>,
        options: &ConnectOptions,
    ) -> Result<Self, CsiError> {
        let endpoint = platform.csi_socket(driver);
        let rpc = GrpcClient::connect(&endpoint, options.timeout).await?;
        let client = Self::new(driver, rpc, platform);

        if options.verify_identity {
            client.verify_identity().await?;
        }
        Ok(client)
    }
}

impl<C> DriverClient<C>
where
    C: CsiNode + CsiIdentity,
{
    pub fn new(name: impl Into<String>, rpc: C, platform: Arc<dyn Platform>) -> Self {
        Self {
            name: name.into(),
            rpc,
            platform,
            support: AtomicU8::new(CapabilitySupport::Unknown as u8),
        }
    }

    /// Driver name this client was created for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state of the capability memo.
    pub fn capability_support(&self) -> CapabilitySupport {
        CapabilitySupport::from_u8(self.support.load(Ordering::Acquire))
    }

    /// Check that the plugin behind the socket is the driver we looked up
    /// and that it reports ready.
    pub async fn verify_identity(&self) -> Result<(), CsiError> {
        let info = self.rpc.get_plugin_info().await?;
        if info.name != self.name {
            return Err(CsiError::IdentityMismatch {
                expected: self.name.clone(),
                actual: info.name,
            });
        }
        if !self.rpc.probe().await? {
            return Err(CsiError::NotReady {
                driver: self.name.clone(),
            });
        }
        debug!(driver = %self.name, version = %info.vendor_version, "driver identity verified");
        Ok(())
    }

    /// Whether the driver reports volume conditions.
    ///
    /// Negotiated once per client.  A failed negotiation is logged and
    /// remembered as unsupported for the rest of the run.
    pub async fn supports_health_check(&self) -> bool {
        match self.capability_support() {
            CapabilitySupport::Supported => return true,
            CapabilitySupport::Unsupported => return false,
            CapabilitySupport::Unknown => {}
        }

        let supported = match self.rpc.get_capabilities().await {
            Ok(caps) => {
                let supported = caps.contains(&NodeCapability::VolumeCondition);
                if !supported {
                    info!(driver = %self.name, "driver does not support VOLUME_CONDITION");
                }
                supported
            }
            Err(e) => {
                error!(driver = %self.name, error = %e, "failed to get capabilities of driver");
                false
            }
        };

        // Only the Unknown -> resolved transition is allowed; a concurrent
        // first caller may have won already.
        let resolved = CapabilitySupport::from_supported(supported) as u8;
        match self.support.compare_exchange(
            CapabilitySupport::Unknown as u8,
            resolved,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => supported,
            Err(current) => CapabilitySupport::from_u8(current) == CapabilitySupport::Supported,
        }
    }

    /// Ask the driver whether `volume_id` is healthy.
    ///
    /// The path argument is the staging path if one is mounted, else the
    /// publish path, else empty; the driver decides what to do with an
    /// empty path.
    #[instrument(skip(self), fields(driver = %self.name))]
    pub async fn query_health(&self, volume_id: &VolumeId) -> Result<bool, CsiError> {
        if !self.supports_health_check().await {
            return Err(CsiError::Unsupported {
                driver: self.name.clone(),
            });
        }

        let path = match self.platform.staging_path(&self.name, volume_id).await {
            Some(p) => Some(p),
            None => self.platform.publish_path(&self.name, volume_id).await,
        };
        let volume_path = match path {
            Some(p) => p.to_string_lossy().into_owned(),
            None => {
                warn!(%volume_id, "no staging or publish path found, querying with empty path");
                String::new()
            }
        };

        let stats = self
            .rpc
            .get_volume_stats(VolumeStatsRequest {
                volume_id: volume_id.clone(),
                volume_path,
            })
            .await?;

        let condition = stats.condition.ok_or_else(|| CsiError::ConditionUnknown {
            volume_id: volume_id.to_string(),
        })?;
        debug!(%volume_id, abnormal = condition.abnormal, message = %condition.message, "volume condition");
        Ok(!condition.abnormal)
    }

    /// [`Self::query_health`] folded into a [`Health`] value.
    pub async fn health(&self, volume_id: &VolumeId) -> Health {
        match self.query_health(volume_id).await {
            Ok(healthy) => Health::from(healthy),
            Err(e) => {
                debug!(driver = %self.name, %volume_id, error = %e, "health unknown");
                Health::Unknown
            }
        }
    }
}
