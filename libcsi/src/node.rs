//! CSI Node service seam.
//!
//! The Node service runs on each worker node.  Of its RPCs, the health probe
//! only needs two:
//!
//! 1. **NodeGetCapabilities**: does the driver report volume conditions?
//! 2. **NodeGetVolumeStats**: usage and condition of one mounted volume.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{NodeCapability, VolumeStats, VolumeStatsRequest};

/// Node service: capability negotiation and volume statistics.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// List the RPC capabilities of the node service.
    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError>;

    /// Fetch statistics, including the condition, for a volume at
    /// `req.volume_path`.
    async fn get_volume_stats(&self, req: VolumeStatsRequest) -> Result<VolumeStats, CsiError>;
}
