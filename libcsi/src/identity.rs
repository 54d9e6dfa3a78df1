//! CSI Identity service seam.
//!
//! The Identity service lets a caller discover which plugin sits behind a
//! socket and whether it is ready.  `rkvc` uses it to optionally confirm
//! that a socket really belongs to the driver it was looked up for and that
//! the plugin is ready to serve.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::PluginInfo;

/// Identity service: plugin discovery and readiness.
#[async_trait]
pub trait CsiIdentity: Send + Sync {
    /// Return the plugin name and version.
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError>;

    /// Readiness probe.  Returns `true` when the plugin reports ready (or
    /// does not say).
    async fn probe(&self) -> Result<bool, CsiError>;
}
