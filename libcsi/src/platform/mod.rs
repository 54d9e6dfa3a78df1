//! Deployment layouts: where drivers listen and where volumes are mounted.
//!
//! Different Kubernetes distributions use different directories to talk to
//! CSI drivers and to mount volumes.  A [`Platform`] captures one such
//! layout.  Platforms are built from an explicit [`PlatformConfig`] and
//! selected by [`PlatformKind`]; nothing here is detected at runtime.

pub mod kubelet;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CsiError;
use crate::mount::ProcMounts;
use crate::types::VolumeId;

pub use kubelet::Kubelet;

/// Scheme prefix of driver endpoints.
pub const UNIX_SCHEME: &str = "unix://";

/// Path conventions of one deployment layout.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Staging path of the volume, if the driver staged it and it is mounted.
    ///
    /// Not all drivers stage volumes; `None` means "try the publish path".
    async fn staging_path(&self, driver: &str, volume_id: &VolumeId) -> Option<PathBuf>;

    /// Publish path of the volume for some pod, if one is recorded.
    async fn publish_path(&self, driver: &str, volume_id: &VolumeId) -> Option<PathBuf>;

    /// Endpoint of the driver's control socket, `unix://...`.
    ///
    /// No existence check happens here; a missing socket surfaces when
    /// dialling.
    fn csi_socket(&self, driver: &str) -> String;
}

/// Supported deployment layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Upstream kubelet directory layout.
    #[default]
    Kubelet,
}

/// Directories of a kubelet-style layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Kubelet root directory.
    pub root_dir: PathBuf,
    /// Plugin registration directory, relative to `root_dir`.
    pub plugins_dir: PathBuf,
    /// Directory of the in-tree CSI plugin, relative to `plugins_dir`.
    pub csi_plugin_dir: PathBuf,
    /// Mount table consulted for mount point checks.
    pub mount_table: PathBuf,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/var/lib/kubelet"),
            plugins_dir: PathBuf::from("plugins"),
            csi_plugin_dir: PathBuf::from("kubernetes.io/csi"),
            mount_table: PathBuf::from(crate::mount::PROC_MOUNTS),
        }
    }
}

impl PlatformConfig {
    /// Default layout rooted at `root_dir` instead of `/var/lib/kubelet`.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }
}

/// Build the platform selected by `kind`.
pub fn build(kind: PlatformKind, config: PlatformConfig) -> Arc<dyn Platform> {
    match kind {
        PlatformKind::Kubelet => {
            let mounter = ProcMounts::new(config.mount_table.clone());
            Arc::new(Kubelet::new(config, Arc::new(mounter)))
        }
    }
}

/// Strip the `unix://` scheme from a driver endpoint.
pub fn socket_path(endpoint: &str) -> Result<PathBuf, CsiError> {
    let path = endpoint.strip_prefix(UNIX_SCHEME).ok_or_else(|| {
        CsiError::InvalidArgument(format!("endpoint {endpoint} is not a unix socket"))
    })?;
    if !Path::new(path).is_absolute() {
        return Err(CsiError::InvalidArgument(format!(
            "endpoint {endpoint} has a relative socket path"
        )));
    }
    Ok(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_strips_scheme() {
        let path = socket_path("unix:///var/lib/kubelet/plugins/d1/csi.sock").unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/kubelet/plugins/d1/csi.sock"));
    }

    #[test]
    fn socket_path_rejects_other_schemes() {
        assert!(matches!(
            socket_path("tcp://10.0.0.1:9000"),
            Err(CsiError::InvalidArgument(_))
        ));
        assert!(matches!(
            socket_path("unix://relative/csi.sock"),
            Err(CsiError::InvalidArgument(_))
        ));
    }

    #[test]
    fn default_config_is_upstream_kubelet() {
        let config = PlatformConfig::default();
        assert_eq!(config.root_dir, PathBuf::from("/var/lib/kubelet"));
        assert_eq!(
            PlatformConfig::with_root("/tmp/k").csi_plugin_dir,
            PathBuf::from("kubernetes.io/csi")
        );
    }

    #[test]
    fn build_kubelet_platform() {
        let platform = build(PlatformKind::Kubelet, PlatformConfig::with_root("/srv/kubelet"));
        assert_eq!(
            platform.csi_socket("d1"),
            "unix:///srv/kubelet/plugins/d1/csi.sock"
        );
    }
}
