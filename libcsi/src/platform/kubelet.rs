//! Upstream kubelet layout.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/
//!   plugins/<driver>/csi.sock                        # driver control socket
//!   plugins/kubernetes.io/csi/<driver>/<sha256(volume-id)>/globalmount[/<volume-id>]
//!                                                    # staging path
//!   pods/<pod-uid>/volumes/kubernetes.io~csi/<pv>/vol_data.json
//!   pods/<pod-uid>/volumes/kubernetes.io~csi/<pv>/mount
//!                                                    # publish path
//! ```
//!
//! Block-mode volumes (`volumeDevices/...`) are not resolved.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, instrument, warn};

use super::{Platform, PlatformConfig, UNIX_SCHEME};
use crate::mount::Mounter;
use crate::types::VolumeId;

const GLOBAL_MOUNT: &str = "globalmount";
const PODS_DIR: &str = "pods";
const CSI_VOLUMES_DIR: &str = "volumes/kubernetes.io~csi";
const VOL_DATA: &str = "vol_data.json";
const PUBLISH_MOUNT: &str = "mount";
const SOCKET_NAME: &str = "csi.sock";

/// Mount metadata kubelet writes next to every published CSI volume.
#[derive(Debug, Deserialize)]
struct VolData {
    #[serde(rename = "driverName", default)]
    driver: String,
    #[serde(rename = "specVolID", default)]
    persistent_volume: String,
    #[serde(rename = "volumeHandle", default)]
    volume_id: String,
}

/// [`Platform`] for the upstream kubelet directory layout.
pub struct Kubelet {
    config: PlatformConfig,
    mounter: Arc<dyn Mounter>,
}

impl Kubelet {
    pub fn new(config: PlatformConfig, mounter: Arc<dyn Mounter>) -> Self {
        Self { config, mounter }
    }

    /// `<root>/plugins/kubernetes.io/csi/<driver>/<sha256(volume-id)>/globalmount`.
    ///
    /// The hash only keeps directory names short and collision free.
    pub fn staging_candidate(&self, driver: &str, volume_id: &VolumeId) -> PathBuf {
        let hash = hex::encode(Sha256::digest(volume_id.as_str().as_bytes()));
        self.config
            .root_dir
            .join(&self.config.plugins_dir)
            .join(&self.config.csi_plugin_dir)
            .join(driver)
            .join(hash)
            .join(GLOBAL_MOUNT)
    }

    async fn is_mount_point(&self, path: &Path) -> bool {
        match self.mounter.is_mount_point(path).await {
            Ok(mounted) => mounted,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to check mount point");
                false
            }
        }
    }

    /// Read and parse one `vol_data.json`, logging and skipping failures.
    async fn read_vol_data(path: &Path) -> Option<VolData> {
        let data = match tokio::fs::read(path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read vol_data.json, skipping");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(vd) => Some(vd),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse vol_data.json, skipping");
                None
            }
        }
    }
}

/// `<staging>/<volume-id>`, with the volume id treated as a relative path
/// that cannot leave `staging`.
///
/// Root and `.` components are dropped and `..` pops at most back to
/// `staging`.  An id that reduces to nothing has no nested candidate.
fn nested_candidate(staging: &Path, volume_id: &VolumeId) -> Option<PathBuf> {
    let mut parts = Vec::new();
    for component in Path::new(volume_id.as_str()).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.into_iter().fold(staging.to_path_buf(), |path, part| path.join(part)))
}

/// Subdirectories of `dir` sorted by name; a missing directory has none.
async fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to list directory");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    loop {
        match rd.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                // Follows symlinks, like a glob match would.
                if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
                    entries.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                break;
            }
        }
    }
    entries.sort();
    entries
}

#[async_trait]
impl Platform for Kubelet {
    #[instrument(skip(self, volume_id), fields(volume_id = %volume_id))]
    async fn staging_path(&self, driver: &str, volume_id: &VolumeId) -> Option<PathBuf> {
        let staging = self.staging_candidate(driver, volume_id);
        if self.is_mount_point(&staging).await {
            return Some(staging);
        }

        // Some drivers mount below globalmount, in a directory named after
        // the volume.
        if let Some(nested) = nested_candidate(&staging, volume_id) {
            if self.is_mount_point(&nested).await {
                return Some(nested);
            }
        }

        debug!(path = %staging.display(), "no staging mount point found");
        None
    }

    #[instrument(skip(self, volume_id), fields(volume_id = %volume_id))]
    async fn publish_path(&self, driver: &str, volume_id: &VolumeId) -> Option<PathBuf> {
        let pods = self.config.root_dir.join(PODS_DIR);

        for pod in sorted_subdirs(&pods).await {
            for volume_dir in sorted_subdirs(&pod.join(CSI_VOLUMES_DIR)).await {
                let vol_data = volume_dir.join(VOL_DATA);
                let Some(vd) = Self::read_vol_data(&vol_data).await else {
                    continue;
                };

                if vd.driver == driver && vd.volume_id == volume_id.as_str() {
                    debug!(pv = %vd.persistent_volume, path = %vol_data.display(), "found publish metadata");
                    return Some(volume_dir.join(PUBLISH_MOUNT));
                }
            }
        }

        warn!(%driver, "could not find a vol_data.json for the volume");
        None
    }

    fn csi_socket(&self, driver: &str) -> String {
        let path = self
            .config
            .root_dir
            .join(&self.config.plugins_dir)
            .join(driver)
            .join(SOCKET_NAME);
        format!("{UNIX_SCHEME}{}", path.display())
    }
}
