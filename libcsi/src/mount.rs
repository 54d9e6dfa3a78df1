//! Mount point detection.
//!
//! [`ProcMounts`] answers "is this path a mount point?" by reading a mount
//! table in `/proc/self/mounts` format.  It is the only [`Mounter`] used in
//! production; tests point it at a fixture file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::CsiError;

/// Default location of the kernel mount table.
pub const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Checks whether a path is a mount point.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Return `true` if `path` is listed as a mount point.
    ///
    /// Symlinks in `path` are resolved first, since the kernel lists
    /// resolved paths.  A path that does not exist is not a mount point and
    /// yields `Ok(false)`.
    async fn is_mount_point(&self, path: &Path) -> Result<bool, CsiError>;
}

/// [`Mounter`] backed by a mount table file.
#[derive(Debug, Clone)]
pub struct ProcMounts {
    table: PathBuf,
}

impl ProcMounts {
    pub fn new(table: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

#[async_trait]
impl Mounter for ProcMounts {
    async fn is_mount_point(&self, path: &Path) -> Result<bool, CsiError> {
        let resolved = match tokio::fs::canonicalize(path).await {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "path does not exist");
                return Ok(false);
            }
            Err(e) => {
                return Err(CsiError::Mount {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let contents = tokio::fs::read_to_string(&self.table)
            .await
            .map_err(|e| CsiError::Mount {
                path: path.display().to_string(),
                reason: format!("read {}: {e}", self.table.display()),
            })?;

        Ok(mount_points(&contents).any(|mp| Path::new(&mp) == resolved))
    }
}

/// Iterate the mount point column of a mount table.
///
/// Format: `<device> <mountpoint> <fstype> <options> <dump> <pass>`, with
/// whitespace and backslashes in paths escaped as octal (`\040`).
fn mount_points(contents: &str) -> impl Iterator<Item = String> + '_ {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(unescape_octal)
}

fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = (bytes[i + 1] - b'0') as u32 * 64
                + (bytes[i + 2] - b'0') as u32 * 8
                + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
