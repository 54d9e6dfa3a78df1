//! Attached volumes, as recorded by the cluster.
//!
//! [`VolumeCatalog`] turns `VolumeAttachment` records into [`Volume`] values
//! carrying the CSI volume handle.  The cluster is reached through the
//! [`ClusterStore`] seam: [`KubeStore`] talks to the API server, tests use an
//! in-memory store.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use k8s_openapi::api::storage::v1::VolumeAttachment;
use kube::api::{Api, ListParams};
use libcsi::{Volume, VolumeId};
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not list VolumeAttachments: {0}")]
    List(String),

    #[error("failed to get PersistentVolume {pv}: {reason}")]
    Resolution { pv: String, reason: String },

    /// Inline (ephemeral) volumes have no PersistentVolume to resolve.
    #[error("VolumeAttachment {attachment} has no PersistentVolume source")]
    InlineVolume { attachment: String },

    #[error("PersistentVolume {pv} is not a CSI volume")]
    NotCsi { pv: String },

    #[error("PersistentVolume {pv} has an empty volume handle")]
    EmptyHandle { pv: String },
}

/// The parts of a `VolumeAttachment` the catalog needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub name: String,
    /// CSI driver name (`spec.attacher`).
    pub attacher: String,
    pub node_name: String,
    /// `spec.source.persistentVolumeName`; `None` for inline volumes.
    pub persistent_volume_name: Option<String>,
}

impl From<VolumeAttachment> for AttachmentRecord {
    fn from(va: VolumeAttachment) -> Self {
        Self {
            name: va.metadata.name.unwrap_or_default(),
            attacher: va.spec.attacher,
            node_name: va.spec.node_name,
            persistent_volume_name: va.spec.source.persistent_volume_name,
        }
    }
}

/// Read-only queries against the cluster's object store.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// All attachment records, in listing order.
    async fn list_attachments(&self) -> Result<Vec<AttachmentRecord>, CatalogError>;

    /// CSI volume handle of the named PersistentVolume.
    async fn volume_handle(&self, pv_name: &str) -> Result<String, CatalogError>;
}

/// [`ClusterStore`] backed by the Kubernetes API server.
pub struct KubeStore {
    client: kube::Client,
}

impl KubeStore {
    /// Build a client from the in-cluster environment or the local
    /// kubeconfig.
    pub async fn try_default() -> Result<Self, kube::Error> {
        let client = kube::Client::try_default().await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn list_attachments(&self) -> Result<Vec<AttachmentRecord>, CatalogError> {
        let api: Api<VolumeAttachment> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| CatalogError::List(e.to_string()))?;
        Ok(list.items.into_iter().map(AttachmentRecord::from).collect())
    }

    async fn volume_handle(&self, pv_name: &str) -> Result<String, CatalogError> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let pv = api.get(pv_name).await.map_err(|e| CatalogError::Resolution {
            pv: pv_name.to_owned(),
            reason: e.to_string(),
        })?;

        pv.spec
            .and_then(|spec| spec.csi)
            .map(|csi| csi.volume_handle)
            .ok_or_else(|| CatalogError::NotCsi {
                pv: pv_name.to_owned(),
            })
    }
}

/// What to do when a volume's handle cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Log the failure and leave the volume out.
    #[default]
    Skip,
    /// Fail the whole listing.
    Abort,
}

/// Resolves attachment records into [`Volume`]s.
pub struct VolumeCatalog<S> {
    store: S,
    node_filter: Option<String>,
    policy: ResolutionPolicy,
}

impl<S: ClusterStore> VolumeCatalog<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            node_filter: None,
            policy: ResolutionPolicy::default(),
        }
    }

    /// Only list attachments on `node` (exact, case-sensitive match).  An
    /// empty name disables the filter.
    pub fn with_node_filter(mut self, node: impl Into<String>) -> Self {
        let node = node.into();
        self.node_filter = (!node.is_empty()).then_some(node);
        self
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Volumes attached to the selected node, in listing order.
    #[instrument(skip(self), fields(node = ?self.node_filter, policy = ?self.policy))]
    pub async fn list_volumes(&self) -> Result<Vec<Volume>, CatalogError> {
        let attachments = self.store.list_attachments().await?;
        let mut volumes = Vec::with_capacity(attachments.len());

        for attachment in attachments {
            if let Some(node) = &self.node_filter {
                if &attachment.node_name != node {
                    continue;
                }
            }

            match self.resolve(&attachment).await {
                Ok(volume) => {
                    debug!(%volume, "resolved volume");
                    volumes.push(volume);
                }
                Err(e) if self.policy == ResolutionPolicy::Skip => {
                    warn!(
                        attachment = %attachment.name,
                        driver = %attachment.attacher,
                        error = %e,
                        "skipping volume that could not be resolved"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(volumes)
    }

    async fn resolve(&self, attachment: &AttachmentRecord) -> Result<Volume, CatalogError> {
        let pv = attachment
            .persistent_volume_name
            .clone()
            .ok_or_else(|| CatalogError::InlineVolume {
                attachment: attachment.name.clone(),
            })?;

        let handle = self.store.volume_handle(&pv).await?;
        if handle.is_empty() {
            return Err(CatalogError::EmptyHandle { pv });
        }

        Ok(Volume {
            driver_name: attachment.attacher.clone(),
            node: attachment.node_name.clone(),
            persistent_volume: pv,
            volume_id: VolumeId(handle),
        })
    }
}
