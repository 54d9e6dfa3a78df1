//! Probe orchestration: one health query per volume, one client per driver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use libcsi::{
    ConnectOptions, CsiError, CsiIdentity, CsiNode, DriverClient, GrpcClient, Health, Platform,
    Volume,
};
use serde::Serialize;
use tracing::{error, info, instrument};

/// Creates [`DriverClient`]s by driver name.
#[async_trait]
pub trait DriverConnector: Send + Sync {
    type Rpc: CsiNode + CsiIdentity;

    async fn connect(&self, driver: &str) -> Result<DriverClient<Self::Rpc>, CsiError>;
}

/// Dials drivers over the sockets of a [`Platform`].
pub struct GrpcConnector {
    platform: Arc<dyn Platform>,
    options: ConnectOptions,
}

impl GrpcConnector {
    pub fn new(platform: Arc<dyn Platform>, options: ConnectOptions) -> Self {
        Self { platform, options }
    }
}

#[async_trait]
impl DriverConnector for GrpcConnector {
    type Rpc = GrpcClient;

    async fn connect(&self, driver: &str) -> Result<DriverClient<GrpcClient>, CsiError> {
        DriverClient::connect(driver, Arc::clone(&self.platform), &self.options).await
    }
}

/// Health of one probed volume.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub volume: Volume,
    pub health: Health,
    /// Why the health is unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of a probe run.
#[derive(Debug, Default, Serialize)]
pub struct ProbeSummary {
    pub reports: Vec<ProbeReport>,
    /// Volumes left out: driver unreachable or without VOLUME_CONDITION.
    pub skipped: usize,
}

impl ProbeSummary {
    pub fn count(&self, health: Health) -> usize {
        self.reports.iter().filter(|r| r.health == health).count()
    }
}

/// Walks a list of volumes and queries their drivers.
pub struct Prober<K: DriverConnector> {
    connector: K,
    /// `None` marks a driver that could not be reached this run.
    drivers: HashMap<String, Option<DriverClient<K::Rpc>>>,
}

impl<K: DriverConnector> Prober<K> {
    pub fn new(connector: K) -> Self {
        Self {
            connector,
            drivers: HashMap::new(),
        }
    }

    /// Client for `driver`, dialling it on first use.  A failed dial is
    /// remembered and not retried.
    async fn driver(&mut self, driver: &str) -> Option<&DriverClient<K::Rpc>> {
        if !self.drivers.contains_key(driver) {
            let client = match self.connector.connect(driver).await {
                Ok(client) => Some(client),
                Err(e) => {
                    error!(%driver, error = %e, "could not find driver");
                    None
                }
            };
            self.drivers.insert(driver.to_owned(), client);
        }
        self.drivers.get(driver).and_then(Option::as_ref)
    }

    /// Probe every volume in order.  Failures of one volume never stop the
    /// others.
    #[instrument(skip_all, fields(volumes = volumes.len()))]
    pub async fn probe_all(&mut self, volumes: &[Volume]) -> ProbeSummary {
        let mut summary = ProbeSummary::default();

        for volume in volumes {
            info!(driver = %volume.driver_name, %volume, "probing volume");

            let Some(drv) = self.driver(&volume.driver_name).await else {
                summary.skipped += 1;
                continue;
            };

            if !drv.supports_health_check().await {
                summary.skipped += 1;
                continue;
            }

            let report = match drv.query_health(&volume.volume_id).await {
                Ok(healthy) => {
                    info!(volume_id = %volume.volume_id, healthy, "volume condition");
                    ProbeReport {
                        volume: volume.clone(),
                        health: Health::from(healthy),
                        detail: None,
                    }
                }
                Err(CsiError::Unsupported { .. }) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        driver = %volume.driver_name,
                        volume_id = %volume.volume_id,
                        error = %e,
                        "failed to check if volume is healthy"
                    );
                    ProbeReport {
                        volume: volume.clone(),
                        health: Health::Unknown,
                        detail: Some(e.to_string()),
                    }
                }
            };
            summary.reports.push(report);
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use libcsi::{
        NodeCapability, PluginInfo, VolumeCondition, VolumeId, VolumeStats, VolumeStatsRequest,
    };

    use super::*;

    /// Node plugin answering from a table of volume id -> abnormal flag.
    struct TableNode {
        caps: Vec<NodeCapability>,
        abnormal: HashMap<String, bool>,
    }

    #[async_trait]
    impl CsiNode for TableNode {
        async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError> {
            Ok(self.caps.clone())
        }

        async fn get_volume_stats(
            &self,
            req: VolumeStatsRequest,
        ) -> Result<VolumeStats, CsiError> {
            Ok(VolumeStats {
                condition: self.abnormal.get(req.volume_id.as_str()).map(|abnormal| {
                    VolumeCondition {
                        abnormal: *abnormal,
                        message: String::new(),
                    }
                }),
            })
        }
    }

    #[async_trait]
    impl CsiIdentity for TableNode {
        async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
            Err(CsiError::call("GetPluginInfo", "unimplemented"))
        }

        async fn probe(&self) -> Result<bool, CsiError> {
            Ok(true)
        }
    }

    struct NoPaths;

    #[async_trait]
    impl Platform for NoPaths {
        async fn staging_path(&self, _: &str, _: &VolumeId) -> Option<PathBuf> {
            None
        }

        async fn publish_path(&self, _: &str, _: &VolumeId) -> Option<PathBuf> {
            None
        }

        fn csi_socket(&self, driver: &str) -> String {
            format!("unix:///nonexistent/{driver}/csi.sock")
        }
    }

    /// Connector with per-driver canned nodes; unknown drivers fail to dial.
    struct FakeConnector {
        nodes: Mutex<HashMap<String, TableNode>>,
        dials: AtomicUsize,
    }

    #[async_trait]
    impl DriverConnector for FakeConnector {
        type Rpc = TableNode;

        async fn connect(&self, driver: &str) -> Result<DriverClient<TableNode>, CsiError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let endpoint = format!("unix:///nonexistent/{driver}/csi.sock");
            let node = self
                .nodes
                .lock()
                .unwrap()
                .remove(driver)
                .ok_or_else(|| CsiError::connection(endpoint, "no such file or directory"))?;
            Ok(DriverClient::new(driver, node, Arc::new(NoPaths)))
        }
    }

    fn volume(driver: &str, id: &str) -> Volume {
        Volume {
            driver_name: driver.into(),
            node: "node-a".into(),
            persistent_volume: format!("pv-{id}"),
            volume_id: VolumeId::from(id),
        }
    }

    fn connector() -> FakeConnector {
        let healthy = TableNode {
            caps: vec![NodeCapability::StageUnstageVolume, NodeCapability::VolumeCondition],
            abnormal: HashMap::from([("vol-1".into(), false), ("vol-2".into(), true)]),
        };
        let legacy = TableNode {
            caps: vec![NodeCapability::StageUnstageVolume],
            abnormal: HashMap::new(),
        };
        FakeConnector {
            nodes: Mutex::new(HashMap::from([
                ("d1".to_owned(), healthy),
                ("legacy".to_owned(), legacy),
            ])),
            dials: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn reports_health_and_skips_unusable_drivers() {
        let mut prober = Prober::new(connector());
        let volumes = vec![
            volume("d1", "vol-1"),
            volume("missing", "vol-x"),
            volume("d1", "vol-2"),
            volume("legacy", "vol-l"),
            volume("d1", "vol-3"),
            volume("missing", "vol-y"),
        ];

        let summary = prober.probe_all(&volumes).await;

        let got: Vec<(&str, Health)> = summary
            .reports
            .iter()
            .map(|r| (r.volume.volume_id.as_str(), r.health))
            .collect();
        assert_eq!(
            got,
            vec![
                ("vol-1", Health::Healthy),
                ("vol-2", Health::Unhealthy),
                ("vol-3", Health::Unknown),
            ]
        );
        assert!(summary.reports[2].detail.is_some());
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.count(Health::Healthy), 1);
    }

    #[tokio::test]
    async fn each_driver_is_dialled_once() {
        let mut prober = Prober::new(connector());
        let volumes = vec![
            volume("d1", "vol-1"),
            volume("missing", "vol-x"),
            volume("d1", "vol-2"),
            volume("missing", "vol-y"),
        ];
        prober.probe_all(&volumes).await;
        assert_eq!(prober.connector.dials.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn report_json_omits_empty_detail() {
        let report = ProbeReport {
            volume: volume("d1", "vol-1"),
            health: Health::Healthy,
            detail: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["health"], "healthy");
        assert!(json.get("detail").is_none());
    }
}
