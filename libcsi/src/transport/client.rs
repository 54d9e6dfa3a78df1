//! gRPC client used to issue CSI requests against a node plugin's socket.

use std::time::Duration;

use async_trait::async_trait;
use http::uri::PathAndQuery;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, instrument};

use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::message::*;
use crate::node::CsiNode;
use crate::platform::socket_path;
use crate::types::{NodeCapability, PluginInfo, VolumeStats, VolumeStatsRequest};

const NODE_GET_CAPABILITIES: &str = "/csi.v1.Node/NodeGetCapabilities";
const NODE_GET_VOLUME_STATS: &str = "/csi.v1.Node/NodeGetVolumeStats";
const GET_PLUGIN_INFO: &str = "/csi.v1.Identity/GetPluginInfo";
const PROBE: &str = "/csi.v1.Identity/Probe";

/// A CSI client bound to one driver socket.
///
/// The underlying [`Channel`] is cheap to clone; every call clones it into a
/// fresh [`tonic::client::Grpc`].
#[derive(Clone)]
pub struct GrpcClient {
    channel: Channel,
    endpoint: String,
}

impl GrpcClient {
    /// Dial the driver at `endpoint` (`unix:///path/to/csi.sock`).
    ///
    /// * `timeout`: optional deadline applied to the dial and to every
    ///   subsequent request on this client
    pub async fn connect(endpoint: &str, timeout: Option<Duration>) -> Result<Self, CsiError> {
        let path = socket_path(endpoint)?;

        // The URI authority is never resolved: the connector always dials
        // the socket path.
        let mut builder = Endpoint::from_static("http://[::]:50051");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout).connect_timeout(timeout);
        }

        let channel = builder
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = path.clone();
                async move {
                    let stream = UnixStream::connect(path).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }))
            .await
            .map_err(|e| CsiError::connection(endpoint, e))?;

        debug!(%endpoint, "CSI connection established");
        Ok(Self {
            channel,
            endpoint: endpoint.to_owned(),
        })
    }

    /// Issue one unary call on `path` and decode the reply.
    async fn unary<Req, Resp>(
        &self,
        rpc: &'static str,
        path: &'static str,
        req: Req,
    ) -> Result<Resp, CsiError>
    where
        Req: prost::Message + Send + 'static,
        Resp: prost::Message + Default + Send + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| CsiError::call(rpc, format!("service was not ready: {e}")))?;

        let codec = tonic::codec::ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(req),
                PathAndQuery::from_static(path),
                codec,
            )
            .await
            .map_err(|status| CsiError::call(rpc, status))?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl CsiNode for GrpcClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError> {
        let resp: NodeGetCapabilitiesResponse = self
            .unary(
                "NodeGetCapabilities",
                NODE_GET_CAPABILITIES,
                NodeGetCapabilitiesRequest {},
            )
            .await?;
        Ok(resp.rpc_capabilities())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint, volume_id = %req.volume_id))]
    async fn get_volume_stats(&self, req: VolumeStatsRequest) -> Result<VolumeStats, CsiError> {
        let wire = NodeGetVolumeStatsRequest {
            volume_id: req.volume_id.0,
            volume_path: req.volume_path,
            staging_target_path: String::new(),
        };
        let resp: NodeGetVolumeStatsResponse = self
            .unary("NodeGetVolumeStats", NODE_GET_VOLUME_STATS, wire)
            .await?;
        Ok(resp.into())
    }
}

#[async_trait]
impl CsiIdentity for GrpcClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        let resp: GetPluginInfoResponse = self
            .unary("GetPluginInfo", GET_PLUGIN_INFO, GetPluginInfoRequest {})
            .await?;
        Ok(resp.into())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn probe(&self) -> Result<bool, CsiError> {
        let resp: ProbeResponse = self.unary("Probe", PROBE, ProbeRequest {}).await?;
        Ok(resp.ready.unwrap_or(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_missing_socket_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let endpoint = format!("unix://{}/csi.sock", tmp.path().display());

        let result = GrpcClient::connect(&endpoint, Some(Duration::from_secs(1))).await;
        match result {
            Err(CsiError::Connection { endpoint: e, .. }) => assert_eq!(e, endpoint),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connecting to a missing socket must fail"),
        }
    }

    #[tokio::test]
    async fn connect_rejects_tcp_endpoint() {
        let result = GrpcClient::connect("tcp://127.0.0.1:10000", None).await;
        assert!(matches!(result, Err(CsiError::InvalidArgument(_))));
    }
}
