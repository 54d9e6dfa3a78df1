//! CSI v1 protocol messages transmitted over gRPC.
//!
//! Only the messages `rkvc` exchanges with a driver are declared here, with
//! the field tags of the upstream `csi.proto`.  Unknown fields sent by newer
//! drivers are skipped by `prost` during decoding.

use crate::types::{NodeCapability, PluginInfo, VolumeCondition, VolumeStats};

// ----- Identity -------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoResponse {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub vendor_version: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "3")]
    pub manifest:
        ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeResponse {
    /// `google.protobuf.BoolValue`; absent means ready.
    #[prost(message, optional, tag = "1")]
    pub ready: ::core::option::Option<bool>,
}

// ----- Node -----------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetCapabilitiesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetCapabilitiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: ::prost::alloc::vec::Vec<NodeServiceCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeServiceCapability {
    #[prost(oneof = "node_service_capability::Type", tags = "1")]
    pub r#type: ::core::option::Option<node_service_capability::Type>,
}

pub mod node_service_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Rpc {
        #[prost(int32, tag = "1")]
        pub r#type: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Rpc(Rpc),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetVolumeStatsRequest {
    #[prost(string, tag = "1")]
    pub volume_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub volume_path: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub staging_target_path: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetVolumeStatsResponse {
    #[prost(message, repeated, tag = "1")]
    pub usage: ::prost::alloc::vec::Vec<VolumeUsage>,
    #[prost(message, optional, tag = "2")]
    pub volume_condition: ::core::option::Option<WireVolumeCondition>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeUsage {
    #[prost(int64, tag = "1")]
    pub available: i64,
    #[prost(int64, tag = "2")]
    pub total: i64,
    #[prost(int64, tag = "3")]
    pub used: i64,
    #[prost(int32, tag = "4")]
    pub unit: i32,
}

/// `csi.v1.VolumeCondition`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireVolumeCondition {
    #[prost(bool, tag = "1")]
    pub abnormal: bool,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

// ----- Conversions into the crate's data model -----------------------------

impl NodeGetCapabilitiesResponse {
    /// RPC capabilities in reply order; non-RPC entries are dropped.
    pub fn rpc_capabilities(&self) -> Vec<NodeCapability> {
        self.capabilities
            .iter()
            .filter_map(|cap| match &cap.r#type {
                Some(node_service_capability::Type::Rpc(rpc)) => {
                    Some(NodeCapability::from(rpc.r#type))
                }
                None => None,
            })
            .collect()
    }
}

impl From<NodeGetVolumeStatsResponse> for VolumeStats {
    fn from(resp: NodeGetVolumeStatsResponse) -> Self {
        Self {
            condition: resp.volume_condition.map(|c| VolumeCondition {
                abnormal: c.abnormal,
                message: c.message,
            }),
        }
    }
}

impl From<GetPluginInfoResponse> for PluginInfo {
    fn from(resp: GetPluginInfoResponse) -> Self {
        Self {
            name: resp.name,
            vendor_version: resp.vendor_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn rpc_cap(t: i32) -> NodeServiceCapability {
        NodeServiceCapability {
            r#type: Some(node_service_capability::Type::Rpc(
                node_service_capability::Rpc { r#type: t },
            )),
        }
    }

    #[test]
    fn capabilities_decode_from_wire() {
        let resp = NodeGetCapabilitiesResponse {
            capabilities: vec![rpc_cap(1), NodeServiceCapability { r#type: None }, rpc_cap(4)],
        };
        let bytes = resp.encode_to_vec();
        let de = NodeGetCapabilitiesResponse::decode(bytes.as_slice()).expect("decode");
        assert_eq!(
            de.rpc_capabilities(),
            vec![NodeCapability::StageUnstageVolume, NodeCapability::VolumeCondition]
        );
    }

    #[test]
    fn stats_without_condition_maps_to_none() {
        let resp = NodeGetVolumeStatsResponse {
            usage: vec![VolumeUsage {
                available: 10,
                total: 20,
                used: 10,
                unit: 1,
            }],
            volume_condition: None,
        };
        assert_eq!(VolumeStats::from(resp).condition, None);
    }

    #[test]
    fn stats_condition_is_carried_over() {
        let resp = NodeGetVolumeStatsResponse {
            usage: vec![],
            volume_condition: Some(WireVolumeCondition {
                abnormal: true,
                message: "I/O errors".into(),
            }),
        };
        let stats = VolumeStats::from(resp);
        let condition = stats.condition.expect("condition");
        assert!(condition.abnormal);
        assert_eq!(condition.message, "I/O errors");
    }
}
