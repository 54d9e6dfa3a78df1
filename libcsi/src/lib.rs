//! # libcsi: CSI node-plugin client for RK8s
//!
//! `libcsi` talks to [Container Storage Interface][csi] node plugins over
//! their Unix domain control sockets (gRPC via [`tonic`]) and knows where the
//! kubelet mounts CSI volumes on a node.  It is the library half of the
//! `rkvc` volume condition checker and follows the RK8s architecture
//! conventions (Tokio async runtime, `tracing` for observability,
//! `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `Volume`, `VolumeId`, capabilities, health. |
//! | [`error`] | [`CsiError`] enum covering all failure modes. |
//! | [`message`] | CSI v1 wire messages (`prost`). |
//! | [`identity`] | [`CsiIdentity`] trait: plugin discovery & readiness. |
//! | [`node`] | [`CsiNode`] trait: capabilities & volume stats. |
//! | [`transport`] | gRPC-over-UDS client built on `tonic`. |
//! | [`driver`] | [`DriverClient`]: memoized capability check & health query. |
//! | [`platform`] | [`Platform`]: socket and mount path conventions. |
//! | [`mount`] | [`Mounter`]: mount table inspection. |
//!
//! [csi]: https://github.com/container-storage-interface/spec

pub mod driver;
pub mod error;
pub mod identity;
pub mod message;
pub mod mount;
pub mod node;
pub mod platform;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use driver::{ConnectOptions, DriverClient};
pub use error::CsiError;
pub use identity::CsiIdentity;
pub use mount::{Mounter, ProcMounts};
pub use node::CsiNode;
pub use platform::{Platform, PlatformConfig, PlatformKind};
pub use transport::GrpcClient;
pub use types::*;
