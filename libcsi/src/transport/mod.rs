//! gRPC transport for CSI calls.
//!
//! This module provides [`GrpcClient`], which speaks the CSI v1 gRPC
//! protocol to a driver over its Unix domain control socket using `tonic`.

pub mod client;

pub use client::GrpcClient;
