//! RKVC command line and run configuration.
//!
//! Flags are parsed once and resolved into an immutable [`ProbeConfig`]
//! that is handed to every component explicitly.
//!
//! Environment variables:
//! - `RKVC_NODENAME`: only check volumes attached to this node. Same as
//!   `--nodename`; unset or empty checks every node.
//! - `RKVC_KUBELET_DIR`: kubelet root directory. Defaults to
//!   `/var/lib/kubelet`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use libcsi::{ConnectOptions, PlatformConfig, PlatformKind};

use crate::catalog::ResolutionPolicy;

/// Check the condition of CSI volumes attached to Kubernetes nodes.
#[derive(Debug, Parser)]
#[command(name = "rkvc", version, about)]
pub struct Cli {
    /// Name of the Kubernetes node whose volumes are checked.
    #[arg(long, env = "RKVC_NODENAME", default_value = "")]
    pub nodename: String,

    /// Kubelet root directory.
    #[arg(long, env = "RKVC_KUBELET_DIR", default_value = "/var/lib/kubelet")]
    pub kubelet_dir: PathBuf,

    /// Directory layout of the node.
    #[arg(long, value_enum, default_value_t = PlatformArg::Kubelet)]
    pub platform: PlatformArg,

    /// Deadline in seconds for dialling a driver and for each call; 0 disables it.
    #[arg(long, default_value_t = 30)]
    pub rpc_timeout: u64,

    /// Refuse drivers whose GetPluginInfo name differs from the attacher name
    /// or whose Probe reports not ready.
    #[arg(long)]
    pub verify_identity: bool,

    /// Abort when a PersistentVolume cannot be resolved instead of skipping it.
    #[arg(long)]
    pub strict: bool,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Report format written to stdout.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformArg {
    Kubelet,
}

impl From<PlatformArg> for PlatformKind {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Kubelet => PlatformKind::Kubelet,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Resolved configuration of one probe run.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub node_filter: Option<String>,
    pub platform_kind: PlatformKind,
    pub platform: PlatformConfig,
    pub connect: ConnectOptions,
    pub policy: ResolutionPolicy,
    pub output: OutputFormat,
}

impl From<&Cli> for ProbeConfig {
    fn from(cli: &Cli) -> Self {
        // Matched byte for byte against `spec.nodeName`; only an empty
        // name disables the filter.
        let node_filter = (!cli.nodename.is_empty()).then(|| cli.nodename.clone());
        let timeout = (cli.rpc_timeout > 0).then(|| Duration::from_secs(cli.rpc_timeout));

        Self {
            node_filter,
            platform_kind: cli.platform.into(),
            platform: PlatformConfig::with_root(&cli.kubelet_dir),
            connect: ConnectOptions {
                timeout,
                verify_identity: cli.verify_identity,
            },
            policy: if cli.strict {
                ResolutionPolicy::Abort
            } else {
                ResolutionPolicy::Skip
            },
            output: cli.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["rkvc"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("valid arguments")
    }

    #[test]
    fn defaults() {
        let cli = parse(&["--kubelet-dir", "/var/lib/kubelet", "--nodename", ""]);
        let config = ProbeConfig::from(&cli);
        assert_eq!(config.node_filter, None);
        assert_eq!(config.platform_kind, PlatformKind::Kubelet);
        assert_eq!(config.platform, PlatformConfig::default());
        assert_eq!(config.connect.timeout, Some(Duration::from_secs(30)));
        assert!(!config.connect.verify_identity);
        assert_eq!(config.policy, ResolutionPolicy::Skip);
        assert_eq!(config.output, OutputFormat::Text);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "--nodename",
            "worker-1",
            "--kubelet-dir",
            "/srv/kubelet",
            "--rpc-timeout",
            "0",
            "--verify-identity",
            "--strict",
            "--output",
            "json",
        ]);
        let config = ProbeConfig::from(&cli);
        assert_eq!(config.node_filter.as_deref(), Some("worker-1"));
        assert_eq!(config.platform.root_dir, PathBuf::from("/srv/kubelet"));
        assert_eq!(config.connect.timeout, None);
        assert!(config.connect.verify_identity);
        assert_eq!(config.policy, ResolutionPolicy::Abort);
        assert_eq!(config.output, OutputFormat::Json);
    }

    #[test]
    fn nodename_is_kept_verbatim() {
        let config = ProbeConfig::from(&parse(&["--nodename", " node-a"]));
        assert_eq!(config.node_filter.as_deref(), Some(" node-a"));

        let config = ProbeConfig::from(&parse(&["--nodename", "Node-A "]));
        assert_eq!(config.node_filter.as_deref(), Some("Node-A "));
    }
}
