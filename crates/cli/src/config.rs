//! Command-line and settings-file configuration.

use crate::commands::Command;
use anyhow::{Context, Result};
use clap::Parser;
use node::Limits;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quicnode", version, about = "Request/response RPC over QUIC")]
pub struct CliConfig {
    /// JSON settings file. Command-line flags take precedence over it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(self) -> Result<()> {
        init_tracing(&self.log);

        let settings = match &self.config {
            Some(path) => NodeSettings::load(path)?,
            None => NodeSettings::default(),
        };
        let json = self.command.wants_json();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to build the Tokio runtime")?;
        let result = runtime.block_on(self.command.execute(&settings))?;
        println!("{}", result.render(json)?);
        Ok(())
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // stdout is reserved for command output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Values a settings file may provide.
///
/// ```json
/// { "listen": "0.0.0.0:4433", "cert": "cert.pem", "key": "key.pem",
///   "ca": "cert.pem", "server_name": "localhost", "dial_timeout_ms": 3000 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeSettings {
    pub listen: Option<String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub ca: Option<PathBuf>,
    pub server_name: Option<String>,
    pub dial_timeout_ms: Option<u64>,
    pub stream_timeout_ms: Option<u64>,
    pub max_body_bytes: Option<usize>,
}

impl NodeSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("invalid settings file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Node limits with any overrides from this file applied.
    pub fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        if let Some(ms) = self.dial_timeout_ms {
            limits.dial_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.stream_timeout_ms {
            limits.stream_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = self.max_body_bytes {
            limits.frame.max_body = max;
        }
        limits
    }
}
