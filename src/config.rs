use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::decode::DecoderConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// UDP address the collector binds to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Output file for gzipped JSON lines, one object per decoded packet.
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    /// Rotate the output file every this many seconds; 0 disables
    /// rotation.
    #[serde(default = "default_rotate_interval")]
    pub rotate_interval_secs: u64,
    /// Where the template-registry snapshot is persisted across restarts.
    #[serde(default)]
    pub snapshot_file: Option<PathBuf>,
    /// Log at debug level.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub decoder: DecoderSection,
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:2055".parse().expect("valid default listen address")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("flows.jsonl.gz")
}

fn default_rotate_interval() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecoderSection {
    /// Per-exporter cap on datagrams parked while waiting for templates.
    #[serde(default = "default_max_deferred")]
    pub max_deferred_per_exporter: usize,
    /// Seconds a deferred datagram may wait before it is dropped.
    #[serde(default = "default_deferred_ttl")]
    pub deferred_ttl_secs: u64,
}

fn default_max_deferred() -> usize {
    500
}

fn default_deferred_ttl() -> u64 {
    600
}

impl Default for DecoderSection {
    fn default() -> Self {
        Self {
            max_deferred_per_exporter: default_max_deferred(),
            deferred_ttl_secs: default_deferred_ttl(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            output_file: default_output_file(),
            rotate_interval_secs: default_rotate_interval(),
            snapshot_file: None,
            debug: false,
            decoder: DecoderSection::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.decoder.max_deferred_per_exporter == 0 {
            anyhow::bail!("decoder.max_deferred_per_exporter must be at least 1");
        }
        if self.decoder.deferred_ttl_secs == 0 {
            anyhow::bail!("decoder.deferred_ttl_secs must be at least 1");
        }
        if self.output_file.as_os_str().is_empty() {
            anyhow::bail!("output_file must not be empty");
        }
        Ok(())
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            max_deferred_per_exporter: self.decoder.max_deferred_per_exporter,
            deferred_ttl: Duration::from_secs(self.decoder.deferred_ttl_secs),
        }
    }
}
