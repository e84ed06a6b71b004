//! Configuration loading and validation.
//!
//! The document is YAML, matching the original service's
//! `config.yaml`/`gopkg.in/yaml.v3`, loaded from the path named by the
//! `CONFIG_PATH` environment variable (default `config.yaml`). Every
//! range check below is enforced once, at startup; a config error is
//! fatal and the process never serves traffic with a partially invalid
//! configuration.

use std::net::ToSocketAddrs;
use std::time::Duration;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_MESSAGE_OR_SEGMENT_SIZE: u64 = 1 << 30;
const MAX_CONNECTIONS_CEILING: u32 = 100;
const MAX_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineSettings,
    pub network: NetworkSettings,
    pub wal: WalSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub address: String,
    pub max_connections: u32,
    pub max_message_size: ByteSize,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalSettings {
    #[serde(default = "default_wal_enabled")]
    pub enabled: bool,
    pub flushing_batch_size: u32,
    #[serde(with = "humantime_serde")]
    pub flushing_batch_timeout: Duration,
    pub max_segment_size: ByteSize,
    pub data_directory: String,
}

fn default_wal_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub output: String,
}

impl Config {
    /// Reads the path in `CONFIG_PATH` (default `config.yaml`), parses it
    /// as YAML, and validates every field. Any failure is fatal.
    pub async fn load() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        let content = tokio::fs::read_to_string(&path).await?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| Error::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.kind != "in_memory" {
            return Err(Error::EngineUnknown(self.engine.kind.clone()));
        }

        self.network.validate()?;
        self.wal.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl NetworkSettings {
    fn validate(&self) -> Result<()> {
        self.address
            .to_socket_addrs()
            .map_err(|_| Error::AddressInvalid(self.address.clone()))?
            .next()
            .ok_or_else(|| Error::AddressInvalid(self.address.clone()))?;

        if self.max_connections > MAX_CONNECTIONS_CEILING {
            return Err(Error::ParamOutOfRange {
                field: "network.max_connections",
                min: "0".to_string(),
                max: MAX_CONNECTIONS_CEILING.to_string(),
                got: self.max_connections.to_string(),
            });
        }

        let max_message_size = self.max_message_size.as_u64();
        if max_message_size == 0 || max_message_size > MAX_MESSAGE_OR_SEGMENT_SIZE {
            return Err(Error::ParamOutOfRange {
                field: "network.max_message_size",
                min: "1".to_string(),
                max: MAX_MESSAGE_OR_SEGMENT_SIZE.to_string(),
                got: max_message_size.to_string(),
            });
        }

        if self.idle_timeout > MAX_TIMEOUT {
            return Err(Error::ParamOutOfRange {
                field: "network.idle_timeout",
                min: "0s".to_string(),
                max: "5m".to_string(),
                got: humantime::format_duration(self.idle_timeout).to_string(),
            });
        }

        Ok(())
    }
}

impl WalSettings {
    fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.flushing_batch_size == 0
            || self.flushing_batch_size as u64 > MAX_MESSAGE_OR_SEGMENT_SIZE
        {
            return Err(Error::ParamOutOfRange {
                field: "wal.flushing_batch_size",
                min: "1".to_string(),
                max: MAX_MESSAGE_OR_SEGMENT_SIZE.to_string(),
                got: self.flushing_batch_size.to_string(),
            });
        }

        if self.flushing_batch_timeout > MAX_TIMEOUT {
            return Err(Error::ParamOutOfRange {
                field: "wal.flushing_batch_timeout",
                min: "0s".to_string(),
                max: "5m".to_string(),
                got: humantime::format_duration(self.flushing_batch_timeout).to_string(),
            });
        }

        let max_segment_size = self.max_segment_size.as_u64();
        if max_segment_size == 0 || max_segment_size > MAX_MESSAGE_OR_SEGMENT_SIZE {
            return Err(Error::ParamOutOfRange {
                field: "wal.max_segment_size",
                min: "1".to_string(),
                max: MAX_MESSAGE_OR_SEGMENT_SIZE.to_string(),
                got: max_segment_size.to_string(),
            });
        }

        if self.data_directory.trim().is_empty() {
            return Err(Error::ConfigInvalid(
                "wal.data_directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingSettings {
    fn validate(&self) -> Result<()> {
        match self.level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::ConfigInvalid(format!(
                    "logging.level must be one of debug|info|warn|error, got {other}"
                )))
            }
        }

        if self.output.trim().is_empty() {
            return Err(Error::ConfigInvalid(
                "logging.output must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
