//! Agent and hub configuration
//!
//! Every setting is resolved once at startup with the precedence
//! flag > environment variable > JSON config file > default. Flags and
//! environment variables are handled by clap; [`AgentArgs::resolve`] and
//! [`HubArgs::resolve`] fold in the config file and the defaults.

use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::storage::StorageConfig;

const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_POLL_INTERVAL: u64 = 2;
const DEFAULT_REPORT_INTERVAL: u64 = 10;
const DEFAULT_RATE_LIMIT: usize = 1;
const DEFAULT_STORE_INTERVAL: u64 = 300;
const DEFAULT_STORE_FILE: &str = "/tmp/metrics-db.json";

/// Interval in a config file: either a number of seconds or a string like `"10s"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FileInterval {
    Seconds(u64),
    Text(String),
}

impl FileInterval {
    fn to_seconds(&self) -> anyhow::Result<u64> {
        match self {
            FileInterval::Seconds(secs) => Ok(*secs),
            FileInterval::Text(text) => {
                let trimmed = text.trim();
                trimmed
                    .strip_suffix('s')
                    .unwrap_or(trimmed)
                    .parse()
                    .with_context(|| format!("invalid interval: {text:?}"))
            }
        }
    }
}

fn resolve_interval(
    flag: Option<u64>,
    file: Option<&FileInterval>,
    default: u64,
) -> anyhow::Result<Duration> {
    let secs = match (flag, file) {
        (Some(secs), _) => secs,
        (None, Some(file)) => file.to_seconds()?,
        (None, None) => default,
    };
    Ok(Duration::from_secs(secs))
}

/// Empty strings count as unset
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn read_config_file<T: DeserializeOwned + Debug>(path: &str) -> anyhow::Result<T> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// Command line of the agent
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "relay-agent", about = "Collects system metrics and ships them to the hub")]
pub struct AgentArgs {
    /// Hub address (host:port or URL)
    #[arg(short, long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Seconds between metric polls
    #[arg(short, long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Seconds between reports to the hub
    #[arg(short, long, env = "REPORT_INTERVAL")]
    pub report_interval: Option<u64>,

    /// Key used to sign request bodies
    #[arg(short, long, env = "KEY")]
    pub key: Option<String>,

    /// Path to the hub's public key (PEM)
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Number of concurrent senders (and queue capacity)
    #[arg(short = 'l', long, env = "RATE_LIMIT")]
    pub rate_limit: Option<usize>,

    /// Send all metrics in one batch request
    #[arg(short, long, env = "BATCH")]
    pub batch: Option<bool>,

    /// JSON configuration file
    #[arg(short, long, env = "CONFIG")]
    pub config: Option<String>,
}

/// Agent config file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentFileConfig {
    pub address: Option<String>,
    pub poll_interval: Option<FileInterval>,
    pub report_interval: Option<FileInterval>,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub rate_limit: Option<usize>,
    pub batch: Option<bool>,
}

/// Fully resolved agent settings
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub address: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub rate_limit: usize,
    pub batch: bool,
}

impl AgentArgs {
    /// Parse the command line and environment, then merge the config file
    pub fn load() -> anyhow::Result<AgentSettings> {
        let args = Self::parse();
        let file = match &args.config {
            Some(path) => read_config_file(path)?,
            None => AgentFileConfig::default(),
        };
        args.resolve(file)
    }

    pub fn resolve(self, file: AgentFileConfig) -> anyhow::Result<AgentSettings> {
        let settings = AgentSettings {
            address: non_empty(self.address)
                .or(non_empty(file.address))
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            poll_interval: resolve_interval(
                self.poll_interval,
                file.poll_interval.as_ref(),
                DEFAULT_POLL_INTERVAL,
            )?,
            report_interval: resolve_interval(
                self.report_interval,
                file.report_interval.as_ref(),
                DEFAULT_REPORT_INTERVAL,
            )?,
            key: non_empty(self.key).or(non_empty(file.key)),
            crypto_key: self.crypto_key.or(file.crypto_key),
            rate_limit: self
                .rate_limit
                .or(file.rate_limit)
                .unwrap_or(DEFAULT_RATE_LIMIT),
            batch: self.batch.or(file.batch).unwrap_or(true),
        };

        anyhow::ensure!(
            !settings.poll_interval.is_zero(),
            "poll interval must be positive"
        );
        anyhow::ensure!(
            !settings.report_interval.is_zero(),
            "report interval must be positive"
        );
        anyhow::ensure!(settings.rate_limit > 0, "rate limit must be positive");

        Ok(settings)
    }
}

/// Command line of the hub
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "relay-hub", about = "Receives and stores metrics from agents")]
pub struct HubArgs {
    /// Listen address (host:port)
    #[arg(short, long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Seconds between snapshot saves (0 disables automatic saves)
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    pub store_interval: Option<u64>,

    /// Snapshot file (empty keeps metrics in memory only)
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    pub file_storage_path: Option<String>,

    /// Load the snapshot file on startup
    #[arg(short, long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// Database DSN; takes precedence over file storage
    #[arg(short, long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Key used to verify request hashes and sign responses
    #[arg(short, long, env = "KEY")]
    pub key: Option<String>,

    /// Path to the private key (PEM) for encrypted bodies
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Only accept agents whose X-Real-IP is inside this CIDR
    #[arg(short, long, env = "TRUSTED_SUBNET")]
    pub trusted_subnet: Option<String>,

    /// JSON configuration file
    #[arg(short, long, env = "CONFIG")]
    pub config: Option<String>,
}

/// Hub config file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubFileConfig {
    pub address: Option<String>,
    pub store_interval: Option<FileInterval>,
    pub store_file: Option<String>,
    pub restore: Option<bool>,
    pub database_dsn: Option<String>,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<String>,
}

/// Fully resolved hub settings
#[derive(Debug, Clone, PartialEq)]
pub struct HubSettings {
    pub address: String,
    pub store_interval: Duration,
    pub file_storage_path: String,
    pub restore: bool,
    pub database_dsn: Option<String>,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<String>,
}

impl HubSettings {
    pub fn storage(&self) -> StorageConfig {
        StorageConfig::select(
            self.database_dsn.as_deref(),
            Some(&self.file_storage_path),
            self.store_interval,
            self.restore,
        )
    }
}

impl HubArgs {
    /// Parse the command line and environment, then merge the config file
    pub fn load() -> anyhow::Result<HubSettings> {
        let args = Self::parse();
        let file = match &args.config {
            Some(path) => read_config_file(path)?,
            None => HubFileConfig::default(),
        };
        args.resolve(file)
    }

    pub fn resolve(self, file: HubFileConfig) -> anyhow::Result<HubSettings> {
        Ok(HubSettings {
            address: non_empty(self.address)
                .or(non_empty(file.address))
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            store_interval: resolve_interval(
                self.store_interval,
                file.store_interval.as_ref(),
                DEFAULT_STORE_INTERVAL,
            )?,
            // an explicitly empty path selects memory storage, so no non_empty here
            file_storage_path: self
                .file_storage_path
                .or(file.store_file)
                .unwrap_or_else(|| DEFAULT_STORE_FILE.to_string()),
            restore: self.restore.or(file.restore).unwrap_or(true),
            database_dsn: non_empty(self.database_dsn).or(non_empty(file.database_dsn)),
            key: non_empty(self.key).or(non_empty(file.key)),
            crypto_key: self.crypto_key.or(file.crypto_key),
            trusted_subnet: non_empty(self.trusted_subnet).or(non_empty(file.trusted_subnet)),
        })
    }
}
