//! Configuration resolution for voxshift
//!
//! Every tunable resolves through the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`VOXSHIFT_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Clap handles tiers 1-2; the TOML tier is merged in [`Config::resolve`].

use crate::error::{Error, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 5740;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_RETENTION_TTL_SECS: u64 = 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30 * 60;
const DEFAULT_BASE_SAMPLE_RATE: u32 = 44_100;
const DEFAULT_TRANSFORM_TIMEOUT_SECS: u64 = 120;

/// Command-line / environment tier of the configuration
#[derive(Debug, Parser)]
#[command(name = "voxshift", version, about = "Audio pitch-transform pipeline service")]
pub struct Cli {
    /// Path to a TOML config file (tier 3)
    #[arg(long, env = "VOXSHIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP listen port
    #[arg(long, env = "VOXSHIFT_PORT")]
    pub port: Option<u16>,

    /// Root directory for artifact storage (incoming/ and derived/ live here)
    #[arg(long, env = "VOXSHIFT_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "VOXSHIFT_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<u64>,

    /// Artifact time-to-live in seconds before the sweeper removes it
    #[arg(long, env = "VOXSHIFT_RETENTION_TTL_SECS")]
    pub retention_ttl_secs: Option<u64>,

    /// Interval between retention sweep passes, in seconds
    #[arg(long, env = "VOXSHIFT_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,

    /// Base sample rate used by the pitch-shift filter chain
    #[arg(long, env = "VOXSHIFT_BASE_SAMPLE_RATE")]
    pub base_sample_rate: Option<u32>,

    /// ffmpeg binary to invoke (name on PATH or absolute path)
    #[arg(long, env = "VOXSHIFT_FFMPEG_PATH")]
    pub ffmpeg_path: Option<String>,

    /// Wall-clock budget for a single transform invocation, in seconds
    #[arg(long, env = "VOXSHIFT_TRANSFORM_TIMEOUT_SECS")]
    pub transform_timeout_secs: Option<u64>,
}

/// TOML tier of the configuration (all fields optional)
#[derive(Debug, Default, Deserialize)]
pub struct TomlConfig {
    pub port: Option<u16>,
    pub storage_root: Option<PathBuf>,
    pub max_upload_bytes: Option<u64>,
    pub retention_ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub base_sample_rate: Option<u32>,
    pub ffmpeg_path: Option<String>,
    pub transform_timeout_secs: Option<u64>,
}

/// Fully resolved application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage_root: PathBuf,
    pub max_upload_bytes: u64,
    pub retention_ttl: Duration,
    pub sweep_interval: Duration,
    pub base_sample_rate: u32,
    pub ffmpeg_path: String,
    pub transform_timeout: Duration,
}

impl Config {
    /// Resolve the full configuration from all four tiers
    pub fn resolve(cli: Cli) -> Result<Self> {
        let file = load_toml_tier(cli.config.as_deref())?;

        let config = Config {
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            storage_root: cli
                .storage_root
                .or(file.storage_root)
                .unwrap_or_else(|| PathBuf::from("./data")),
            max_upload_bytes: cli
                .max_upload_bytes
                .or(file.max_upload_bytes)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            retention_ttl: Duration::from_secs(
                cli.retention_ttl_secs
                    .or(file.retention_ttl_secs)
                    .unwrap_or(DEFAULT_RETENTION_TTL_SECS),
            ),
            sweep_interval: Duration::from_secs(
                cli.sweep_interval_secs
                    .or(file.sweep_interval_secs)
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            ),
            base_sample_rate: cli
                .base_sample_rate
                .or(file.base_sample_rate)
                .unwrap_or(DEFAULT_BASE_SAMPLE_RATE),
            ffmpeg_path: cli
                .ffmpeg_path
                .or(file.ffmpeg_path)
                .unwrap_or_else(|| "ffmpeg".to_string()),
            transform_timeout: Duration::from_secs(
                cli.transform_timeout_secs
                    .or(file.transform_timeout_secs)
                    .unwrap_or(DEFAULT_TRANSFORM_TIMEOUT_SECS),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be non-zero".to_string()));
        }
        if self.base_sample_rate == 0 {
            return Err(Error::Config("base_sample_rate must be non-zero".to_string()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep_interval_secs must be non-zero".to_string()));
        }
        if self.transform_timeout.is_zero() {
            return Err(Error::Config(
                "transform_timeout_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load the TOML tier from an explicit path, or the platform default
/// (`<config_dir>/voxshift/config.toml`) when present.
fn load_toml_tier(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            // An explicitly named file must exist and parse
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => {
            let Some(default_path) = default_config_path() else {
                return Ok(TomlConfig::default());
            };
            if !default_path.exists() {
                return Ok(TomlConfig::default());
            }
            default_path
        }
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read config {} failed: {}", path.display(), e)))?;
    match toml::from_str(&content) {
        Ok(parsed) => {
            info!("Loaded config file: {}", path.display());
            Ok(parsed)
        }
        Err(e) => {
            if explicit.is_some() {
                Err(Error::Config(format!(
                    "Parse config {} failed: {}",
                    path.display(),
                    e
                )))
            } else {
                // A broken default-location file should not stop startup
                warn!("Ignoring unparseable config {}: {}", path.display(), e);
                Ok(TomlConfig::default())
            }
        }
    }
}

/// Default configuration file path for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("voxshift").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_cli() -> Cli {
        Cli::parse_from(["voxshift"])
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cli = empty_cli();
        // Avoid picking up a developer's real config file
        let file = TomlConfig::default();
        let config = Config {
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            storage_root: PathBuf::from("./data"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention_ttl: Duration::from_secs(DEFAULT_RETENTION_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            base_sample_rate: DEFAULT_BASE_SAMPLE_RATE,
            ffmpeg_path: "ffmpeg".to_string(),
            transform_timeout: Duration::from_secs(DEFAULT_TRANSFORM_TIMEOUT_SECS),
        };
        assert_eq!(config.port, 5740);
        assert_eq!(config.max_upload_bytes, 52_428_800);
        assert_eq!(config.retention_ttl, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(1800));
        assert_eq!(config.base_sample_rate, 44_100);
    }

    #[test]
    fn cli_overrides_toml() {
        let cli = Cli::parse_from([
            "voxshift",
            "--port",
            "9000",
            "--max-upload-bytes",
            "1024",
        ]);
        let file = TomlConfig {
            port: Some(7000),
            max_upload_bytes: Some(2048),
            ..TomlConfig::default()
        };
        assert_eq!(cli.port.or(file.port).unwrap(), 9000);
        assert_eq!(cli.max_upload_bytes.or(file.max_upload_bytes).unwrap(), 1024);
    }

    #[test]
    fn toml_tier_parses_all_fields() {
        let parsed: TomlConfig = toml::from_str(
            r#"
            port = 8123
            storage_root = "/var/lib/voxshift"
            max_upload_bytes = 1048576
            retention_ttl_secs = 120
            sweep_interval_secs = 60
            base_sample_rate = 48000
            ffmpeg_path = "/usr/local/bin/ffmpeg"
            transform_timeout_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(parsed.port, Some(8123));
        assert_eq!(parsed.storage_root, Some(PathBuf::from("/var/lib/voxshift")));
        assert_eq!(parsed.base_sample_rate, Some(48_000));
    }

    #[test]
    fn zero_upload_ceiling_is_rejected() {
        let config = Config {
            port: DEFAULT_PORT,
            storage_root: PathBuf::from("./data"),
            max_upload_bytes: 0,
            retention_ttl: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(1),
            base_sample_rate: DEFAULT_BASE_SAMPLE_RATE,
            ffmpeg_path: "ffmpeg".to_string(),
            transform_timeout: Duration::from_secs(1),
        };
        assert!(config.validate().is_err());
    }
}
