//! Configuration loading and validation.
//!
//! Loads `config.toml` from the platform config directory (or
//! `$STRAYLIGHT_CONFIG_PATH`, or an explicit `--config` path). Environment
//! variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Upper bound accepted for `channel.read_buffer_size`.
pub const MAX_READ_BUFFER_SIZE: usize = 1_048_576;

// ── Top-level config ────────────────────────────────────────────

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StraylightConfig {
    /// Device channel settings (`[channel]`).
    pub channel: ChannelConfig,
    /// Socket transport settings (`[server]`).
    pub server: ServerConfig,
    /// Log output settings (`[logging]`).
    pub logging: LoggingConfig,
}

impl StraylightConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// `explicit` wins over `$STRAYLIGHT_CONFIG_PATH` and the default
    /// location. A missing file at the default location yields defaults; a
    /// missing file that was asked for explicitly is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting values are out of range.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path, true)?,
            None => Self::load_from_file(&Self::config_path_with(env)?, false)?,
        };
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides.
    fn load_from_file(path: &Path, required: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
        if let Some(p) = env("STRAYLIGHT_CONFIG_PATH") {
            return Ok(PathBuf::from(p));
        }
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process environment.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("STRAYLIGHT_READ_BUFFER_SIZE") {
            match v.parse() {
                Ok(n) => self.channel.read_buffer_size = n,
                Err(_) => tracing::warn!(
                    var = "STRAYLIGHT_READ_BUFFER_SIZE",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("STRAYLIGHT_SOCKET_PATH") {
            self.server.socket_path = PathBuf::from(v);
        }
        if let Some(v) = env("STRAYLIGHT_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("STRAYLIGHT_LOG_DIR") {
            self.logging.dir = PathBuf::from(v);
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let size = self.channel.read_buffer_size;
        if size == 0 || size > MAX_READ_BUFFER_SIZE {
            anyhow::bail!(
                "channel.read_buffer_size must be between 1 and {MAX_READ_BUFFER_SIZE}, got {size}"
            );
        }
        if self.server.socket_path.as_os_str().is_empty() {
            anyhow::bail!("server.socket_path must not be empty");
        }
        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level must not be empty");
        }
        Ok(())
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrongly-typed fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: StraylightConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

// ── Channel config ──────────────────────────────────────────────

/// Device channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Bytes offered to a snapshot read.
    pub read_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
        }
    }
}

// ── Server config ───────────────────────────────────────────────

/// Unix socket transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket file the agent listens on.
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let dir = directories::ProjectDirs::from("", "", "straylight")
            .and_then(|d| d.runtime_dir().map(Path::to_path_buf))
            .unwrap_or_else(std::env::temp_dir);
        Self {
            socket_path: dir.join("straylight.sock"),
        }
    }
}

// ── Logging config ──────────────────────────────────────────────

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for the rolling JSON log.
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let dir = directories::ProjectDirs::from("", "", "straylight")
            .map(|d| d.data_local_dir().join("logs"))
            .unwrap_or_else(|| std::env::temp_dir().join("straylight-logs"));
        Self {
            level: "info".to_owned(),
            dir,
        }
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "straylight")
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))
}
