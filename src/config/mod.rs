//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `GROVE_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{DEFAULT_CACHE_NAMESPACE, DEFAULT_MAX_SEQ_LEN};

/// Server configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `GROVE_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port. Default: `8080`.
    pub port: u16,

    /// IP address to bind to. Default: `127.0.0.1`.
    pub bind_addr: IpAddr,

    /// Path to the GGUF decoder model. `None` runs the scorer in stub mode.
    pub model_path: Option<PathBuf>,

    /// Path to `tokenizer.json`. Defaults to the model's directory.
    pub tokenizer_path: Option<PathBuf>,

    /// Max tokens fed to the model per input. Default: `2048`.
    pub max_seq_len: usize,

    /// Namespace prefix for cache keys.
    pub cache_namespace: String,

    /// Optional bound on in-memory entries. Default: unbounded.
    ///
    /// With a bound, least-used scores are evicted and computed again on the next request.
    pub cache_capacity: Option<u64>,

    /// Optional time-to-live for cached scores. Default: no expiry.
    pub cache_ttl: Option<Duration>,

    /// Optional snapshot file used to persist scores across restarts.
    pub snapshot_path: Option<PathBuf>,

    /// Optional per-request timeout. Default: wait for the computation.
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            model_path: None,
            tokenizer_path: None,
            max_seq_len: DEFAULT_MAX_SEQ_LEN,
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            cache_capacity: None,
            cache_ttl: None,
            snapshot_path: None,
            request_timeout: None,
        }
    }
}

impl Config {
    pub const ENV_PORT: &'static str = "GROVE_PORT";
    const ENV_BIND_ADDR: &'static str = "GROVE_BIND_ADDR";
    const ENV_MODEL_PATH: &'static str = "GROVE_MODEL_PATH";
    const ENV_TOKENIZER_PATH: &'static str = "GROVE_TOKENIZER_PATH";
    const ENV_MAX_SEQ_LEN: &'static str = "GROVE_MAX_SEQ_LEN";
    const ENV_CACHE_NAMESPACE: &'static str = "GROVE_CACHE_NAMESPACE";
    const ENV_CACHE_CAPACITY: &'static str = "GROVE_CACHE_CAPACITY";
    const ENV_CACHE_TTL_SECS: &'static str = "GROVE_CACHE_TTL_SECS";
    const ENV_SNAPSHOT_PATH: &'static str = "GROVE_SNAPSHOT_PATH";
    const ENV_REQUEST_TIMEOUT_SECS: &'static str = "GROVE_REQUEST_TIMEOUT_SECS";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let model_path = Self::parse_optional_path_from_env(Self::ENV_MODEL_PATH);
        let tokenizer_path = Self::parse_optional_path_from_env(Self::ENV_TOKENIZER_PATH);
        let max_seq_len = Self::parse_usize_from_env(Self::ENV_MAX_SEQ_LEN, defaults.max_seq_len);
        let cache_namespace =
            Self::parse_namespace_from_env(Self::ENV_CACHE_NAMESPACE, defaults.cache_namespace)?;
        let cache_capacity = Self::parse_optional_u64_from_env(Self::ENV_CACHE_CAPACITY)?;
        let cache_ttl = Self::parse_optional_secs_from_env(Self::ENV_CACHE_TTL_SECS)?;
        let snapshot_path = Self::parse_optional_path_from_env(Self::ENV_SNAPSHOT_PATH);
        let request_timeout = Self::parse_optional_secs_from_env(Self::ENV_REQUEST_TIMEOUT_SECS)?;

        Ok(Self {
            port,
            bind_addr,
            model_path,
            tokenizer_path,
            max_seq_len,
            cache_namespace,
            cache_capacity,
            cache_ttl,
            snapshot_path,
            request_timeout,
        })
    }

    /// Validates paths and basic invariants (does not create directories).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref path) = self.model_path {
            if !path.exists() {
                return Err(ConfigError::PathNotFound { path: path.clone() });
            }
            if !path.is_file() {
                return Err(ConfigError::NotAFile { path: path.clone() });
            }
        }

        if let Some(ref path) = self.tokenizer_path {
            if !path.exists() {
                return Err(ConfigError::PathNotFound { path: path.clone() });
            }
            if !path.is_file() {
                return Err(ConfigError::NotAFile { path: path.clone() });
            }
        }

        if let Some(parent) = self
            .snapshot_path
            .as_ref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            && parent.exists()
            && !parent.is_dir()
        {
            return Err(ConfigError::NotADirectory {
                path: parent.to_path_buf(),
            });
        }

        if self.max_seq_len == 0 {
            return Err(ConfigError::InvalidValue {
                name: Self::ENV_MAX_SEQ_LEN,
                value: "0".to_string(),
            });
        }

        if self.cache_capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: Self::ENV_CACHE_CAPACITY,
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    /// Returns `"{bind_addr}:{port}"` (useful for logging/binding).
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn parse_namespace_from_env(
        var_name: &'static str,
        default: String,
    ) -> Result<String, ConfigError> {
        match env::var(var_name) {
            Ok(value) if value.trim().is_empty() => {
                Err(ConfigError::InvalidValue { name: var_name, value })
            }
            Ok(value) => Ok(value.trim().to_string()),
            Err(_) => Ok(default),
        }
    }

    fn parse_optional_secs_from_env(var_name: &'static str) -> Result<Option<Duration>, ConfigError> {
        let Some(value) = env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
            name: var_name,
            value: value.clone(),
        })?;

        // 0 means "disabled", matching an unset variable.
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }

    fn parse_usize_from_env(var_name: &str, default: usize) -> usize {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn parse_optional_u64_from_env(var_name: &'static str) -> Result<Option<u64>, ConfigError> {
        let Some(value) = env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: var_name,
                value,
            })
    }
}
