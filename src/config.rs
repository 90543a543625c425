//! SIEVE - Filter Configuration
//! Construction parameters for a filter and its backend.
//!
//! Loading these from files or the environment is left to the caller;
//! every struct derives `Deserialize` so any serde format works.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SieveError};
use crate::types::FilterIdentity;

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_ERROR_RATE: f64 = 0.001;

/// Sizing of the bit vector. Fixed for the lifetime of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    /// Expected maximum number of distinct items.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Target false-positive probability, exclusive range (0, 1).
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_error_rate() -> f64 {
    DEFAULT_ERROR_RATE
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            error_rate: DEFAULT_ERROR_RATE,
        }
    }
}

impl FilterParams {
    pub fn new(capacity: usize, error_rate: f64) -> Self {
        Self {
            capacity,
            error_rate,
        }
    }

    /// Reject parameters the bit vector cannot be sized from.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SieveError::Config("capacity must be positive".into()));
        }
        // Written so that NaN fails as well.
        if !(self.error_rate > 0.0 && self.error_rate < 1.0) {
            return Err(SieveError::Config(format!(
                "error rate must be in (0, 1), got {}",
                self.error_rate
            )));
        }
        Ok(())
    }
}

/// Connection settings for the shared (Redis) backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    /// Empty means no AUTH.
    pub password: String,
    pub db: i64,
    /// Applied to connect, read and write.
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6379,
            password: String::new(),
            db: 0,
            timeout_ms: 2_000,
        }
    }
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SieveError::Config("shared backend requires a host".into()));
        }
        if self.port == 0 {
            return Err(SieveError::Config("shared backend requires a port".into()));
        }
        if self.db < 0 {
            return Err(SieveError::Config(format!(
                "database index must not be negative, got {}",
                self.db
            )));
        }
        if self.timeout_ms == 0 {
            return Err(SieveError::Config("timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Backend selector. Tagged by the `backend` field when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendConfig {
    Local {
        #[serde(default = "default_store_dir")]
        store_dir: PathBuf,
    },
    Shared(RemoteConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local {
            store_dir: default_store_dir(),
        }
    }
}

/// `$HOME/.sieve`, or `./.sieve` when no home directory is known.
pub fn default_store_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".sieve"),
        _ => PathBuf::from(".sieve"),
    }
}

/// Everything needed to open one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub identity: FilterIdentity,

    #[serde(flatten)]
    pub params: FilterParams,

    #[serde(flatten)]
    pub backend: BackendConfig,
}

impl FilterConfig {
    /// A local filter in the default store directory with default sizing.
    pub fn new(identity: FilterIdentity) -> Self {
        Self {
            identity,
            params: FilterParams::default(),
            backend: BackendConfig::default(),
        }
    }

    pub fn with_params(mut self, capacity: usize, error_rate: f64) -> Self {
        self.params = FilterParams::new(capacity, error_rate);
        self
    }

    pub fn local(mut self, store_dir: impl Into<PathBuf>) -> Self {
        self.backend = BackendConfig::Local {
            store_dir: store_dir.into(),
        };
        self
    }

    pub fn shared(mut self, remote: RemoteConfig) -> Self {
        self.backend = BackendConfig::Shared(remote);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = FilterParams::default();
        assert_eq!(params.capacity, 10_000);
        assert_eq!(params.error_rate, 0.001);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        assert!(FilterParams::new(0, 0.01).validate().is_err());
        assert!(FilterParams::new(100, 0.0).validate().is_err());
        assert!(FilterParams::new(100, 1.0).validate().is_err());
        assert!(FilterParams::new(100, -0.5).validate().is_err());
        assert!(FilterParams::new(100, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_remote_validation() {
        assert!(RemoteConfig::default().validate().is_ok());
        assert!(RemoteConfig::new("", 6379).validate().is_err());
        assert!(RemoteConfig::new("localhost", 0).validate().is_err());
        assert!(RemoteConfig::default().with_db(-1).validate().is_err());
        assert!(RemoteConfig::default()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_local() {
        let json = r#"{
            "identity": "news",
            "capacity": 500,
            "backend": "local",
            "store_dir": "/var/lib/sieve"
        }"#;
        let config: FilterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.identity.as_str(), "news");
        assert_eq!(config.params.capacity, 500);
        assert_eq!(config.params.error_rate, DEFAULT_ERROR_RATE);
        assert_eq!(
            config.backend,
            BackendConfig::Local {
                store_dir: PathBuf::from("/var/lib/sieve")
            }
        );
    }

    #[test]
    fn test_deserialize_shared() {
        let json = r#"{
            "identity": "news",
            "error_rate": 0.01,
            "backend": "shared",
            "host": "redis.internal",
            "password": "secret",
            "db": 3
        }"#;
        let config: FilterConfig = serde_json::from_str(json).unwrap();
        match config.backend {
            BackendConfig::Shared(remote) => {
                assert_eq!(remote.host, "redis.internal");
                assert_eq!(remote.port, 6379);
                assert_eq!(remote.password, "secret");
                assert_eq!(remote.db, 3);
            }
            other => panic!("expected shared backend, got {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_rejects_bad_identity() {
        let json = r#"{ "identity": "../etc", "backend": "local" }"#;
        assert!(serde_json::from_str::<FilterConfig>(json).is_err());
    }
}
