use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::GenError;

pub const DEFAULT_HOST: &str = "https://api.stability.ai/v2beta";
pub const DEFAULT_API_KEY_ENV: &str = "STABILITY_KEY";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 500;

/// Env var naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "MEDIAGEN_CONFIG";
/// Env var overriding the service host.
pub const HOST_ENV: &str = "STABILITY_HOST";
/// Env var overriding the poll timeout, in whole seconds.
pub const TIMEOUT_ENV: &str = "WORKER_TIMEOUT";

/// Timing of the async poll loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed wait between two status queries.
    pub poll_interval: Duration,
    /// Budget from submission to a terminal state.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from_secs(DEFAULT_POLL_INTERVAL_SECS, DEFAULT_TIMEOUT_SECS)
    }
}

impl PollConfig {
    pub fn from_secs(poll_interval_secs: u64, timeout_secs: u64) -> Self {
        Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// A timeout that does not exceed the interval leaves no room for a
    /// second poll, so it is rejected as a configuration error.
    pub fn validate(&self) -> Result<(), GenError> {
        if self.poll_interval.is_zero() {
            return Err(GenError::Config("poll interval must be positive".into()));
        }
        if self.timeout <= self.poll_interval {
            return Err(GenError::Config(format!(
                "timeout ({}s) must exceed poll interval ({}s)",
                self.timeout.as_secs_f64(),
                self.poll_interval.as_secs_f64()
            )));
        }
        Ok(())
    }
}

/// Where the bearer credential comes from. Queried once per request so a
/// rotated key is picked up by the next call.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Reads the credential from an environment variable on every call.
#[derive(Clone, Debug)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl CredentialSource for EnvCredential {
    fn api_key(&self) -> Option<String> {
        env::var(&self.var).ok().filter(|k| !k.trim().is_empty())
    }
}

/// Fixed credential, mainly for embedding and tests.
#[derive(Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticCredential([REDACTED])")
    }
}

impl CredentialSource for StaticCredential {
    fn api_key(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// On-disk shape of the optional TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    api_key_env: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Service root, without trailing slash.
    pub host: String,
    pub poll: PollConfig,
    /// Name of the env var holding the bearer credential.
    pub api_key_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            poll: PollConfig::default(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file named by `MEDIAGEN_CONFIG` (if set),
    /// then environment overrides.
    pub fn load() -> Result<Self, GenError> {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Defaults plus environment overrides, ignoring any config file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Result<Self, GenError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GenError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, GenError> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| GenError::Config(format!("config file: {e}")))?;

        let mut config = Self::default();
        if let Some(host) = file.host {
            config.host = normalize_host(&host);
        }
        if let Some(secs) = file.poll_interval_secs {
            config.poll.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.timeout_secs {
            config.poll.timeout = Duration::from_secs(secs);
        }
        if let Some(var) = file.api_key_env {
            config.api_key_env = var;
        }
        Ok(config)
    }

    /// Apply `STABILITY_HOST` and `WORKER_TIMEOUT` through `lookup`.
    /// A timeout that does not parse as whole seconds is ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(HOST_ENV).filter(|h| !h.trim().is_empty()) {
            self.host = normalize_host(&host);
        }

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.poll.timeout = Duration::from_secs(secs),
                Err(e) => tracing::warn!(
                    value = raw,
                    fallback_secs = self.poll.timeout.as_secs(),
                    "{TIMEOUT_ENV} is not a whole number of seconds: {e}"
                ),
            }
        }
    }

    pub fn credentials(&self) -> EnvCredential {
        EnvCredential::new(&self.api_key_env)
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('/').to_string()
}
