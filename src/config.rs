use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionFactory;
use crate::error::SqlPoolError;
use crate::pool::Pool;

/// Where connections are opened and with which credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTarget {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    password: String,
}

impl PoolTarget {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for PoolTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolTarget")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Timing knobs for the background refill monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorOptions {
    /// Polling interval while the pool is healthy, and the first retry delay after a failed refill.
    pub base_interval_ms: u64,
    /// Upper bound the retry delay grows to while refills keep failing.
    pub max_interval_ms: u64,
    /// Added to the retry delay after every failed refill.
    pub backoff_step_ms: u64,
    /// How often the monitor logs a status snapshot.
    pub status_interval_ms: u64,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            base_interval_ms: 1_000,
            max_interval_ms: 30_000,
            backoff_step_ms: 1_000,
            status_interval_ms: 60_000,
        }
    }
}

impl MonitorOptions {
    #[must_use]
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    #[must_use]
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    #[must_use]
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }

    #[must_use]
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

/// Options for configuring a [`Pool`].
///
/// A `max_size` of zero turns pooling off: every `acquire` opens a fresh connection and every
/// `release` closes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    pub name: String,
    pub target: PoolTarget,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    #[serde(default)]
    pub monitor: MonitorOptions,
}

fn default_max_size() -> usize {
    10
}

fn default_min_size() -> usize {
    1
}

impl PoolOptions {
    #[must_use]
    pub fn new(name: impl Into<String>, target: PoolTarget) -> Self {
        Self {
            name: name.into(),
            target,
            max_size: default_max_size(),
            min_size: default_min_size(),
            monitor: MonitorOptions::default(),
        }
    }

    #[must_use]
    pub fn builder(name: impl Into<String>, target: PoolTarget) -> PoolOptionsBuilder {
        PoolOptionsBuilder::new(name, target)
    }

    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.max_size > 0
    }

    /// Parse options from a JSON document.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::JsonError`] for malformed input and [`SqlPoolError::ConfigError`]
    /// if the parsed options fail [`PoolOptions::validate`].
    pub fn from_json_str(raw: &str) -> Result<Self, SqlPoolError> {
        let opts: Self = serde_json::from_str(raw)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Read and parse options from a JSON file.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::IoError`] if the file cannot be read, otherwise the same errors as
    /// [`PoolOptions::from_json_str`].
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, SqlPoolError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// # Errors
    /// Returns [`SqlPoolError::ConfigError`] when the sizes or monitor intervals are inconsistent.
    pub fn validate(&self) -> Result<(), SqlPoolError> {
        if self.name.is_empty() {
            return Err(SqlPoolError::ConfigError("pool name is required".to_string()));
        }
        if self.is_pooled() && self.min_size > self.max_size {
            return Err(SqlPoolError::ConfigError(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.monitor.base_interval_ms == 0 {
            return Err(SqlPoolError::ConfigError(
                "monitor base_interval_ms must be positive".to_string(),
            ));
        }
        if self.monitor.max_interval_ms < self.monitor.base_interval_ms {
            return Err(SqlPoolError::ConfigError(format!(
                "monitor max_interval_ms ({}) is below base_interval_ms ({})",
                self.monitor.max_interval_ms, self.monitor.base_interval_ms
            )));
        }
        Ok(())
    }
}

/// Fluent builder for [`PoolOptions`].
#[derive(Debug, Clone)]
pub struct PoolOptionsBuilder {
    opts: PoolOptions,
}

impl PoolOptionsBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, target: PoolTarget) -> Self {
        Self {
            opts: PoolOptions::new(name, target),
        }
    }

    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.opts.max_size = max_size;
        self
    }

    #[must_use]
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.opts.min_size = min_size;
        self
    }

    #[must_use]
    pub fn monitor(mut self, monitor: MonitorOptions) -> Self {
        self.opts.monitor = monitor;
        self
    }

    #[must_use]
    pub fn base_interval(mut self, interval: Duration) -> Self {
        self.opts.monitor.base_interval_ms = duration_ms(interval);
        self
    }

    #[must_use]
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.opts.monitor.max_interval_ms = duration_ms(interval);
        self
    }

    #[must_use]
    pub fn backoff_step(mut self, step: Duration) -> Self {
        self.opts.monitor.backoff_step_ms = duration_ms(step);
        self
    }

    #[must_use]
    pub fn status_interval(mut self, interval: Duration) -> Self {
        self.opts.monitor.status_interval_ms = duration_ms(interval);
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolOptions {
        self.opts
    }

    /// Build the pool, run its initial refill and start its monitor.
    ///
    /// # Errors
    ///
    /// Returns `SqlPoolError::ConfigError` if the options are inconsistent.
    pub async fn build<F: ConnectionFactory>(self, factory: F) -> Result<Pool<F>, SqlPoolError> {
        Pool::new(self.finish(), factory).await
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
