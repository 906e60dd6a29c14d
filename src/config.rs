//! Endpoint and worker pool configuration.

use crate::error::{ConverterError, Result};
use reqwest::Url;
use std::time::Duration;

/// Default timeout of a single network request (5 minutes).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default number of workers kept alive at all times.
pub const DEFAULT_CORE_POOL_SIZE: usize = 4;

/// Default upper bound on concurrently running workers.
pub const DEFAULT_MAXIMUM_POOL_SIZE: usize = 8;

/// Default idle time after which a worker above the core size exits.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Largest accepted request timeout, in milliseconds.
pub const MAX_REQUEST_TIMEOUT_MS: u128 = i32::MAX as u128;

/// Environment variable names read by [`EndpointConfigBuilder::from_env`].
pub const ENV_BASE_URI: &str = "CONVERTER_BASE_URI";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "CONVERTER_REQUEST_TIMEOUT_MS";
pub const ENV_CORE_POOL_SIZE: &str = "CONVERTER_CORE_POOL_SIZE";
pub const ENV_MAX_POOL_SIZE: &str = "CONVERTER_MAX_POOL_SIZE";
pub const ENV_KEEP_ALIVE_SECS: &str = "CONVERTER_KEEP_ALIVE_SECS";

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers spawned at startup and kept alive until shutdown.
    pub core_pool_size: usize,
    /// Maximum number of workers alive at once.
    pub maximum_pool_size: usize,
    /// Idle time after which workers above `core_pool_size` exit.
    pub keep_alive: Duration,
}

impl PoolConfig {
    fn validate(&self) -> Result<()> {
        if self.core_pool_size == 0 {
            return Err(ConverterError::configuration(
                "Core pool size must be positive",
            ));
        }
        if self.maximum_pool_size < self.core_pool_size {
            return Err(ConverterError::configuration(format!(
                "Maximum pool size ({}) must not be smaller than core pool size ({})",
                self.maximum_pool_size, self.core_pool_size
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_pool_size: DEFAULT_CORE_POOL_SIZE,
            maximum_pool_size: DEFAULT_MAXIMUM_POOL_SIZE,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

/// Immutable description of the remote conversion server and worker pool.
///
/// Built through [`EndpointConfig::builder`], which validates every field.
/// Workers share a clone and never mutate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    base_uri: Url,
    request_timeout: Duration,
    pool: PoolConfig,
}

impl EndpointConfig {
    /// Creates a new builder with default timeout and pool sizing.
    pub fn builder() -> EndpointConfigBuilder {
        EndpointConfigBuilder::default()
    }

    /// The URI under which the conversion server is reachable.
    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    /// Timeout applied to every individual network request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Worker pool sizing.
    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Full URL of the converter resource below the base URI.
    ///
    /// The resource path is appended to the path of the base URI; its query
    /// and fragment are kept as they are.
    pub fn resource_url(&self, resource_path: &str) -> Url {
        let mut url = self.base_uri.clone();
        // `build` rejects bases that cannot carry path segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(resource_path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }
}

/// Validating builder for [`EndpointConfig`].
///
/// Setters only record values; [`build`](Self::build) checks them all and
/// returns [`ConverterError::Configuration`] on the first violation.
#[derive(Debug, Clone)]
pub struct EndpointConfigBuilder {
    base_uri: Option<BaseUri>,
    request_timeout: Duration,
    pool: PoolConfig,
}

#[derive(Debug, Clone)]
enum BaseUri {
    Parsed(Url),
    Raw(String),
}

impl Default for EndpointConfigBuilder {
    fn default() -> Self {
        Self {
            base_uri: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            pool: PoolConfig::default(),
        }
    }
}

impl EndpointConfigBuilder {
    /// Loads settings from `CONVERTER_*` environment variables.
    ///
    /// Unset variables keep their defaults. Set but unparseable values fail.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(uri) = lookup(ENV_BASE_URI) {
            builder = builder.base_uri(uri);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_REQUEST_TIMEOUT_MS)? {
            builder = builder.request_timeout(Duration::from_millis(ms));
        }
        if let Some(size) = parse_var::<usize>(&lookup, ENV_CORE_POOL_SIZE)? {
            builder = builder.core_pool_size(size);
        }
        if let Some(size) = parse_var::<usize>(&lookup, ENV_MAX_POOL_SIZE)? {
            builder = builder.maximum_pool_size(size);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_KEEP_ALIVE_SECS)? {
            builder = builder.keep_alive(Duration::from_secs(secs));
        }

        Ok(builder)
    }

    /// Base URI of the conversion server in string form. Parsed at build time.
    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = Some(BaseUri::Raw(uri.into()));
        self
    }

    /// Base URI of the conversion server.
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_uri = Some(BaseUri::Parsed(url));
        self
    }

    /// Timeout of a single network request. Must be positive.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn core_pool_size(mut self, size: usize) -> Self {
        self.pool.core_pool_size = size;
        self
    }

    pub fn maximum_pool_size(mut self, size: usize) -> Self {
        self.pool.maximum_pool_size = size;
        self
    }

    /// Idle time after which workers above the core size exit.
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.pool.keep_alive = keep_alive;
        self
    }

    /// Validates the collected settings.
    pub fn build(self) -> Result<EndpointConfig> {
        let base_uri = match self.base_uri {
            None => return Err(ConverterError::configuration("The base URI was not set")),
            Some(BaseUri::Parsed(url)) => url,
            Some(BaseUri::Raw(raw)) => Url::parse(raw.trim()).map_err(|e| {
                ConverterError::configuration(format!("Malformed base URI '{}': {}", raw, e))
            })?,
        };
        if base_uri.cannot_be_a_base() {
            return Err(ConverterError::configuration(format!(
                "Base URI '{}' cannot be used as a base",
                base_uri
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ConverterError::configuration(
                "Request timeout must be positive",
            ));
        }
        // Sub-millisecond timeouts round up to the 1 ms resolution.
        let request_timeout = self.request_timeout.max(Duration::from_millis(1));
        let timeout_ms = request_timeout.as_millis();
        if timeout_ms > MAX_REQUEST_TIMEOUT_MS {
            return Err(ConverterError::configuration(format!(
                "Request timeout of {} ms exceeds the maximum of {} ms",
                timeout_ms, MAX_REQUEST_TIMEOUT_MS
            )));
        }

        self.pool.validate()?;

        Ok(EndpointConfig {
            base_uri,
            request_timeout,
            pool: self.pool,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            ConverterError::configuration(format!("Invalid value '{}' for {}: {}", raw, key, e))
        }),
    }
}
