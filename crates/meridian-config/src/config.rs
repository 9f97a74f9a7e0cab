//! Main configuration types.
//!
//! This module provides the top-level [`MeridianConfig`] struct and its builder.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::{AccessLogConfig, BodyConfig, ConfigError, LoggingConfig, MetricsConfig, ServerConfig};

/// Complete Meridian configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use meridian_config::MeridianConfig;
///
/// let config = MeridianConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.access_log.service_name, "meridian");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct MeridianConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Body parser limits.
    #[serde(default)]
    pub body: BodyConfig,

    /// Access log configuration.
    #[serde(default)]
    pub access_log: AccessLogConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl MeridianConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use meridian_config::{MeridianConfig, ServerConfig};
    ///
    /// let config = MeridianConfig::builder()
    ///     .server(ServerConfig {
    ///         http_addr: "127.0.0.1:3000".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    #[must_use]
    pub fn builder() -> MeridianConfigBuilder {
        MeridianConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first field that fails:
    /// - an unparsable server or metrics address
    /// - a zero request timeout or body limit
    /// - an invalid log filter
    /// - a metrics path without a leading `/`
    /// - empty or unordered histogram buckets
    /// - an empty access log service name
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.logging.enabled {
            meridian_telemetry::logging::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        if self.body.json_limit == 0 {
            return Err(ConfigError::invalid_value(
                "body.json_limit",
                "must be greater than zero",
            ));
        }
        if self.body.urlencoded_limit == 0 {
            return Err(ConfigError::invalid_value(
                "body.urlencoded_limit",
                "must be greater than zero",
            ));
        }

        if self.access_log.enabled && self.access_log.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "access_log.service_name",
                "must not be empty",
            ));
        }

        if self.metrics.enabled {
            self.validate_metrics()?;
        }

        Ok(())
    }

    fn validate_metrics(&self) -> Result<(), ConfigError> {
        if let Some(addr) = &self.metrics.listen_addr {
            if addr.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "metrics.listen_addr",
                    format!("invalid socket address: {addr}"),
                ));
            }
        }

        if !self.metrics.path.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "metrics.path",
                "must start with '/'",
            ));
        }

        let buckets = &self.metrics.histogram_buckets;
        if buckets.is_empty() || buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::invalid_value(
                "metrics.histogram_buckets",
                "must be non-empty and strictly increasing",
            ));
        }

        Ok(())
    }

    /// Development preset: pretty, colored `debug` logs with source locations.
    ///
    /// # Example
    ///
    /// ```
    /// use meridian_config::{LogFormat, MeridianConfig};
    ///
    /// let config = MeridianConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert_eq!(config.logging.format, LogFormat::Pretty);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.logging.level = "debug".to_string();
        config.logging.format = crate::LogFormat::Pretty;
        config.logging.ansi_enabled = true;
        config.logging.include_location = true;

        config
    }

    /// Production preset: JSON `info` logs and a short shutdown window.
    ///
    /// # Example
    ///
    /// ```
    /// use meridian_config::{LogFormat, MeridianConfig};
    ///
    /// let config = MeridianConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = crate::LogFormat::Json;
        config.logging.ansi_enabled = false;
        config.logging.include_location = false;
        config.server.shutdown_timeout_secs = 15;

        config
    }
}

/// Builder for [`MeridianConfig`].
#[derive(Debug, Default)]
pub struct MeridianConfigBuilder {
    server: Option<ServerConfig>,
    logging: Option<LoggingConfig>,
    body: Option<BodyConfig>,
    access_log: Option<AccessLogConfig>,
    metrics: Option<MetricsConfig>,
}

impl MeridianConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the body parser limits.
    #[must_use]
    pub fn body(mut self, body: BodyConfig) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the access log configuration.
    #[must_use]
    pub fn access_log(mut self, access_log: AccessLogConfig) -> Self {
        self.access_log = Some(access_log);
        self
    }

    /// Set the metrics configuration.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> MeridianConfig {
        MeridianConfig {
            server: self.server.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            body: self.body.unwrap_or_default(),
            access_log: self.access_log.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<MeridianConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
