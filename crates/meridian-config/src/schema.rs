//! Configuration schema types.
//!
//! Every section rejects unknown fields and fills omitted ones with defaults.

use meridian_pipeline::body::{BodyParser, DEFAULT_JSON_LIMIT, DEFAULT_URLENCODED_LIMIT};
use meridian_telemetry::{LogConfig, MetricsConfig as TelemetryMetricsConfig};
use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// # Example
///
/// ```
/// use meridian_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:3000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.request_timeout_ms, 30_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Time allowed to receive a request body, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30_000
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (trace, debug, info, warn, error, or per-target).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Converts the section into the subscriber settings.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        let base = match self.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: self.format == LogFormat::Json,
            file_line_info: self.include_location,
            ansi: self.ansi_enabled,
            ..base
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Request body parsing limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BodyConfig {
    /// Largest accepted JSON body, in bytes.
    #[serde(default = "default_json_limit")]
    pub json_limit: usize,

    /// Largest accepted URL-encoded body, in bytes.
    #[serde(default = "default_urlencoded_limit")]
    pub urlencoded_limit: usize,

    /// Parse `a[b]=c` keys into nested objects.
    #[serde(default = "default_true")]
    pub extended: bool,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            json_limit: default_json_limit(),
            urlencoded_limit: default_urlencoded_limit(),
            extended: true,
        }
    }
}

impl BodyConfig {
    /// Builds the parser these limits describe.
    #[must_use]
    pub fn to_body_parser(&self) -> BodyParser {
        BodyParser::new()
            .json_limit(self.json_limit)
            .urlencoded_limit(self.urlencoded_limit)
            .extended(self.extended)
    }

    /// Largest body the transport needs to buffer.
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.json_limit.max(self.urlencoded_limit)
    }
}

fn default_json_limit() -> usize {
    DEFAULT_JSON_LIMIT
}

fn default_urlencoded_limit() -> usize {
    DEFAULT_URLENCODED_LIMIT
}

/// Access log configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AccessLogConfig {
    /// Emit one event per request.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Service name written on each line.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "meridian".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable metrics collection and export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Standalone exporter address. When unset the server answers
    /// scrapes on [`path`](Self::path) itself.
    #[serde(default)]
    pub listen_addr: Option<String>,

    /// Scrape path served by the application listener.
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Histogram bucket boundaries for request duration, in seconds.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            path: default_metrics_path(),
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

impl MetricsConfig {
    /// Converts the section into the exporter settings.
    #[must_use]
    pub fn to_metrics_config(&self) -> TelemetryMetricsConfig {
        TelemetryMetricsConfig {
            enabled: self.enabled,
            listen_addr: self.listen_addr.clone(),
            duration_buckets: self.histogram_buckets.clone(),
        }
    }

    /// Path the application listener serves, if any.
    #[must_use]
    pub fn scrape_path(&self) -> Option<&str> {
        (self.enabled && self.listen_addr.is_none()).then_some(self.path.as_str())
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

fn default_true() -> bool {
    true
}
