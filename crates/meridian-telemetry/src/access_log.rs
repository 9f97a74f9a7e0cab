//! Per-request access logging.
//!
//! The access log only observes a finished request: it never reads or
//! changes pipeline state.

use crate::metrics::record_request;
use chrono::{DateTime, Local, Utc};
use http::{Method, StatusCode};
use std::time::Duration;

/// What the access log sees of one finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    /// Request method.
    pub method: Method,
    /// Request path and query.
    pub url: String,
    /// Response status.
    pub status: StatusCode,
    /// Response body length, when known.
    pub content_length: Option<u64>,
    /// Time from first byte in to response ready.
    pub duration: Duration,
    /// When the request completed.
    pub completed_at: DateTime<Utc>,
}

impl AccessRecord {
    /// Creates a record completed now.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>, status: StatusCode, duration: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            status,
            content_length: None,
            duration,
            completed_at: Utc::now(),
        }
    }

    /// Sets the response body length.
    #[must_use]
    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Response time in milliseconds, to three decimals.
    #[must_use]
    pub fn response_time_ms(&self) -> f64 {
        (self.duration.as_secs_f64() * 1_000_000.0).round() / 1000.0
    }
}

/// Writes one `info` event and the request metrics per finished request.
///
/// # Example
///
/// ```
/// use meridian_telemetry::{AccessLog, AccessRecord};
/// use http::{Method, StatusCode};
/// use std::time::Duration;
///
/// let log = AccessLog::new("orders");
/// let record = AccessRecord::new(Method::GET, "/orders?page=2", StatusCode::OK, Duration::from_millis(12))
///     .with_content_length(42);
///
/// let line = log.line(&record);
/// assert!(line.ends_with(", orders, GET /orders?page=2 200 42 - 12.000 ms"));
/// log.record(&record);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLog {
    service: String,
    enabled: bool,
    record_metrics: bool,
}

impl AccessLog {
    /// Creates an enabled access log for `service`.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            enabled: true,
            record_metrics: true,
        }
    }

    /// Creates an access log that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            service: String::new(),
            enabled: false,
            record_metrics: false,
        }
    }

    /// Turns metric recording on or off.
    #[must_use]
    pub fn with_metrics(mut self, record_metrics: bool) -> Self {
        self.record_metrics = record_metrics;
        self
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns `true` when events are written.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Formats the one-line summary:
    /// `<local time>, <service>, <method> <url> <status> <length> - <ms> ms`.
    ///
    /// An unknown length renders as `-`.
    #[must_use]
    pub fn line(&self, record: &AccessRecord) -> String {
        let length = record
            .content_length
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        let local: DateTime<Local> = record.completed_at.with_timezone(&Local);
        format!(
            "{}, {}, {} {} {} {} - {:.3} ms",
            local.format("%Y-%m-%d %H:%M:%S"),
            self.service,
            record.method,
            record.url,
            record.status.as_u16(),
            length,
            record.response_time_ms(),
        )
    }

    /// Emits the event and records metrics.
    pub fn record(&self, record: &AccessRecord) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            target: "meridian::access",
            service = %self.service,
            http.method = %record.method,
            http.url = %record.url,
            http.status_code = record.status.as_u16(),
            http.content_length = record.content_length,
            duration_ms = record.response_time_ms(),
            "{}",
            self.line(record)
        );
        if self.record_metrics {
            record_request(record.method.as_str(), record.status.as_u16(), record.duration);
        }
    }
}
