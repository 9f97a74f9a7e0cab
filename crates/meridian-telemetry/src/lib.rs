//! # Meridian Telemetry
//!
//! Observability for the Meridian controller framework:
//!
//! - **Logging**: `tracing-subscriber` with JSON or pretty output
//! - **Access log**: one `info` event per finished request
//! - **Metrics**: Prometheus counters and histograms via `metrics`
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_telemetry::{init_logging, init_metrics, AccessLog, LogConfig, MetricsConfig};
//!
//! init_logging(&LogConfig::production())?;
//! init_metrics(&MetricsConfig::default())?;
//! let access = AccessLog::new("orders");
//! ```

#![doc(html_root_url = "https://docs.rs/meridian-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod access_log;
pub mod error;
pub mod logging;
pub mod metrics;

pub use access_log::{AccessLog, AccessRecord};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, render_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
