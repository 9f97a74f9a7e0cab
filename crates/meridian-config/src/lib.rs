//! Typed configuration for Meridian.
//!
//! This crate provides:
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`MeridianConfig`] holds every section:
//!
//! - [`ServerConfig`] - bind address and timeouts
//! - [`LoggingConfig`] - log level and format
//! - [`BodyConfig`] - JSON and URL-encoded body limits
//! - [`AccessLogConfig`] - per-request access log
//! - [`MetricsConfig`] - Prometheus exporter
//!
//! # Example
//!
//! ```no_run
//! use meridian_config::ConfigLoader;
//!
//! # fn main() -> Result<(), meridian_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("meridian.toml")?
//!     .with_env_prefix("MERIDIAN")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [body]
//! json_limit = 102400
//! urlencoded_limit = 102400
//! extended = true
//!
//! [access_log]
//! enabled = true
//! service_name = "orders"
//!
//! [metrics]
//! enabled = true
//! path = "/metrics"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `MERIDIAN__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `MERIDIAN__LOGGING__LEVEL=debug`
//! - `MERIDIAN__BODY__JSON_LIMIT=1048576`

#![doc(html_root_url = "https://docs.rs/meridian-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{MeridianConfig, MeridianConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{AccessLogConfig, BodyConfig, LogFormat, LoggingConfig, MetricsConfig, ServerConfig};
