//! # Meridian Server
//!
//! hyper 1.x transport for the Meridian controller framework.
//!
//! The server owns no routing or binding logic of its own: it buffers the
//! request body, hands the request to a [`Dispatcher`](meridian_pipeline::Dispatcher)
//! and writes the processed response back, logging one access line per
//! request.
//!
//! ## Features
//!
//! - HTTP/1.1 via hyper with one task per connection
//! - Body size cap and collection timeout, both routed through the
//!   controller's error hooks
//! - Built-in Prometheus scrape path
//! - Graceful shutdown on SIGTERM/SIGINT or an explicit [`ShutdownSignal`]

#![doc(html_root_url = "https://docs.rs/meridian-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod server;
pub mod shutdown;

pub use error::ServerError;
pub use server::{ResponseBody, Server, ServerBuilder};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownReceiver, ShutdownSignal};

use meridian_config::MeridianConfig;

/// Installs logging and metrics as described by `config`.
///
/// Call once, early, from inside the tokio runtime when a standalone
/// metrics listener is configured.
///
/// # Errors
///
/// Returns [`ServerError::Telemetry`] when a subscriber or recorder is
/// already installed, or a filter or address is invalid.
pub fn init_telemetry(config: &MeridianConfig) -> Result<(), ServerError> {
    meridian_telemetry::init_logging(&config.logging.to_log_config())?;
    meridian_telemetry::init_metrics(&config.metrics.to_metrics_config())?;
    tracing::debug!(
        access_log = config.access_log.enabled,
        metrics = config.metrics.enabled,
        "telemetry initialised"
    );
    Ok(())
}
