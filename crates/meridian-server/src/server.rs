//! HTTP server.
//!
//! Accepts connections with hyper, buffers each request body under a size
//! cap and a timeout, hands it to the [`Dispatcher`], and writes the
//! processed response back.
//!
//! # Architecture
//!
//! - TCP listener bound to the configured address
//! - One task per connection, tracked for graceful shutdown
//! - Body collection bounded by `max_body_bytes` and `request_timeout`
//! - Optional Prometheus scrape path answered before dispatch
//! - One access log event per request
//!
//! # Example
//!
//! ```rust,ignore
//! use meridian_config::ConfigLoader;
//! use meridian_server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_env_prefix("MERIDIAN").load()?;
//!     meridian_server::init_telemetry(&config)?;
//!
//!     let dispatcher = build_dispatcher(&config)?;
//!     Server::from_config(dispatcher, &config).run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use meridian_config::MeridianConfig;
use meridian_core::{HttpError, ProcessedResponse};
use meridian_pipeline::body::TOO_LARGE_MESSAGE;
use meridian_pipeline::Dispatcher;
use meridian_telemetry::{render_metrics, AccessLog, AccessRecord, InFlightGuard};

use crate::error::ServerError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Response body type written to the wire.
pub type ResponseBody = Full<Bytes>;

/// Message for a body that did not arrive within the request timeout.
pub const BODY_TIMEOUT_MESSAGE: &str = "Request body collection timed out";

/// Message for a body the connection failed to deliver.
pub const BODY_READ_MESSAGE: &str = "Failed to read request body";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// The Meridian HTTP server.
///
/// # Example
///
/// ```rust
/// use meridian_extract::MetadataStore;
/// use meridian_pipeline::Dispatcher;
/// use meridian_server::Server;
/// use std::time::Duration;
///
/// let dispatcher = Dispatcher::builder(MetadataStore::builder().build().unwrap())
///     .build()
///     .unwrap();
///
/// let server = Server::builder(dispatcher)
///     .http_addr("127.0.0.1:3000")
///     .request_timeout(Duration::from_secs(5))
///     .build();
///
/// assert_eq!(server.http_addr(), "127.0.0.1:3000");
/// ```
#[derive(Debug)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    http_addr: String,
    shutdown_timeout: Duration,
    request_timeout: Duration,
    max_body_bytes: usize,
    access_log: AccessLog,
    metrics_path: Option<String>,
}

impl Server {
    /// Creates a server builder around `dispatcher`.
    #[must_use]
    pub fn builder(dispatcher: Dispatcher) -> ServerBuilder {
        ServerBuilder::new(dispatcher)
    }

    /// Creates a server with the transport settings from `config`.
    ///
    /// Body limits are taken from the dispatcher's own parser; the buffer
    /// cap here only bounds what is read off the socket.
    #[must_use]
    pub fn from_config(dispatcher: Dispatcher, config: &MeridianConfig) -> Self {
        let access_log = if config.access_log.enabled {
            AccessLog::new(config.access_log.service_name.clone()).with_metrics(config.metrics.enabled)
        } else {
            AccessLog::disabled()
        };

        let mut builder = Self::builder(dispatcher)
            .http_addr(config.server.http_addr.clone())
            .shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout_secs))
            .request_timeout(Duration::from_millis(config.server.request_timeout_ms))
            .max_body_bytes(config.body.max_body_bytes())
            .access_log(access_log);
        if let Some(path) = config.metrics.scrape_path() {
            builder = builder.metrics_path(path);
        }
        builder.build()
    }

    /// The configured bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// The dispatcher requests are handed to.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Time allowed to receive a request body.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Time allowed for open connections to finish after shutdown.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Runs until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and runs until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr: SocketAddr = self
            .http_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                addr: self.http_addr.clone(),
                reason: e.to_string(),
            })?;

        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// fires, then waits up to the shutdown timeout for open connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address is unavailable.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, controllers = self.dispatcher.controller_count(), "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, remote_addr, shutdown).await {
                                tracing::debug!(remote = %remote_addr, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        tracing::info!(
            timeout = ?server.shutdown_timeout,
            active = tracker.active_connections(),
            "waiting for open connections"
        );
        tokio::select! {
            () = tracker.wait_for_shutdown() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(server.shutdown_timeout) => {
                tracing::warn!(active = tracker.active_connections(), "shutdown timeout reached");
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.serve_request(req, Some(remote_addr)).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => return result,
            () = shutdown.recv() => {
                tracing::debug!(remote = %remote_addr, "draining connection for shutdown");
                conn.as_mut().graceful_shutdown();
            }
        }
        conn.await
    }

    /// Handles one request end to end and writes its access log event.
    pub async fn serve_request<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let started = Instant::now();
        let _in_flight = InFlightGuard::new();

        let method = req.method().clone();
        let url = req
            .uri()
            .path_and_query()
            .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string());

        let response = match self.scrape(&method, req.uri().path()) {
            Some(response) => response,
            None => self.dispatch(req, remote_addr).await.into_http_response(),
        };

        let length = response.body().len() as u64;
        self.access_log.record(
            &AccessRecord::new(method, url, response.status(), started.elapsed()).with_content_length(length),
        );

        response.map(Full::new)
    }

    async fn dispatch<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> ProcessedResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let limited = Limited::new(body, self.max_body_bytes);

        match tokio::time::timeout(self.request_timeout, limited.collect()).await {
            Ok(Ok(collected)) => {
                let bytes = collected.to_bytes();
                self.dispatcher.handle(parts, &bytes, remote_addr).await
            }
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::debug!(limit = self.max_body_bytes, "request body over limit");
                self.dispatcher
                    .reject(parts, HttpError::payload_too_large(TOO_LARGE_MESSAGE), remote_addr)
                    .await
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "failed to read request body");
                self.dispatcher
                    .reject(parts, HttpError::bad_request(BODY_READ_MESSAGE), remote_addr)
                    .await
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.request_timeout, "request body collection timed out");
                let error = HttpError::new(StatusCode::REQUEST_TIMEOUT, BODY_TIMEOUT_MESSAGE);
                self.dispatcher.reject(parts, error, remote_addr).await
            }
        }
    }

    fn scrape(&self, method: &Method, path: &str) -> Option<Response<Bytes>> {
        let scrape_path = self.metrics_path.as_deref()?;
        if method != Method::GET || path != scrape_path {
            return None;
        }

        let (status, body) = match render_metrics() {
            Some(text) => (StatusCode::OK, Bytes::from(text)),
            None => (StatusCode::SERVICE_UNAVAILABLE, Bytes::from_static(b"metrics recorder not installed")),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        let body_len = response.body().len();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));
        Some(response)
    }
}

/// Builder for [`Server`].
#[derive(Debug)]
pub struct ServerBuilder {
    dispatcher: Dispatcher,
    http_addr: String,
    shutdown_timeout: Duration,
    request_timeout: Duration,
    max_body_bytes: usize,
    access_log: AccessLog,
    metrics_path: Option<String>,
}

impl ServerBuilder {
    /// Creates a builder with the default transport settings.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        let max_body_bytes = dispatcher.body_parser().max_limit();
        Self {
            dispatcher,
            http_addr: "0.0.0.0:8080".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_body_bytes,
            access_log: AccessLog::new("meridian"),
            metrics_path: None,
        }
    }

    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the graceful shutdown window.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the body collection timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the largest body read off the socket.
    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Sets the access log.
    #[must_use]
    pub fn access_log(mut self, access_log: AccessLog) -> Self {
        self.access_log = access_log;
        self
    }

    /// Answers Prometheus scrapes on `path`.
    #[must_use]
    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            dispatcher: Arc::new(self.dispatcher),
            http_addr: self.http_addr,
            shutdown_timeout: self.shutdown_timeout,
            request_timeout: self.request_timeout,
            max_body_bytes: self.max_body_bytes,
            access_log: self.access_log,
            metrics_path: self.metrics_path,
        }
    }
}
