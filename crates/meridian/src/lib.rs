//! # Meridian
//!
//! **A controller framework with declarative parameter binding and a
//! hook-based request pipeline.**
//!
//! - Route metadata declares where each action argument comes from (query,
//!   header, body, path, system attributes or the execution context) and
//!   how it is coerced, defaulted, validated and rejected
//! - Controllers wrap every action with `before_handle`, `after_handle`,
//!   `on_error` and `on_http_error` hooks
//! - Replies are normalized into one processed response shape
//! - Logging, access logs and Prometheus metrics come from the
//!   `tracing` / `metrics` stack
//!
//! ## Quick Start
//!
//! ```rust
//! use meridian::prelude::*;
//!
//! let store = MetadataStore::builder()
//!     .route(RouteMetadata::get("users", "show", "/users/{id}").declare(DeclaredType::NUMBER))
//!     .param(RouteParamDescriptor::path(0, "id"))
//!     .build()
//!     .unwrap();
//!
//! let mut builder = Dispatcher::builder(store);
//! builder
//!     .controller("users", || ApiController::new(PassThrough))
//!     .unwrap()
//!     .action("show", |_, args| async move { args.get(0).clone() });
//! let dispatcher = builder.build().unwrap();
//!
//! let request = RawRequest::builder().uri("/users/7".parse().unwrap()).build();
//! let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let response = runtime.block_on(dispatcher.dispatch(request));
//! assert_eq!(response.status().as_u16(), 200);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Transport → Body parser → Route match → Before → Bind + Action → After → Normalize
//!                  │                         │            │           │
//!                  └─────────────────────────┴────────────┴───────────┴─→ Error → HttpError
//! ```

#![doc(html_root_url = "https://docs.rs/meridian/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use meridian_core as core;

// Re-export binding types
pub use meridian_extract as extract;

// Re-export pipeline types
pub use meridian_pipeline as pipeline;

// Re-export telemetry
pub use meridian_telemetry as telemetry;

// Re-export configuration
pub use meridian_config as config;

// Re-export server types
pub use meridian_server as server;

// Controllers implement an `#[async_trait]` trait.
pub use async_trait::async_trait;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use meridian::prelude::*;
///
/// let reply = Reply::from(Value::from("ok"));
/// assert_eq!(reply.content(), &Value::from("ok"));
/// ```
pub mod prelude {
    pub use async_trait::async_trait;

    pub use meridian_core::{
        CallerIdentity, ExecutionContext, Failure, GenericError, HttpError, HttpResponse, Object,
        ProcessedResponse, RequestContext, Value,
    };

    pub use meridian_extract::{
        DeclaredType, EnumDef, MetadataStore, ParamOptions, ParamSource, RawRequest, RouteMetadata,
        RouteParamDescriptor, ScalarType,
    };

    pub use meridian_pipeline::{
        ActionResult, ApiController, Arguments, BodyParser, Controller, Deferred, Dispatcher,
        DispatcherBuilder, PassThrough, Reply,
    };

    pub use meridian_config::{ConfigLoader, MeridianConfig};

    pub use meridian_server::{init_telemetry, Server, ShutdownSignal};
}
