//! # Meridian Pipeline
//!
//! Controller hooks, action invocation and the per-request pipeline for the
//! Meridian controller framework.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → Before → Action → After → Response
//!              │        │       │
//!              └────────┴───────┴──→ Error → HttpError → Error response
//! ```
//!
//! | Stage | Hook | Purpose |
//! |-------|------|---------|
//! | 1 | `before_handle` | Seed the execution context, reject early |
//! | 2 | action | Bind arguments, run the action |
//! | 3 | `after_handle` | Shape the reply |
//! | 4 | `on_error` | Turn a generic failure into a response |
//! | 5 | `on_http_error` | Shape the final protocol error |
//!
//! Protocol errors (an [`HttpError`](meridian_core::HttpError)) skip stage 4.
//! A response returned from `on_error` is final and skips stage 5.
//!
//! ## Example
//!
//! ```
//! use meridian_pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 5);
//! assert_eq!(stages[0].name(), "before");
//! assert_eq!(stages[4].name(), "http_error");
//! ```

#![doc(html_root_url = "https://docs.rs/meridian-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
pub mod controller;
pub mod dispatch;
mod error;
pub mod invoker;
pub mod normalize;
pub mod pipeline;

pub use body::BodyParser;
pub use controller::{ApiController, Controller, PassThrough, GENERIC_ERROR_MESSAGE};
pub use dispatch::{ControllerRoutes, Dispatcher, DispatcherBuilder};
pub use error::DispatchError;
pub use invoker::{
    action_fn, ActionFn, ActionInvoker, ActionResult, Arguments, BoxFuture, ControllerBinding,
    Deferred, Reply,
};
pub use normalize::{normalize, normalize_error, normalize_response, NO_CONTENT};
pub use pipeline::{Outcome, Pipeline, Stage};
