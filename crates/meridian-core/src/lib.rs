//! # Meridian Core
//!
//! Core types for the Meridian controller framework.
//!
//! This crate provides the foundational types used throughout Meridian:
//!
//! - [`Value`] - Dynamic request/response value (with [`BigInteger`] and dates)
//! - [`RequestContext`] - Read-only per-request facts derived from the raw request
//! - [`ExecutionContext`] - Mutable per-request scratch space written by the before-hook
//! - [`CallerIdentity`] - Caller identity parsed from the `Authorization` header
//! - [`HttpError`], [`GenericError`], [`Failure`] - The error taxonomy
//! - [`HttpResponse`], [`ProcessedResponse`] - Structured and wire-level responses
//! - [`Registry`] - Keyed creation-or-lookup store

#![doc(html_root_url = "https://docs.rs/meridian-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;
pub mod registry;
mod response;
pub mod value;

pub use context::{ExecutionContext, RequestContext, RequestId};
pub use error::{Failure, GenericError, HttpError};
pub use identity::CallerIdentity;
pub use registry::Registry;
pub use response::{HttpResponse, ProcessedResponse};
pub use value::{BigInteger, Object, ParseBigIntError, Value};
