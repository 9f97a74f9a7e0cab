//! # Meridian Extract
//!
//! Route metadata, type coercion and parameter binding for the Meridian
//! controller framework.
//!
//! This crate turns a raw, untyped request into the validated argument list
//! of a controller action.
//!
//! ## Parameter sources
//!
//! | Source | Read from | Coerced |
//! |--------|-----------|---------|
//! | `Query` | Parsed query string | yes |
//! | `Header` | Request headers (case-insensitive) | yes |
//! | `Body` | Parsed body, dotted path (`a.b[0]`) | yes |
//! | `Path` | Route path segments | yes |
//! | `System` | [`RequestContext`](meridian_core::RequestContext) attribute | no |
//! | `Context` | [`ExecutionContext`](meridian_core::ExecutionContext) entry | no |
//!
//! ## Example
//!
//! ```rust
//! use meridian_extract::{
//!     derive_request_context, DeclaredType, EnumDef, MetadataStore, ParamOptions,
//!     ParamResolver, RawRequest, RouteMetadata, RouteParamDescriptor,
//! };
//! use meridian_core::{ExecutionContext, Value};
//!
//! let store = MetadataStore::builder()
//!     .route(RouteMetadata::post("orders", "update", "/orders/{id}")
//!         .declare(DeclaredType::NUMBER)
//!         .declare(DeclaredType::Any))
//!     .param(RouteParamDescriptor::path(0, "id"))
//!     .param(RouteParamDescriptor::body(1, "status").with_options(
//!         ParamOptions::new()
//!             .ty(EnumDef::new().variant("OPEN", "O").variant("CLOSED", "C"))
//!             .required(true),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let request = RawRequest::builder()
//!     .path_param("id", "12")
//!     .body(Value::from(serde_json::json!({ "status": "X" })))
//!     .build();
//! let ctx = derive_request_context(&request);
//! let exec = ExecutionContext::new();
//!
//! let route = store.find_route("orders", "update").unwrap();
//! let err = ParamResolver::new(&request, &ctx, &exec)
//!     .resolve(route, store.get_route_params("orders", "update"))
//!     .unwrap_err();
//! assert_eq!(err.message(), Some("Invalid Body: status"));
//! ```

#![doc(html_root_url = "https://docs.rs/meridian-extract/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod coerce;
mod context;
mod error;
pub mod metadata;
mod params;
mod request;
mod resolver;

pub use coerce::coerce;
pub use context::{derive_request_context, FORWARDED_FOR_HEADER, REQUEST_ID_HEADER};
pub use error::{BindingError, CoercionError, MetadataError};
pub use metadata::{
    DeclaredType, EnumDef, Invalid, MetadataStore, MetadataStoreBuilder, Missing, ParamOptions,
    ParamSource, Rejection, RouteMetadata, RouteParamDescriptor, ScalarType, TypeHint, Validator,
};
pub use params::Params;
pub use request::{parse_query, RawRequest, RawRequestBuilder};
pub use resolver::ParamResolver;
