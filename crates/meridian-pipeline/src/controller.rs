//! Controller lifecycle hooks.
//!
//! A [`Controller`] is asked four things during a request:
//!
//! | Hook | Runs | Default |
//! |------|------|---------|
//! | `before_handle` | before argument binding | no-op |
//! | `after_handle` | after a successful action | pass-through |
//! | `on_error` | for any non-protocol failure | logs, 500 `"An error has occurred."` |
//! | `on_http_error` | for protocol errors, last | pass-through |
//!
//! [`ApiController`] wraps another controller and shapes every outcome into
//! a `{ result, data }` JSON envelope.

use crate::dispatch::Dispatcher;
use crate::invoker::Reply;
use async_trait::async_trait;
use http::StatusCode;
use meridian_core::{
    ExecutionContext, Failure, GenericError, HttpError, HttpResponse, Object, RequestContext, Value,
};
use std::ops::Deref;

/// Content of the default generic-error response.
pub const GENERIC_ERROR_MESSAGE: &str = "An error has occurred.";

/// Message used for failures that carry a database error payload.
const DB_ERROR_MESSAGE: &str = "An error has occurred. (DB Error)";

/// The four lifecycle hooks the pipeline calls on a controller.
///
/// Every hook has a default, so a controller only overrides what it needs.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use meridian_core::{ExecutionContext, Failure, HttpError, RequestContext};
/// use meridian_pipeline::Controller;
///
/// struct AdminOnly;
///
/// #[async_trait]
/// impl Controller for AdminOnly {
///     async fn before_handle(
///         &self,
///         ctx: &RequestContext,
///         exec: &mut ExecutionContext,
///     ) -> Result<(), Failure> {
///         let user = ctx.identity().username().ok_or_else(|| HttpError::unauthorized("Login required"))?;
///         exec.insert("user", user);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    /// Runs before argument binding. May seed the execution context.
    async fn before_handle(
        &self,
        _ctx: &RequestContext,
        _exec: &mut ExecutionContext,
    ) -> Result<(), Failure> {
        Ok(())
    }

    /// Shapes a successful reply.
    async fn after_handle(
        &self,
        _ctx: &RequestContext,
        reply: Reply,
        _exec: &ExecutionContext,
    ) -> Result<Reply, Failure> {
        Ok(reply)
    }

    /// Turns a generic failure into a response.
    ///
    /// An `Ok` response is final and skips `on_http_error`. An `Err` continues
    /// down the error path.
    async fn on_error(
        &self,
        error: GenericError,
        ctx: &RequestContext,
        _dispatcher: &Dispatcher,
    ) -> Result<HttpResponse, Failure> {
        tracing::error!(
            request_id = %ctx.request_id(),
            error.name = %error.name(),
            error.message = %error.message(),
            "unhandled controller error"
        );
        Ok(HttpResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            GENERIC_ERROR_MESSAGE,
        ))
    }

    /// Shapes a protocol error. The returned error is terminal.
    async fn on_http_error(
        &self,
        _ctx: &RequestContext,
        error: HttpError,
    ) -> Result<HttpError, Failure> {
        Ok(error)
    }
}

/// A controller that keeps every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Controller for PassThrough {}

/// Wraps a controller in the JSON API envelope.
///
/// - Success: `{ "result": true, "data": <content> }`
/// - Protocol error: `{ "result": false, ...additional, "data": <content> }`
/// - Generic error: `{ "result": false, "code": <name>, "message": <message> }`
///
/// A falsy `data` is left out. The inner controller's hooks run first.
///
/// ```rust
/// use meridian_pipeline::{ApiController, PassThrough};
///
/// let api = ApiController::new(PassThrough);
/// let _inner: &PassThrough = &api;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ApiController<C> {
    inner: C,
}

impl<C> ApiController<C> {
    /// Wraps a controller.
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// Returns the wrapped controller.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C> Deref for ApiController<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Controller> Controller for ApiController<C> {
    async fn before_handle(
        &self,
        ctx: &RequestContext,
        exec: &mut ExecutionContext,
    ) -> Result<(), Failure> {
        self.inner.before_handle(ctx, exec).await
    }

    async fn after_handle(
        &self,
        ctx: &RequestContext,
        reply: Reply,
        exec: &ExecutionContext,
    ) -> Result<Reply, Failure> {
        let reply = self.inner.after_handle(ctx, reply, exec).await?;
        let response = match reply {
            Reply::Response(response) => {
                let data = response.content().clone();
                response.with_content(envelope(true, Object::new(), data))
            }
            Reply::Value(value) => HttpResponse::ok(envelope(true, Object::new(), value)),
        };
        Ok(Reply::Response(response))
    }

    async fn on_error(
        &self,
        error: GenericError,
        ctx: &RequestContext,
        dispatcher: &Dispatcher,
    ) -> Result<HttpResponse, Failure> {
        let response = self.inner.on_error(error.clone(), ctx, dispatcher).await?;

        let message = if error.thrown().and_then(|t| t.get("sqlMessage")).is_some() {
            DB_ERROR_MESSAGE.to_string()
        } else {
            error.message().to_string()
        };
        let mut body = Object::new();
        body.insert("result".into(), Value::Bool(false));
        body.insert("code".into(), Value::from(error.name()));
        body.insert("message".into(), Value::from(message));
        Ok(response.with_content(body))
    }

    async fn on_http_error(
        &self,
        ctx: &RequestContext,
        error: HttpError,
    ) -> Result<HttpError, Failure> {
        let error = self.inner.on_http_error(ctx, error).await?;
        let additional = error.additional().clone();
        let data = error.content().clone();
        Ok(error.with_content(envelope(false, additional, data)))
    }
}

fn envelope(result: bool, additional: Object, data: Value) -> Value {
    let mut body = Object::with_capacity(additional.len() + 2);
    body.insert("result".into(), Value::Bool(result));
    body.extend(additional);
    body.insert(
        "data".into(),
        if data.is_truthy() { data } else { Value::Undefined },
    );
    Value::Object(body)
}
