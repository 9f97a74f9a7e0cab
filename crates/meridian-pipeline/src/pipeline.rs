//! The per-request pipeline.
//!
//! ```text
//! Before ─► Action ─► After ─► response
//!   │         │         │
//!   └─────────┴─────────┴──► Error ─► HttpError ─► error response
//! ```
//!
//! A protocol failure skips `Error` and goes straight to `HttpError`. A
//! generic failure visits `Error` first; if the controller answers there
//! with a response, that response is final and `HttpError` is skipped.

use crate::controller::GENERIC_ERROR_MESSAGE;
use crate::dispatch::Dispatcher;
use crate::invoker::{ActionInvoker, ControllerBinding};
use crate::normalize::{normalize, normalize_error, normalize_response};
use meridian_core::{
    ExecutionContext, Failure, GenericError, HttpError, ProcessedResponse, RequestContext,
};
use meridian_extract::{derive_request_context, RawRequest, RouteMetadata};
use tracing::{debug, error};

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Controller `before_handle`.
    Before,
    /// Argument binding and action invocation.
    Action,
    /// Controller `after_handle` and normalization.
    After,
    /// Controller `on_error`, for generic failures.
    Error,
    /// Controller `on_http_error`, terminal.
    HttpError,
}

impl Stage {
    /// Returns the stage name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::Action => "action",
            Self::After => "after",
            Self::Error => "error",
            Self::HttpError => "http_error",
        }
    }

    /// Returns all stages in execution order.
    #[must_use]
    pub const fn all() -> &'static [Stage] {
        &[
            Self::Before,
            Self::Action,
            Self::After,
            Self::Error,
            Self::HttpError,
        ]
    }

    /// Returns `true` for the two error-path stages.
    #[must_use]
    pub const fn is_error_path(&self) -> bool {
        matches!(self, Self::Error | Self::HttpError)
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A normalized response, from `after_handle` or a final `on_error`.
    Response(ProcessedResponse),
    /// The terminal error returned by `on_http_error`.
    Error(HttpError),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Error`].
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Renders the outcome as a processed response.
    #[must_use]
    pub fn into_processed(self) -> ProcessedResponse {
        match self {
            Self::Response(response) => response,
            Self::Error(err) => normalize_error(err),
        }
    }
}

/// One request's run through a controller's hooks.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    dispatcher: &'a Dispatcher,
    binding: &'a ControllerBinding,
    route: &'a RouteMetadata,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline for a matched route.
    pub fn new(
        dispatcher: &'a Dispatcher,
        binding: &'a ControllerBinding,
        route: &'a RouteMetadata,
    ) -> Self {
        Self {
            dispatcher,
            binding,
            route,
        }
    }

    /// Runs the request through every stage.
    pub async fn run(&self, request: &RawRequest) -> Outcome {
        let ctx = derive_request_context(request);
        let mut exec = ExecutionContext::new();
        let controller = self.binding.controller();

        self.enter(Stage::Before, &ctx);
        if let Err(failure) = controller.before_handle(&ctx, &mut exec).await {
            return self.fail(&ctx, failure).await;
        }

        self.enter(Stage::Action, &ctx);
        let reply = match ActionInvoker::new(self.dispatcher.metadata())
            .invoke(self.binding, self.route, request, &ctx, &exec)
            .await
        {
            Ok(reply) => reply,
            Err(failure) => return self.fail(&ctx, failure).await,
        };

        self.enter(Stage::After, &ctx);
        match controller.after_handle(&ctx, reply, &exec).await {
            Ok(reply) => Outcome::Response(normalize(reply)),
            Err(failure) => self.fail(&ctx, failure).await,
        }
    }

    /// Sends a failure raised before the pipeline (e.g. body parsing)
    /// straight to the error path.
    pub async fn reject(&self, request: &RawRequest, failure: Failure) -> Outcome {
        let ctx = derive_request_context(request);
        self.fail(&ctx, failure).await
    }

    async fn fail(&self, ctx: &RequestContext, failure: Failure) -> Outcome {
        match failure {
            Failure::Protocol(err) => self.http_error(ctx, err).await,
            Failure::Generic(err) => self.generic_error(ctx, err).await,
        }
    }

    async fn generic_error(&self, ctx: &RequestContext, err: GenericError) -> Outcome {
        self.enter(Stage::Error, ctx);
        match self
            .binding
            .controller()
            .on_error(err, ctx, self.dispatcher)
            .await
        {
            Ok(response) => Outcome::Response(normalize_response(response)),
            Err(Failure::Protocol(err)) => self.http_error(ctx, err).await,
            Err(Failure::Generic(err)) => {
                error!(
                    request_id = %ctx.request_id(),
                    controller = self.binding.id(),
                    error = %err,
                    "on_error failed"
                );
                self.http_error(ctx, HttpError::internal(GENERIC_ERROR_MESSAGE))
                    .await
            }
        }
    }

    async fn http_error(&self, ctx: &RequestContext, err: HttpError) -> Outcome {
        self.enter(Stage::HttpError, ctx);
        match self.binding.controller().on_http_error(ctx, err).await {
            Ok(err) | Err(Failure::Protocol(err)) => Outcome::Error(err),
            Err(Failure::Generic(err)) => {
                error!(
                    request_id = %ctx.request_id(),
                    controller = self.binding.id(),
                    error = %err,
                    "on_http_error failed"
                );
                Outcome::Error(HttpError::internal(GENERIC_ERROR_MESSAGE))
            }
        }
    }

    fn enter(&self, stage: Stage, ctx: &RequestContext) {
        debug!(
            request_id = %ctx.request_id(),
            controller = self.binding.id(),
            action = self.route.action(),
            stage = stage.name(),
            "pipeline stage"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_names() {
        let names: Vec<_> = Stage::all().iter().map(Stage::name).collect();
        assert_eq!(names, ["before", "action", "after", "error", "http_error"]);
        assert!(Stage::Error.is_error_path());
        assert!(!Stage::After.is_error_path());
    }

    #[test]
    fn test_outcome_into_processed() {
        let outcome = Outcome::Error(HttpError::not_found("gone"));
        assert!(outcome.is_error());
        let processed = outcome.into_processed();
        assert_eq!(processed.status(), http::StatusCode::NOT_FOUND);
        assert_eq!(processed.content(), &meridian_core::Value::from("gone"));
    }
}
