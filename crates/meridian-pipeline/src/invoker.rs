//! Action invocation.
//!
//! An action is a type-erased async closure over its controller instance.
//! The invoker resolves the action's arguments, calls it, and folds every
//! way an action can end (value, deferred value, failure, panic) into one
//! `Result<Reply, Failure>` for the next stage.

use crate::controller::Controller;
use dashmap::DashMap;
use futures_util::FutureExt;
use meridian_core::{
    ExecutionContext, Failure, GenericError, HttpError, HttpResponse, RequestContext, Value,
};
use meridian_extract::{MetadataStore, ParamResolver, RawRequest, RouteMetadata, RouteParamDescriptor};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A bound, type-erased action.
pub type ActionFn = Arc<dyn Fn(Arguments) -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// Erases an async function into an [`ActionFn`].
///
/// ```
/// use meridian_pipeline::{action_fn, Arguments};
/// use meridian_core::Value;
///
/// let echo = action_fn(|args: Arguments| async move { args.get(0).clone() });
/// # let _ = echo;
/// ```
pub fn action_fn<F, Fut, R>(f: F) -> ActionFn
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Into<ActionResult>,
{
    Arc::new(move |args| {
        let future = f(args);
        Box::pin(async move { future.await.into() })
    })
}

/// What an action (or hook) hands to the next stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A plain value, sent as `200` with the value as content.
    Value(Value),
    /// A structured response with explicit status and headers.
    Response(HttpResponse),
}

impl Reply {
    /// Returns the content of either variant.
    pub fn content(&self) -> &Value {
        match self {
            Self::Value(value) => value,
            Self::Response(response) => response.content(),
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<serde_json::Value> for Reply {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value.into())
    }
}

impl From<HttpResponse> for Reply {
    fn from(response: HttpResponse) -> Self {
        Self::Response(response)
    }
}

/// A lazily produced reply, run once by the invoker.
pub struct Deferred(Box<dyn FnOnce() -> BoxFuture<'static, Result<Reply, Failure>> + Send>);

impl Deferred {
    /// Wraps a zero-argument producer.
    pub fn new<F, Fut>(produce: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Reply, Failure>> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(produce())))
    }

    fn run(self) -> BoxFuture<'static, Result<Reply, Failure>> {
        (self.0)()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// The outcome of calling an action.
///
/// ```
/// use meridian_pipeline::{ActionResult, Reply};
/// use meridian_core::{HttpError, Value};
///
/// let ok: ActionResult = Value::from("done").into();
/// assert!(matches!(ok, ActionResult::Value(Reply::Value(_))));
///
/// let failed: ActionResult = Err::<Value, _>(HttpError::not_found("gone")).into();
/// assert!(matches!(failed, ActionResult::Failure(_)));
/// ```
#[derive(Debug)]
pub enum ActionResult {
    /// The action produced a reply.
    Value(Reply),
    /// The action produced a producer to run once for the real reply.
    Deferred(Deferred),
    /// The action failed.
    Failure(Failure),
}

impl ActionResult {
    /// Creates a [`ActionResult::Deferred`].
    pub fn deferred<F, Fut>(produce: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Reply, Failure>> + Send + 'static,
    {
        Self::Deferred(Deferred::new(produce))
    }

    /// Wraps a thrown value that is not an error.
    pub fn thrown(value: impl Into<Value>) -> Self {
        Self::Failure(GenericError::from_thrown(value.into()).into())
    }
}

impl From<Reply> for ActionResult {
    fn from(reply: Reply) -> Self {
        Self::Value(reply)
    }
}

impl From<Value> for ActionResult {
    fn from(value: Value) -> Self {
        Self::Value(Reply::Value(value))
    }
}

impl From<serde_json::Value> for ActionResult {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(Reply::from(value))
    }
}

impl From<HttpResponse> for ActionResult {
    fn from(response: HttpResponse) -> Self {
        Self::Value(Reply::Response(response))
    }
}

impl From<Failure> for ActionResult {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

impl From<HttpError> for ActionResult {
    fn from(err: HttpError) -> Self {
        Self::Failure(Failure::Protocol(err))
    }
}

impl From<GenericError> for ActionResult {
    fn from(err: GenericError) -> Self {
        Self::Failure(Failure::Generic(err))
    }
}

impl From<Deferred> for ActionResult {
    fn from(deferred: Deferred) -> Self {
        Self::Deferred(deferred)
    }
}

impl<T, E> From<Result<T, E>> for ActionResult
where
    T: Into<Reply>,
    E: Into<Failure>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(reply) => Self::Value(reply.into()),
            Err(err) => Self::Failure(err.into()),
        }
    }
}

/// The resolved argument list of an action, in declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Vec<Value>);

impl Arguments {
    /// Wraps resolved values.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Returns the argument at `index`, or `Undefined`.
    pub fn get(&self, index: usize) -> &Value {
        const UNDEFINED: &Value = &Value::Undefined;
        self.0.get(index).unwrap_or(UNDEFINED)
    }

    /// Moves the argument at `index` out, leaving `Undefined` behind.
    pub fn take(&mut self, index: usize) -> Value {
        self.0.get_mut(index).map(std::mem::take).unwrap_or_default()
    }

    /// Returns the number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the action takes no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the values.
    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

/// One registered controller instance with its bound actions.
///
/// Holds the per-instance cache of declared parameter lists. Each action's
/// list is written once on first use and only read afterwards.
pub struct ControllerBinding {
    id: String,
    controller: Arc<dyn Controller>,
    actions: HashMap<String, ActionFn>,
    descriptors: DashMap<String, Arc<[RouteParamDescriptor]>>,
}

impl ControllerBinding {
    pub(crate) fn new(id: impl Into<String>, controller: Arc<dyn Controller>) -> Self {
        Self {
            id: id.into(),
            controller,
            actions: HashMap::new(),
            descriptors: DashMap::new(),
        }
    }

    pub(crate) fn bind(&mut self, action: impl Into<String>, handler: ActionFn) {
        self.actions.insert(action.into(), handler);
    }

    /// Returns the controller id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the controller.
    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    /// Returns `true` when `action` is bound.
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    /// Returns the bound action names.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Returns the declared parameters of `action`, caching them.
    pub fn params(&self, store: &MetadataStore, action: &str) -> Arc<[RouteParamDescriptor]> {
        if let Some(cached) = self.descriptors.get(action) {
            return Arc::clone(cached.value());
        }
        let entry = self
            .descriptors
            .entry(action.to_string())
            .or_insert_with(|| store.get_route_params(&self.id, action).into());
        Arc::clone(entry.value())
    }

    /// Returns the number of cached parameter lists.
    pub fn cached_params(&self) -> usize {
        self.descriptors.len()
    }

    fn action(&self, name: &str) -> Option<&ActionFn> {
        self.actions.get(name)
    }
}

impl fmt::Debug for ControllerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&str> = self.actions().collect();
        actions.sort_unstable();
        f.debug_struct("ControllerBinding")
            .field("id", &self.id)
            .field("actions", &actions)
            .finish_non_exhaustive()
    }
}

/// Resolves arguments and invokes actions.
#[derive(Debug, Clone, Copy)]
pub struct ActionInvoker<'a> {
    store: &'a MetadataStore,
}

impl<'a> ActionInvoker<'a> {
    /// Creates an invoker over a metadata store.
    pub fn new(store: &'a MetadataStore) -> Self {
        Self { store }
    }

    /// Resolves the route's arguments and runs the bound action.
    ///
    /// Binding failures, action failures, failures of a deferred producer
    /// and panics all come back as `Err`.
    pub async fn invoke(
        &self,
        binding: &ControllerBinding,
        route: &RouteMetadata,
        request: &RawRequest,
        ctx: &RequestContext,
        exec: &ExecutionContext,
    ) -> Result<Reply, Failure> {
        let descriptors = binding.params(self.store, route.action());
        let args = ParamResolver::new(request, ctx, exec).resolve(route, &descriptors)?;

        let action = binding.action(route.action()).ok_or_else(|| {
            GenericError::new(
                "UnboundAction",
                format!("{} has no action {}", binding.id(), route.action()),
            )
        })?;

        match call(action, Arguments::new(args)).await {
            ActionResult::Value(reply) => Ok(reply),
            ActionResult::Failure(failure) => Err(failure),
            ActionResult::Deferred(deferred) => {
                match std::panic::catch_unwind(AssertUnwindSafe(|| deferred.run())) {
                    Ok(future) => AssertUnwindSafe(future)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(panic_failure(payload.as_ref()))),
                    Err(payload) => Err(panic_failure(payload.as_ref())),
                }
            }
        }
    }
}

async fn call(action: &ActionFn, args: Arguments) -> ActionResult {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| action(args))) {
        Ok(future) => future,
        Err(payload) => return ActionResult::Failure(panic_failure(payload.as_ref())),
    };
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| ActionResult::Failure(panic_failure(payload.as_ref())))
}

fn panic_failure(payload: &(dyn Any + Send)) -> Failure {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "action panicked".to_string());
    Failure::Generic(GenericError::panic(message))
}
