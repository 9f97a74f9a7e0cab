//! The top-level dispatcher.
//!
//! A [`Dispatcher`] owns the route metadata, the registered controllers and
//! the compiled route table. It matches a request to a route, parses the
//! body and runs the [`Pipeline`]. It is also the handle every controller's
//! `on_error` receives.

use crate::body::BodyParser;
use crate::controller::Controller;
use crate::error::DispatchError;
use crate::invoker::{action_fn, ActionResult, Arguments, ControllerBinding};
use crate::normalize::normalize_error;
use crate::pipeline::Pipeline;
use http::Method;
use meridian_core::{HttpError, ProcessedResponse, Registry, Value};
use meridian_extract::{MetadataStore, Params, RawRequest, RouteMetadata};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

type Instance = dyn Any + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    method: Method,
    segments: Vec<Segment>,
    /// Index into the metadata store's route list.
    route: usize,
}

impl CompiledRoute {
    fn compile(route: usize, metadata: &RouteMetadata) -> Result<Self, DispatchError> {
        let invalid = |reason| DispatchError::InvalidPath {
            path: metadata.path().to_string(),
            reason,
        };
        let mut segments = Vec::new();
        for part in metadata.path().split('/').filter(|s| !s.is_empty()) {
            let segment = if let Some(rest) = part.strip_prefix('{') {
                let name = rest
                    .strip_suffix('}')
                    .ok_or_else(|| invalid("unterminated parameter"))?;
                if name.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }
        Ok(Self {
            method: metadata.method().clone(),
            segments,
            route,
        })
    }

    fn matches(&self, method: &Method, path: &str) -> Option<Params> {
        if &self.method != method {
            return None;
        }
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut params = Params::new();
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push(name.clone(), percent_decode(part)),
            }
        }
        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

/// Decodes `%XX` escapes in a path segment; malformed escapes stay literal.
fn percent_decode(segment: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes())).into_owned()
}

/// Routes requests to controllers and runs their pipelines.
///
/// # Example
///
/// ```rust
/// use meridian_pipeline::{Arguments, Dispatcher, PassThrough};
/// use meridian_extract::{DeclaredType, MetadataStore, RawRequest, RouteMetadata, RouteParamDescriptor};
/// use meridian_core::Value;
///
/// # tokio_test::block_on(async {
/// let store = MetadataStore::builder()
///     .route(RouteMetadata::get("items", "show", "/items/{id}").declare(DeclaredType::NUMBER))
///     .param(RouteParamDescriptor::path(0, "id"))
///     .build()
///     .unwrap();
///
/// let mut builder = Dispatcher::builder(store);
/// builder
///     .controller("items", || PassThrough)
///     .unwrap()
///     .action("show", |_items, args: Arguments| async move { args.get(0).clone() });
/// let dispatcher = builder.build().unwrap();
///
/// let request = RawRequest::builder().uri("/items/5".parse().unwrap()).build();
/// let response = dispatcher.dispatch(request).await;
/// assert_eq!(response.content(), &Value::from(5));
/// # });
/// ```
pub struct Dispatcher {
    store: MetadataStore,
    instances: Registry<String, Instance>,
    controllers: Registry<String, ControllerBinding>,
    routes: Vec<CompiledRoute>,
    body_parser: BodyParser,
}

impl Dispatcher {
    /// Starts a builder over the given route metadata.
    #[must_use]
    pub fn builder(store: MetadataStore) -> DispatcherBuilder {
        DispatcherBuilder {
            store,
            instances: Registry::new(),
            bindings: HashMap::new(),
            body_parser: BodyParser::new(),
        }
    }

    /// Returns the route metadata.
    pub fn metadata(&self) -> &MetadataStore {
        &self.store
    }

    /// Returns the body parser.
    pub fn body_parser(&self) -> &BodyParser {
        &self.body_parser
    }

    /// Returns a registered controller's hooks.
    pub fn controller(&self, id: &str) -> Option<Arc<dyn Controller>> {
        self.controllers
            .get(&id.to_string())
            .map(|binding| Arc::clone(binding.controller()))
    }

    /// Returns a registered controller as its concrete type.
    pub fn instance<C: Controller>(&self, id: &str) -> Option<Arc<C>> {
        self.instances
            .get(&id.to_string())
            .and_then(|instance| instance.downcast::<C>().ok())
    }

    /// Returns the number of registered controllers.
    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Finds the route for a method and path.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<(&RouteMetadata, Params)> {
        self.routes.iter().find_map(|compiled| {
            let params = compiled.matches(method, path)?;
            let route = self.store.get_routes().get(compiled.route)?;
            Some((route, params))
        })
    }

    /// Runs a request whose body is already parsed.
    pub async fn dispatch(&self, mut request: RawRequest) -> ProcessedResponse {
        let Some((route, binding)) = self.route(&mut request) else {
            return not_found(&request);
        };
        Pipeline::new(self, &binding, route)
            .run(&request)
            .await
            .into_processed()
    }

    /// Parses the body and runs the request.
    ///
    /// A body that fails to parse enters the pipeline at the error path.
    pub async fn handle(
        &self,
        parts: http::request::Parts,
        body: &[u8],
        remote_addr: Option<SocketAddr>,
    ) -> ProcessedResponse {
        let mut request = RawRequest::from_parts(parts, Value::Undefined, remote_addr);
        let Some((route, binding)) = self.route(&mut request) else {
            return not_found(&request);
        };
        let pipeline = Pipeline::new(self, &binding, route);
        let outcome = match self.body_parser.parse(request.headers(), body) {
            Ok(parsed) => {
                request.set_body(parsed);
                pipeline.run(&request).await
            }
            Err(err) => pipeline.reject(&request, err.into()).await,
        };
        outcome.into_processed()
    }

    /// Runs a request whose body never arrived intact (too large, timed
    /// out) straight into the error path of the matched controller.
    pub async fn reject(
        &self,
        parts: http::request::Parts,
        error: HttpError,
        remote_addr: Option<SocketAddr>,
    ) -> ProcessedResponse {
        let mut request = RawRequest::from_parts(parts, Value::Undefined, remote_addr);
        let Some((route, binding)) = self.route(&mut request) else {
            return not_found(&request);
        };
        Pipeline::new(self, &binding, route)
            .reject(&request, error.into())
            .await
            .into_processed()
    }

    fn route(&self, request: &mut RawRequest) -> Option<(&RouteMetadata, Arc<ControllerBinding>)> {
        let (route, params) = self.match_route(request.method(), request.path())?;
        let binding = self.controllers.get(&route.target().to_string())?;
        request.set_path_params(params);
        Some((route, binding))
    }
}

fn not_found(request: &RawRequest) -> ProcessedResponse {
    tracing::debug!(method = %request.method(), path = request.path(), "no route matched");
    normalize_error(HttpError::not_found(format!(
        "Cannot {} {}",
        request.method(),
        request.path()
    )))
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("controllers", &self.controllers)
            .field("body_parser", &self.body_parser)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    store: MetadataStore,
    instances: Registry<String, Instance>,
    bindings: HashMap<String, ControllerBinding>,
    body_parser: BodyParser,
}

impl DispatcherBuilder {
    /// Replaces the body parser.
    #[must_use]
    pub fn body_parser(mut self, parser: BodyParser) -> Self {
        self.body_parser = parser;
        self
    }

    /// Registers a controller under `id`, creating it on first use.
    ///
    /// Registering the same id again returns the existing instance, so
    /// actions can be bound in several places.
    ///
    /// # Errors
    ///
    /// Fails when `id` is already registered with another type.
    pub fn controller<C, F>(&mut self, id: &str, create: F) -> Result<ControllerRoutes<'_, C>, DispatchError>
    where
        C: Controller,
        F: FnOnce() -> C,
    {
        let instance = self
            .instances
            .get_or_create(id.to_string(), || Arc::new(create()) as Arc<Instance>)
            .downcast::<C>()
            .map_err(|_| DispatchError::ControllerTypeMismatch { id: id.to_string() })?;

        let hooks: Arc<dyn Controller> = Arc::clone(&instance) as Arc<dyn Controller>;
        let binding = self
            .bindings
            .entry(id.to_string())
            .or_insert_with(|| ControllerBinding::new(id, hooks));
        Ok(ControllerRoutes { binding, instance })
    }

    /// Checks every declared route against the bindings and compiles the
    /// route table.
    ///
    /// # Errors
    ///
    /// Fails on routes with no controller, unbound actions, or bad paths.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let mut routes = Vec::with_capacity(self.store.get_routes().len());
        for (index, route) in self.store.get_routes().iter().enumerate() {
            let binding =
                self.bindings
                    .get(route.target())
                    .ok_or_else(|| DispatchError::UnknownController {
                        target: route.target().to_string(),
                        method: route.method().to_string(),
                        path: route.path().to_string(),
                    })?;
            if !binding.has_action(route.action()) {
                return Err(DispatchError::unbound_action(route.target(), route.action()));
            }
            routes.push(CompiledRoute::compile(index, route)?);
        }

        let controllers = Registry::new();
        for (id, binding) in self.bindings {
            controllers.insert(id, Arc::new(binding));
        }

        tracing::debug!(
            routes = routes.len(),
            controllers = controllers.len(),
            "dispatcher built"
        );

        Ok(Dispatcher {
            store: self.store,
            instances: self.instances,
            controllers,
            routes,
            body_parser: self.body_parser,
        })
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Binds actions to one registered controller.
pub struct ControllerRoutes<'a, C> {
    binding: &'a mut ControllerBinding,
    instance: Arc<C>,
}

impl<C: Controller> ControllerRoutes<'_, C> {
    /// Binds `name` to an async function over the controller instance.
    ///
    /// The function may return anything convertible into an
    /// [`ActionResult`]: a value, a response, a `Result`, a failure or a
    /// deferred producer.
    pub fn action<F, Fut, R>(self, name: &str, f: F) -> Self
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<ActionResult>,
    {
        let instance = Arc::clone(&self.instance);
        self.binding
            .bind(name, action_fn(move |args| f(Arc::clone(&instance), args)));
        self
    }

    /// Returns the controller instance.
    pub fn instance(&self) -> &Arc<C> {
        &self.instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::PassThrough;
    use http::StatusCode;
    use meridian_extract::{DeclaredType, RouteParamDescriptor};

    fn store() -> MetadataStore {
        MetadataStore::builder()
            .route(RouteMetadata::get("items", "list", "/items"))
            .route(
                RouteMetadata::get("items", "show", "/items/{id}/detail").declare(DeclaredType::STRING),
            )
            .param(RouteParamDescriptor::path(0, "id"))
            .route(RouteMetadata::delete("items", "remove", "/items/:id"))
            .build()
            .unwrap()
    }

    fn dispatcher() -> Dispatcher {
        let mut builder = Dispatcher::builder(store());
        builder
            .controller("items", || PassThrough)
            .unwrap()
            .action("list", |_, _| async { Value::from("all") })
            .action("show", |_, args| async move { args.get(0).clone() })
            .action("remove", |_, _| async { Value::Null });
        builder.build().unwrap()
    }

    #[test]
    fn test_compile_rejects_bad_paths() {
        let route = RouteMetadata::get("a", "b", "/x/{id");
        assert!(matches!(
            CompiledRoute::compile(0, &route),
            Err(DispatchError::InvalidPath { .. })
        ));
        let route = RouteMetadata::get("a", "b", "/x/:");
        assert!(CompiledRoute::compile(0, &route).is_err());
    }

    #[test]
    fn test_match_route() {
        let dispatcher = dispatcher();
        let (route, params) = dispatcher.match_route(&Method::GET, "/items/a%20b/detail").unwrap();
        assert_eq!(route.action(), "show");
        assert_eq!(params.get("id"), Some("a b"));

        let (route, _) = dispatcher.match_route(&Method::GET, "/items/").unwrap();
        assert_eq!(route.action(), "list");

        let (route, params) = dispatcher.match_route(&Method::DELETE, "/items/9").unwrap();
        assert_eq!(route.action(), "remove");
        assert_eq!(params.get("id"), Some("9"));

        assert!(dispatcher.match_route(&Method::POST, "/items").is_none());
        assert!(dispatcher.match_route(&Method::GET, "/items/9").is_none());
    }

    #[tokio::test]
    async fn test_unmatched_is_404() {
        let request = RawRequest::builder().uri("/nope".parse().unwrap()).build();
        let response = dispatcher().dispatch(request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.content(), &Value::from("Cannot GET /nope"));
    }

    #[tokio::test]
    async fn test_dispatch_binds_path() {
        let request = RawRequest::builder()
            .uri("/items/abc/detail".parse().unwrap())
            .build();
        let response = dispatcher().dispatch(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.content(), &Value::from("abc"));
    }

    #[tokio::test]
    async fn test_handle_rejects_malformed_body() {
        let (parts, ()) = http::Request::get("/items")
            .header("content-type", "application/json")
            .body(())
            .unwrap()
            .into_parts();
        let response = dispatcher().handle(parts, b"{nope", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.content(),
            &Value::from("The specified json body is invalid.")
        );
    }

    #[tokio::test]
    async fn test_reject_uses_error_path() {
        let (parts, ()) = http::Request::get("/items").body(()).unwrap().into_parts();
        let response = dispatcher()
            .reject(parts, HttpError::payload_too_large("too big"), None)
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let (parts, ()) = http::Request::get("/missing").body(()).unwrap().into_parts();
        let response = dispatcher()
            .reject(parts, HttpError::payload_too_large("too big"), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_build_requires_bound_actions() {
        let mut builder = Dispatcher::builder(store());
        builder
            .controller("items", || PassThrough)
            .unwrap()
            .action("list", |_, _| async { Value::Null });
        let err = builder.build().unwrap_err();
        assert!(matches!(err, DispatchError::UnboundAction { .. }));
    }

    #[test]
    fn test_build_requires_controllers() {
        let err = Dispatcher::builder(store()).build().unwrap_err();
        assert!(matches!(err, DispatchError::UnknownController { .. }));
    }

    #[test]
    fn test_controller_is_created_once() {
        struct Counted;
        impl Controller for Counted {}

        let mut builder = Dispatcher::builder(MetadataStore::builder().build().unwrap());
        let first = Arc::clone(builder.controller("c", || Counted).unwrap().instance());
        let second = Arc::clone(
            builder
                .controller("c", || -> Counted { panic!("created twice") })
                .unwrap()
                .instance(),
        );
        assert!(Arc::ptr_eq(&first, &second));

        assert!(matches!(
            builder.controller("c", || PassThrough),
            Err(DispatchError::ControllerTypeMismatch { .. })
        ));

        let dispatcher = builder.build().unwrap();
        assert!(dispatcher.instance::<Counted>("c").is_some());
        assert!(dispatcher.instance::<PassThrough>("c").is_none());
        assert!(dispatcher.controller("c").is_some());
        assert_eq!(dispatcher.controller_count(), 1);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%2Fb"), "a/b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("caf%C3%A9"), "caf\u{e9}");
        assert_eq!(percent_decode("%FF"), "\u{fffd}");
        assert_eq!(percent_decode("plain"), "plain");
    }
}
