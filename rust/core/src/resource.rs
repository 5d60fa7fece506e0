//! Resource declarations: a bound type plus the routes its methods serve.

use crate::dependencies::types::{Instance, Key};
use crate::errors::{HandlerError, RouteError};
use crate::request::{parse_form_body, parse_json_body, HttpRequest, RequestBody};
use crate::response::HttpResponse;
use crate::routing::{parse_route_pattern, HttpMethod, ParamSpec, Route};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::{type_name, Any};
use std::borrow::Cow;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

/// Type-erased handler: the resolved resource instance plus request arguments.
pub type Handler =
    Arc<dyn Fn(&Instance, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync>;

/// What a handler produced.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Nothing to send back; answered with 204.
    Empty,
    /// Written with the route's body writer and answered with 200.
    Entity(Value),
    /// Sent unchanged.
    Response(HttpResponse),
}

impl Reply {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        serde_json::to_value(value)
            .map(Reply::Entity)
            .map_err(HandlerError::failed)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Reply::Entity(Value::String(text.into()))
    }
}

/// Read access to the parts of a request a handler declared.
pub struct RequestArgs<'a> {
    request: &'a HttpRequest,
    path_params: &'a HashMap<String, String>,
    request_id: u64,
}

impl<'a> RequestArgs<'a> {
    pub fn new(
        request: &'a HttpRequest,
        path_params: &'a HashMap<String, String>,
        request_id: u64,
    ) -> Self {
        Self {
            request,
            path_params,
            request_id,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        self.request
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn path(&self, name: &str) -> Result<&str, HandlerError> {
        self.path_params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| HandlerError::bad_request(format!("missing path parameter '{}'", name)))
    }

    pub fn path_as<T: FromStr>(&self, name: &str) -> Result<T, HandlerError> {
        let raw = self.path(name)?;
        raw.parse().map_err(|_| {
            HandlerError::bad_request(format!(
                "path parameter '{}' is not a valid {}",
                name,
                type_name::<T>()
            ))
        })
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.query_params.get(name).map(String::as_str)
    }

    pub fn query_as<T: FromStr>(&self, name: &str) -> Result<Option<T>, HandlerError> {
        self.query(name)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    HandlerError::bad_request(format!("query parameter '{}' is invalid", name))
                })
            })
            .transpose()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn body_bytes(&self) -> Cow<'_, [u8]> {
        self.request.body.as_bytes()
    }

    /// Decodes the body as JSON into `T`. Failures are 400s.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        let value = match &self.request.body {
            RequestBody::Json(value) => value.clone(),
            other => parse_json_body(&other.as_bytes())
                .map_err(|e| HandlerError::bad_request(e.to_string()))?,
        };
        serde_json::from_value(value).map_err(|e| HandlerError::bad_request(e.to_string()))
    }

    pub fn form(&self) -> Result<HashMap<String, String>, HandlerError> {
        match &self.request.body {
            RequestBody::Form(fields) => Ok(fields.clone()),
            other => parse_form_body(&other.as_bytes())
                .map_err(|e| HandlerError::bad_request(e.to_string())),
        }
    }
}

struct RouteDecl {
    method: HttpMethod,
    path: String,
    handler: Handler,
    params: Vec<ParamSpec>,
    produces: Option<String>,
    name: Option<String>,
    /// Binding resolved for this route when it is not the resource's own.
    resource: Option<Key>,
}

/// Routes served by instances of `T`, resolved from the container per request.
///
/// `param`, `produces` and `named` modify the most recently declared route.
/// `produces` before any route sets the default for the whole resource.
pub struct Resource<T> {
    key: Key,
    base: String,
    produces: String,
    routes: Vec<RouteDecl>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Resource<T> {
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_key(Key::of::<T>(), base)
    }

    /// Resource backed by a qualified binding of `T`.
    pub fn qualified(base: impl Into<String>, qualifier: impl Into<Cow<'static, str>>) -> Self {
        Self::with_key(Key::named::<T>(qualifier), base)
    }

    fn with_key(key: Key, base: impl Into<String>) -> Self {
        Self {
            key,
            base: base.into(),
            produces: Route::DEFAULT_MEDIA_TYPE.to_string(),
            routes: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn route<F>(mut self, method: HttpMethod, path: &str, handler: F) -> Self
    where
        F: Fn(&T, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        let handler = erase(move |instance, args| handler(downcast::<T>(instance)?, args));
        self.routes.push(RouteDecl {
            method,
            path: path.to_string(),
            handler,
            params: Vec::new(),
            produces: None,
            name: None,
            resource: None,
        });
        self
    }

    pub fn get<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&T, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        self.route(HttpMethod::GET, path, handler)
    }

    pub fn post<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&T, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        self.route(HttpMethod::POST, path, handler)
    }

    pub fn put<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&T, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        self.route(HttpMethod::PUT, path, handler)
    }

    pub fn delete<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&T, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        self.route(HttpMethod::DELETE, path, handler)
    }

    pub fn patch<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&T, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        self.route(HttpMethod::PATCH, path, handler)
    }

    pub fn head<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&T, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        self.route(HttpMethod::HEAD, path, handler)
    }

    pub fn options<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&T, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        self.route(HttpMethod::OPTIONS, path, handler)
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        match self.routes.last_mut() {
            Some(route) => route.params.push(spec),
            None => log::warn!("parameter {} declared before any route of {}", spec.name, self.key),
        }
        self
    }

    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        let media_type = media_type.into();
        match self.routes.last_mut() {
            Some(route) => route.produces = Some(media_type),
            None => self.produces = media_type,
        }
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        match self.routes.last_mut() {
            Some(route) => route.name = Some(name.into()),
            None => log::warn!("name declared before any route of {}", self.key),
        }
        self
    }

    /// Serves the routes of `sub` below `path`. For every request the resolved
    /// `T` hands out the sub-resource through `locate`; the sub-resource's
    /// handlers then run against that value.
    pub fn locator<S, F>(mut self, path: &str, locate: F, sub: Resource<S>) -> Self
    where
        S: Any + Send + Sync,
        F: Fn(&T, &RequestArgs<'_>) -> Result<S, HandlerError> + Send + Sync + 'static,
    {
        let locate = Arc::new(locate);
        let prefix = join_paths(path, &sub.base);
        for decl in sub.routes {
            let handler = match decl.resource {
                Some(_) => decl.handler,
                None => {
                    let inner = decl.handler;
                    let locate = Arc::clone(&locate);
                    erase(move |instance, args| {
                        let parent = downcast::<T>(instance)?;
                        let child: Instance = Arc::new(locate(parent, args)?);
                        inner(&child, args)
                    })
                }
            };
            self.routes.push(RouteDecl {
                method: decl.method,
                path: join_paths(&prefix, &decl.path),
                handler,
                params: decl.params,
                produces: decl.produces.or_else(|| Some(sub.produces.clone())),
                name: decl.name,
                resource: decl.resource,
            });
        }
        self
    }

    /// Serves the routes of a separately bound resource below `path`. Its
    /// instance is resolved from the container in the same request scope.
    pub fn mount<S: Any + Send + Sync>(mut self, path: &str, sub: Resource<S>) -> Self {
        let prefix = join_paths(path, &sub.base);
        for decl in sub.routes {
            self.routes.push(RouteDecl {
                path: join_paths(&prefix, &decl.path),
                produces: decl.produces.or_else(|| Some(sub.produces.clone())),
                resource: decl.resource.or_else(|| Some(sub.key.clone())),
                ..decl
            });
        }
        self
    }

    /// Compiles every declared route against the resource's base path.
    pub fn into_routes(self) -> Result<Vec<Route>, RouteError> {
        let Self {
            key,
            base,
            produces,
            routes,
            ..
        } = self;

        routes
            .into_iter()
            .map(|decl| {
                let template = parse_route_pattern(&join_paths(&base, &decl.path))?;
                let resource = decl.resource.unwrap_or_else(|| key.clone());
                let mut route = Route::new(decl.method, template, resource, decl.handler);
                route.params = decl.params;
                route.produces = decl.produces.unwrap_or_else(|| produces.clone());
                if let Some(name) = decl.name {
                    route.name = name;
                }
                Ok(route)
            })
            .collect()
    }
}

fn erase<F>(handler: F) -> Handler
where
    F: Fn(&Instance, &RequestArgs<'_>) -> Result<Reply, HandlerError> + Send + Sync + 'static,
{
    Arc::new(handler)
}

fn downcast<T: Any>(instance: &Instance) -> Result<&T, HandlerError> {
    instance.downcast_ref::<T>().ok_or_else(|| {
        HandlerError::failed(format!("resource instance is not a {}", type_name::<T>()))
    })
}

fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", path),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ParamSource;
    use serde::Deserialize;
    use serde_json::json;

    struct Greeter {
        greeting: String,
    }

    #[derive(Deserialize)]
    struct NewMessage {
        text: String,
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/messages", "/{id}"), "/messages/{id}");
        assert_eq!(join_paths("/messages/", ""), "/messages");
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/", "health"), "/health");
    }

    #[test]
    fn test_into_routes_applies_modifiers() {
        let routes = Resource::<Greeter>::new("/greet")
            .produces("text/plain")
            .get("/{name}", |greeter, args| {
                Ok(Reply::text(format!("{} {}", greeter.greeting, args.path("name")?)))
            })
            .param(ParamSpec::path("name"))
            .named("greet-one")
            .post("", |_, _| Ok(Reply::Empty))
            .produces("application/json")
            .into_routes()
            .unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].template.pattern(), "/greet/{name}");
        assert_eq!(routes[0].produces, "text/plain");
        assert_eq!(routes[0].name, "greet-one");
        assert_eq!(routes[0].params[0].source, ParamSource::Path);
        assert_eq!(routes[1].template.pattern(), "/greet");
        assert_eq!(routes[1].produces, "application/json");
        assert_eq!(routes[1].name, "POST /greet");
        assert!(routes.iter().all(|route| route.resource == Key::of::<Greeter>()));
    }

    #[test]
    fn test_handler_receives_typed_instance() {
        let routes = Resource::<Greeter>::new("/greet")
            .get("/{name}", |greeter, args| {
                Ok(Reply::text(format!("{} {}", greeter.greeting, args.path("name")?)))
            })
            .into_routes()
            .unwrap();

        let instance: Instance = Arc::new(Greeter {
            greeting: "hello".to_string(),
        });
        let request = HttpRequest::new(HttpMethod::GET, "/greet/ann");
        let params = HashMap::from([("name".to_string(), "ann".to_string())]);
        let args = RequestArgs::new(&request, &params, 1);

        match (routes[0].handler)(&instance, &args).unwrap() {
            Reply::Entity(value) => assert_eq!(value, json!("hello ann")),
            other => panic!("expected entity, got {:?}", other),
        }
    }

    #[test]
    fn test_handler_rejects_wrong_instance() {
        let routes = Resource::<Greeter>::new("/greet")
            .get("", |_, _| Ok(Reply::Empty))
            .into_routes()
            .unwrap();

        let instance: Instance = Arc::new(42u32);
        let request = HttpRequest::new(HttpMethod::GET, "/greet");
        let params = HashMap::new();
        let args = RequestArgs::new(&request, &params, 1);

        let err = (routes[0].handler)(&instance, &args).unwrap_err();
        assert!(matches!(err, HandlerError::Failed(_)));
    }

    #[test]
    fn test_request_args_decoding() {
        let request = HttpRequest::from_uri(HttpMethod::POST, "/messages/7?limit=3&bad=x")
            .with_body(RequestBody::Raw(br#"{"text": "hi"}"#.to_vec()));
        let params = HashMap::from([("id".to_string(), "7".to_string())]);
        let args = RequestArgs::new(&request, &params, 5);

        assert_eq!(args.path_as::<u64>("id").unwrap(), 7);
        assert_eq!(args.query_as::<u32>("limit").unwrap(), Some(3));
        assert_eq!(args.query_as::<u32>("missing").unwrap(), None);
        assert!(args.query_as::<u32>("bad").is_err());
        assert_eq!(args.json::<NewMessage>().unwrap().text, "hi");
        assert_eq!(args.request_id(), 5);

        let err = args.path("nope").unwrap_err();
        assert!(matches!(err, HandlerError::Status { status: 400, .. }));
    }

    #[test]
    fn test_invalid_json_is_bad_request() {
        let request = HttpRequest::new(HttpMethod::POST, "/messages")
            .with_body(RequestBody::Raw(b"{not json".to_vec()));
        let params = HashMap::new();
        let args = RequestArgs::new(&request, &params, 1);

        let err = args.json::<NewMessage>().err().unwrap();
        assert!(matches!(err, HandlerError::Status { status: 400, .. }));
    }

    #[test]
    fn test_reply_json() {
        #[derive(Serialize)]
        struct Message {
            id: u64,
        }
        match Reply::json(&Message { id: 3 }).unwrap() {
            Reply::Entity(value) => assert_eq!(value, json!({"id": 3})),
            other => panic!("expected entity, got {:?}", other),
        }
    }

    struct Message {
        text: String,
    }

    struct Inbox;

    #[test]
    fn test_locator_builds_sub_resource_from_parent() {
        let message = Resource::<Message>::new("")
            .get("", |message, _| Ok(Reply::text(message.text.clone())))
            .produces("text/plain");
        let routes = Resource::<Greeter>::new("/greet")
            .locator(
                "/{name}/message",
                |greeter, args| {
                    Ok(Message {
                        text: format!("{} {}", greeter.greeting, args.path("name")?),
                    })
                },
                message,
            )
            .into_routes()
            .unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].template.pattern(), "/greet/{name}/message");
        assert_eq!(routes[0].resource, Key::of::<Greeter>());
        assert_eq!(routes[0].produces, "text/plain");

        let instance: Instance = Arc::new(Greeter {
            greeting: "hi".to_string(),
        });
        let request = HttpRequest::new(HttpMethod::GET, "/greet/bo/message");
        let params = HashMap::from([("name".to_string(), "bo".to_string())]);
        let args = RequestArgs::new(&request, &params, 1);

        match (routes[0].handler)(&instance, &args).unwrap() {
            Reply::Entity(value) => assert_eq!(value, json!("hi bo")),
            other => panic!("expected entity, got {:?}", other),
        }
    }

    #[test]
    fn test_locator_error_stops_the_request() {
        let routes = Resource::<Greeter>::new("/greet")
            .locator(
                "/missing",
                |_, _| Err::<Message, _>(HandlerError::not_found("no message")),
                Resource::<Message>::new("").get("", |_, _| Ok(Reply::Empty)),
            )
            .into_routes()
            .unwrap();

        let instance: Instance = Arc::new(Greeter {
            greeting: "hi".to_string(),
        });
        let request = HttpRequest::new(HttpMethod::GET, "/greet/missing");
        let params = HashMap::new();
        let args = RequestArgs::new(&request, &params, 1);

        let err = (routes[0].handler)(&instance, &args).unwrap_err();
        assert!(matches!(err, HandlerError::Status { status: 404, .. }));
    }

    #[test]
    fn test_mount_keeps_sub_resource_binding() {
        let routes = Resource::<Greeter>::new("/users/{user}")
            .get("", |_, _| Ok(Reply::Empty))
            .mount(
                "/inbox",
                Resource::<Inbox>::new("")
                    .get("", |_, _| Ok(Reply::Empty))
                    .get("/{message}", |_, _| Ok(Reply::Empty)),
            )
            .into_routes()
            .unwrap();

        let patterns: Vec<_> = routes.iter().map(|route| route.template.pattern()).collect();
        assert_eq!(
            patterns,
            vec!["/users/{user}", "/users/{user}/inbox", "/users/{user}/inbox/{message}"]
        );
        assert_eq!(routes[0].resource, Key::of::<Greeter>());
        assert!(routes[1..].iter().all(|route| route.resource == Key::of::<Inbox>()));
    }
}
