use crate::dependencies::{Container, RequestScope};
use crate::dispatch::mappers::ErrorMappers;
use crate::dispatch::types::{CancelFlag, DispatchState, Exchange, ScopeEvent, ScopeListener};
use crate::errors::{panic_message, DispatchError, HandlerError, RouteError};
use crate::request::{parse_json_body, HttpRequest, RequestBody};
use crate::resource::{Reply, RequestArgs};
use crate::response::{
    create_response, encoded_response, error_response, HttpResponse, ResponseBody,
};
use crate::routing::{allow_header, HttpMethod, ParamSource, Route, RouteMatch, RouteTable};
use crate::serialization::{accepts, BodyWriters};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Outcome of one dispatched request.
#[derive(Debug)]
pub struct Dispatched {
    pub response: HttpResponse,
    pub request_id: u64,
    pub trace: Vec<DispatchState>,
}

/// Turns requests into responses: route lookup, per-request scope, resource
/// resolution, handler invocation and body writing.
///
/// Shared across worker threads; every piece of state it holds is read-only
/// or internally synchronized.
#[derive(Clone)]
pub struct Dispatcher {
    container: Container,
    routes: Arc<RouteTable>,
    writers: Arc<BodyWriters>,
    mappers: Arc<ErrorMappers>,
    listener: Option<ScopeListener>,
}

impl Dispatcher {
    pub fn new(container: Container, routes: RouteTable, writers: BodyWriters) -> Self {
        Self {
            container,
            routes: Arc::new(routes),
            writers: Arc::new(writers),
            mappers: Arc::new(ErrorMappers::new()),
            listener: None,
        }
    }

    /// Installs the mappers consulted when a handler fails.
    pub fn with_error_mappers(mut self, mappers: ErrorMappers) -> Self {
        self.mappers = Arc::new(mappers);
        self
    }

    /// Observes request scope creation and release.
    pub fn with_scope_listener(
        mut self,
        listener: impl Fn(ScopeEvent) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn writers(&self) -> &BodyWriters {
        &self.writers
    }

    pub fn dispatch(&self, request: &HttpRequest) -> HttpResponse {
        self.execute(request, &CancelFlag::new()).response
    }

    /// Dispatches `request`, aborting at the next state transition once
    /// `cancel` is raised.
    pub fn execute(&self, request: &HttpRequest, cancel: &CancelFlag) -> Dispatched {
        let mut exchange = Exchange::new(
            crate::dependencies::next_request_id(),
            request.method,
            &request.path,
        );

        let response = match self.run(&mut exchange, request, cancel) {
            Ok(response) => {
                exchange.advance(DispatchState::Completed);
                response
            }
            Err(err) => {
                exchange.fail(&err);
                failure_response(err)
            }
        };
        let response = if request.method == HttpMethod::HEAD {
            response.without_body()
        } else {
            response
        };

        Dispatched {
            response,
            request_id: exchange.request_id(),
            trace: exchange.into_trace(),
        }
    }

    fn run(
        &self,
        exchange: &mut Exchange,
        request: &HttpRequest,
        cancel: &CancelFlag,
    ) -> Result<HttpResponse, DispatchError> {
        exchange.checkpoint(cancel)?;
        let RouteMatch { route, path_params } =
            match self.routes.match_route(request.method, &request.path) {
                Ok(matched) => matched,
                Err(RouteError::MethodNotAllowed { allowed, .. })
                    if request.method == HttpMethod::OPTIONS =>
                {
                    return Ok(create_response(204, ResponseBody::Empty)
                        .with_header("Allow", allow_header(&allowed)));
                }
                Err(err) => return Err(err.into()),
            };
        exchange.advance(DispatchState::RouteMatched);

        check_params(&route, request, &path_params)?;
        if !accepts(request.header("accept"), &route.produces) {
            return Err(DispatchError::NotAcceptable {
                produces: route.produces.clone(),
            });
        }
        exchange.checkpoint(cancel)?;

        let mut scope = self.open_scope(exchange.request_id());
        exchange.advance(DispatchState::ScopeCreated);

        let instance = self
            .container
            .resolve_key(&route.resource, Some(&mut scope))
            .map_err(|source| DispatchError::Resolution {
                route: route.describe(),
                key: route.resource.clone(),
                source,
            })?;
        exchange.advance(DispatchState::InstanceResolved);
        exchange.checkpoint(cancel)?;

        let args = RequestArgs::new(request, &path_params, exchange.request_id());
        let reply = match catch_unwind(AssertUnwindSafe(|| (route.handler)(&instance, &args))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(source)) => {
                return Err(DispatchError::Invocation {
                    route: route.describe(),
                    source: self.mappers.apply(source),
                })
            }
            Err(payload) => {
                return Err(DispatchError::Panicked {
                    route: route.describe(),
                    message: panic_message(payload.as_ref()),
                })
            }
        };
        exchange.advance(DispatchState::Invoked);
        exchange.checkpoint(cancel)?;

        let response = self.render(&route, reply)?;
        drop(instance);
        scope.release();
        Ok(response)
    }

    fn open_scope(&self, request_id: u64) -> RequestScope {
        let mut scope = RequestScope::with_id(request_id);
        if let Some(listener) = &self.listener {
            listener(ScopeEvent::Created { request_id });
            let listener = Arc::clone(listener);
            scope.on_release(move |request_id, instances| {
                listener(ScopeEvent::Released {
                    request_id,
                    instances,
                })
            });
        }
        scope
    }

    fn render(&self, route: &Route, reply: Reply) -> Result<HttpResponse, DispatchError> {
        match reply {
            Reply::Empty => Ok(create_response(204, ResponseBody::Empty)),
            Reply::Response(response) => Ok(response),
            Reply::Entity(entity) => {
                let writer = self.writers.writer_for(&route.produces).ok_or_else(|| {
                    DispatchError::Serialization {
                        media_type: route.produces.clone(),
                        reason: "no body writer registered".to_string(),
                    }
                })?;
                let bytes = writer
                    .write(&entity)
                    .map_err(|e| DispatchError::Serialization {
                        media_type: route.produces.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(encoded_response(200, &route.produces, bytes))
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("container", &self.container)
            .field("routes", &self.routes.len())
            .field("writers", &self.writers)
            .field("mappers", &self.mappers)
            .finish()
    }
}

fn check_params(
    route: &Route,
    request: &HttpRequest,
    path_params: &HashMap<String, String>,
) -> Result<(), DispatchError> {
    for spec in &route.params {
        let (present, source) = match spec.source {
            ParamSource::Path => (path_params.contains_key(&spec.name), "path"),
            ParamSource::Query => (request.query_params.contains_key(&spec.name), "query"),
            ParamSource::Header => (request.header(&spec.name).is_some(), "header"),
            ParamSource::Body => (!request.body.is_empty(), "body"),
        };
        if spec.required && !present {
            return Err(DispatchError::BadRequest(format!(
                "missing required {} parameter '{}'",
                source, spec.name
            )));
        }
        if spec.source == ParamSource::Body && present {
            check_body(request)?;
        }
    }
    Ok(())
}

fn check_body(request: &HttpRequest) -> Result<(), DispatchError> {
    let is_json = request
        .content_type()
        .map(|media| media.trim().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);
    if let (true, RequestBody::Raw(bytes)) = (is_json, &request.body) {
        parse_json_body(bytes).map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    }
    Ok(())
}

fn failure_response(err: DispatchError) -> HttpResponse {
    match err {
        DispatchError::Invocation {
            source: HandlerError::Response(response),
            ..
        } => *response,
        DispatchError::Routing(RouteError::MethodNotAllowed { ref allowed, .. }) => {
            error_response(err.status_code(), err.public_detail())
                .with_header("Allow", allow_header(allowed))
        }
        _ => error_response(err.status_code(), err.public_detail()),
    }
}
