use crate::dependencies::types::{BoxError, Key};
use crate::response::HttpResponse;
use crate::routing::types::HttpMethod;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::Write;
use thiserror::Error;

/// Failures of the binding registry, graph resolution and instance construction.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("binding for {key} is already registered")]
    DuplicateBinding { key: Key },

    #[error("no binding for {key}{}", render_path(.path))]
    UnboundKey { key: Key, path: Vec<Key> },

    #[error("cyclic dependency: {}", render_chain(.cycle))]
    CyclicDependency { cycle: Vec<Key> },

    #[error("singleton {holder} cannot depend on request-scoped {dependency}")]
    ScopeMismatch { holder: Key, dependency: Key },

    #[error("failed to construct {key}: {source}")]
    Construction {
        key: Key,
        #[source]
        source: BoxError,
    },

    #[error("registry is sealed, cannot register {key}")]
    RegistrySealed { key: Key },

    #[error("{key} is request-scoped and needs a request scope to resolve")]
    MissingRequestScope { key: Key },

    #[error("provider for {key} produces {provided}")]
    ProviderTypeMismatch { key: Key, provided: &'static str },

    #[error("container was dropped before {key} could be resolved")]
    ContainerDropped { key: Key },

    #[error("lazy {key} dereferenced while constructing {owner}")]
    LazyDuringConstruction { key: Key, owner: Key },
}

impl ContainerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateBinding { .. } => "RUST_CORE_CONTAINER_DUPLICATE_BINDING",
            Self::UnboundKey { .. } => "RUST_CORE_CONTAINER_UNBOUND_KEY",
            Self::CyclicDependency { .. } => "RUST_CORE_CONTAINER_CYCLIC_DEPENDENCY",
            Self::ScopeMismatch { .. } => "RUST_CORE_CONTAINER_SCOPE_MISMATCH",
            Self::Construction { .. } => "RUST_CORE_CONTAINER_CONSTRUCTION",
            Self::RegistrySealed { .. } => "RUST_CORE_CONTAINER_REGISTRY_SEALED",
            Self::MissingRequestScope { .. } => "RUST_CORE_CONTAINER_MISSING_REQUEST_SCOPE",
            Self::ProviderTypeMismatch { .. } => "RUST_CORE_CONTAINER_PROVIDER_TYPE_MISMATCH",
            Self::ContainerDropped { .. } => "RUST_CORE_CONTAINER_DROPPED",
            Self::LazyDuringConstruction { .. } => {
                "RUST_CORE_CONTAINER_LAZY_DURING_CONSTRUCTION"
            }
        }
    }
}

/// Errors raised by a provider while reading its injected dependencies.
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("{owner} did not declare a dependency on {key}")]
    Undeclared { owner: Key, key: Key },

    #[error("dependency {key} was not resolved before {owner}")]
    Missing { owner: Key, key: Key },

    #[error("dependency {key} is not a {expected}")]
    TypeMismatch { key: Key, expected: &'static str },
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("{method} {pattern} conflicts with {existing}")]
    RouteConflict {
        method: HttpMethod,
        pattern: String,
        existing: String,
    },

    #[error("no route found for {method} {path}")]
    NoRoute { method: HttpMethod, path: String },

    #[error("{method} is not allowed for {path}")]
    MethodNotAllowed {
        method: HttpMethod,
        path: String,
        allowed: BTreeSet<HttpMethod>,
    },

    #[error("invalid route pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
}

impl RouteError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RouteConflict { .. } => "RUST_CORE_ROUTING_ROUTE_CONFLICT",
            Self::NoRoute { .. } => "RUST_CORE_ROUTING_ROUTE_NOT_FOUND",
            Self::MethodNotAllowed { .. } => "RUST_CORE_ROUTING_METHOD_NOT_ALLOWED",
            Self::InvalidPattern { .. } => "RUST_CORE_ROUTING_INVALID_ROUTE_PATTERN",
            Self::InvalidMethod(_) => "RUST_CORE_ROUTING_INVALID_HTTP_METHOD",
        }
    }
}

/// A request body that cannot be decoded as declared.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid UTF-8 in form body: {0}")]
    InvalidUtf8(String),

    #[error("request body is empty")]
    Missing,
}

impl BodyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "RUST_CORE_REQUEST_INVALID_JSON",
            Self::InvalidUtf8(_) => "RUST_CORE_REQUEST_INVALID_UTF8",
            Self::Missing => "RUST_CORE_REQUEST_MISSING_BODY",
        }
    }
}

/// Fatal configuration errors found while building an application.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Routing(#[from] RouteError),

    #[error("route {route} serves {key}, which has no binding")]
    UnboundResource { route: String, key: Key },
}

/// What a resource handler returns when it does not produce a reply.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler chose an HTTP status for the outcome.
    #[error("{status}: {message}")]
    Status { status: u16, message: String },

    /// A complete response, headers included, sent back unchanged.
    #[error("responded with status {}", .0.status_code)]
    Response(Box<HttpResponse>),

    #[error(transparent)]
    Failed(BoxError),
}

impl HandlerError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(400, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(404, message)
    }

    pub fn failed(source: impl Into<BoxError>) -> Self {
        Self::Failed(source.into())
    }

    pub fn respond(response: HttpResponse) -> Self {
        Self::Response(Box::new(response))
    }
}

/// Per-request failures caught at the dispatcher boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Routing(#[from] RouteError),

    #[error("could not resolve {key} for {route}: {source}")]
    Resolution {
        route: String,
        key: Key,
        #[source]
        source: ContainerError,
    },

    #[error("{route} failed: {source}")]
    Invocation {
        route: String,
        #[source]
        source: HandlerError,
    },

    #[error("{route} panicked: {message}")]
    Panicked { route: String, message: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("client does not accept {produces}")]
    NotAcceptable { produces: String },

    #[error("cannot write {media_type} body: {reason}")]
    Serialization { media_type: String, reason: String },

    #[error("request {request_id} was cancelled")]
    Cancelled { request_id: u64 },
}

impl DispatchError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Routing(RouteError::NoRoute { .. }) => 404,
            Self::Routing(RouteError::MethodNotAllowed { .. }) => 405,
            Self::Routing(_) => 500,
            Self::Resolution { .. } => 500,
            Self::Invocation {
                source: HandlerError::Status { status, .. },
                ..
            } => *status,
            Self::Invocation {
                source: HandlerError::Response(response),
                ..
            } => response.status_code,
            Self::Invocation { .. } | Self::Panicked { .. } => 500,
            Self::BadRequest(_) => 400,
            Self::NotAcceptable { .. } => 406,
            Self::Serialization { .. } => 500,
            // nginx convention for "client closed request"
            Self::Cancelled { .. } => 499,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Routing(err) => err.code(),
            Self::Resolution { source, .. } => source.code(),
            Self::Invocation { .. } => "RUST_CORE_DISPATCH_INVOCATION",
            Self::Panicked { .. } => "RUST_CORE_DISPATCH_PANIC",
            Self::BadRequest(_) => "RUST_CORE_DISPATCH_BAD_REQUEST",
            Self::NotAcceptable { .. } => "RUST_CORE_DISPATCH_NOT_ACCEPTABLE",
            Self::Serialization { .. } => "RUST_CORE_DISPATCH_SERIALIZATION",
            Self::Cancelled { .. } => "RUST_CORE_DISPATCH_CANCELLED",
        }
    }

    /// Message safe to show to the client. Server-side failures stay generic.
    pub fn public_detail(&self) -> String {
        match self {
            Self::Invocation {
                source: HandlerError::Status { message, .. },
                ..
            } => message.clone(),
            Self::Routing(RouteError::NoRoute { .. }) => "not found".to_string(),
            Self::Routing(RouteError::MethodNotAllowed { .. })
            | Self::BadRequest(_)
            | Self::NotAcceptable { .. }
            | Self::Cancelled { .. } => self.to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn render_chain(keys: &[Key]) -> String {
    let mut out = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push_str(" -> ");
        }
        let _ = write!(out, "{key}");
    }
    out
}

fn render_path(path: &[Key]) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" (required by {})", render_chain(path))
    }
}
