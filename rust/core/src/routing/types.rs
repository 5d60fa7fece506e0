use crate::dependencies::types::Key;
use crate::errors::RouteError;
use crate::resource::Handler;
use crate::routing::parser::PathTemplate;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    TRACE,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GET => "GET",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::DELETE => "DELETE",
            Self::PATCH => "PATCH",
            Self::HEAD => "HEAD",
            Self::OPTIONS => "OPTIONS",
            Self::TRACE => "TRACE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = RouteError;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method.to_uppercase().as_str() {
            "GET" => Ok(Self::GET),
            "POST" => Ok(Self::POST),
            "PUT" => Ok(Self::PUT),
            "DELETE" => Ok(Self::DELETE),
            "PATCH" => Ok(Self::PATCH),
            "HEAD" => Ok(Self::HEAD),
            "OPTIONS" => Ok(Self::OPTIONS),
            "TRACE" => Ok(Self::TRACE),
            _ => Err(RouteError::InvalidMethod(method.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a declared handler parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    Path,
    Query,
    Header,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub source: ParamSource,
    pub required: bool,
}

impl ParamSpec {
    pub fn path(name: impl Into<String>) -> Self {
        Self::required(name, ParamSource::Path)
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::required(name, ParamSource::Query)
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::required(name, ParamSource::Header)
    }

    pub fn body() -> Self {
        Self::required("body", ParamSource::Body)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn required(name: impl Into<String>, source: ParamSource) -> Self {
        Self {
            name: name.into(),
            source,
            required: true,
        }
    }
}

/// One method + path template served by a handler on a bound resource.
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub template: PathTemplate,
    pub resource: Key,
    pub handler: Handler,
    pub params: Vec<ParamSpec>,
    pub produces: String,
    pub name: String,
}

impl Route {
    pub const DEFAULT_MEDIA_TYPE: &'static str = "application/json";

    pub fn new(method: HttpMethod, template: PathTemplate, resource: Key, handler: Handler) -> Self {
        let name = format!("{} {}", method, template.pattern());
        Self {
            method,
            template,
            resource,
            handler,
            params: Vec::new(),
            produces: Self::DEFAULT_MEDIA_TYPE.to_string(),
            name,
        }
    }

    /// `METHOD /pattern`, used in logs and error messages.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.template.pattern())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.template.pattern())
            .field("resource", &self.resource)
            .field("params", &self.params)
            .field("produces", &self.produces)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub path_params: HashMap<String, String>,
}
