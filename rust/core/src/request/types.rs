use crate::request::parser::parse_query_string;
use crate::routing::HttpMethod;
use std::borrow::Cow;
use std::collections::HashMap;

/// Transport-neutral inbound request. Header names are stored lowercase.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(HashMap<String, String>),
    Raw(Vec<u8>),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Raw(bytes) => bytes.is_empty(),
            Self::Json(_) | Self::Form(_) => false,
        }
    }

    /// Raw bytes, serializing decoded variants back when needed.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Empty => Cow::Borrowed(&[]),
            Self::Raw(bytes) => Cow::Borrowed(bytes),
            Self::Json(value) => Cow::Owned(serde_json::to_vec(value).unwrap_or_default()),
            Self::Form(fields) => {
                let encoded = fields
                    .iter()
                    .map(|(key, value)| {
                        format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                    })
                    .collect::<Vec<_>>()
                    .join("&");
                Cow::Owned(encoded.into_bytes())
            }
        }
    }
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HashMap::new(),
            query_params: HashMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Splits `uri` into path and decoded query parameters.
    pub fn from_uri(method: HttpMethod, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (uri, ""),
        };
        let mut request = Self::new(method, path);
        request.query_params = parse_query_string(query);
        request
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}
