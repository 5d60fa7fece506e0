use crate::response::types::{HttpResponse, ResponseBody};
use serde_json::json;
use std::collections::HashMap;

pub fn serialize_json_response(value: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn default_media_type(body: &ResponseBody) -> Option<&'static str> {
    match body {
        ResponseBody::Empty => None,
        ResponseBody::Json(_) => Some("application/json"),
        ResponseBody::Text(_) => Some("text/plain"),
        ResponseBody::Binary(_) => Some("application/octet-stream"),
    }
}

/// Response whose `Content-Type` follows the body variant. Empty bodies get none.
pub fn create_response(status: u16, body: ResponseBody) -> HttpResponse {
    let headers = default_media_type(&body)
        .map(|media| HashMap::from([("Content-Type".to_string(), media.to_string())]))
        .unwrap_or_default();

    HttpResponse {
        status_code: status,
        headers,
        body,
    }
}

/// Already-encoded body with an explicit media type.
pub fn encoded_response(status: u16, media_type: &str, bytes: Vec<u8>) -> HttpResponse {
    create_response(status, ResponseBody::Binary(bytes)).with_header("Content-Type", media_type)
}

/// `{"detail": ...}` error body.
pub fn error_response(status: u16, detail: impl Into<String>) -> HttpResponse {
    create_response(status, ResponseBody::Json(json!({ "detail": detail.into() })))
}

pub fn serialize_response_body(body: &ResponseBody) -> Vec<u8> {
    match body {
        ResponseBody::Empty => vec![],
        ResponseBody::Json(value) => serialize_json_response(value),
        ResponseBody::Text(text) => text.as_bytes().to_vec(),
        ResponseBody::Binary(data) => data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_json_response() {
        let body = ResponseBody::Json(json!({"status": "ok"}));
        let response = create_response(200, body);

        assert_eq!(response.status_code, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_create_empty_response_has_no_content_type() {
        let response = create_response(204, ResponseBody::Empty);
        assert_eq!(response.status_code, 204);
        assert!(response.header("Content-Type").is_none());
        assert!(response.body_bytes().is_empty());
    }

    #[test]
    fn test_encoded_response_overrides_media_type() {
        let response = encoded_response(200, "text/csv", b"a,b\n1,2".to_vec());
        assert_eq!(response.header("Content-Type"), Some("text/csv"));
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.body_bytes(), b"a,b\n1,2");
    }

    #[test]
    fn test_error_response_detail() {
        let response = error_response(404, "not found");
        assert_eq!(response.status_code, 404);
        assert_eq!(response.body_bytes(), br#"{"detail":"not found"}"#);
    }

    #[test]
    fn test_without_body_keeps_headers() {
        let response = create_response(200, ResponseBody::Text("hello".to_string()))
            .with_header("X-Request-Id", "9")
            .without_body();
        assert_eq!(response.body, ResponseBody::Empty);
        assert_eq!(response.header("x-request-id"), Some("9"));
        assert_eq!(response.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_serialize_response_body_variants() {
        assert_eq!(
            serialize_response_body(&ResponseBody::Json(json!({"key": "value"}))),
            br#"{"key":"value"}"#
        );
        assert_eq!(
            serialize_response_body(&ResponseBody::Text("plain".to_string())),
            b"plain"
        );
        assert_eq!(
            serialize_response_body(&ResponseBody::Binary(vec![0x00, 0xFF])),
            vec![0x00, 0xFF]
        );
        assert!(serialize_response_body(&ResponseBody::Empty).is_empty());
    }

    #[test]
    fn test_non_ascii_json_survives_encoding() {
        let serialized = serialize_json_response(&json!({"title": "Grüße, 世界"}));
        let decoded: serde_json::Value = serde_json::from_slice(&serialized).unwrap();
        assert_eq!(decoded["title"], "Grüße, 世界");
    }
}
