use crate::errors::BodyError;
use std::collections::HashMap;

/// Decodes `a=1&b=two`. Pairs without `=` and undecodable pairs are skipped.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

pub fn parse_json_body(data: &[u8]) -> Result<serde_json::Value, BodyError> {
    if data.is_empty() {
        return Err(BodyError::Missing);
    }
    serde_json::from_slice(data).map_err(|e| BodyError::InvalidJson(e.to_string()))
}

pub fn parse_form_body(data: &[u8]) -> Result<HashMap<String, String>, BodyError> {
    let body_str = std::str::from_utf8(data).map_err(|e| BodyError::InvalidUtf8(e.to_string()))?;

    Ok(parse_query_string(body_str))
}

// form encoding uses '+' for spaces
fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|decoded| decoded.into_owned())
}
