//! Body writers keyed by media type.

use crate::dependencies::types::BoxError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Turns a handler's entity into bytes for one media type.
pub trait BodyWriter: Send + Sync {
    fn media_type(&self) -> &str;

    fn write(&self, entity: &Value) -> Result<Vec<u8>, BoxError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonWriter;

impl BodyWriter for JsonWriter {
    fn media_type(&self) -> &str {
        "application/json"
    }

    fn write(&self, entity: &Value) -> Result<Vec<u8>, BoxError> {
        Ok(serde_json::to_vec(entity)?)
    }
}

/// Strings are written as-is, anything else as its JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextWriter;

impl BodyWriter for TextWriter {
    fn media_type(&self) -> &str {
        "text/plain"
    }

    fn write(&self, entity: &Value) -> Result<Vec<u8>, BoxError> {
        Ok(match entity {
            Value::String(text) => text.clone().into_bytes(),
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        })
    }
}

#[derive(Clone)]
pub struct BodyWriters {
    writers: HashMap<String, Arc<dyn BodyWriter>>,
}

impl BodyWriters {
    /// Registry with no writers installed.
    pub fn empty() -> Self {
        Self {
            writers: HashMap::new(),
        }
    }

    /// Installs `writer`, replacing any writer for the same media type.
    pub fn register(&mut self, writer: impl BodyWriter + 'static) {
        let media_type = essence(writer.media_type());
        log::debug!("body writer for {}", media_type);
        self.writers.insert(media_type, Arc::new(writer));
    }

    /// Writer for `media_type`, ignoring parameters such as `charset`.
    pub fn writer_for(&self, media_type: &str) -> Option<&dyn BodyWriter> {
        self.writers.get(&essence(media_type)).map(|writer| writer.as_ref())
    }

    pub fn media_types(&self) -> impl Iterator<Item = &str> {
        self.writers.keys().map(String::as_str)
    }
}

impl Default for BodyWriters {
    fn default() -> Self {
        let mut writers = Self::empty();
        writers.register(JsonWriter);
        writers.register(TextWriter);
        writers
    }
}

impl fmt::Debug for BodyWriters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut media_types: Vec<&str> = self.media_types().collect();
        media_types.sort_unstable();
        f.debug_struct("BodyWriters")
            .field("media_types", &media_types)
            .finish()
    }
}

/// Whether an `Accept` header admits `media_type`. A missing or blank header
/// accepts anything.
///
/// Only the most specific matching range counts (`type/subtype` over
/// `type/*` over `*/*`), so `application/json;q=0, */*` refuses JSON. Ranges
/// with `q=0` are refusals.
pub fn accepts(accept: Option<&str>, media_type: &str) -> bool {
    let accept = match accept.map(str::trim) {
        None | Some("") => return true,
        Some(accept) => accept,
    };
    let wanted = essence(media_type);
    let (wanted_type, _) = wanted.split_once('/').unwrap_or((wanted.as_str(), ""));

    let mut best: Option<(u8, f32)> = None;
    for range in accept.split(',') {
        let mut parts = range.split(';');
        let candidate = essence(parts.next().unwrap_or(""));
        let specificity = match candidate.split_once('/') {
            Some(("*", "*")) => 0,
            Some((range_type, "*")) if range_type == wanted_type => 1,
            _ if candidate == wanted => 2,
            _ => continue,
        };
        let quality = parts
            .filter_map(|param| param.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        best = match best {
            // equally specific ranges: the most favourable wins
            Some((rank, q)) if rank > specificity || (rank == specificity && q >= quality) => {
                Some((rank, q))
            }
            _ => Some((specificity, quality)),
        };
    }
    best.map_or(false, |(_, q)| q > 0.0)
}

fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_writers() {
        let writers = BodyWriters::default();
        let json_writer = writers.writer_for("application/json; charset=utf-8").unwrap();
        assert_eq!(json_writer.write(&json!({"id": 1})).unwrap(), br#"{"id":1}"#);

        let text_writer = writers.writer_for("TEXT/PLAIN").unwrap();
        assert_eq!(text_writer.write(&json!("hello")).unwrap(), b"hello");
        assert_eq!(text_writer.write(&json!(42)).unwrap(), b"42");

        assert!(writers.writer_for("application/xml").is_none());
    }

    #[test]
    fn test_register_replaces_writer() {
        struct Shouting;
        impl BodyWriter for Shouting {
            fn media_type(&self) -> &str {
                "text/plain"
            }
            fn write(&self, entity: &Value) -> Result<Vec<u8>, BoxError> {
                Ok(entity.as_str().unwrap_or_default().to_uppercase().into_bytes())
            }
        }

        let mut writers = BodyWriters::default();
        writers.register(Shouting);
        let writer = writers.writer_for("text/plain").unwrap();
        assert_eq!(writer.write(&json!("hey")).unwrap(), b"HEY");
    }

    #[test]
    fn test_accepts() {
        assert!(accepts(None, "application/json"));
        assert!(accepts(Some(""), "application/json"));
        assert!(accepts(Some("*/*"), "application/json"));
        assert!(accepts(Some("application/*"), "application/json"));
        assert!(accepts(
            Some("text/html, application/json;q=0.9"),
            "application/json"
        ));
        assert!(!accepts(Some("text/html"), "application/json"));
        assert!(!accepts(Some("application/json;q=0"), "application/json"));
        assert!(!accepts(Some("text/*"), "application/json"));
    }

    #[test]
    fn test_specific_refusal_beats_wildcard() {
        let accept = Some("application/json;q=0, */*");
        assert!(!accepts(accept, "application/json"));
        assert!(accepts(accept, "text/plain"));

        let accept = Some("text/*;q=0, text/plain, */*;q=0.1");
        assert!(accepts(accept, "text/plain"));
        assert!(!accepts(accept, "text/html"));
        assert!(accepts(accept, "application/json"));
    }
}
