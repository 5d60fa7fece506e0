use crate::errors::RouteError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;

static PARAM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][\w.-]*$").expect("parameter name regex is valid"));

/// Compiled path template such as `/topics/{id:\d+}/replies`.
///
/// Parameters always span exactly one segment. A constraint is matched
/// against the whole raw segment, so `{name:.+}` never swallows a `/`.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    pattern: String,
    normalized: String,
    regex: Regex,
    params: Vec<String>,
    constraints: Vec<Option<Regex>>,
    literal_segments: usize,
    literal_chars: usize,
    constrained_params: usize,
}

impl PathTemplate {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Pattern with parameter names erased. Two templates with the same
    /// normalized form match exactly the same paths.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Sort key for choosing between templates that match the same path.
    /// Higher is more specific.
    pub fn specificity(&self) -> (usize, usize, usize) {
        (self.literal_segments, self.literal_chars, self.constrained_params)
    }

    /// Percent-decoded parameter values if `path` matches.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let segments = self.segments(path)?;
        let mut values = HashMap::with_capacity(self.params.len());
        for (name, raw) in self.params.iter().zip(segments) {
            let value = urlencoding::decode(raw)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| raw.to_string());
            values.insert(name.clone(), value);
        }
        Some(values)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.segments(path).is_some()
    }

    /// Raw parameter segments, in declaration order, once every constraint holds.
    fn segments<'p>(&self, path: &'p str) -> Option<Vec<&'p str>> {
        let captures = self.regex.captures(path)?;
        let mut segments = Vec::with_capacity(self.params.len());
        for (index, constraint) in self.constraints.iter().enumerate() {
            let raw = captures.name(&group_name(index))?.as_str();
            if let Some(constraint) = constraint {
                if !constraint.is_match(raw) {
                    return None;
                }
            }
            segments.push(raw);
        }
        Some(segments)
    }
}

pub fn parse_route_pattern(pattern: &str) -> Result<PathTemplate, RouteError> {
    let invalid = |reason: String| RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };

    let cleaned = normalize_path(pattern);
    let mut regex_pattern = String::from("^");
    let mut normalized = String::new();
    let mut params: Vec<String> = Vec::new();
    let mut constraints: Vec<Option<Regex>> = Vec::new();
    let mut literal_segments = 0;
    let mut literal_chars = 0;
    let mut constrained_params = 0;

    let segments: Vec<&str> = match cleaned.as_str() {
        "/" => Vec::new(),
        _ => cleaned[1..].split('/').collect(),
    };

    for segment in segments {
        if segment.is_empty() {
            return Err(invalid("empty path segment".to_string()));
        }
        regex_pattern.push('/');
        normalized.push('/');

        if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            let (name, constraint) = match inner.split_once(':') {
                Some((name, constraint)) => (name.trim(), Some(constraint.trim())),
                None => (inner.trim(), None),
            };
            if !PARAM_NAME.is_match(name) {
                return Err(invalid(format!("invalid parameter name '{}'", name)));
            }
            if params.iter().any(|existing| existing == name) {
                return Err(invalid(format!("duplicate parameter '{}'", name)));
            }

            regex_pattern.push_str(&format!("(?P<{}>[^/]+)", group_name(params.len())));
            match constraint {
                Some(constraint) => {
                    if constraint.is_empty() || constraint.contains('/') {
                        return Err(invalid(format!(
                            "constraint of '{}' must be non-empty and must not match '/'",
                            name
                        )));
                    }
                    let anchored = Regex::new(&format!("^(?:{})$", constraint))
                        .map_err(|e| invalid(format!("constraint of '{}': {}", name, e)))?;
                    normalized.push_str(&format!("{{:{}}}", constraint));
                    constraints.push(Some(anchored));
                    constrained_params += 1;
                }
                None => {
                    normalized.push_str("{}");
                    constraints.push(None);
                }
            }
            params.push(name.to_string());
        } else if segment.contains('{') || segment.contains('}') {
            return Err(invalid(format!(
                "segment '{}' mixes literal text and a parameter",
                segment
            )));
        } else {
            regex_pattern.push_str(&regex::escape(segment));
            normalized.push_str(segment);
            literal_segments += 1;
            literal_chars += segment.len();
        }
    }

    if normalized.is_empty() {
        regex_pattern.push('/');
        normalized.push('/');
    }
    regex_pattern.push('$');

    let regex = Regex::new(&regex_pattern).map_err(|e| invalid(e.to_string()))?;

    Ok(PathTemplate {
        pattern: cleaned,
        normalized,
        regex,
        params,
        constraints,
        literal_segments,
        literal_chars,
        constrained_params,
    })
}

/// Leading `/` added, trailing `/` dropped except for the root.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let without_trailing = trimmed.trim_end_matches('/');
    if without_trailing.is_empty() {
        return "/".to_string();
    }
    if without_trailing.starts_with('/') {
        without_trailing.to_string()
    } else {
        format!("/{}", without_trailing)
    }
}

fn group_name(index: usize) -> String {
    format!("p{}", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal_pattern() {
        let template = parse_route_pattern("/topics/latest").unwrap();
        assert!(template.is_match("/topics/latest"));
        assert!(!template.is_match("/topics/latest/more"));
        assert_eq!(template.specificity(), (2, 12, 0));
        assert!(template.params().is_empty());
    }

    #[test]
    fn test_parse_named_parameters() {
        let template = parse_route_pattern("/users/{user}/posts/{post}").unwrap();
        let values = template.captures("/users/alice/posts/42").unwrap();
        assert_eq!(values.get("user"), Some(&"alice".to_string()));
        assert_eq!(values.get("post"), Some(&"42".to_string()));
        assert_eq!(template.normalized(), "/users/{}/posts/{}");
    }

    #[test]
    fn test_parameter_values_are_decoded() {
        let template = parse_route_pattern("/files/{name}").unwrap();
        let values = template.captures("/files/annual%20report").unwrap();
        assert_eq!(values["name"], "annual report");
    }

    #[test]
    fn test_constrained_parameter() {
        let template = parse_route_pattern(r"/topics/{id:\d+}").unwrap();
        assert!(template.is_match("/topics/1234"));
        assert!(!template.is_match("/topics/latest"));
        assert_eq!(template.specificity(), (1, 6, 1));
    }

    #[test]
    fn test_alternation_constraint_stays_in_segment() {
        let template = parse_route_pattern("/files/{kind:a|b}/raw").unwrap();
        assert!(template.is_match("/files/a/raw"));
        assert!(!template.is_match("/files/a"));
    }

    #[test]
    fn test_open_constraint_cannot_span_segments() {
        let template = parse_route_pattern("/files/{name:.+}").unwrap();
        assert!(template.is_match("/files/report.pdf"));
        assert!(!template.is_match("/files/a/b/c"));
        assert!(template.captures("/files/a/b").is_none());

        let negated = parse_route_pattern("/tags/{x:[^z]+}/items").unwrap();
        assert!(negated.is_match("/tags/abc/items"));
        assert!(!negated.is_match("/tags/a/b/items"));
    }

    #[test]
    fn test_root_and_trailing_slash() {
        let root = parse_route_pattern("/").unwrap();
        assert!(root.is_match("/"));
        assert_eq!(root.normalized(), "/");

        let items = parse_route_pattern("items/").unwrap();
        assert_eq!(items.pattern(), "/items");
        assert!(items.is_match("/items"));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = parse_route_pattern("/a/{id}/b/{id}").unwrap_err();
        assert_eq!(err.code(), "RUST_CORE_ROUTING_INVALID_ROUTE_PATTERN");
        assert!(err.to_string().contains("duplicate parameter 'id'"));
    }

    #[test]
    fn test_malformed_patterns_rejected() {
        assert!(parse_route_pattern("/a//b").is_err());
        assert!(parse_route_pattern("/a/pre{id}").is_err());
        assert!(parse_route_pattern("/a/{1bad}").is_err());
        assert!(parse_route_pattern("/a/{id:(}").is_err());
        assert!(parse_route_pattern("/a/{id:.*/.*}").is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/a/b/"), "/a/b");
        assert_eq!(normalize_path("a"), "/a");
    }
}
