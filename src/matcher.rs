//! Route path patterns.
//!
//! Service URLs use express-style patterns: literal segments, `:name`
//! parameters and a `*` wildcard. Leading and trailing slashes are not
//! significant.

use std::collections::HashMap;

/// A compiled service URL pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
    /// Matches the rest of the path
    Wildcard,
}

impl PathPattern {
    /// Parse a service URL such as `users/:id` or `/static/*`.
    pub fn parse(pattern: &str) -> Self {
        let segments = split_segments(pattern)
            .map(|segment| {
                if segment == "*" {
                    Segment::Wildcard
                } else if let Some(name) = segment.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        Self { segments }
    }

    /// Match a request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut remaining = split_segments(path);

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => return Some(params),
                Segment::Literal(lit) => {
                    if remaining.next()? != lit.as_str() {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = remaining.next()?;
                    let decoded = urlencoding::decode(value)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| value.to_string());
                    params.insert(name.clone(), decoded);
                }
            }
        }

        // Must consume entire path
        if remaining.next().is_none() {
            Some(params)
        } else {
            None
        }
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Strip a mount prefix (`/apimocker`) from a request path.
///
/// Returns `None` when the path is outside the prefix.
pub fn strip_basepath<'a>(path: &'a str, basepath: &str) -> Option<&'a str> {
    let prefix = basepath.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_matching() {
        let pattern = PathPattern::parse("nested/ace");
        assert!(pattern.matches("/nested/ace").is_some());
        assert!(pattern.matches("/nested/ace/").is_some());
        assert!(pattern.matches("/nested").is_none());
        assert!(pattern.matches("/nested/ace/extra").is_none());
        assert!(pattern.matches("/nested/king").is_none());
    }

    #[test]
    fn test_param_matching() {
        let pattern = PathPattern::parse("template/:name/:number");
        let params = pattern.matches("/template/john/4").unwrap();
        assert_eq!(params.get("name"), Some(&"john".to_string()));
        assert_eq!(params.get("number"), Some(&"4".to_string()));

        assert!(pattern.matches("/template/john").is_none());
    }

    #[test]
    fn test_param_is_percent_decoded() {
        let pattern = PathPattern::parse("/users/role/:role");
        let params = pattern.matches("/users/role/protocol%20droid").unwrap();
        assert_eq!(params.get("role"), Some(&"protocol droid".to_string()));
    }

    #[test]
    fn test_wildcard_matching() {
        let pattern = PathPattern::parse("files/*");
        assert!(pattern.matches("/files/a/b/c").is_some());
        assert!(pattern.matches("/files").is_some());
        assert!(pattern.matches("/other/a").is_none());
    }

    #[test]
    fn test_strip_basepath() {
        assert_eq!(strip_basepath("/apimocker/nested/ace", "/apimocker"), Some("/nested/ace"));
        assert_eq!(strip_basepath("/apimocker", "/apimocker/"), Some("/"));
        assert_eq!(strip_basepath("/apimockers/x", "/apimocker"), None);
        assert_eq!(strip_basepath("/nested/ace", ""), Some("/nested/ace"));
    }
}
