use std::collections::HashMap;
use std::fmt;

use crate::error::EtudeError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

/// A parsed path pattern such as `/users/{id}` or `/static/{*path}`.
///
/// Literal segments match exactly, `{name}` captures one segment and
/// `{*name}` (last segment only) captures the rest of the path, possibly
/// empty. Empty segments are ignored, so `/users/` and `/users` are the same
/// pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, EtudeError> {
        let invalid = |reason| EtudeError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };
        if !pattern.starts_with('/') {
            return Err(invalid("pattern must start with `/`"));
        }

        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (i, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => {
                    let (catch_all, name) = match inner.strip_prefix('*') {
                        Some(name) => (true, name),
                        None => (false, inner),
                    };
                    if name.is_empty()
                        || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
                    {
                        return Err(invalid("parameter names must be alphanumeric"));
                    }
                    if names.contains(&name) {
                        return Err(invalid("parameter name used twice"));
                    }
                    names.push(name);
                    if catch_all {
                        if i != parts.len() - 1 {
                            return Err(invalid("catch-all must be the last segment"));
                        }
                        Segment::CatchAll(name.to_string())
                    } else {
                        Segment::Param(name.to_string())
                    }
                }
                None => {
                    if part.contains('{') || part.contains('}') {
                        return Err(invalid("braces must wrap a whole segment"));
                    }
                    Segment::Literal((*part).to_string())
                }
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Shape of the pattern with parameter names erased. Two patterns with
    /// the same key match exactly the same paths.
    pub fn normalized(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Param(_) => out.push_str("{}"),
                Segment::CatchAll(_) => out.push_str("{*}"),
            }
        }
        out
    }

    /// Match `path`, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = HashMap::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll(name) => {
                    let rest = parts.get(i..).map(|p| p.join("/")).unwrap_or_default();
                    params.insert(name.clone(), rest);
                    return Some(params);
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), (*value).to_string());
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_match() {
        let p = RoutePattern::parse("/hello/world").unwrap();
        assert!(p.matches("/hello/world").is_some());
        assert!(p.matches("/hello/world/").is_some());
        assert!(p.matches("/hello").is_none());
        assert!(p.matches("/hello/world/again").is_none());
    }

    #[test]
    fn root_matches_only_root() {
        let p = RoutePattern::parse("/").unwrap();
        assert!(p.matches("/").is_some());
        assert!(p.matches("").is_some());
        assert!(p.matches("/x").is_none());
    }

    #[test]
    fn params_are_captured() {
        let p = RoutePattern::parse("/users/{id}/posts/{post_id}").unwrap();
        let params = p.matches("/users/123/posts/abc").unwrap();
        assert_eq!(params["id"], "123");
        assert_eq!(params["post_id"], "abc");
        assert!(p.matches("/users/123/posts").is_none());
    }

    #[test]
    fn catch_all_takes_the_rest() {
        let p = RoutePattern::parse("/assets/{*path}").unwrap();
        assert_eq!(p.matches("/assets/js/app.js").unwrap()["path"], "js/app.js");
        assert_eq!(p.matches("/assets").unwrap()["path"], "");
        assert!(p.matches("/other/x").is_none());
    }

    #[test]
    fn invalid_patterns() {
        for bad in ["users", "/a/{}", "/a/{x}/{x}", "/a/{*rest}/b", "/a/x{y}", "/a/{b-c}"] {
            assert!(
                matches!(RoutePattern::parse(bad), Err(EtudeError::InvalidPattern { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn normalized_erases_names() {
        let a = RoutePattern::parse("/users/{id}/").unwrap();
        let b = RoutePattern::parse("/users/{uid}").unwrap();
        assert_eq!(a.normalized(), b.normalized());
        assert_eq!(a.normalized(), "/users/{}");
    }
}
