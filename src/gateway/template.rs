//! Path template matching for gateway routes.
//!
//! # Responsibilities
//! - Parse templates like `/v1/users/{id}` and `/v1/files/{*path}`
//! - Match request paths segment by segment, capturing variables
//! - Rank matches so literal segments beat captures
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `{*name}` captures the remainder and must be the last segment
//! - No regex to guarantee O(n) matching

use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
    Rest(String),
}

/// A compiled route template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

/// Why a template was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError(pub String);

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(TemplateError("template must start with '/'".into()));
        };

        let mut segments = Vec::new();
        let mut names = HashSet::new();
        let parts: Vec<&str> = if rest.is_empty() { Vec::new() } else { rest.split('/').collect() };
        let last = parts.len().saturating_sub(1);

        for (i, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(var) => {
                    let (segment, name) = match var.strip_prefix('*') {
                        Some(name) if i == last => (Segment::Rest(name.to_string()), name),
                        Some(_) => {
                            return Err(TemplateError("catch-all variable must be the last segment".into()))
                        }
                        None => (Segment::Var(var.to_string()), var),
                    };
                    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                        return Err(TemplateError(format!("invalid variable name {name:?}")));
                    }
                    if !names.insert(name.to_string()) {
                        return Err(TemplateError(format!("variable {name:?} appears twice")));
                    }
                    segment
                }
                None => {
                    if part.is_empty() {
                        return Err(TemplateError("empty path segment".into()));
                    }
                    if part.contains('{') || part.contains('}') {
                        return Err(TemplateError(format!("malformed segment {part:?}")));
                    }
                    Segment::Literal(part.to_string())
                }
            };
            segments.push(segment);
        }

        Ok(Self { raw: raw.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether both templates match exactly the same paths.
    pub fn same_shape(&self, other: &PathTemplate) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|pair| match pair {
                (Segment::Literal(a), Segment::Literal(b)) => a == b,
                (Segment::Var(_), Segment::Var(_)) | (Segment::Rest(_), Segment::Rest(_)) => true,
                _ => false,
            })
    }

    /// Number of literal segments; higher is more specific.
    pub fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Match `path`, returning captured variables in template order.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let path = path.strip_prefix('/')?;
        let parts: Vec<&str> = if path.is_empty() { Vec::new() } else { path.split('/').collect() };

        let mut captures = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Var(name) => {
                    let value = parts.get(i).filter(|v| !v.is_empty())?;
                    captures.push((name.clone(), (*value).to_string()));
                }
                Segment::Rest(name) => {
                    let rest = parts.get(i..).unwrap_or_default().join("/");
                    if rest.is_empty() {
                        return None;
                    }
                    captures.push((name.clone(), rest));
                    return Some(captures);
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(captures)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_template() {
        let t = PathTemplate::parse("/v1/echo").unwrap();
        assert_eq!(t.matches("/v1/echo"), Some(vec![]));
        assert_eq!(t.matches("/v1/echo/x"), None);
        assert_eq!(t.matches("/v1/Echo"), None); // Case sensitive
    }

    #[test]
    fn variables_are_captured() {
        let t = PathTemplate::parse("/v1/users/{id}/posts/{post_id}").unwrap();
        assert_eq!(
            t.matches("/v1/users/7/posts/9"),
            Some(vec![("id".into(), "7".into()), ("post_id".into(), "9".into())])
        );
        assert_eq!(t.matches("/v1/users//posts/9"), None);
    }

    #[test]
    fn catch_all_takes_remainder() {
        let t = PathTemplate::parse("/files/{*path}").unwrap();
        assert_eq!(t.matches("/files/a/b/c"), Some(vec![("path".into(), "a/b/c".into())]));
        assert_eq!(t.matches("/files"), None);
    }

    #[test]
    fn root_template() {
        let t = PathTemplate::parse("/").unwrap();
        assert_eq!(t.matches("/"), Some(vec![]));
        assert_eq!(t.matches("/x"), None);
    }

    #[test]
    fn invalid_templates() {
        assert!(PathTemplate::parse("v1/echo").is_err());
        assert!(PathTemplate::parse("/v1//echo").is_err());
        assert!(PathTemplate::parse("/v1/{*rest}/tail").is_err());
        assert!(PathTemplate::parse("/v1/{id}/{id}").is_err());
        assert!(PathTemplate::parse("/v1/{}").is_err());
        assert!(PathTemplate::parse("/v1/a{id}").is_err());
    }

    #[test]
    fn shape_and_specificity() {
        let a = PathTemplate::parse("/v1/users/{id}").unwrap();
        let b = PathTemplate::parse("/v1/users/{name}").unwrap();
        let c = PathTemplate::parse("/v1/users/me").unwrap();
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
        assert!(c.specificity() > a.specificity());
    }
}
