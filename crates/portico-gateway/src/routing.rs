//! Path matching: context-path routing, flow selectors and path mappings.
//!
//! Templates use `:param` or `{param}` capture segments.  Route tables are
//! small, so lookups are a linear scan over entries kept sorted by
//! descending specificity.

use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// PathPattern
// ─────────────────────────────────────────────────────────────────────────────

/// Parsed path template such as `/products/:id` or `/orders/{order}/lines`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

impl PathPattern {
    pub fn new(template: impl Into<String>) -> Self {
        let source = template.into();
        let segments = split(&source)
            .map(|part| {
                if let Some(name) = part.strip_prefix(':') {
                    Segment::Capture(name.to_string())
                } else if part.starts_with('{') && part.ends_with('}') && part.len() > 1 {
                    Segment::Capture(part[1..part.len() - 1].to_string())
                } else {
                    Segment::Literal(part.to_string())
                }
            })
            .collect();
        Self { source, segments }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match the whole of `path`; returns the captured parameters.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        self.capture(&parts)
    }

    /// `true` when the pattern matches a leading run of `path` segments.
    pub fn matches_prefix(&self, path: &str) -> bool {
        let parts: Vec<&str> = split(path).collect();
        parts.len() >= self.segments.len() && self.capture(&parts[..self.segments.len()]).is_some()
    }

    fn capture(&self, parts: &[&str]) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Capture(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
                Segment::Literal(literal) if literal != part => return None,
                Segment::Literal(_) => {}
            }
        }
        Some(params)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|p| !p.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// ContextPathRouter
// ─────────────────────────────────────────────────────────────────────────────

/// Maps context paths to targets with longest-prefix resolution.
///
/// A context path matches a request path when it equals it or is followed
/// by a `/` in it; `/echo` serves `/echo` and `/echo/x` but not `/echoes`.
#[derive(Debug, Clone)]
pub struct ContextPathRouter<T> {
    /// Sorted by descending context-path length.
    entries: Vec<(String, T)>,
}

impl<T> Default for ContextPathRouter<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Clone> ContextPathRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target` under `context_path`; returns `false` when the path
    /// is already taken.
    pub fn register(&mut self, context_path: &str, target: T) -> bool {
        let path = normalize(context_path);
        if self.entries.iter().any(|(p, _)| *p == path) {
            return false;
        }
        let pos = self.entries.partition_point(|(p, _)| p.len() >= path.len());
        self.entries.insert(pos, (path, target));
        true
    }

    /// Drop every entry whose target satisfies `predicate`.
    pub fn deregister(&mut self, predicate: impl Fn(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, t)| !predicate(t));
        before - self.entries.len()
    }

    /// Longest registered context path serving `path`, with its target.
    pub fn resolve(&self, path: &str) -> Option<(&str, T)> {
        self.entries
            .iter()
            .find(|(context_path, _)| serves(context_path, path))
            .map(|(p, t)| (p.as_str(), t.clone()))
    }

    pub fn context_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Leading slash, no trailing slash; the root stays `/`.
pub fn normalize(context_path: &str) -> String {
    let trimmed = context_path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn serves(context_path: &str, path: &str) -> bool {
    if context_path == "/" {
        return true;
    }
    match path.strip_prefix(context_path) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_captures_params() {
        let pattern = PathPattern::new("/products/:id/reviews/{review}");
        let params = pattern.match_path("/products/42/reviews/7").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["review"], "7");
        assert!(pattern.match_path("/products/42").is_none());
        assert!(pattern.match_path("/orders/42/reviews/7").is_none());
    }

    #[test]
    fn prefix_match_respects_segments() {
        let root = PathPattern::new("/");
        assert!(root.matches_prefix("/anything/at/all"));

        let items = PathPattern::new("/items");
        assert!(items.matches_prefix("/items"));
        assert!(items.matches_prefix("/items/1"));
        assert!(!items.matches_prefix("/itemsx"));
        assert!(!items.matches_prefix("/"));
    }

    #[test]
    fn longest_context_path_wins() {
        let mut router = ContextPathRouter::new();
        assert!(router.register("/echo", "short"));
        assert!(router.register("/echo/v2/", "long"));
        assert!(!router.register("/echo/", "duplicate"));

        assert_eq!(router.resolve("/echo/v2/items"), Some(("/echo/v2", "long")));
        assert_eq!(router.resolve("/echo/v1"), Some(("/echo", "short")));
        assert_eq!(router.resolve("/echo"), Some(("/echo", "short")));
        assert_eq!(router.resolve("/echoes"), None);
    }

    #[test]
    fn deregister_removes_every_path_of_a_target() {
        let mut router = ContextPathRouter::new();
        router.register("/a", 1);
        router.register("/b", 1);
        router.register("/c", 2);
        assert_eq!(router.deregister(|t| *t == 1), 2);
        assert_eq!(router.len(), 1);
        assert_eq!(router.resolve("/a"), None);
    }
}
