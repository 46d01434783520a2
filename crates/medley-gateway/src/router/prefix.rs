//! Segment-prefix router implementing [`GatewayRouter`].
//!
//! Routes are kept in declaration order. Resolution is a linear scan that
//! keeps the longest matching prefix; on equal length the earlier route wins
//! because later ones only replace a candidate when strictly longer.
//!
//! The scan is O(R × D) where R = number of routes and D = path depth, which
//! is fine for gateway route tables.

use std::sync::Arc;

use medley_kernel::gateway::{GatewayError, GatewayRouter, HttpMethod, RouteConfig, RouteMatch};

struct Entry {
    route: Arc<RouteConfig>,
    segments: Vec<String>,
}

/// [`GatewayRouter`] implementation using longest segment-prefix lookup.
#[derive(Default)]
pub struct PrefixRouter {
    entries: Vec<Entry>,
}

impl PrefixRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from routes in declaration order.
    pub fn from_routes<I>(routes: I) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = RouteConfig>,
    {
        let mut router = Self::new();
        for route in routes {
            router.register(route)?;
        }
        Ok(router)
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The registered route with this id.
    pub fn get(&self, route_id: &str) -> Option<&Arc<RouteConfig>> {
        self.entries
            .iter()
            .find(|e| e.route.id == route_id)
            .map(|e| &e.route)
    }
}

/// `.` or `..`, literal or with percent-encoded dots.
fn dot_segment(segment: &str) -> Option<bool> {
    let lower = segment.to_ascii_lowercase();
    match lower.as_str() {
        "." | "%2e" => Some(false),
        ".." | ".%2e" | "%2e." | "%2e%2e" => Some(true),
        _ => None,
    }
}

/// Split a path into segments with dot segments resolved, the same way a URL
/// parser would before the request reaches the backend. `None` when the path
/// climbs above the root or carries a backslash, which URL parsers also treat
/// as a separator.
fn normalize_segments(path: &str) -> Option<Vec<&str>> {
    if path.contains('\\') {
        return None;
    }
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match dot_segment(segment) {
            Some(true) => {
                out.pop()?;
            }
            Some(false) => {}
            None => out.push(segment),
        }
    }
    Some(out)
}

/// Path after removing `strip` leading segments. A trailing slash on the
/// original path is kept, as is the query.
fn forward_path(segments: &[&str], strip: usize, trailing_slash: bool, query: Option<&str>) -> String {
    let rest = &segments[strip.min(segments.len())..];
    let mut out = format!("/{}", rest.join("/"));
    if trailing_slash && !rest.is_empty() {
        out.push('/');
    }
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    out
}

impl GatewayRouter for PrefixRouter {
    fn register(&mut self, route: RouteConfig) -> Result<(), GatewayError> {
        if self.entries.iter().any(|e| e.route.id == route.id) {
            return Err(GatewayError::DuplicateRoute(route.id));
        }
        if let Some(earlier) = self.entries.iter().find(|e| e.route.overlaps(&route)) {
            return Err(GatewayError::AmbiguousRoute(
                route.id,
                earlier.route.id.clone(),
            ));
        }
        let segments = route
            .prefix_segments()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.entries.push(Entry {
            route: Arc::new(route),
            segments,
        });
        Ok(())
    }

    fn resolve(&self, path: &str, method: &HttpMethod) -> Option<RouteMatch> {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let segments = normalize_segments(path)?;

        let mut best: Option<&Entry> = None;
        for entry in &self.entries {
            if !entry.route.allows_method(method) {
                continue;
            }
            if entry.segments.len() > segments.len() {
                continue;
            }
            let is_prefix = entry
                .segments
                .iter()
                .zip(&segments)
                .all(|(want, got)| want == got);
            if !is_prefix {
                continue;
            }
            if best.is_none_or(|b| entry.segments.len() > b.segments.len()) {
                best = Some(entry);
            }
        }

        best.map(|entry| RouteMatch {
            route: Arc::clone(&entry.route),
            forward_path: forward_path(
                &segments,
                entry.route.strip_prefix,
                path.len() > 1 && path.ends_with('/') && !segments.is_empty(),
                query,
            ),
        })
    }

    fn routes(&self) -> Vec<&RouteConfig> {
        self.entries.iter().map(|e| e.route.as_ref()).collect()
    }

    fn deregister(&mut self, route_id: &str) -> Result<(), GatewayError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.route.id != route_id);
        if self.entries.len() == before {
            return Err(GatewayError::RouteNotFound(route_id.to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
