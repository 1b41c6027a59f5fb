//! Route resolution: mapping a request path to a route name and namespace.
//!
//! The route-dependent filters only need a name and a namespace, so resolution
//! is behind the [`RouteResolver`] trait. [`RouteTable`] is a radix-tree
//! implementation (matchit) for applications that register their routes with
//! the logger.
//!
//! Namespaces nest the way URL includes do: a table included under namespace
//! `admin` inside a table included under `v1` resolves to `v1:admin`.

use crate::error::RouteResolutionError;
use matchit::Router as MatchitRouter;

/// The route an exchange's path resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedRoute {
    /// Route pattern as registered, e.g. `/users/{id}`.
    pub pattern: String,
    /// Route name, if the route was named.
    pub url_name: Option<String>,
    /// Colon-joined namespace, if the route was included under one.
    pub namespace: Option<String>,
}

/// Maps request paths to routes.
pub trait RouteResolver: Send + Sync + 'static {
    /// Resolve a request path.
    fn resolve(&self, path: &str) -> Result<ResolvedRoute, RouteResolutionError>;
}

/// Resolver used when the application registers no routes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoutes;

impl RouteResolver for NoRoutes {
    fn resolve(&self, _path: &str) -> Result<ResolvedRoute, RouteResolutionError> {
        Err(RouteResolutionError::NoResolver)
    }
}

/// A named route table backed by a radix tree.
///
/// ```ignore
/// use api_logger::RouteTable;
///
/// let admin = RouteTable::new()
///     .route("/", "index")
///     .route("/users/{id}", "user-change");
///
/// let routes = RouteTable::new()
///     .route("/api/users", "user-list")
///     .route("/api/users/{id}", "user-detail")
///     .include("/admin", Some("admin"), admin);
/// ```
#[derive(Clone)]
pub struct RouteTable {
    inner: MatchitRouter<ResolvedRoute>,
    entries: Vec<(String, ResolvedRoute)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            inner: MatchitRouter::new(),
            entries: Vec::new(),
        }
    }

    /// Register a named route.
    ///
    /// # Panics
    ///
    /// Panics if the path conflicts with an existing route. Route tables are
    /// built at startup, so a conflict is a programming error.
    pub fn route(self, path: &str, name: impl Into<String>) -> Self {
        self.insert_or_panic(path, Some(name.into()), None)
    }

    /// Register an unnamed route.
    ///
    /// # Panics
    ///
    /// Panics on a conflicting path.
    pub fn unnamed(self, path: &str) -> Self {
        self.insert_or_panic(path, None, None)
    }

    /// Include every route of `table` under `prefix`, optionally inside a
    /// namespace.
    ///
    /// # Panics
    ///
    /// Panics on a conflicting path.
    pub fn include(mut self, prefix: &str, namespace: Option<&str>, table: RouteTable) -> Self {
        let prefix = normalize_prefix(prefix);
        for (path, route) in table.entries {
            let full_path = join_paths(&prefix, &path);
            let nested = match (namespace, route.namespace) {
                (Some(outer), Some(inner)) => Some(format!("{}:{}", outer, inner)),
                (Some(outer), None) => Some(outer.to_string()),
                (None, inner) => inner,
            };
            self = self.insert_or_panic(&full_path, route.url_name, nested);
        }
        self
    }

    /// Register a route, returning an error on conflict.
    pub fn try_insert(
        &mut self,
        path: &str,
        name: Option<String>,
        namespace: Option<String>,
    ) -> Result<(), matchit::InsertError> {
        let route = ResolvedRoute {
            pattern: path.to_string(),
            url_name: name,
            namespace,
        };
        self.inner.insert(convert_path_params(path), route.clone())?;
        self.entries.push((path.to_string(), route));
        Ok(())
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_or_panic(
        mut self,
        path: &str,
        name: Option<String>,
        namespace: Option<String>,
    ) -> Self {
        if let Err(e) = self.try_insert(path, name, namespace) {
            panic!("route conflict for `{}`: {}", path, e);
        }
        self
    }
}

impl RouteResolver for RouteTable {
    fn resolve(&self, path: &str) -> Result<ResolvedRoute, RouteResolutionError> {
        self.inner
            .at(path)
            .map(|matched| matched.value.clone())
            .map_err(|_| RouteResolutionError::NotFound(path.to_string()))
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.entries)
            .finish()
    }
}

/// Convert {param} style to :param for matchit
fn convert_path_params(path: &str) -> String {
    let mut result = String::with_capacity(path.len());

    for ch in path.chars() {
        match ch {
            '{' => result.push(':'),
            '}' => {}
            _ => result.push(ch),
        }
    }

    result
}

/// Leading slash, no trailing slash, no empty segments. Empty input is `/`.
fn normalize_prefix(prefix: &str) -> String {
    let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = String::with_capacity(prefix.len() + 1);
    for segment in segments {
        result.push('/');
        result.push_str(segment);
    }
    result
}

fn join_paths(prefix: &str, path: &str) -> String {
    if prefix == "/" {
        return path.to_string();
    }
    if path == "/" || path.is_empty() {
        return prefix.to_string();
    }
    format!("{}{}", prefix, path)
}
