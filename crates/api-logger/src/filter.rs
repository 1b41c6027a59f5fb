//! The filter chain that decides whether an exchange is logged.
//!
//! A [`FilterChain`] is an ordered list of [`ExchangeFilter`] predicates,
//! assembled once from a [`FilterConfig`]. Evaluation stops at the first
//! predicate that excludes the exchange.
//!
//! Built-in predicates, in evaluation order:
//!
//! 1. [`ContentTypeFilter`] - always on
//! 2. [`AdminNamespaceFilter`] - always on
//! 3. [`RouteNameFilter`] - when excluded route names are configured
//! 4. [`NamespaceFilter`] - when excluded namespaces are configured
//! 5. [`MethodFilter`] - when allowed methods are configured
//! 6. [`StatusCodeFilter`] - when allowed status codes are configured
//!
//! Route resolution is lazy and happens at most once per evaluation. The
//! memoized route lives in a [`FilterContext`] created for each call, so one
//! chain can be shared by any number of concurrent requests.

use crate::config::FilterConfig;
use crate::exchange::Exchange;
use crate::route::{ResolvedRoute, RouteResolver};
use std::cell::OnceCell;
use std::collections::HashSet;

/// Response media types that are eligible for logging.
pub const LOGGABLE_CONTENT_TYPES: [&str; 2] = ["application/json", "application/vnd.api+json"];

/// Namespace whose routes are never logged.
pub const ADMIN_NAMESPACE: &str = "admin";

/// Per-evaluation state handed to every predicate.
pub struct FilterContext<'a> {
    exchange: &'a Exchange<'a>,
    resolver: &'a dyn RouteResolver,
    route: OnceCell<Option<ResolvedRoute>>,
}

impl<'a> FilterContext<'a> {
    /// Create a context for one evaluation.
    pub fn new(exchange: &'a Exchange<'a>, resolver: &'a dyn RouteResolver) -> Self {
        Self {
            exchange,
            resolver,
            route: OnceCell::new(),
        }
    }

    /// The exchange under evaluation.
    pub fn exchange(&self) -> &Exchange<'a> {
        self.exchange
    }

    /// The resolved route, or `None` when the path matches no route.
    ///
    /// Resolved on first use and cached for the rest of the evaluation.
    pub fn route(&self) -> Option<&ResolvedRoute> {
        self.route
            .get_or_init(|| match self.resolver.resolve(self.exchange.path()) {
                Ok(route) => Some(route),
                Err(e) => {
                    tracing::trace!(error = %e, "route resolution failed");
                    None
                }
            })
            .as_ref()
    }

    /// Whether the route has been resolved during this evaluation.
    pub fn is_route_resolved(&self) -> bool {
        self.route.get().is_some()
    }
}

/// A single predicate of the chain.
///
/// Returns `true` to exclude the exchange from logging. Predicates that need
/// the route must treat an unresolved route as "do not exclude".
pub trait ExchangeFilter: Send + Sync + 'static {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the exchange should be excluded.
    fn is_filtered(&self, ctx: &FilterContext<'_>) -> bool;
}

/// Excludes responses whose media type is not JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentTypeFilter;

impl ExchangeFilter for ContentTypeFilter {
    fn name(&self) -> &'static str {
        "content_type"
    }

    fn is_filtered(&self, ctx: &FilterContext<'_>) -> bool {
        match ctx.exchange().response_content_type() {
            Some(content_type) => {
                let essence = content_type
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim();
                !LOGGABLE_CONTENT_TYPES
                    .iter()
                    .any(|allowed| essence.eq_ignore_ascii_case(allowed))
            }
            None => true,
        }
    }
}

/// Excludes routes in the administrative namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminNamespaceFilter;

impl ExchangeFilter for AdminNamespaceFilter {
    fn name(&self) -> &'static str {
        "admin_namespace"
    }

    fn is_filtered(&self, ctx: &FilterContext<'_>) -> bool {
        ctx.route()
            .and_then(|route| route.namespace.as_deref())
            .is_some_and(|ns| ns == ADMIN_NAMESPACE)
    }
}

/// Excludes routes by name.
#[derive(Debug, Clone)]
pub struct RouteNameFilter {
    names: HashSet<String>,
}

impl RouteNameFilter {
    /// Exclude routes with any of these names.
    pub fn new(names: HashSet<String>) -> Self {
        Self { names }
    }
}

impl ExchangeFilter for RouteNameFilter {
    fn name(&self) -> &'static str {
        "url_names_skipped"
    }

    fn is_filtered(&self, ctx: &FilterContext<'_>) -> bool {
        ctx.route()
            .and_then(|route| route.url_name.as_ref())
            .is_some_and(|name| self.names.contains(name))
    }
}

/// Excludes routes by namespace.
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    namespaces: HashSet<String>,
}

impl NamespaceFilter {
    /// Exclude routes in any of these namespaces.
    pub fn new(namespaces: HashSet<String>) -> Self {
        Self { namespaces }
    }
}

impl ExchangeFilter for NamespaceFilter {
    fn name(&self) -> &'static str {
        "namespaces_skipped"
    }

    fn is_filtered(&self, ctx: &FilterContext<'_>) -> bool {
        ctx.route()
            .and_then(|route| route.namespace.as_ref())
            .is_some_and(|ns| self.namespaces.contains(ns))
    }
}

/// Excludes requests whose method is not allowed.
#[derive(Debug, Clone)]
pub struct MethodFilter {
    /// Upper-cased.
    methods: HashSet<String>,
}

impl MethodFilter {
    /// Only admit these methods.
    pub fn new(methods: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            methods: methods
                .into_iter()
                .map(|m| m.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }
}

impl ExchangeFilter for MethodFilter {
    fn name(&self) -> &'static str {
        "http_method"
    }

    fn is_filtered(&self, ctx: &FilterContext<'_>) -> bool {
        !self
            .methods
            .contains(&ctx.exchange().method().as_str().to_ascii_uppercase())
    }
}

/// Excludes responses whose status is not allowed.
#[derive(Debug, Clone)]
pub struct StatusCodeFilter {
    codes: HashSet<u16>,
}

impl StatusCodeFilter {
    /// Only admit these status codes.
    pub fn new(codes: HashSet<u16>) -> Self {
        Self { codes }
    }
}

impl ExchangeFilter for StatusCodeFilter {
    fn name(&self) -> &'static str {
        "status_code"
    }

    fn is_filtered(&self, ctx: &FilterContext<'_>) -> bool {
        !self.codes.contains(&ctx.exchange().status().as_u16())
    }
}

/// Ordered, short-circuiting list of filters.
pub struct FilterChain {
    filters: Vec<Box<dyn ExchangeFilter>>,
}

impl FilterChain {
    /// Build the chain for a configuration.
    ///
    /// The two default filters are always present. The others are added only
    /// when their setting is non-empty, so unused ones cost nothing.
    pub fn from_config(config: &FilterConfig) -> Self {
        let mut filters: Vec<Box<dyn ExchangeFilter>> =
            vec![Box::new(ContentTypeFilter), Box::new(AdminNamespaceFilter)];

        if !config.excluded_route_names.is_empty() {
            filters.push(Box::new(RouteNameFilter::new(
                config.excluded_route_names.clone(),
            )));
        }
        if !config.excluded_namespaces.is_empty() {
            filters.push(Box::new(NamespaceFilter::new(
                config.excluded_namespaces.clone(),
            )));
        }
        if !config.allowed_methods.is_empty() {
            filters.push(Box::new(MethodFilter::new(&config.allowed_methods)));
        }
        if !config.allowed_status_codes.is_empty() {
            filters.push(Box::new(StatusCodeFilter::new(
                config.allowed_status_codes.clone(),
            )));
        }

        Self { filters }
    }

    /// A chain with no filters. Admits everything.
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Append a custom filter after the existing ones.
    pub fn with_filter(mut self, filter: Box<dyn ExchangeFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Names of the active filters, in evaluation order.
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Whether the exchange is excluded from logging.
    pub fn is_filtered(&self, exchange: &Exchange<'_>, resolver: &dyn RouteResolver) -> bool {
        let ctx = FilterContext::new(exchange, resolver);
        self.evaluate(&ctx)
    }

    /// Evaluate with a caller-supplied context.
    pub fn evaluate(&self, ctx: &FilterContext<'_>) -> bool {
        for filter in &self.filters {
            tracing::trace!(filter = filter.name(), "evaluating filter");
            if filter.is_filtered(ctx) {
                tracing::debug!(
                    filter = filter.name(),
                    path = %ctx.exchange().path(),
                    "exchange filtered"
                );
                return true;
            }
        }
        false
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filter_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouteResolutionError;
    use crate::exchange::ResponseBody;
    use crate::route::{NoRoutes, RouteTable};
    use bytes::Bytes;
    use http::{request, response, Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn parts(
        method: Method,
        path: &str,
        status: StatusCode,
        content_type: Option<&str>,
    ) -> (request::Parts, response::Parts) {
        let (req, _) = http::Request::builder()
            .method(method)
            .uri(path)
            .body(())
            .unwrap()
            .into_parts();
        let mut builder = http::Response::builder().status(status);
        if let Some(ct) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, ct);
        }
        let (res, _) = builder.body(()).unwrap().into_parts();
        (req, res)
    }

    fn routes() -> RouteTable {
        let admin = RouteTable::new().route("/", "index");
        RouteTable::new()
            .route("/api/users", "user-list")
            .route("/api/health", "health")
            .include("/internal", Some("internal"), RouteTable::new().route("/stats", "stats"))
            .include("/admin", Some("admin"), admin)
    }

    fn check(
        config: &FilterConfig,
        method: Method,
        path: &str,
        status: StatusCode,
        ct: Option<&str>,
    ) -> bool {
        let (req, res) = parts(method, path, status, ct);
        let body = Bytes::new();
        let exchange = Exchange::new(&req, &body, &res, ResponseBody::Buffered(&body));
        FilterChain::from_config(config).is_filtered(&exchange, &routes())
    }

    const JSON: Option<&str> = Some("application/json");

    #[test]
    fn test_chain_order_and_activation() {
        let chain = FilterChain::from_config(&FilterConfig::new());
        assert_eq!(chain.filter_names(), vec!["content_type", "admin_namespace"]);

        let config = FilterConfig::new()
            .allowed_status_codes([200])
            .allowed_methods(["GET"])
            .excluded_namespace("internal")
            .excluded_route_name("health");
        let chain = FilterChain::from_config(&config);
        assert_eq!(
            chain.filter_names(),
            vec![
                "content_type",
                "admin_namespace",
                "url_names_skipped",
                "namespaces_skipped",
                "http_method",
                "status_code",
            ]
        );
    }

    #[test]
    fn test_content_type_filter() {
        let config = FilterConfig::new();
        assert!(!check(&config, Method::GET, "/api/users", StatusCode::OK, JSON));
        for ct in ["application/vnd.api+json", "application/json; charset=utf-8"] {
            assert!(!check(&config, Method::GET, "/api/users", StatusCode::OK, Some(ct)));
        }
        assert!(check(&config, Method::GET, "/api/users", StatusCode::OK, Some("text/html")));
        assert!(check(&config, Method::GET, "/api/users", StatusCode::OK, None));
    }

    #[test]
    fn test_content_type_wins_over_other_settings() {
        let config = FilterConfig::new()
            .allowed_methods(["GET"])
            .allowed_status_codes([200]);
        assert!(check(&config, Method::GET, "/api/users", StatusCode::OK, Some("image/png")));
    }

    #[test]
    fn test_admin_namespace_always_filtered() {
        let config = FilterConfig::new()
            .allowed_methods(["GET"])
            .allowed_status_codes([200]);
        assert!(check(&config, Method::GET, "/admin", StatusCode::OK, JSON));
    }

    #[test]
    fn test_method_allow_list() {
        let config = FilterConfig::new().allowed_methods(["GET"]);
        assert!(check(&config, Method::POST, "/api/users", StatusCode::OK, JSON));
        assert!(!check(&config, Method::GET, "/api/users", StatusCode::OK, JSON));
    }

    #[test]
    fn test_status_code_allow_list() {
        let config = FilterConfig::new().allowed_status_codes([200, 201]);
        assert!(!check(&config, Method::GET, "/api/users", StatusCode::CREATED, JSON));
        assert!(check(&config, Method::GET, "/api/users", StatusCode::NOT_FOUND, JSON));
    }

    #[test]
    fn test_route_name_and_namespace_exclusion() {
        let config = FilterConfig::new()
            .excluded_route_name("health")
            .excluded_namespace("internal");
        assert!(check(&config, Method::GET, "/api/health", StatusCode::OK, JSON));
        assert!(check(&config, Method::GET, "/internal/stats", StatusCode::OK, JSON));
        assert!(!check(&config, Method::GET, "/api/users", StatusCode::OK, JSON));
    }

    #[test]
    fn test_unresolved_route_does_not_exclude() {
        let config = FilterConfig::new()
            .excluded_route_name("health")
            .excluded_namespace("internal");
        assert!(!check(&config, Method::GET, "/not/a/route", StatusCode::OK, JSON));

        let (req, res) = parts(Method::GET, "/admin", StatusCode::OK, JSON);
        let body = Bytes::new();
        let exchange = Exchange::new(&req, &body, &res, ResponseBody::Buffered(&body));
        assert!(!FilterChain::from_config(&config).is_filtered(&exchange, &NoRoutes));
    }

    struct CountingResolver {
        calls: Arc<AtomicUsize>,
    }

    impl RouteResolver for CountingResolver {
        fn resolve(&self, path: &str) -> Result<ResolvedRoute, RouteResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RouteResolutionError::NotFound(path.to_string()))
        }
    }

    #[test]
    fn test_route_resolved_at_most_once_per_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CountingResolver { calls: calls.clone() };
        let config = FilterConfig::new()
            .excluded_route_name("a")
            .excluded_namespace("b");
        let chain = FilterChain::from_config(&config);

        let (req, res) = parts(Method::GET, "/x", StatusCode::OK, JSON);
        let body = Bytes::new();
        let exchange = Exchange::new(&req, &body, &res, ResponseBody::Buffered(&body));

        let ctx = FilterContext::new(&exchange, &resolver);
        assert!(!chain.evaluate(&ctx));
        assert!(ctx.is_route_resolved());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A new evaluation starts with a fresh context.
        assert!(!chain.is_filtered(&exchange, &resolver));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_short_circuit_skips_route_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CountingResolver { calls: calls.clone() };
        let chain = FilterChain::from_config(&FilterConfig::new());

        let (req, res) = parts(Method::GET, "/x", StatusCode::OK, Some("text/html"));
        let body = Bytes::new();
        let exchange = Exchange::new(&req, &body, &res, ResponseBody::Buffered(&body));

        let ctx = FilterContext::new(&exchange, &resolver);
        assert!(chain.evaluate(&ctx));
        assert!(!ctx.is_route_resolved());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shared_chain_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CountingResolver { calls: calls.clone() };
        let config = FilterConfig::new()
            .allowed_methods(["GET"])
            .excluded_route_name("health");
        let chain = Arc::new(FilterChain::from_config(&config));

        std::thread::scope(|scope| {
            for n in 0..8 {
                let chain = Arc::clone(&chain);
                let resolver = &resolver;
                scope.spawn(move || {
                    let method = if n % 2 == 0 { Method::GET } else { Method::POST };
                    let (req, res) = parts(method, "/x", StatusCode::OK, JSON);
                    let body = Bytes::new();
                    let exchange =
                        Exchange::new(&req, &body, &res, ResponseBody::Buffered(&body));
                    for _ in 0..100 {
                        assert_eq!(chain.is_filtered(&exchange, resolver), n % 2 == 1);
                    }
                });
            }
        });

        // One resolution per evaluation, none shared between threads.
        assert_eq!(calls.load(Ordering::SeqCst), 8 * 100);
    }

    struct DenyPath(&'static str);

    impl ExchangeFilter for DenyPath {
        fn name(&self) -> &'static str {
            "deny_path"
        }

        fn is_filtered(&self, ctx: &FilterContext<'_>) -> bool {
            ctx.exchange().path() == self.0
        }
    }

    #[test]
    fn test_custom_filter_appended() {
        let chain = FilterChain::from_config(&FilterConfig::new())
            .with_filter(Box::new(DenyPath("/api/users")));
        assert_eq!(chain.filter_names().last(), Some(&"deny_path"));

        let (req, res) = parts(Method::GET, "/api/users", StatusCode::OK, JSON);
        let body = Bytes::new();
        let exchange = Exchange::new(&req, &body, &res, ResponseBody::Buffered(&body));
        assert!(chain.is_filtered(&exchange, &routes()));
    }
}
