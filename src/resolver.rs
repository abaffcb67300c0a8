use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;

/// The module slug assigned to requests whose path carries no segments at all
/// (i.e. "/"). Granting against it is possible but no seed route ever uses it.
pub const UNCLASSIFIED: &str = "unclassified";

/// Identity endpoints. Requests under these paths must never reach an authorization
/// decision, so the resolver tags them instead of guessing a module.
pub const EXEMPT_PATHS: &[&str] = &["/auth/login", "/auth/signup"];

/// Default mapping from URL path segments to module slugs. URL segments are plural
/// (REST collections), module slugs are singular (matrix dimension). Any segment not
/// listed here falls back to the lowercased first segment of the path.
pub const DEFAULT_SEGMENT_MAP: &[(&str, &str)] = &[
    ("roles", "role"),
    ("modules", "module"),
    ("permissions", "permission"),
    ("grants", "grant"),
    ("dashboard", "dashboard"),
    ("categories", "category"),
    ("products", "product"),
    ("blogs", "blog"),
    ("pages", "page"),
    ("orders", "order"),
    ("customers", "customer"),
    ("coupons", "coupon"),
    ("uploads", "upload"),
    ("pricing", "pricing"),
    ("terms-conditions", "terms-conditions"),
];

/// RouteClass
///
/// The resolver's verdict for one request path, attached to the request extensions so
/// the downstream authorization middleware never re-derives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteClass {
    /// The request belongs to the named module and is subject to the permission check.
    Module(String),
    /// Identity traffic. The authorization decision point must pass it through untouched.
    Exempt,
}

/// ModuleResolver
///
/// Classifies request paths into module slugs using an immutable segment map injected
/// at construction time. Resolution is deterministic: segments are scanned left to
/// right and the **first** mapped segment wins, so "/categories/{id}/products" always
/// resolves to "category" regardless of map declaration order.
///
/// The resolver holds no mutable state and is shared behind an Arc; routing behaviour
/// cannot drift at runtime.
pub struct ModuleResolver {
    // Lowercased URL segment -> module slug.
    segments: HashMap<String, String>,
    // Path prefixes excluded from classification (identity endpoints).
    exempt: Vec<String>,
}

impl ModuleResolver {
    /// new
    ///
    /// Builds a resolver from explicit tables. Used directly by tests that need a
    /// custom topology; production wiring goes through `with_defaults`.
    pub fn new(segments: &[(&str, &str)], exempt: &[&str]) -> Self {
        Self {
            segments: segments
                .iter()
                .map(|(segment, slug)| (segment.to_string(), slug.to_string()))
                .collect(),
            exempt: exempt.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// with_defaults
    ///
    /// The standard storefront topology: every seeded module's URL segment plus the
    /// identity exemptions.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SEGMENT_MAP, EXEMPT_PATHS)
    }

    /// classify
    ///
    /// Resolution algorithm, in order:
    /// 1. Exempt prefixes short-circuit to `RouteClass::Exempt`.
    /// 2. Path segments are scanned left to right; the first segment found in the map
    ///    (compared case-insensitively) names the module.
    /// 3. No mapped segment: the lowercased first segment itself is taken as the module
    ///    slug, which lets path layouts and module slugs coincide without registration.
    /// 4. A bare "/" has no segments and classifies as the `UNCLASSIFIED` sentinel.
    ///
    /// The function never fails; every path gets a class.
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.is_exempt(path) {
            return RouteClass::Exempt;
        }

        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let Some(first) = parts.first() else {
            return RouteClass::Module(UNCLASSIFIED.to_string());
        };

        for part in &parts {
            let lowered = part.to_lowercase();
            if let Some(slug) = self.segments.get(&lowered) {
                return RouteClass::Module(slug.clone());
            }
        }

        RouteClass::Module(first.to_lowercase())
    }

    // Exemption requires a whole-segment prefix match so "/auth/login2" is not exempt
    // while "/auth/login" and "/auth/login/refresh" are.
    fn is_exempt(&self, path: &str) -> bool {
        self.exempt.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// resolve_module
///
/// Middleware stage that classifies the raw request path and attaches the resulting
/// `RouteClass` to the request extensions. It makes no decision itself; allowing or
/// denying is entirely the authorization middleware's job further down the stack.
pub async fn resolve_module(
    State(resolver): State<Arc<ModuleResolver>>,
    mut request: Request,
    next: Next,
) -> Response {
    let class = resolver.classify(request.uri().path());
    tracing::debug!(path = request.uri().path(), class = ?class, "request classified");
    request.extensions_mut().insert(class);
    next.run(request).await
}
