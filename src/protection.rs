use axum::http::Method;
use std::collections::HashMap;

/// Well-known permission slugs. These mirror the default rows seeded into the
/// `permissions` table; bindings and seed data share this vocabulary.
pub mod labels {
    pub const CREATE: &str = "create";
    pub const VIEW: &str = "view";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
}

/// Protection
///
/// The declared authorization requirement of one operation. `Open` is an explicit,
/// reviewable statement that no permission check applies; it is not the same thing as
/// an operation that was simply never bound (the registry reports those as `None` so
/// the decision point can log the gap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protection {
    /// No permission check. Authentication may still be enforced by the handler.
    Open,
    /// The caller's role must hold at least one of these permission labels on the
    /// request's resolved module.
    Protected(Vec<String>),
}

impl Protection {
    /// protected
    ///
    /// Convenience constructor so bindings read as `Protection::protected([labels::VIEW])`.
    pub fn protected<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Protection::Protected(required.into_iter().map(Into::into).collect())
    }
}

/// ProtectionRegistry
///
/// A static table binding operations to their `Protection`, populated once at router
/// construction and immutable afterwards. Two binding granularities exist:
///
/// * **Specific**: an exact (HTTP method, route pattern) pair, e.g. `POST /roles`.
/// * **Group**: a route-pattern prefix covering every operation underneath it,
///   e.g. `/roles` covering `GET /roles` and `GET /roles/{slug}/grants`.
///
/// Lookup precedence is specific first, then the **longest** matching group prefix,
/// so a group default can be carved out per operation without ambiguity.
pub struct ProtectionRegistry {
    operations: HashMap<(Method, String), Protection>,
    groups: Vec<(String, Protection)>,
}

impl ProtectionRegistry {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
            groups: Vec::new(),
        }
    }

    /// bind
    ///
    /// Declares the protection of one exact operation. `path` must be the axum route
    /// pattern (including `{param}` placeholders), because lookups key on the matched
    /// pattern rather than the raw request path.
    pub fn bind(&mut self, method: Method, path: &str, protection: Protection) {
        self.operations
            .insert((method, path.to_string()), protection);
    }

    /// bind_prefix
    ///
    /// Declares a group default for every operation whose route pattern lives under
    /// `prefix`. Matching is whole-segment: the prefix `/roles` covers `/roles` and
    /// `/roles/{slug}` but not `/roles-archive`.
    pub fn bind_prefix(&mut self, prefix: &str, protection: Protection) {
        self.groups.push((prefix.to_string(), protection));
    }

    /// lookup
    ///
    /// Resolves the protection for an operation. Returns `None` when neither a specific
    /// binding nor any group prefix covers it; the decision point treats that as
    /// pass-through but logs it, since an unbound admin operation is usually a missed
    /// registration rather than an intentional hole.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<Protection> {
        if let Some(protection) = self.operations.get(&(method.clone(), path.to_string())) {
            return Some(protection.clone());
        }
        self.groups
            .iter()
            .filter(|(prefix, _)| Self::prefix_covers(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, protection)| protection.clone())
    }

    fn prefix_covers(prefix: &str, path: &str) -> bool {
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl Default for ProtectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
