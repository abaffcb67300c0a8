use crate::{
    AppState, handlers,
    protection::{Protection, ProtectionRegistry, labels},
};
use axum::{
    Router,
    http::Method,
    routing::{delete, get, post},
};

/// Admin Router Module
///
/// The matrix administration surface. Every route defined here is wrapped by the
/// principal, resolver, and authorization layers in `create_router`; which permission
/// each operation demands is declared in `protection_bindings` below, not in the
/// handlers.
///
/// Keep `admin_routes` and `protection_bindings` in sync: bindings key on the route
/// patterns declared here, and an operation added without a binding passes through
/// with only a warning in the logs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // Roles: listing and row view fall under the /roles group binding (view);
        // mutations carry their own specific bindings.
        .route(
            "/roles",
            get(handlers::get_roles).post(handlers::create_role),
        )
        .route("/roles/{slug}", delete(handlers::delete_role))
        .route("/roles/{slug}/grants", get(handlers::get_role_grants))
        // Modules: bootstrap on create, cascade on delete.
        .route(
            "/modules",
            get(handlers::get_modules).post(handlers::create_module),
        )
        .route("/modules/{slug}", delete(handlers::delete_module))
        // Permissions: the rarely-changing action vocabulary.
        .route(
            "/permissions",
            get(handlers::get_permissions).post(handlers::create_permission),
        )
        .route("/permissions/{slug}", delete(handlers::delete_permission))
        // Grants: populate and clear individual matrix cells.
        .route("/grants", post(handlers::create_grant))
        .route(
            "/grants/{role}/{module}/{permission}",
            delete(handlers::revoke_grant),
        )
        // Dashboard counters.
        .route("/dashboard/stats", get(handlers::get_stats))
        // Identity echo. Explicitly Open in the bindings; authentication is still
        // enforced by the handler's AuthUser extractor.
        .route("/me", get(handlers::whoami))
}

/// protection_bindings
///
/// The static table declaring what each admin operation requires. Declared next to the
/// router so a reviewer sees routes and requirements side by side.
///
/// Granularity rules (resolved in `ProtectionRegistry::lookup`):
/// * group prefixes set a default for everything underneath them;
/// * specific (method, pattern) bindings override the group default;
/// * multi-label sets are any-of: POST /grants passes with either `create` or
///   `update` on the grant module.
pub fn protection_bindings() -> ProtectionRegistry {
    let mut registry = ProtectionRegistry::new();

    // Group defaults for the browse surfaces. These cover GET /roles and
    // GET /roles/{slug}/grants, and GET /dashboard/stats respectively.
    registry.bind_prefix("/roles", Protection::protected([labels::VIEW]));
    registry.bind_prefix("/dashboard", Protection::protected([labels::VIEW]));

    // Role mutations.
    registry.bind(
        Method::POST,
        "/roles",
        Protection::protected([labels::CREATE]),
    );
    registry.bind(
        Method::DELETE,
        "/roles/{slug}",
        Protection::protected([labels::DELETE]),
    );

    // Modules.
    registry.bind(
        Method::GET,
        "/modules",
        Protection::protected([labels::VIEW]),
    );
    registry.bind(
        Method::POST,
        "/modules",
        Protection::protected([labels::CREATE]),
    );
    registry.bind(
        Method::DELETE,
        "/modules/{slug}",
        Protection::protected([labels::DELETE]),
    );

    // Permissions.
    registry.bind(
        Method::GET,
        "/permissions",
        Protection::protected([labels::VIEW]),
    );
    registry.bind(
        Method::POST,
        "/permissions",
        Protection::protected([labels::CREATE]),
    );
    registry.bind(
        Method::DELETE,
        "/permissions/{slug}",
        Protection::protected([labels::DELETE]),
    );

    // Grants. Populating a cell is accepted under either label because the admin UI
    // treats the matrix editor as one update surface.
    registry.bind(
        Method::POST,
        "/grants",
        Protection::protected([labels::CREATE, labels::UPDATE]),
    );
    registry.bind(
        Method::DELETE,
        "/grants/{role}/{module}/{permission}",
        Protection::protected([labels::DELETE]),
    );

    // Identity echo: explicitly open, and visible as such in this table.
    registry.bind(Method::GET, "/me", Protection::Open);

    registry
}
