use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod guard;
pub mod handlers;
pub mod matrix;
pub mod models;
pub mod protection;
pub mod resolver;

// Module for routing segregation (Public vs. Protected Admin).
pub mod routes;
use routes::{admin, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry point (main.rs)
// and the integration tests.
pub use config::AppConfig;
pub use matrix::{MatrixState, MemoryMatrix, PostgresMatrix};
pub use protection::{Protection, ProtectionRegistry};
pub use resolver::ModuleResolver;

/// ApiDoc
///
/// This struct auto-generates the OpenAPI documentation (Swagger JSON) for the application.
/// It aggregates all API paths and data schemas that have been decorated with
/// the `#[utoipa::path]` and `#[derive(utoipa::ToSchema)]` macros.
/// The resulting JSON is served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    // List all public handler functions here for documentation generation.
    paths(
        handlers::get_roles, handlers::create_role, handlers::delete_role,
        handlers::get_role_grants, handlers::get_modules, handlers::create_module,
        handlers::delete_module, handlers::get_permissions, handlers::create_permission,
        handlers::delete_permission, handlers::create_grant, handlers::revoke_grant,
        handlers::get_stats, handlers::whoami, handlers::login, handlers::signup
    ),
    // List all models (schemas) used in the request/response bodies.
    components(
        schemas(
            models::Role, models::Module, models::Permission, models::Grant,
            models::MatrixStats, models::CreateRoleRequest, models::CreateModuleRequest,
            models::CreatePermissionRequest, models::GrantRequest,
            models::CredentialsRequest, auth::AuthUser,
        )
    ),
    tags(
        (name = "storefront-admin", description = "Storefront Admin Authorization API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Implements the **Unified State Pattern**. This is the single, thread-safe, and
/// immutable container holding all essential application services and configuration.
/// The routing topology (resolver) and the operation requirements (registry) are
/// built once and shared read-only; nothing in the request path can mutate them.
#[derive(Clone)]
pub struct AppState {
    /// Matrix Layer: abstracts grant storage and the decision-point query.
    pub matrix: MatrixState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Path classification topology, injected rather than global.
    pub resolver: Arc<ModuleResolver>,
    /// The static operation-to-protection binding table.
    pub registry: Arc<ProtectionRegistry>,
}

impl AppState {
    /// new
    ///
    /// Standard wiring: the default storefront resolver topology plus the binding
    /// table declared next to the admin router. Tests that need a custom topology
    /// build the struct literally instead.
    pub fn new(matrix: MatrixState, config: AppConfig) -> Self {
        Self {
            matrix,
            config,
            resolver: Arc::new(ModuleResolver::with_defaults()),
            registry: Arc::new(admin::protection_bindings()),
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// These implementations allow handlers and middleware to selectively pull components
// from the shared AppState, keeping each function's dependencies explicit.

impl FromRef<AppState> for MatrixState {
    fn from_ref(app_state: &AppState) -> MatrixState {
        app_state.matrix.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for Arc<ModuleResolver> {
    fn from_ref(app_state: &AppState) -> Arc<ModuleResolver> {
        app_state.resolver.clone()
    }
}

impl FromRef<AppState> for Arc<ProtectionRegistry> {
    fn from_ref(app_state: &AppState) -> Arc<ProtectionRegistry> {
        app_state.registry.clone()
    }
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global and scoped
/// middleware, and registers the application state.
///
/// The admin surface is wrapped in three `route_layer`s. Axum runs the layer added
/// **last** first, so the runtime order is:
///   attach_principal -> resolve_module -> authorize -> handler
/// The public routes are merged without these layers; their exemption from
/// authorization is a property of the router shape, not of any runtime check.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: health probe and identity proxies, no authorization layers.
        .merge(public::public_routes())
        // Protected Admin Routes: the full principal/resolver/decision pipeline.
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    guard::authorize,
                ))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    resolver::resolve_module,
                ))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::attach_principal,
                )),
        )
        // Apply the Unified State to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers (Applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a unique UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: wraps the request/response lifecycle in a span
                // carrying the request ID, so every allow/deny log line is correlated.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: returns the generated x-request-id header
                // to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer (Applied last, allowing all traffic in/out after processing)
        .layer(cors)
}

/// trace_span_logger
///
/// Helper function used by `TraceLayer` to customize the tracing span creation.
/// It extracts the `x-request-id` header (if present) and includes it in the
/// structured logging metadata alongside the HTTP method and URI.
///
/// *Goal*: Ensure every log line for a single request, including the authorization
/// verdict, is correlated by a unique ID.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    // The structured log format used by the tracing macros.
    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
