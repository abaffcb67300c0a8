use crate::{
    AppState,
    auth::AuthUser,
    config::AppConfig,
    matrix::{GrantOutcome, StoreError},
    models::{
        CreateModuleRequest, CreatePermissionRequest, CreateRoleRequest, CredentialsRequest,
        Grant, GrantRequest, MatrixStats, Module, Permission, Role,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

// --- Shared Input Normalization ---

/// normalized
///
/// Slugs double as path parameters and matrix keys, so blanks are rejected early and
/// case is folded to keep lookups consistent with the resolver's lowercasing.
fn normalized(name: &str, slug: &str) -> Result<(String, String), StatusCode> {
    let name = name.trim();
    let slug = slug.trim().to_lowercase();
    if name.is_empty() || slug.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok((name.to_string(), slug))
}

// --- Role Handlers ---

/// get_roles
///
/// [Matrix Route: role/view] Lists every role, ordered by slug.
#[utoipa::path(
    get,
    path = "/roles",
    responses((status = 200, description = "All roles", body = [Role]))
)]
pub async fn get_roles(State(state): State<AppState>) -> Json<Vec<Role>> {
    Json(state.matrix.get_roles().await)
}

/// create_role
///
/// [Matrix Route: role/create] Defines a new role. Name and slug must both be unique;
/// collisions surface as 409 so the admin UI can report them precisely.
#[utoipa::path(
    post,
    path = "/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Created", body = Role),
        (status = 409, description = "Name or slug already taken"),
        (status = 422, description = "Blank name or slug")
    )
)]
pub async fn create_role(
    State(state): State<AppState>,
    Json(payload): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), StatusCode> {
    let (name, slug) = normalized(&payload.name, &payload.slug)?;
    match state.matrix.create_role(&name, &slug).await {
        Ok(role) => Ok((StatusCode::CREATED, Json(role))),
        Err(StoreError::Duplicate) => Err(StatusCode::CONFLICT),
        Err(e) => {
            tracing::error!("create_role failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// delete_role
///
/// [Matrix Route: role/delete] Removes a role by slug. Every grant held by the role
/// disappears with it in the same statement (cascade), so no request authorized under
/// the deleted role can succeed afterwards.
#[utoipa::path(
    delete,
    path = "/roles/{slug}",
    params(("slug" = String, Path, description = "Role slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown role")
    )
)]
pub async fn delete_role(State(state): State<AppState>, Path(slug): Path<String>) -> StatusCode {
    match state.matrix.delete_role(&slug).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!("delete_role failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// get_role_grants
///
/// [Matrix Route: role/view] Lists the full matrix row for one role. An unknown slug
/// yields an empty list rather than 404; the admin UI treats both the same way.
#[utoipa::path(
    get,
    path = "/roles/{slug}/grants",
    params(("slug" = String, Path, description = "Role slug")),
    responses((status = 200, description = "Grants held by the role", body = [Grant]))
)]
pub async fn get_role_grants(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Json<Vec<Grant>> {
    Json(state.matrix.get_grants_for_role(&slug).await)
}

// --- Module Handlers ---

/// get_modules
///
/// [Matrix Route: module/view] Lists every registered module, ordered by slug.
#[utoipa::path(
    get,
    path = "/modules",
    responses((status = 200, description = "All modules", body = [Module]))
)]
pub async fn get_modules(State(state): State<AppState>) -> Json<Vec<Module>> {
    Json(state.matrix.get_modules().await)
}

/// create_module
///
/// [Matrix Route: module/create] Bootstraps a new module: the module record and the
/// auto-grant of every current permission to the configured bootstrap role commit in
/// one transaction. The bootstrap role can therefore administer a new module the
/// moment it exists, without a follow-up grant call.
#[utoipa::path(
    post,
    path = "/modules",
    request_body = CreateModuleRequest,
    responses(
        (status = 201, description = "Created", body = Module),
        (status = 409, description = "Name or slug already taken"),
        (status = 422, description = "Blank name or slug")
    )
)]
pub async fn create_module(
    State(state): State<AppState>,
    Json(payload): Json<CreateModuleRequest>,
) -> Result<(StatusCode, Json<Module>), StatusCode> {
    let (name, slug) = normalized(&payload.name, &payload.slug)?;
    match state
        .matrix
        .bootstrap_module(&name, &slug, &state.config.bootstrap_role)
        .await
    {
        Ok(module) => Ok((StatusCode::CREATED, Json(module))),
        Err(StoreError::Duplicate) => Err(StatusCode::CONFLICT),
        Err(e) => {
            tracing::error!("create_module failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// delete_module
///
/// [Matrix Route: module/delete] Removes a module and cascades its grants.
#[utoipa::path(
    delete,
    path = "/modules/{slug}",
    params(("slug" = String, Path, description = "Module slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown module")
    )
)]
pub async fn delete_module(State(state): State<AppState>, Path(slug): Path<String>) -> StatusCode {
    match state.matrix.delete_module(&slug).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!("delete_module failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// --- Permission Handlers ---

/// get_permissions
///
/// [Matrix Route: permission/view] Lists the action vocabulary, ordered by slug.
#[utoipa::path(
    get,
    path = "/permissions",
    responses((status = 200, description = "All permissions", body = [Permission]))
)]
pub async fn get_permissions(State(state): State<AppState>) -> Json<Vec<Permission>> {
    Json(state.matrix.get_permissions().await)
}

/// create_permission
///
/// [Matrix Route: permission/create] Registers a new action kind. Existing modules and
/// roles are untouched; nobody is granted the new permission until an explicit grant.
#[utoipa::path(
    post,
    path = "/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Created", body = Permission),
        (status = 409, description = "Name or slug already taken"),
        (status = 422, description = "Blank name or slug")
    )
)]
pub async fn create_permission(
    State(state): State<AppState>,
    Json(payload): Json<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<Permission>), StatusCode> {
    let (name, slug) = normalized(&payload.name, &payload.slug)?;
    match state.matrix.create_permission(&name, &slug).await {
        Ok(permission) => Ok((StatusCode::CREATED, Json(permission))),
        Err(StoreError::Duplicate) => Err(StatusCode::CONFLICT),
        Err(e) => {
            tracing::error!("create_permission failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// delete_permission
///
/// [Matrix Route: permission/delete] Removes a permission and cascades its grants.
#[utoipa::path(
    delete,
    path = "/permissions/{slug}",
    params(("slug" = String, Path, description = "Permission slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown permission")
    )
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> StatusCode {
    match state.matrix.delete_permission(&slug).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!("delete_permission failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// --- Grant Handlers ---

/// create_grant
///
/// [Matrix Route: grant/create+update] Populates one matrix cell.
///
/// *Idempotency*: repeating an existing triple is not an error; the handler answers
/// 200 instead of 201 so callers can tell whether anything changed. Unknown dimension
/// slugs answer 404 without touching the matrix.
#[utoipa::path(
    post,
    path = "/grants",
    request_body = GrantRequest,
    responses(
        (status = 201, description = "Grant created"),
        (status = 200, description = "Grant already existed"),
        (status = 404, description = "Unknown role, module, or permission")
    )
)]
pub async fn create_grant(
    State(state): State<AppState>,
    Json(payload): Json<GrantRequest>,
) -> Result<StatusCode, StatusCode> {
    match state
        .matrix
        .grant(&payload.role, &payload.module, &payload.permission)
        .await
    {
        Ok(GrantOutcome::Created) => Ok(StatusCode::CREATED),
        Ok(GrantOutcome::Existed) => Ok(StatusCode::OK),
        Ok(GrantOutcome::UnknownDimension) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("create_grant failed: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// revoke_grant
///
/// [Matrix Route: grant/delete] Clears one matrix cell addressed by its three slugs.
/// Takes effect on the next authorization decision; no caching layer sits in between.
#[utoipa::path(
    delete,
    path = "/grants/{role}/{module}/{permission}",
    params(
        ("role" = String, Path, description = "Role slug"),
        ("module" = String, Path, description = "Module slug"),
        ("permission" = String, Path, description = "Permission slug")
    ),
    responses(
        (status = 204, description = "Revoked"),
        (status = 404, description = "No such grant")
    )
)]
pub async fn revoke_grant(
    State(state): State<AppState>,
    Path((role, module, permission)): Path<(String, String, String)>,
) -> StatusCode {
    match state.matrix.revoke(&role, &module, &permission).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::error!("revoke_grant failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// --- Dashboard Handlers ---

/// get_stats
///
/// [Matrix Route: dashboard/view] Retrieves matrix-wide counters for the dashboard.
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    responses((status = 200, description = "Stats", body = MatrixStats))
)]
pub async fn get_stats(State(state): State<AppState>) -> Json<MatrixStats> {
    Json(state.matrix.get_stats().await)
}

// --- Identity Handlers ---

/// whoami
///
/// [Open Route] Echoes the caller's resolved identity. The operation is bound as
/// `Protection::Open`, so no grant is consulted, but the `AuthUser` extractor still
/// demands a principal; anonymous callers get 401 from the extractor itself.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Resolved principal", body = AuthUser),
        (status = 401, description = "No credentials presented")
    )
)]
pub async fn whoami(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}

/// login
///
/// [Exempt Route] Proxies a login attempt to the external identity provider and
/// forwards its verdict verbatim. Mounted outside the authorization layers; by
/// construction no permission check can ever run for it.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Identity provider accepted the credentials"),
        (status = 502, description = "Identity provider unreachable")
    )
)]
pub async fn login(
    State(config): State<AppConfig>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    proxy_identity(&config, "login", &payload).await
}

/// signup
///
/// [Exempt Route] Proxies account creation to the external identity provider.
/// Role assignment for new accounts happens at the provider; this service only ever
/// reads the role back out of issued tokens.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Account created at the identity provider"),
        (status = 502, description = "Identity provider unreachable")
    )
)]
pub async fn signup(
    State(config): State<AppConfig>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    proxy_identity(&config, "signup", &payload).await
}

/// proxy_identity
///
/// Shared plumbing for the identity proxies. The upstream status code is forwarded
/// via u16 conversion; a transport failure (upstream down, DNS, timeout) maps to 502.
async fn proxy_identity(
    config: &AppConfig,
    operation: &str,
    payload: &CredentialsRequest,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let client = reqwest::Client::new();
    let url = format!("{}/auth/v1/{}", config.auth_upstream, operation);

    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(&serde_json::json!({ "email": payload.email, "password": payload.password }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!("identity upstream unreachable: {e}");
            StatusCode::BAD_GATEWAY
        })?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = response
        .json::<serde_json::Value>()
        .await
        .unwrap_or_else(|_| serde_json::json!({}));
    Ok((status, Json(body)))
}
