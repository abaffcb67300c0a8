use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use storefront_admin::{
    AppState,
    auth::AuthUser,
    config::AppConfig,
    handlers,
    matrix::{MatrixState, MatrixStore, MemoryMatrix},
    models::{
        CreateModuleRequest, CreatePermissionRequest, CreateRoleRequest, GrantRequest,
    },
};
use tokio::test;
use uuid::Uuid;

// --- TEST UTILITIES ---

const TEST_ADMIN_ID: Uuid = Uuid::from_u128(456);

// Handlers only touch the matrix and the config; the default resolver and registry
// that AppState::new wires in are inert for direct handler calls.
fn create_test_state(mem: &Arc<MemoryMatrix>) -> AppState {
    let matrix: MatrixState = mem.clone();
    AppState::new(matrix, AppConfig::default())
}

fn admin_user() -> AuthUser {
    AuthUser {
        id: TEST_ADMIN_ID,
        role: "admin".to_string(),
    }
}

fn role_payload(name: &str, slug: &str) -> Json<CreateRoleRequest> {
    Json(CreateRoleRequest {
        name: name.to_string(),
        slug: slug.to_string(),
    })
}

fn grant_payload(role: &str, module: &str, permission: &str) -> Json<GrantRequest> {
    Json(GrantRequest {
        role: role.to_string(),
        module: module.to_string(),
        permission: permission.to_string(),
    })
}

// --- ROLE HANDLER TESTS ---

#[test]
async fn test_create_role_returns_created_with_the_stored_row() {
    let mem = Arc::new(MemoryMatrix::new());
    let state = create_test_state(&mem);

    let result = handlers::create_role(State(state), role_payload("Support", "support")).await;

    assert!(result.is_ok());
    let (status, Json(role)) = result.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(role.name, "Support");
    assert_eq!(role.slug, "support");
    assert_eq!(mem.get_roles().await.len(), 1);
}

#[test]
async fn test_create_role_normalizes_case_and_whitespace() {
    let mem = Arc::new(MemoryMatrix::new());
    let state = create_test_state(&mem);

    let result =
        handlers::create_role(State(state), role_payload("  Store Manager  ", " MANAGER ")).await;

    let (_, Json(role)) = result.unwrap();
    // The stored slug is what grants and JWT claims will reference, so folding happens
    // on the way in, not at query time.
    assert_eq!(role.name, "Store Manager");
    assert_eq!(role.slug, "manager");
}

#[test]
async fn test_create_role_duplicate_slug_conflict() {
    let mem = Arc::new(MemoryMatrix::new());
    mem.create_role("Support", "support").await.unwrap();
    let state = create_test_state(&mem);

    let result = handlers::create_role(State(state), role_payload("Support Two", "support")).await;

    assert!(result.is_err());
    assert_eq!(result.unwrap_err(), StatusCode::CONFLICT);
}

#[test]
async fn test_create_role_blank_slug_unprocessable() {
    let mem = Arc::new(MemoryMatrix::new());
    let state = create_test_state(&mem);

    let result = handlers::create_role(State(state), role_payload("Support", "   ")).await;

    assert!(result.is_err());
    assert_eq!(result.unwrap_err(), StatusCode::UNPROCESSABLE_ENTITY);
    // Nothing was written.
    assert!(mem.get_roles().await.is_empty());
}

#[test]
async fn test_delete_role_no_content_then_not_found() {
    let mem = Arc::new(MemoryMatrix::new());
    mem.create_role("Support", "support").await.unwrap();
    let state = create_test_state(&mem);

    let first = handlers::delete_role(State(state.clone()), Path("support".to_string())).await;
    let second = handlers::delete_role(State(state), Path("support".to_string())).await;

    assert_eq!(first, StatusCode::NO_CONTENT);
    assert_eq!(second, StatusCode::NOT_FOUND);
}

#[test]
async fn test_get_role_grants_unknown_role_is_an_empty_list() {
    let mem = Arc::new(MemoryMatrix::new());
    let state = create_test_state(&mem);

    let Json(grants) =
        handlers::get_role_grants(State(state), Path("ghost".to_string())).await;

    assert!(grants.is_empty());
}

// --- MODULE HANDLER TESTS ---

#[test]
async fn test_create_module_auto_grants_to_the_bootstrap_role() {
    let mem = Arc::new(MemoryMatrix::new());
    // AppConfig::default() sets bootstrap_role = "admin".
    mem.create_role("Admin", "admin").await.unwrap();
    mem.create_permission("Create", "create").await.unwrap();
    mem.create_permission("View", "view").await.unwrap();
    let state = create_test_state(&mem);

    let result = handlers::create_module(
        State(state),
        Json(CreateModuleRequest {
            name: "Reviews".to_string(),
            slug: "review".to_string(),
        }),
    )
    .await;

    let (status, Json(module)) = result.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(module.slug, "review");

    // One auto-granted cell per currently registered permission.
    let grants = mem.get_grants_for_role("admin").await;
    assert_eq!(grants.len(), 2);
    assert!(grants.iter().all(|g| g.module_slug == "review"));
}

#[test]
async fn test_create_module_duplicate_conflict() {
    let mem = Arc::new(MemoryMatrix::new());
    mem.bootstrap_module("Reviews", "review", "admin").await.unwrap();
    let state = create_test_state(&mem);

    let result = handlers::create_module(
        State(state),
        Json(CreateModuleRequest {
            name: "Reviews".to_string(),
            slug: "review".to_string(),
        }),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(result.unwrap_err(), StatusCode::CONFLICT);
}

// --- PERMISSION HANDLER TESTS ---

#[test]
async fn test_create_permission_is_not_retroactive() {
    let mem = Arc::new(MemoryMatrix::new());
    mem.create_role("Admin", "admin").await.unwrap();
    mem.bootstrap_module("Reviews", "review", "admin").await.unwrap();
    let state = create_test_state(&mem);

    let result = handlers::create_permission(
        State(state),
        Json(CreatePermissionRequest {
            name: "Publish".to_string(),
            slug: "publish".to_string(),
        }),
    )
    .await;

    let (status, Json(permission)) = result.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(permission.slug, "publish");
    // The module existed before the permission; nobody holds publish until an
    // explicit grant.
    assert!(mem.get_grants_for_role("admin").await.is_empty());
}

// --- GRANT HANDLER TESTS ---

#[test]
async fn test_create_grant_reports_created_then_existed() {
    let mem = Arc::new(MemoryMatrix::new());
    mem.create_role("Support", "support").await.unwrap();
    mem.bootstrap_module("Reviews", "review", "nobody").await.unwrap();
    mem.create_permission("View", "view").await.unwrap();
    let state = create_test_state(&mem);

    let first = handlers::create_grant(
        State(state.clone()),
        grant_payload("support", "review", "view"),
    )
    .await;
    let second =
        handlers::create_grant(State(state), grant_payload("support", "review", "view")).await;

    // 201 for the fresh cell, 200 for the idempotent repeat; neither is an error.
    assert_eq!(first.unwrap(), StatusCode::CREATED);
    assert_eq!(second.unwrap(), StatusCode::OK);
    assert_eq!(mem.get_grants_for_role("support").await.len(), 1);
}

#[test]
async fn test_create_grant_unknown_dimension_not_found() {
    let mem = Arc::new(MemoryMatrix::new());
    mem.create_role("Support", "support").await.unwrap();
    let state = create_test_state(&mem);

    let result =
        handlers::create_grant(State(state), grant_payload("support", "review", "view")).await;

    assert!(result.is_err());
    assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_revoke_grant_no_content_then_not_found() {
    let mem = Arc::new(MemoryMatrix::new());
    mem.create_role("Support", "support").await.unwrap();
    mem.bootstrap_module("Reviews", "review", "nobody").await.unwrap();
    mem.create_permission("View", "view").await.unwrap();
    mem.grant("support", "review", "view").await.unwrap();
    let state = create_test_state(&mem);

    let triple = Path((
        "support".to_string(),
        "review".to_string(),
        "view".to_string(),
    ));
    let first = handlers::revoke_grant(State(state.clone()), triple).await;
    let second = handlers::revoke_grant(
        State(state),
        Path((
            "support".to_string(),
            "review".to_string(),
            "view".to_string(),
        )),
    )
    .await;

    assert_eq!(first, StatusCode::NO_CONTENT);
    assert_eq!(second, StatusCode::NOT_FOUND);
}

// --- DASHBOARD HANDLER TESTS ---

#[test]
async fn test_get_stats_counts_every_dimension_and_cell() {
    let mem = Arc::new(MemoryMatrix::new());
    mem.create_role("Admin", "admin").await.unwrap();
    mem.create_permission("Create", "create").await.unwrap();
    mem.create_permission("View", "view").await.unwrap();
    // Bootstrap auto-grants both permissions on the new module to admin.
    mem.bootstrap_module("Reviews", "review", "admin").await.unwrap();
    let state = create_test_state(&mem);

    let Json(stats) = handlers::get_stats(State(state)).await;

    assert_eq!(stats.total_roles, 1);
    assert_eq!(stats.total_modules, 1);
    assert_eq!(stats.total_permissions, 2);
    assert_eq!(stats.total_grants, 2);
}

// --- IDENTITY HANDLER TESTS ---

#[test]
async fn test_whoami_echoes_the_attached_principal() {
    let Json(user) = handlers::whoami(admin_user()).await;

    assert_eq!(user.id, TEST_ADMIN_ID);
    assert_eq!(user.role, "admin");
}
