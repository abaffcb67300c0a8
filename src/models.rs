use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Matrix Schemas (Mapped to Database) ---

/// Role
///
/// Represents an access role record from the `public.roles` table. Roles are the
/// "who" dimension of the permission matrix; every authenticated principal carries
/// exactly one role slug resolved by the identity layer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Role {
    pub id: Uuid,
    // Human-readable label shown in the admin UI (e.g. "Store Manager").
    pub name: String,
    // Stable machine identifier used in grants and JWT claims (e.g. "store-manager").
    pub slug: String,
}

/// Module
///
/// Represents a protected functional area from the `public.modules` table. Modules are
/// the "where" dimension of the permission matrix; incoming request paths are resolved
/// to a module slug before any permission check runs.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Module {
    pub id: Uuid,
    pub name: String,
    // Matched against the slug produced by the request path resolver.
    pub slug: String,
}

/// Permission
///
/// Represents an action kind from the `public.permissions` table. Permissions are the
/// "what" dimension of the matrix; the set is small and rarely changes (create, view,
/// update, delete by default).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Grant
///
/// A single cell of the permission matrix: one (role, module, permission) association,
/// enriched with the dimension slugs via JOINs so API consumers never deal in raw IDs.
/// The underlying `role_module_permissions` row enforces uniqueness of the triple.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Grant {
    pub id: Uuid,
    pub role_slug: String,
    pub module_slug: String,
    pub permission_slug: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// --- Request Payloads (Input Schemas) ---

/// CreateRoleRequest
///
/// Input payload for defining a new role (POST /roles). The slug must be unique and is
/// normalized to lowercase before insertion.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateRoleRequest {
    pub name: String,
    pub slug: String,
}

/// CreateModuleRequest
///
/// Input payload for bootstrapping a new module (POST /modules).
/// Creating a module through this endpoint also auto-grants every existing permission
/// on it to the configured bootstrap role, in one transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateModuleRequest {
    pub name: String,
    pub slug: String,
}

/// CreatePermissionRequest
///
/// Input payload for registering a new permission kind (POST /permissions).
/// Note: permissions added after a module was bootstrapped are *not* retroactively
/// granted to anyone.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub slug: String,
}

/// GrantRequest
///
/// Input payload for adding a matrix cell (POST /grants). All three fields are dimension
/// slugs; the store resolves them to IDs and rejects unknown ones with 404.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct GrantRequest {
    pub role: String,
    pub module: String,
    pub permission: String,
}

/// CredentialsRequest
///
/// Input payload for the login and signup proxy endpoints (POST /auth/login, /auth/signup).
/// Note: The password is only passed through to the external identity provider and never
/// persisted or logged internally by this application.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// --- Dashboard Schemas (Output) ---

/// MatrixStats
///
/// Output schema for the administrative statistics dashboard (GET /dashboard/stats).
/// Counts every dimension plus the number of populated matrix cells.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MatrixStats {
    pub total_roles: i64,
    pub total_modules: i64,
    pub total_permissions: i64,
    /// The number of populated (role, module, permission) cells.
    pub total_grants: i64,
}
