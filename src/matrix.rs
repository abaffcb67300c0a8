use crate::models::{Grant, MatrixStats, Module, Permission, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use thiserror::Error;
use uuid::Uuid;

/// StoreError
///
/// Failure modes surfaced by the matrix store. Unique-constraint violations are folded
/// into `Duplicate` so handlers can map them to 409 without inspecting driver errors;
/// everything else stays a `Database` error and becomes a generic 500 upstream.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a record with that name or slug already exists")]
    Duplicate,
    #[error("matrix store unavailable")]
    Unavailable,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Database(e),
        }
    }
}

/// GrantOutcome
///
/// Result of a grant attempt. The insert itself is idempotent (`ON CONFLICT DO NOTHING`),
/// so the caller needs a three-way answer rather than a bare bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// A new matrix cell was inserted.
    Created,
    /// The exact (role, module, permission) triple was already present; nothing changed.
    Existed,
    /// At least one of the referenced slugs does not exist.
    UnknownDimension,
}

/// MatrixStore Trait
///
/// Defines the abstract contract for all permission-matrix persistence. This is the core
/// of the Repository Abstraction pattern, allowing the handlers and the authorization
/// middleware to interact with the matrix without knowing the concrete backend
/// (Postgres in deployments, the in-memory store in tests).
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn MatrixStore>`) safely shareable and usable across Axum's asynchronous
/// task boundaries.
#[async_trait]
pub trait MatrixStore: Send + Sync {
    // --- Roles ---
    async fn get_roles(&self) -> Vec<Role>;
    async fn create_role(&self, name: &str, slug: &str) -> Result<Role, StoreError>;
    // Deleting a role cascades: every grant referencing it is removed atomically.
    async fn delete_role(&self, slug: &str) -> Result<bool, StoreError>;
    // Lists all matrix cells held by one role, enriched with dimension slugs.
    async fn get_grants_for_role(&self, slug: &str) -> Vec<Grant>;

    // --- Modules ---
    async fn get_modules(&self) -> Vec<Module>;
    /// Creates a module and, in the same transaction, grants every currently known
    /// permission on it to the bootstrap role. Either both effects land or neither does.
    async fn bootstrap_module(
        &self,
        name: &str,
        slug: &str,
        bootstrap_role: &str,
    ) -> Result<Module, StoreError>;
    async fn delete_module(&self, slug: &str) -> Result<bool, StoreError>;

    // --- Permissions ---
    async fn get_permissions(&self) -> Vec<Permission>;
    // Permissions registered after a module was bootstrapped are NOT retroactively granted.
    async fn create_permission(&self, name: &str, slug: &str) -> Result<Permission, StoreError>;
    async fn delete_permission(&self, slug: &str) -> Result<bool, StoreError>;

    // --- Grants ---
    // Idempotent insert: repeating an existing triple reports Existed, never an error.
    async fn grant(
        &self,
        role: &str,
        module: &str,
        permission: &str,
    ) -> Result<GrantOutcome, StoreError>;
    async fn revoke(
        &self,
        role: &str,
        module: &str,
        permission: &str,
    ) -> Result<bool, StoreError>;

    /// The decision-point query: every grant held by `role` on `module` whose permission
    /// slug is in `permissions`. Exactly one consistent read per authorization decision.
    async fn query_matches(
        &self,
        role: &str,
        module: &str,
        permissions: &[String],
    ) -> Result<Vec<Grant>, StoreError>;

    // --- Dashboard ---
    async fn get_stats(&self) -> MatrixStats;
}

/// MatrixState
///
/// The concrete type used to share the matrix store access across the application state.
pub type MatrixState = Arc<dyn MatrixStore>;

// --- Startup Seeding ---

/// The action vocabulary every deployment starts with. Deliberately small; new kinds
/// are added through the API, not by code changes.
pub const DEFAULT_PERMISSIONS: &[(&str, &str)] = &[
    ("Create", "create"),
    ("View", "view"),
    ("Update", "update"),
    ("Delete", "delete"),
];

/// The storefront's functional areas, registered at startup so the matrix admin screens
/// have something to grant against on a fresh database. Slugs are singular because the
/// request path resolver normalizes plural URL segments down to these.
pub const SEED_MODULES: &[(&str, &str)] = &[
    ("Dashboard", "dashboard"),
    ("Roles", "role"),
    ("Modules", "module"),
    ("Permissions", "permission"),
    ("Grants", "grant"),
    ("Categories", "category"),
    ("Products", "product"),
    ("Blogs", "blog"),
    ("Pages", "page"),
    ("Orders", "order"),
    ("Customers", "customer"),
    ("Coupons", "coupon"),
    ("Uploads", "upload"),
    ("Pricing", "pricing"),
    ("Terms & Conditions", "terms-conditions"),
];

/// seed_matrix
///
/// Idempotent startup pass that guarantees the default permissions, the bootstrap role,
/// and the seed modules exist. `Duplicate` results are skipped silently so the function
/// is safe to run on every boot; any other store failure aborts startup.
///
/// Ordering matters: permissions first, then the role, then the modules, because
/// `bootstrap_module` auto-grants all permissions present at that moment to the
/// bootstrap role.
pub async fn seed_matrix(matrix: &MatrixState, bootstrap_role: &str) -> Result<(), StoreError> {
    let mut created = 0usize;

    for (name, slug) in DEFAULT_PERMISSIONS {
        match matrix.create_permission(name, slug).await {
            Ok(_) => created += 1,
            Err(StoreError::Duplicate) => {}
            Err(e) => return Err(e),
        }
    }

    match matrix.create_role(bootstrap_role, bootstrap_role).await {
        Ok(_) => created += 1,
        Err(StoreError::Duplicate) => {}
        Err(e) => return Err(e),
    }

    for (name, slug) in SEED_MODULES {
        match matrix.bootstrap_module(name, slug, bootstrap_role).await {
            Ok(_) => created += 1,
            Err(StoreError::Duplicate) => {}
            Err(e) => return Err(e),
        }
    }

    tracing::info!(created, "matrix seed pass complete");
    Ok(())
}

/// PostgresMatrix
///
/// The concrete implementation of the `MatrixStore` trait, backed by the PostgreSQL
/// database. Uniqueness of dimension slugs and of the grant triple is enforced by
/// database constraints; cascade deletion of grants is enforced by foreign keys.
pub struct PostgresMatrix {
    pool: PgPool,
}

impl PostgresMatrix {
    /// Creates a new store instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Shared projection for grant reads: every grant row is joined back to its three
// dimensions so the API never leaks raw IDs.
const GRANT_SELECT: &str = r#"
    SELECT
        rmp.id,
        r.slug AS role_slug,
        m.slug AS module_slug,
        p.slug AS permission_slug,
        rmp.created_at
    FROM role_module_permissions rmp
    JOIN roles r ON rmp.role_id = r.id
    JOIN modules m ON rmp.module_id = m.id
    JOIN permissions p ON rmp.permission_id = p.id
"#;

#[async_trait]
impl MatrixStore for PostgresMatrix {
    /// get_roles
    ///
    /// Read-only listing for the admin screens. List reads degrade to an empty vector on
    /// database failure; the error is logged but never turns a dashboard into a 500.
    async fn get_roles(&self) -> Vec<Role> {
        match sqlx::query_as::<_, Role>("SELECT id, name, slug FROM roles ORDER BY slug ASC")
            .fetch_all(&self.pool)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("get_roles error: {:?}", e);
                vec![]
            }
        }
    }

    /// create_role
    ///
    /// Inserts a new role. Unique violations on name or slug surface as
    /// `StoreError::Duplicate` via the From conversion.
    async fn create_role(&self, name: &str, slug: &str) -> Result<Role, StoreError> {
        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (id, name, slug) VALUES ($1, $2, $3) RETURNING id, name, slug",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(role)
    }

    /// delete_role
    ///
    /// Removes a role by slug. The `ON DELETE CASCADE` foreign key on
    /// `role_module_permissions` removes every dependent grant in the same statement,
    /// so no dangling matrix cells can survive.
    async fn delete_role(&self, slug: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM roles WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// get_grants_for_role
    ///
    /// Lists the full matrix row for one role, ordered for stable display.
    async fn get_grants_for_role(&self, slug: &str) -> Vec<Grant> {
        let query = format!("{GRANT_SELECT} WHERE r.slug = $1 ORDER BY module_slug, permission_slug");
        sqlx::query_as::<_, Grant>(&query)
            .bind(slug)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_grants_for_role error: {:?}", e);
                vec![]
            })
    }

    /// get_modules
    async fn get_modules(&self) -> Vec<Module> {
        match sqlx::query_as::<_, Module>("SELECT id, name, slug FROM modules ORDER BY slug ASC")
            .fetch_all(&self.pool)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("get_modules error: {:?}", e);
                vec![]
            }
        }
    }

    /// bootstrap_module
    ///
    /// Transactional module creation. The module insert and the auto-grant of every
    /// current permission to the bootstrap role commit together; a failure in either
    /// statement rolls back both, so a module can never exist half-granted.
    async fn bootstrap_module(
        &self,
        name: &str,
        slug: &str,
        bootstrap_role: &str,
    ) -> Result<Module, StoreError> {
        let mut tx = self.pool.begin().await?;

        let module = sqlx::query_as::<_, Module>(
            "INSERT INTO modules (id, name, slug) VALUES ($1, $2, $3) RETURNING id, name, slug",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .fetch_one(&mut *tx)
        .await?;

        // Cross join covers whatever the permission set is at this moment. Grant IDs
        // come from the column default since this is a set-based insert.
        let granted = sqlx::query(
            r#"
            INSERT INTO role_module_permissions (role_id, module_id, permission_id)
            SELECT r.id, $1, p.id
            FROM roles r
            CROSS JOIN permissions p
            WHERE r.slug = $2
            ON CONFLICT (role_id, module_id, permission_id) DO NOTHING
            "#,
        )
        .bind(module.id)
        .bind(bootstrap_role)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            module = slug,
            granted = granted.rows_affected(),
            "module bootstrapped"
        );
        Ok(module)
    }

    /// delete_module
    ///
    /// Cascade semantics identical to `delete_role`.
    async fn delete_module(&self, slug: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM modules WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// get_permissions
    async fn get_permissions(&self) -> Vec<Permission> {
        match sqlx::query_as::<_, Permission>(
            "SELECT id, name, slug FROM permissions ORDER BY slug ASC",
        )
        .fetch_all(&self.pool)
        .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("get_permissions error: {:?}", e);
                vec![]
            }
        }
    }

    /// create_permission
    ///
    /// Registers a new action kind. No retroactive grants happen here: existing modules
    /// and roles are untouched until an explicit grant is made.
    async fn create_permission(&self, name: &str, slug: &str) -> Result<Permission, StoreError> {
        let permission = sqlx::query_as::<_, Permission>(
            "INSERT INTO permissions (id, name, slug) VALUES ($1, $2, $3) RETURNING id, name, slug",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(permission)
    }

    /// delete_permission
    ///
    /// Cascade semantics identical to `delete_role`.
    async fn delete_permission(&self, slug: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM permissions WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// grant
    ///
    /// Two steps: resolve the three slugs to IDs in one round trip, then insert with
    /// `ON CONFLICT DO NOTHING` for **idempotency**. `rows_affected` distinguishes a
    /// fresh cell from a repeat of an existing one.
    async fn grant(
        &self,
        role: &str,
        module: &str,
        permission: &str,
    ) -> Result<GrantOutcome, StoreError> {
        let dims: Option<(Uuid, Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT r.id, m.id, p.id
            FROM roles r, modules m, permissions p
            WHERE r.slug = $1 AND m.slug = $2 AND p.slug = $3
            "#,
        )
        .bind(role)
        .bind(module)
        .bind(permission)
        .fetch_optional(&self.pool)
        .await?;

        let Some((role_id, module_id, permission_id)) = dims else {
            return Ok(GrantOutcome::UnknownDimension);
        };

        let result = sqlx::query(
            "INSERT INTO role_module_permissions (role_id, module_id, permission_id) \
             VALUES ($1, $2, $3) ON CONFLICT (role_id, module_id, permission_id) DO NOTHING",
        )
        .bind(role_id)
        .bind(module_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(GrantOutcome::Created)
        } else {
            Ok(GrantOutcome::Existed)
        }
    }

    /// revoke
    ///
    /// Deletes one matrix cell addressed by its three slugs. Returns true only if a cell
    /// was actually removed.
    async fn revoke(
        &self,
        role: &str,
        module: &str,
        permission: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_module_permissions rmp
            USING roles r, modules m, permissions p
            WHERE rmp.role_id = r.id
              AND rmp.module_id = m.id
              AND rmp.permission_id = p.id
              AND r.slug = $1 AND m.slug = $2 AND p.slug = $3
            "#,
        )
        .bind(role)
        .bind(module)
        .bind(permission)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// query_matches
    ///
    /// The hot path behind every authorization decision: a single SELECT over the
    /// joined matrix. Errors are propagated, never swallowed, because the caller must
    /// fail closed rather than treat a database outage as "no grants".
    async fn query_matches(
        &self,
        role: &str,
        module: &str,
        permissions: &[String],
    ) -> Result<Vec<Grant>, StoreError> {
        let query =
            format!("{GRANT_SELECT} WHERE r.slug = $1 AND m.slug = $2 AND p.slug = ANY($3)");
        let matches = sqlx::query_as::<_, Grant>(&query)
            .bind(role)
            .bind(module)
            .bind(permissions)
            .fetch_all(&self.pool)
            .await?;
        Ok(matches)
    }

    /// get_stats
    ///
    /// Compiles all necessary counters for the administrative dashboard in a single call.
    async fn get_stats(&self) -> MatrixStats {
        let total_roles = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let total_modules = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM modules")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let total_permissions = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM permissions")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let total_grants =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM role_module_permissions")
                .fetch_one(&self.pool)
                .await
                .unwrap_or(0);
        MatrixStats {
            total_roles,
            total_modules,
            total_permissions,
            total_grants,
        }
    }
}

// --- The In-Memory Implementation (For Tests) ---

// Internal grant row mirroring the database layout (IDs, not slugs).
#[derive(Clone)]
struct MemoryGrant {
    id: Uuid,
    role_id: Uuid,
    module_id: Uuid,
    permission_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryTables {
    roles: Vec<Role>,
    modules: Vec<Module>,
    permissions: Vec<Permission>,
    grants: Vec<MemoryGrant>,
}

impl MemoryTables {
    // Rebuilds the enriched view for one stored grant. Rows whose dimensions vanished
    // mid-iteration are skipped, matching what the SQL joins would return.
    fn view(&self, grant: &MemoryGrant) -> Option<Grant> {
        let role = self.roles.iter().find(|r| r.id == grant.role_id)?;
        let module = self.modules.iter().find(|m| m.id == grant.module_id)?;
        let permission = self
            .permissions
            .iter()
            .find(|p| p.id == grant.permission_id)?;
        Some(Grant {
            id: grant.id,
            role_slug: role.slug.clone(),
            module_slug: module.slug.clone(),
            permission_slug: permission.slug.clone(),
            created_at: grant.created_at,
        })
    }
}

/// MemoryMatrix
///
/// An in-memory implementation of `MatrixStore` used exclusively for unit and
/// integration testing. It reproduces the store semantics (slug uniqueness, idempotent
/// grants, cascade deletes, single consistent read per match query) without requiring
/// a running Postgres, isolating the test boundary.
///
/// Two probes support the authorization tests: `should_fail` simulates a store outage
/// for fail-closed assertions, and `match_query_count` counts `query_matches` calls so
/// tests can prove how many store reads one request costs.
pub struct MemoryMatrix {
    tables: Mutex<MemoryTables>,
    match_queries: AtomicUsize,
    should_fail: AtomicBool,
}

impl MemoryMatrix {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(MemoryTables::default()),
            match_queries: AtomicUsize::new(0),
            should_fail: AtomicBool::new(false),
        }
    }

    /// When set, `query_matches` returns `StoreError::Unavailable` instead of reading.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `query_matches` calls observed since construction.
    pub fn match_query_count(&self) -> usize {
        self.match_queries.load(Ordering::SeqCst)
    }
}

impl Default for MemoryMatrix {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatrixStore for MemoryMatrix {
    async fn get_roles(&self) -> Vec<Role> {
        let mut roles = self.tables.lock().unwrap().roles.clone();
        roles.sort_by(|a, b| a.slug.cmp(&b.slug));
        roles
    }

    async fn create_role(&self, name: &str, slug: &str) -> Result<Role, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.roles.iter().any(|r| r.name == name || r.slug == slug) {
            return Err(StoreError::Duplicate);
        }
        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
        };
        tables.roles.push(role.clone());
        Ok(role)
    }

    async fn delete_role(&self, slug: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(pos) = tables.roles.iter().position(|r| r.slug == slug) else {
            return Ok(false);
        };
        let removed = tables.roles.remove(pos);
        // Cascade, same as the ON DELETE CASCADE foreign key.
        tables.grants.retain(|g| g.role_id != removed.id);
        Ok(true)
    }

    async fn get_grants_for_role(&self, slug: &str) -> Vec<Grant> {
        let tables = self.tables.lock().unwrap();
        let mut grants: Vec<Grant> = tables
            .grants
            .iter()
            .filter_map(|g| tables.view(g))
            .filter(|g| g.role_slug == slug)
            .collect();
        grants.sort_by(|a, b| {
            (a.module_slug.as_str(), a.permission_slug.as_str())
                .cmp(&(b.module_slug.as_str(), b.permission_slug.as_str()))
        });
        grants
    }

    async fn get_modules(&self) -> Vec<Module> {
        let mut modules = self.tables.lock().unwrap().modules.clone();
        modules.sort_by(|a, b| a.slug.cmp(&b.slug));
        modules
    }

    async fn bootstrap_module(
        &self,
        name: &str,
        slug: &str,
        bootstrap_role: &str,
    ) -> Result<Module, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .modules
            .iter()
            .any(|m| m.name == name || m.slug == slug)
        {
            return Err(StoreError::Duplicate);
        }
        let module = Module {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
        };
        tables.modules.push(module.clone());

        // Both effects happen under one lock, mirroring the Postgres transaction.
        if let Some(role_id) = tables
            .roles
            .iter()
            .find(|r| r.slug == bootstrap_role)
            .map(|r| r.id)
        {
            let permission_ids: Vec<Uuid> = tables.permissions.iter().map(|p| p.id).collect();
            for permission_id in permission_ids {
                tables.grants.push(MemoryGrant {
                    id: Uuid::new_v4(),
                    role_id,
                    module_id: module.id,
                    permission_id,
                    created_at: Utc::now(),
                });
            }
        }
        Ok(module)
    }

    async fn delete_module(&self, slug: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(pos) = tables.modules.iter().position(|m| m.slug == slug) else {
            return Ok(false);
        };
        let removed = tables.modules.remove(pos);
        tables.grants.retain(|g| g.module_id != removed.id);
        Ok(true)
    }

    async fn get_permissions(&self) -> Vec<Permission> {
        let mut permissions = self.tables.lock().unwrap().permissions.clone();
        permissions.sort_by(|a, b| a.slug.cmp(&b.slug));
        permissions
    }

    async fn create_permission(&self, name: &str, slug: &str) -> Result<Permission, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .permissions
            .iter()
            .any(|p| p.name == name || p.slug == slug)
        {
            return Err(StoreError::Duplicate);
        }
        let permission = Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
        };
        tables.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn delete_permission(&self, slug: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(pos) = tables.permissions.iter().position(|p| p.slug == slug) else {
            return Ok(false);
        };
        let removed = tables.permissions.remove(pos);
        tables.grants.retain(|g| g.permission_id != removed.id);
        Ok(true)
    }

    async fn grant(
        &self,
        role: &str,
        module: &str,
        permission: &str,
    ) -> Result<GrantOutcome, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let role_id = tables.roles.iter().find(|r| r.slug == role).map(|r| r.id);
        let module_id = tables.modules.iter().find(|m| m.slug == module).map(|m| m.id);
        let permission_id = tables
            .permissions
            .iter()
            .find(|p| p.slug == permission)
            .map(|p| p.id);

        let (Some(role_id), Some(module_id), Some(permission_id)) =
            (role_id, module_id, permission_id)
        else {
            return Ok(GrantOutcome::UnknownDimension);
        };

        let exists = tables.grants.iter().any(|g| {
            g.role_id == role_id && g.module_id == module_id && g.permission_id == permission_id
        });
        if exists {
            return Ok(GrantOutcome::Existed);
        }

        tables.grants.push(MemoryGrant {
            id: Uuid::new_v4(),
            role_id,
            module_id,
            permission_id,
            created_at: Utc::now(),
        });
        Ok(GrantOutcome::Created)
    }

    async fn revoke(
        &self,
        role: &str,
        module: &str,
        permission: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.grants.len();
        let views: Vec<(Uuid, String, String, String)> = tables
            .grants
            .iter()
            .filter_map(|g| {
                tables.view(g).map(|v| {
                    (g.id, v.role_slug, v.module_slug, v.permission_slug)
                })
            })
            .collect();
        let doomed: Vec<Uuid> = views
            .into_iter()
            .filter(|(_, r, m, p)| r == role && m == module && p == permission)
            .map(|(id, ..)| id)
            .collect();
        tables.grants.retain(|g| !doomed.contains(&g.id));
        Ok(tables.grants.len() < before)
    }

    async fn query_matches(
        &self,
        role: &str,
        module: &str,
        permissions: &[String],
    ) -> Result<Vec<Grant>, StoreError> {
        // Counted before the failure switch so outage tests still observe the call.
        self.match_queries.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }

        // One lock acquisition per decision, the in-memory analogue of the single
        // consistent SELECT.
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .grants
            .iter()
            .filter_map(|g| tables.view(g))
            .filter(|g| {
                g.role_slug == role
                    && g.module_slug == module
                    && permissions.contains(&g.permission_slug)
            })
            .collect())
    }

    async fn get_stats(&self) -> MatrixStats {
        let tables = self.tables.lock().unwrap();
        MatrixStats {
            total_roles: tables.roles.len() as i64,
            total_modules: tables.modules.len() as i64,
            total_permissions: tables.permissions.len() as i64,
            total_grants: tables.grants.len() as i64,
        }
    }
}
