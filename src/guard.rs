use axum::{
    Json,
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    AppState, auth::AuthUser, matrix::StoreError, protection::Protection, resolver::RouteClass,
};

/// AccessError
///
/// The complete denial taxonomy of the authorization decision point. Every variant maps
/// to a distinct HTTP outcome and a distinct log line, so operators can tell apart
/// "not logged in", "logged in but not granted", "we could not even classify the path",
/// and "the store is down" without enabling debug logging.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("role '{role}' holds no matching grant on module '{module}'")]
    Forbidden { role: String, module: String },
    #[error("request path could not be classified")]
    Unresolved,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// DenialBody
///
/// JSON body returned with every denial, stable enough for frontends to branch on the
/// `error` discriminant while showing `message` to humans.
#[derive(Debug, Serialize)]
struct DenialBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            AccessError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AccessError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            AccessError::Unresolved => (StatusCode::FORBIDDEN, "forbidden"),
            AccessError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let message = match &self {
            // Store failure details stay in the logs; clients get a generic line.
            AccessError::Store(_) => "authorization check failed".to_string(),
            other => other.to_string(),
        };
        (status, Json(DenialBody { error, message })).into_response()
    }
}

/// authorize
///
/// The authorization decision point, applied as a `route_layer` over the protected
/// subrouter. By the time a request arrives here, routing has succeeded (so the
/// matched route pattern is available), `attach_principal` has run (so a principal is
/// present iff credentials checked out), and `resolve_module` has attached the
/// `RouteClass`.
///
/// Decision sequence:
/// 1. Look up the operation's `Protection` by (method, matched pattern). Explicitly
///    `Open` operations pass immediately and never consult identity or the store.
///    Unbound operations also pass, but with a warning, since an unregistered admin
///    operation usually means a missed binding. A `Protected` binding that declares
///    no labels at all is the same case in disguise and passes with the same warning.
/// 2. Protected operations require a principal with a non-empty role; otherwise 401.
/// 3. The module slug comes from the attached `RouteClass`. A missing class is a
///    wiring bug and fails closed with 403.
/// 4. One `query_matches` call settles the decision: any returned grant allows, an
///    empty result denies with 403, and a store failure denies with 500. The decision
///    depends only on whether the match set is empty; counts are logged, never acted on.
pub async fn authorize(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let pattern = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_owned());

    let protection = match pattern.as_deref() {
        Some(path) => match state.registry.lookup(&method, path) {
            Some(p) => p,
            None => {
                tracing::warn!(
                    method = %method,
                    path,
                    "operation has no protection binding; passing through"
                );
                Protection::Open
            }
        },
        None => {
            // route_layer only runs after a successful route match, so a missing
            // pattern extension is a wiring bug rather than a client mistake.
            tracing::warn!(method = %method, "no matched pattern on guarded route; passing through");
            Protection::Open
        }
    };

    let required = match protection {
        Protection::Open => {
            tracing::debug!(
                method = %method,
                path = pattern.as_deref().unwrap_or("-"),
                "open operation; no permission check"
            );
            return next.run(request).await;
        }
        Protection::Protected(required) => required,
    };

    // No labels declared means no check to run: an empty any-of set allows, it does
    // not deny everyone. Worth a warning because the binding is almost certainly a
    // mistake.
    if required.is_empty() {
        tracing::warn!(
            method = %method,
            path = pattern.as_deref().unwrap_or("-"),
            "protected binding declares no permission labels; passing through"
        );
        return next.run(request).await;
    }

    // Protected operation: a principal is mandatory from here on.
    let Some(user) = request.extensions().get::<AuthUser>().cloned() else {
        tracing::info!(
            method = %method,
            path = pattern.as_deref().unwrap_or("-"),
            "denied: no principal attached"
        );
        return AccessError::Unauthenticated.into_response();
    };
    if user.role.trim().is_empty() {
        tracing::info!(user = %user.id, "denied: principal carries an empty role");
        return AccessError::Unauthenticated.into_response();
    }

    let module = match request.extensions().get::<RouteClass>() {
        Some(RouteClass::Module(slug)) => slug.clone(),
        Some(RouteClass::Exempt) => {
            // Exempt paths are mounted outside this layer; honoring the class here
            // keeps the guarantee even if one ever gets wired inside it.
            return next.run(request).await;
        }
        None => {
            tracing::error!(
                method = %method,
                path = pattern.as_deref().unwrap_or("-"),
                "denied: no route class attached, resolver layer missing"
            );
            return AccessError::Unresolved.into_response();
        }
    };

    match state
        .matrix
        .query_matches(&user.role, &module, &required)
        .await
    {
        Ok(matches) if matches.is_empty() => {
            tracing::info!(
                role = %user.role,
                module = %module,
                required = ?required,
                "denied: no matching grant"
            );
            AccessError::Forbidden {
                role: user.role,
                module,
            }
            .into_response()
        }
        Ok(matches) => {
            tracing::debug!(
                role = %user.role,
                module = %module,
                matched = matches.len(),
                "authorized"
            );
            next.run(request).await
        }
        Err(e) => {
            tracing::error!(role = %user.role, module = %module, "matrix query failed: {e}");
            AccessError::Store(e).into_response()
        }
    }
}
