use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum::extract::FromRequestParts;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{AppConfig, Env};

/// Claims
///
/// Represents the standard payload structure expected inside a JSON Web Token (JWT).
/// These claims are signed by the external identity provider's secret and validated on
/// every request that presents a token. The role travels inside the token; this service
/// never resolves identities against its own database.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): The UUID of the user, owned by the identity provider.
    pub sub: Uuid,
    /// The role slug assigned to the user. This is the only identity attribute the
    /// permission matrix ever consults.
    pub role: String,
    /// Expiration Time (exp): Timestamp after which the JWT must not be accepted.
    pub exp: usize,
    /// Issued At (iat): Timestamp when the JWT was issued.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of a request, as attached by `attach_principal`. Downstream
/// consumers (the authorization middleware, handlers needing the caller's identity)
/// read this from the request extensions instead of re-decoding the token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthUser {
    /// The unique identifier of the user at the identity provider.
    pub id: Uuid,
    /// The user's role slug, matched against the `roles.slug` dimension of the matrix.
    pub role: String,
}

/// attach_principal
///
/// Lenient principal-attachment middleware. It inspects the request for credentials
/// and, when they check out, inserts an `AuthUser` into the request extensions. It
/// **never rejects**: anonymous or badly-credentialed requests simply continue without
/// a principal, and the authorization decision point downstream decides whether that
/// matters for the operation being hit. Exempt identity routes are mounted outside
/// this layer entirely.
pub async fn attach_principal(
    State(config): State<AppConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(user) = resolve_principal(request.headers(), &config) {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

/// resolve_principal
///
/// The credential-to-principal resolution, in order:
/// 1. Local Development Bypass: when running in Env::Local, the 'x-actor-id' and
///    'x-actor-role' headers stand in for a signed token. This accelerates development
///    and testing but is guarded by the Env check and dead in production.
/// 2. Bearer Token: standard Authorization header extraction and JWT decoding against
///    the configured secret, with expiry validation always active.
///
/// Returns None on any failure; failures are logged at debug level and carry no
/// response-shaping side effects.
fn resolve_principal(headers: &HeaderMap, config: &AppConfig) -> Option<AuthUser> {
    if config.env == Env::Local {
        if let (Some(id_header), Some(role_header)) =
            (headers.get("x-actor-id"), headers.get("x-actor-role"))
        {
            if let (Ok(id_str), Ok(role_str)) = (id_header.to_str(), role_header.to_str()) {
                if let Ok(id) = Uuid::parse_str(id_str) {
                    return Some(AuthUser {
                        id,
                        role: role_str.to_string(),
                    });
                }
            }
        }
    }
    // If Env is Production, or if the bypass headers were absent or malformed,
    // execution falls through to the standard JWT validation flow.

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    let token = auth_header.strip_prefix("Bearer ")?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::default();
    // Ensure expiration time validation is always active.
    validation.validate_exp = true;

    let token_data = match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => data,
        Err(e) => {
            // Detailed error inspection: expired tokens are the common case and worth
            // telling apart from tampering when reading logs.
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("bearer token expired"),
                _ => tracing::debug!("bearer token rejected: {:?}", e.kind()),
            }
            return None;
        }
    };

    Some(AuthUser {
        id: token_data.claims.sub,
        role: token_data.claims.role,
    })
}

/// AuthUser Extractor Implementation
///
/// Implements Axum's FromRequestParts trait, making AuthUser usable as a function
/// argument in any handler that needs the caller's identity. The heavy lifting
/// (bypass headers, JWT decoding) already happened in `attach_principal`; this
/// extractor only reads the result out of the request extensions.
///
/// Rejection: Returns StatusCode::UNAUTHORIZED (401) when no principal was attached,
/// which makes "must be logged in" a property a handler can demand even on operations
/// whose Protection is Open.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
