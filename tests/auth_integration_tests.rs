use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    middleware,
    routing::get,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use storefront_admin::{
    AppState,
    auth::{self, Claims},
    config::{AppConfig, Env},
    handlers,
    matrix::MatrixState,
    MemoryMatrix,
};
use tower::util::ServiceExt;
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

/// Signs a token the way the external identity provider would. A negative offset
/// produces a token expired well past the validator's built-in leeway.
fn create_token(role: &str, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: TEST_USER_ID,
        role: role.to_string(),
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

/// A single-route probe behind `attach_principal` alone. The /whoami handler demands
/// an AuthUser via its extractor, so the response status tells us exactly whether the
/// middleware attached a principal: 200 with the identity echoed, or 401.
fn probe_app(env: Env) -> Router {
    let mut config = AppConfig::default();
    config.env = env;
    config.jwt_secret = TEST_JWT_SECRET.to_string();

    let matrix: MatrixState = Arc::new(MemoryMatrix::new());
    let state = AppState::new(matrix, config);

    Router::new()
        .route("/whoami", get(handlers::whoami))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::attach_principal,
        ))
        .with_state(state)
}

async fn probe(app: Router, request: Request<Body>) -> (StatusCode, Option<serde_json::Value>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).ok())
}

fn whoami_request() -> axum::http::request::Builder {
    Request::builder().method(Method::GET).uri("/whoami")
}

// --- Bearer Token Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let token = create_token("manager", 3600);
    let request = whoami_request()
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let (status, body) = probe(probe_app(Env::Production), request).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["id"], TEST_USER_ID.to_string());
    assert_eq!(body["role"], "manager");
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let request = whoami_request().body(Body::empty()).unwrap();

    let (status, _) = probe(probe_app(Env::Production), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    // Expired a full hour ago, comfortably beyond the validator's clock leeway.
    let token = create_token("manager", -3600);
    let request = whoami_request()
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let (status, _) = probe(probe_app(Env::Production), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_wrong_secret() {
    let claims = Claims {
        sub: TEST_USER_ID,
        role: "manager".to_string(),
        iat: 0,
        exp: usize::MAX,
    };
    let forged = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();
    let request = whoami_request()
        .header(header::AUTHORIZATION, format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap();

    let (status, _) = probe(probe_app(Env::Production), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_malformed_header() {
    for value in ["Bearer not-a-token", "Basic dXNlcjpwYXNz", "Bearer"] {
        let request = whoami_request()
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap();

        let (status, _) = probe(probe_app(Env::Production), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED, "header value: {value}");
    }
}

#[tokio::test]
async fn test_bearer_token_also_works_in_local() {
    // The bypass is an addition in local, not a replacement for real tokens.
    let token = create_token("manager", 3600);
    let request = whoami_request()
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let (status, body) = probe(probe_app(Env::Local), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["role"], "manager");
}

// --- Local Bypass Tests ---

#[tokio::test]
async fn test_local_bypass_success() {
    let request = whoami_request()
        .header("x-actor-id", TEST_USER_ID.to_string())
        .header("x-actor-role", "support")
        .body(Body::empty())
        .unwrap();

    let (status, body) = probe(probe_app(Env::Local), request).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["id"], TEST_USER_ID.to_string());
    assert_eq!(body["role"], "support");
}

#[tokio::test]
async fn test_local_bypass_requires_both_headers() {
    let id_only = whoami_request()
        .header("x-actor-id", TEST_USER_ID.to_string())
        .body(Body::empty())
        .unwrap();
    let role_only = whoami_request()
        .header("x-actor-role", "support")
        .body(Body::empty())
        .unwrap();

    let (id_status, _) = probe(probe_app(Env::Local), id_only).await;
    let (role_status, _) = probe(probe_app(Env::Local), role_only).await;

    assert_eq!(id_status, StatusCode::UNAUTHORIZED);
    assert_eq!(role_status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_with_malformed_actor_id() {
    let request = whoami_request()
        .header("x-actor-id", "definitely-not-a-uuid")
        .header("x-actor-role", "support")
        .body(Body::empty())
        .unwrap();

    let (status, _) = probe(probe_app(Env::Local), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    // The same headers that work in local must mean nothing in production.
    let request = whoami_request()
        .header("x-actor-id", TEST_USER_ID.to_string())
        .header("x-actor-role", "admin")
        .body(Body::empty())
        .unwrap();

    let (status, _) = probe(probe_app(Env::Production), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
