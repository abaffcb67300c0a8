use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines the endpoints mounted **outside** the principal/resolver/authorization
/// layer stack. For these routes the guarantee is structural, not conditional: no
/// authorization code is on their call path at all, so no matrix outage, missing
/// grant, or resolver quirk can ever affect them.
///
/// Only two kinds of traffic belong here: operational probes and the identity
/// endpoints that must work for users who cannot yet hold any permission.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // A simple, unauthenticated endpoint used for monitoring and load balancer checks.
        // Returns "ok" immediately to verify the service is running and responsive.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/login
        // Credential verification proxied to the external identity provider. The
        // provider's verdict and body are forwarded verbatim.
        .route("/auth/login", post(handlers::login))
        // POST /auth/signup
        // Account creation, likewise proxied. New accounts start with whatever role
        // the provider assigns; grants are managed separately through the matrix.
        .route("/auth/signup", post(handlers::signup))
}
