//! Router construction.
//!
//! Exemption from authentication is structural: the exempt routes live in
//! their own group that the authenticator middleware never wraps, so the
//! full list of token-free paths is readable here in one place.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::auth::{
    api, authenticate, require_authority, AuthState, RequiredAuthority,
};
use crate::middleware::request_logging;

pub fn build_router(state: AuthState) -> Router {
    // Reachable with no token: authentication lifecycle, the validation
    // probe, health, and the public demo endpoint.
    let exempt_routes = Router::new()
        .route("/api/auth/login", post(api::login))
        .route("/api/auth/register", post(api::register))
        .route("/api/auth/validate-token", get(api::validate_token))
        .route("/api/auth/profile", get(api::auth_profile))
        .route("/api/auth/logout", post(api::logout))
        .route("/api/health", get(api::health))
        .route("/api/public/test", get(api::public_test));

    let user_routes = Router::new()
        .route("/api/user/test", get(api::user_test))
        .route_layer(middleware::from_fn_with_state(
            RequiredAuthority::Role("USER"),
            require_authority,
        ));

    let moderator_routes = Router::new()
        .route("/api/moderator/test", get(api::moderator_test))
        .route_layer(middleware::from_fn_with_state(
            RequiredAuthority::AnyRole(&["MODERATOR", "ADMIN"]),
            require_authority,
        ));

    let admin_routes = Router::new()
        .route("/api/admin/test", get(api::admin_test))
        .route("/api/admin/users", get(api::list_users))
        .route_layer(middleware::from_fn_with_state(
            RequiredAuthority::Role("ADMIN"),
            require_authority,
        ));

    // The authenticator wraps the whole protected group; guards stack on
    // top of it per route group.
    let protected_routes = Router::new()
        .route("/api/profile", get(api::current_profile))
        .merge(user_routes)
        .merge(moderator_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .merge(exempt_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
