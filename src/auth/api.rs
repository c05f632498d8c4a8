//! Authentication API Endpoints
//! Mission: Login, registration, and session lifecycle over cookie-borne JWTs

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{
    identity::IdentityResolver,
    jwt::JwtHandler,
    middleware::current_identity,
    models::{LoginRequest, LoginResponse, ProfileResponse, RegisterRequest, UserResponse},
    user_store::{DuplicateField, NewUser, StoreError, UserStore},
};

/// Cookie carrying the token. HTTP-only, path `/`.
pub const TOKEN_COOKIE: &str = "jwt-token";

/// The cookie expires client-side after 2 hours, independently of the token's
/// own 8-hour validity window. The embedded `exp` claim is what the server
/// trusts; the cookie is only the delivery vehicle.
const COOKIE_MAX_AGE_HOURS: i64 = 2;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub store: Arc<UserStore>,
    pub jwt: Arc<JwtHandler>,
    pub resolver: Arc<IdentityResolver>,
    pub cookie_secure: bool,
}

impl AuthState {
    pub fn new(store: Arc<UserStore>, jwt: Arc<JwtHandler>, cookie_secure: bool) -> Self {
        let resolver = Arc::new(IdentityResolver::new(Arc::clone(&store)));
        Self {
            store,
            jwt,
            resolver,
            cookie_secure,
        }
    }
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(TOKEN_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_secure(secure);
    cookie.set_max_age(time::Duration::hours(COOKIE_MAX_AGE_HOURS));
    cookie
}

fn expired_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(TOKEN_COOKIE, "");
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_secure(secure);
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

/// Login endpoint - POST /api/auth/login
///
/// Rejects unknown usernames, wrong passwords, and disabled accounts with
/// the same response so usernames cannot be enumerated.
pub async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthApiError> {
    info!("Login attempt: {}", payload.username);

    let user = state
        .store
        .find_user_by_username(&payload.username)
        .map_err(|e| {
            warn!(error = %e, "User lookup failed during login");
            AuthApiError::InternalError
        })?
        .ok_or(AuthApiError::InvalidCredentials)?;

    if !user.enabled {
        warn!("Login attempt for disabled user: {}", user.username);
        return Err(AuthApiError::InvalidCredentials);
    }

    let valid = bcrypt::verify(&payload.password, &user.password_hash)
        .map_err(|_| AuthApiError::InternalError)?;
    if !valid {
        warn!("Failed login attempt: {}", payload.username);
        return Err(AuthApiError::InvalidCredentials);
    }

    let identity = state
        .resolver
        .resolve(&user.username)
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::InvalidCredentials)?;

    let token = state
        .jwt
        .issue(&user.username)
        .map_err(|_| AuthApiError::InternalError)?;

    info!("Login successful: {}", user.username);

    let jar = jar.add(session_cookie(token, state.cookie_secure));
    Ok((
        jar,
        Json(LoginResponse {
            username: identity.username,
            roles: identity.roles.into_iter().collect(),
            permissions: identity.permissions.into_iter().collect(),
        }),
    ))
}

/// Registration endpoint - POST /api/auth/register
///
/// Creates the user with no roles; role assignment is an administrative act.
/// The pre-flight exists checks give field-specific rejections, and the
/// store's unique constraints close the race two concurrent registrations
/// would otherwise win together.
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    if state
        .store
        .exists_by_username(&payload.username)
        .map_err(|_| AuthApiError::InternalError)?
    {
        return Err(AuthApiError::DuplicateUsername);
    }
    if state
        .store
        .exists_by_email(&payload.email)
        .map_err(|_| AuthApiError::InternalError)?
    {
        return Err(AuthApiError::DuplicateEmail);
    }

    let password_hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST)
        .map_err(|_| AuthApiError::InternalError)?;

    let user = state.store.create_user(NewUser {
        username: payload.username,
        email: payload.email,
        password_hash,
        first_name: payload.first_name,
        middle_name: payload.middle_name,
        last_name: payload.last_name,
    })?;

    info!("User registered: {}", user.username);

    Ok(Json(json!({
        "success": true,
        "message": "User registered successfully",
    })))
}

/// Session probe - GET /api/auth/validate-token
///
/// Verifies the cookie token cryptographically and re-checks that the
/// subject still resolves to an enabled user: missing, malformed, expired,
/// forged, and since-disabled all come back as `TokenInvalid`.
pub async fn validate_token(
    State(state): State<AuthState>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    let token = jar.get(TOKEN_COOKIE).ok_or(AuthApiError::TokenInvalid)?;
    let subject = state
        .jwt
        .verify(token.value())
        .ok_or(AuthApiError::TokenInvalid)?;

    let identity = state
        .resolver
        .resolve(&subject)
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::TokenInvalid)?;

    Ok(Json(json!({
        "success": true,
        "username": identity.username,
        "timestamp": Utc::now().timestamp_millis(),
    })))
}

/// Cookie-based profile - GET /api/auth/profile
///
/// Lives under the exempt prefix, so it reads and verifies the cookie itself
/// instead of relying on the authenticator middleware.
pub async fn auth_profile(
    State(state): State<AuthState>,
    jar: CookieJar,
) -> Result<Json<ProfileResponse>, AuthApiError> {
    let token = jar.get(TOKEN_COOKIE).ok_or(AuthApiError::TokenInvalid)?;
    let subject = state
        .jwt
        .verify(token.value())
        .ok_or(AuthApiError::TokenInvalid)?;

    let identity = state
        .resolver
        .resolve(&subject)
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::TokenInvalid)?;

    let user = state
        .store
        .find_user_by_username(&identity.username)
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::TokenInvalid)?;

    Ok(Json(ProfileResponse {
        username: user.username,
        email: user.email,
        first_name: user.first_name,
        middle_name: user.middle_name,
        last_name: user.last_name,
        roles: identity.roles.into_iter().collect(),
        permissions: identity.permissions.into_iter().collect(),
    }))
}

/// Logout - POST /api/auth/logout
///
/// Clears the cookie client-side. Tokens are stateless and unrevoked, so a
/// captured token stays usable until its natural expiry; this endpoint only
/// tells well-behaved clients to discard theirs.
pub async fn logout(
    State(state): State<AuthState>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar.add(expired_cookie(state.cookie_secure));
    (jar, Json(json!({ "success": true })))
}

/// Health check - GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "UP",
        "message": "RBAC backend is running",
        "timestamp": Utc::now().timestamp_millis(),
    }))
}

/// Public demo endpoint - GET /api/public/test
pub async fn public_test() -> Json<serde_json::Value> {
    Json(json!({
        "message": "This is a public endpoint - no authentication required",
        "timestamp": Utc::now().timestamp_millis(),
    }))
}

/// Authenticated profile - GET /api/profile
pub async fn current_profile(req: Request) -> Result<Json<serde_json::Value>, AuthApiError> {
    let identity = current_identity(&req).ok_or(AuthApiError::TokenInvalid)?;

    Ok(Json(json!({
        "username": identity.username,
        "roles": identity.roles,
        "permissions": identity.permissions,
        "authenticated": true,
        "timestamp": Utc::now().timestamp_millis(),
    })))
}

/// GET /api/user/test - requires role USER
pub async fn user_test(req: Request) -> Result<Json<serde_json::Value>, AuthApiError> {
    let identity = current_identity(&req).ok_or(AuthApiError::TokenInvalid)?;

    Ok(Json(json!({
        "message": "This is a user endpoint - USER role required",
        "username": identity.username,
        "roles": identity.roles,
        "timestamp": Utc::now().timestamp_millis(),
    })))
}

/// GET /api/moderator/test - requires role MODERATOR or ADMIN
pub async fn moderator_test(req: Request) -> Result<Json<serde_json::Value>, AuthApiError> {
    let identity = current_identity(&req).ok_or(AuthApiError::TokenInvalid)?;

    Ok(Json(json!({
        "message": "This is a moderator endpoint - MODERATOR or ADMIN role required",
        "username": identity.username,
        "roles": identity.roles,
        "timestamp": Utc::now().timestamp_millis(),
    })))
}

/// GET /api/admin/test - requires role ADMIN
pub async fn admin_test(req: Request) -> Result<Json<serde_json::Value>, AuthApiError> {
    let identity = current_identity(&req).ok_or(AuthApiError::TokenInvalid)?;

    Ok(Json(json!({
        "message": "This is an admin endpoint - ADMIN role required",
        "username": identity.username,
        "roles": identity.roles,
        "timestamp": Utc::now().timestamp_millis(),
    })))
}

/// List users - GET /api/admin/users (ADMIN only, enforced by route guard)
pub async fn list_users(
    State(state): State<AuthState>,
) -> Result<Json<Vec<UserResponse>>, AuthApiError> {
    let users = state
        .store
        .list_users()
        .map_err(|_| AuthApiError::InternalError)?;

    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Auth API errors
///
/// Every user-visible failure carries a machine-readable code plus a human
/// message; internals never leak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthApiError {
    InvalidCredentials,
    DuplicateUsername,
    DuplicateEmail,
    TokenInvalid,
    Forbidden,
    InternalError,
}

impl AuthApiError {
    fn parts(self) -> (StatusCode, &'static str, &'static str) {
        match self {
            AuthApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid username or password",
            ),
            AuthApiError::DuplicateUsername => (
                StatusCode::CONFLICT,
                "DUPLICATE_USERNAME",
                "Username already exists",
            ),
            AuthApiError::DuplicateEmail => (
                StatusCode::CONFLICT,
                "DUPLICATE_EMAIL",
                "Email already exists",
            ),
            AuthApiError::TokenInvalid => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "Not authenticated")
            }
            AuthApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Insufficient permissions",
            ),
            AuthApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            ),
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = Json(json!({
            "success": false,
            "code": code,
            "message": message,
        }));
        (status, body).into_response()
    }
}

impl From<StoreError> for AuthApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(DuplicateField::Username) => AuthApiError::DuplicateUsername,
            StoreError::Duplicate(DuplicateField::Email) => AuthApiError::DuplicateEmail,
            other => {
                warn!(error = %other, "Storage failure surfaced to API");
                AuthApiError::InternalError
            }
        }
    }
}
