//! Authentication Middleware
//! Mission: Establish request identity from the token cookie and guard
//! protected operations with role/permission predicates

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use crate::auth::api::{AuthApiError, AuthState, TOKEN_COOKIE};
use crate::auth::identity::Identity;

/// Request authenticator: runs once per protected request, before any guard.
///
/// Reads the `jwt-token` cookie, verifies it, resolves the subject to a full
/// `Identity`, and binds it to the request's extensions. Every negative
/// outcome (no cookie, invalid token, unknown or disabled subject) leaves the
/// request unauthenticated and lets it continue; downstream guards reject if
/// the operation requires identity. Only storage faults abort the request.
///
/// Purely read-and-bind: no writes, no retries.
pub async fn authenticate(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(cookie) = jar.get(TOKEN_COOKIE) {
        if let Some(subject) = state.jwt.verify(cookie.value()) {
            match state.resolver.resolve(&subject) {
                Ok(Some(identity)) => {
                    debug!(username = %identity.username, "Request authenticated");
                    req.extensions_mut().insert(identity);
                }
                Ok(None) => {
                    // Subject deleted or disabled after issuance: same as an
                    // invalid token.
                    debug!(subject = %subject, "Token subject no longer resolves");
                }
                Err(err) => {
                    warn!(error = %err, "Identity resolution failed");
                    return AuthApiError::InternalError.into_response();
                }
            }
        }
    }

    next.run(req).await
}

/// Extract the identity bound by [`authenticate`] (use in protected handlers).
pub fn current_identity(req: &Request) -> Option<&Identity> {
    req.extensions().get::<Identity>()
}

/// Declarative predicate over an identity's authorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredAuthority {
    Role(&'static str),
    AnyRole(&'static [&'static str]),
    Permission(&'static str),
}

impl RequiredAuthority {
    /// Pure set-membership check; no I/O.
    pub fn satisfied_by(&self, identity: &Identity) -> bool {
        match self {
            RequiredAuthority::Role(role) => identity.has_role(role),
            RequiredAuthority::AnyRole(roles) => identity.has_any_role(roles),
            RequiredAuthority::Permission(permission) => identity.has_permission(permission),
        }
    }
}

/// Authorization guard: attach per route group with
/// `middleware::from_fn_with_state(RequiredAuthority::..., require_authority)`.
///
/// No bound identity means the caller is unknown (401); a bound identity
/// failing the predicate means the caller is known but disallowed (403).
/// Either way the protected operation never executes.
pub async fn require_authority(
    State(required): State<RequiredAuthority>,
    req: Request,
    next: Next,
) -> Result<Response, AuthApiError> {
    let identity = current_identity(&req).ok_or(AuthApiError::TokenInvalid)?;

    if !required.satisfied_by(identity) {
        warn!(
            username = %identity.username,
            required = ?required,
            "Authorization denied"
        );
        return Err(AuthApiError::Forbidden);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use std::collections::BTreeSet;

    fn identity(roles: &[&str], permissions: &[&str]) -> Identity {
        Identity {
            username: "test".to_string(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_current_identity_from_request() {
        let mut req = HttpRequest::new(Body::empty());
        assert!(current_identity(&req).is_none());

        req.extensions_mut().insert(Identity {
            username: "admin".to_string(),
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
        });

        let bound = current_identity(&req);
        assert_eq!(bound.unwrap().username, "admin");
    }

    #[test]
    fn test_role_predicate() {
        let admin = identity(&["ADMIN"], &[]);
        let user = identity(&["USER"], &[]);

        assert!(RequiredAuthority::Role("ADMIN").satisfied_by(&admin));
        assert!(!RequiredAuthority::Role("ADMIN").satisfied_by(&user));
    }

    #[test]
    fn test_any_role_predicate() {
        let moderator_or_admin = RequiredAuthority::AnyRole(&["MODERATOR", "ADMIN"]);

        assert!(moderator_or_admin.satisfied_by(&identity(&["ADMIN"], &[])));
        assert!(moderator_or_admin.satisfied_by(&identity(&["MODERATOR"], &[])));
        assert!(!moderator_or_admin.satisfied_by(&identity(&["USER"], &[])));
        assert!(!moderator_or_admin.satisfied_by(&identity(&[], &[])));
    }

    #[test]
    fn test_permission_predicate() {
        let can_write = RequiredAuthority::Permission("USER_WRITE");

        assert!(can_write.satisfied_by(&identity(&[], &["USER_WRITE"])));
        assert!(!can_write.satisfied_by(&identity(&["ADMIN"], &["USER_READ"])));
    }
}
