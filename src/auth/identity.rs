//! Identity Resolution
//! Mission: Turn a verified token subject into a full authority set

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;

use crate::auth::user_store::UserStore;

/// The request-scoped authenticated identity: a username plus the flattened
/// union of role and permission names reachable through the user's roles.
///
/// Bound to a request's extensions by the authenticator middleware and never
/// shared across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.roles.contains(*role))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// The single place where the Role→Permission graph is traversed for
/// authorization. Loads the whole closure in one store operation so guards
/// never see a partially loaded authority set.
pub struct IdentityResolver {
    store: Arc<UserStore>,
}

impl IdentityResolver {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self { store }
    }

    /// Resolve a token subject to an `Identity`. Unknown and disabled users
    /// both come back as `None`; only storage faults error.
    pub fn resolve(&self, subject: &str) -> Result<Option<Identity>> {
        self.store.load_identity(subject)
    }
}
