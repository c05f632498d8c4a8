//! Authentication Module
//! Mission: Token-based authentication and role/permission authorization
//!
//! - JWT issuance and verification (in-memory process key)
//! - User/Role/Permission credential store (SQLite)
//! - Per-request identity resolution and binding
//! - Declarative authorization guards

pub mod api;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod user_store;

pub use api::AuthState;
pub use identity::{Identity, IdentityResolver};
pub use jwt::JwtHandler;
pub use middleware::{authenticate, require_authority, RequiredAuthority};
pub use user_store::UserStore;
