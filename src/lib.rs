//! RBAC Backend Library
//!
//! Exposes core modules for use by the binary and integration tests.

pub mod app;
pub mod auth;
pub mod middleware;
