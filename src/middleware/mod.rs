//! HTTP middleware shared across route groups.

mod logging;

pub use logging::request_logging;
