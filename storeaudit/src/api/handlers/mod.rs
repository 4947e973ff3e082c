//! Axum route handlers.
//!
//! - [`audits`]: photo submission through the audit pipeline
//! - [`sessions`]: store-code login against the roster
//! - [`internal`]: cache invalidation for operators

pub mod audits;
pub mod internal;
pub mod sessions;
