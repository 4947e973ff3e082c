//! API request and response bodies.

pub mod audits;
pub mod internal;
pub mod sessions;
