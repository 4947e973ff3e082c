//! HTTP surface for field submissions.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response bodies
//!
//! # Routes
//!
//! - `POST /api/v1/sessions`: resolve a store code from the roster (login boundary)
//! - `POST /api/v1/audits`: submit one photo and receive its verdict
//! - `POST /internal/candidates/refresh`, `POST /internal/roster/refresh`: drop cached lookups

pub mod handlers;
pub mod models;
