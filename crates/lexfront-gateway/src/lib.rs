//! # Lexfront Gateway
//!
//! HTTP surface for the admin console: post and campaign lifecycle
//! actions, scheduling views, and newsletter subscription upkeep. Thin by
//! design — every handler delegates to the lifecycle service and maps its
//! errors onto HTTP statuses.

pub mod routes;
pub mod server;

pub use server::{router, serve, AppState};
