//! # Lexfront Core
//!
//! Shared foundation for the Lexfront site backend: configuration loading
//! and the crate-wide error taxonomy. Every other crate in the workspace
//! depends on this one and nothing else in the workspace.

pub mod config;
pub mod error;

pub use config::SiteConfig;
pub use error::{LexfrontError, Result};
