//! cacrs-core: investigative casework with AI-assisted analysis
//!
//! This crate provides the case repository (in-memory and SQLite), the
//! generative-AI seam, the chat and report flow, file analysis, web research,
//! the third-party services registry, the onboarding tour controller and
//! identity-backed sessions.

pub mod ai;
pub mod analysis;
pub mod chat;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod models;
pub mod paths;
pub mod research;
pub mod schema;
pub mod services;
pub mod session;
pub mod store;
pub mod tour;

pub use config::Config;
pub use error::Error;
pub use error::Result;
pub use store::CaseRepository;

/// Application name used for config directories and paths.
pub const APP_NAME: &str = "cacrs";

/// Returns the environment variable prefix for this application.
pub fn env_prefix() -> String {
    "CACRS".to_string()
}
