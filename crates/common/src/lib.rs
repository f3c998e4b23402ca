//! ResearchEase Common Library
//!
//! Shared code for the ResearchEase services including:
//! - Paper and analysis data model
//! - Persistence gateway (object storage and relational tables)
//! - Sessions and authentication backends
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod storage;
pub mod supabase;
pub mod types;

// Re-export commonly used types
pub use auth::{Session, SessionProvider};
pub use config::AppConfig;
pub use db::PaperStore;
pub use errors::{AppError, Result};
pub use storage::ObjectStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
