//! litgraph Common Library
//!
//! Shared code for the litgraph services including:
//! - Database models and repository patterns
//! - Generative service client abstraction
//! - Bibliographic index client abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod bibliography;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use llm::Generator;
pub use bibliography::BibliographicIndex;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default generative model
pub const DEFAULT_GENERATIVE_MODEL: &str = "gemini-2.5-flash";

/// Default bibliographic index endpoint
pub const DEFAULT_BIBLIOGRAPHY_BASE: &str = "https://api.openalex.org";
