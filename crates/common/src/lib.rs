//! PolicyReply Common Library
//!
//! Shared code for the PolicyReply services:
//! - Answer pipeline (clustering, synthesis, confidence, citations)
//! - Retrieval backends and embedding clients
//! - Completion clients
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retrieval;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::{AnswerPipeline, Confidence, PolicyAnswer};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::CompletionClient;
pub use retrieval::{Passage, Retriever};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
