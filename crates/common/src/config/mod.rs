//! Configuration management for PolicyReply services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! The pipeline thresholds were calibrated against `all-MiniLM-L6-v2`
//! similarity scores. Swapping the embedding model means re-tuning
//! `pipeline.*`.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (pgvector backend only)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Retrieval backend selection
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Completion (LLM) service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Numeric knobs of the answer pipeline
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Outbound reply and inbound triage settings
    #[serde(default)]
    pub mail: MailConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres URL with the pgvector extension
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Which vector index answers `retrieve`
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalBackend {
    /// `passages` table queried through pgvector
    Pgvector,
    /// Pre-embedded JSON snapshot held in memory
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_backend")]
    pub backend: RetrievalBackend,

    /// Table holding `content`, `source` and `embedding vector(N)` columns
    #[serde(default = "default_passages_table")]
    pub table: String,

    /// JSON snapshot for the memory backend
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, ollama, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Completion provider: openai, ollama, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API endpoint; provider default when unset
    pub endpoint: Option<String>,

    /// API key (openai only)
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context window passed to ollama as `num_ctx`
    #[serde(default = "default_context_window")]
    pub context_window: u32,

    /// Timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Empirical constants of the answer pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PipelineConfig {
    /// Passages requested from the retriever
    #[serde(default = "default_retrieve_k")]
    pub retrieve_k: usize,

    /// Below this many passages clustering is skipped
    #[serde(default = "default_min_cluster_passages")]
    pub min_cluster_passages: usize,

    /// At or above this many passages `large_set_clusters` is used
    #[serde(default = "default_large_set_passages")]
    pub large_set_passages: usize,

    #[serde(default = "default_small_set_clusters")]
    pub small_set_clusters: usize,

    #[serde(default = "default_large_set_clusters")]
    pub large_set_clusters: usize,

    /// Clusters kept after ranking by centroid similarity
    #[serde(default = "default_selected_clusters")]
    pub selected_clusters: usize,

    #[serde(default = "default_kmeans_seed")]
    pub kmeans_seed: u64,

    #[serde(default = "default_kmeans_max_iterations")]
    pub kmeans_max_iterations: usize,

    /// Mean score strictly above this is `High`
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f32,

    /// Mean score strictly above this is `Medium`
    #[serde(default = "default_medium_confidence")]
    pub medium_confidence: f32,

    /// Citation blend weight on similarity to the question
    #[serde(default = "default_question_weight")]
    pub question_weight: f32,

    /// Citation blend weight on similarity to the answer
    #[serde(default = "default_answer_weight")]
    pub answer_weight: f32,

    #[serde(default = "default_max_sources")]
    pub max_sources: usize,

    #[serde(default = "default_max_answer_sentences")]
    pub max_answer_sentences: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// Header prepended to every generated reply
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,

    /// Sender substrings that mark automated mail (case-insensitive)
    #[serde(default = "default_blocked_senders")]
    pub blocked_sender_keywords: Vec<String>,

    /// Bodies shorter than this (after trimming) get no reply
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter (EnvFilter syntax)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_retrieval_backend() -> RetrievalBackend { RetrievalBackend::Memory }
fn default_passages_table() -> String { "passages".to_string() }
fn default_snapshot_path() -> String { "index/passages.json".to_string() }
fn default_embedding_provider() -> String { "ollama".to_string() }
fn default_embedding_model() -> String { "all-minilm".to_string() }
fn default_embedding_dimension() -> usize { 384 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_batch_size() -> usize { 32 }
fn default_llm_provider() -> String { "ollama".to_string() }
fn default_llm_model() -> String { "qwen2.5:3b".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_context_window() -> u32 { 4096 }
fn default_llm_timeout() -> u64 { 90 }
fn default_retrieve_k() -> usize { 10 }
fn default_min_cluster_passages() -> usize { 4 }
fn default_large_set_passages() -> usize { 8 }
fn default_small_set_clusters() -> usize { 2 }
fn default_large_set_clusters() -> usize { 3 }
fn default_selected_clusters() -> usize { 2 }
fn default_kmeans_seed() -> u64 { 42 }
fn default_kmeans_max_iterations() -> usize { 300 }
fn default_high_confidence() -> f32 { 0.70 }
fn default_medium_confidence() -> f32 { 0.50 }
fn default_question_weight() -> f32 { 0.6 }
fn default_answer_weight() -> f32 { 0.4 }
fn default_max_sources() -> usize { 3 }
fn default_max_answer_sentences() -> usize { 2 }
fn default_disclaimer() -> String {
    "This is an auto-generated email.\nPlease verify any important information before acting on it."
        .to_string()
}
fn default_blocked_senders() -> Vec<String> {
    [
        "no-reply",
        "noreply",
        "donotreply",
        "do-not-reply",
        "mailer-daemon",
        "postmaster",
        "bounce",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_min_body_chars() -> usize { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "policyreply".to_string() }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 10 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__PIPELINE__HIGH_CONFIDENCE=0.65
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl PipelineConfig {
    /// Cluster count for a retrieval set of `passages`, or `None` when the
    /// set is too small to cluster.
    pub fn cluster_count(&self, passages: usize) -> Option<usize> {
        if passages < self.min_cluster_passages {
            None
        } else if passages >= self.large_set_passages {
            Some(self.large_set_clusters)
        } else {
            Some(self.small_set_clusters)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: default_retrieval_backend(),
            table: default_passages_table(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: None,
            api_key: None,
            model: default_llm_model(),
            temperature: default_temperature(),
            context_window: default_context_window(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieve_k: default_retrieve_k(),
            min_cluster_passages: default_min_cluster_passages(),
            large_set_passages: default_large_set_passages(),
            small_set_clusters: default_small_set_clusters(),
            large_set_clusters: default_large_set_clusters(),
            selected_clusters: default_selected_clusters(),
            kmeans_seed: default_kmeans_seed(),
            kmeans_max_iterations: default_kmeans_max_iterations(),
            high_confidence: default_high_confidence(),
            medium_confidence: default_medium_confidence(),
            question_weight: default_question_weight(),
            answer_weight: default_answer_weight(),
            max_sources: default_max_sources(),
            max_answer_sentences: default_max_answer_sentences(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            disclaimer: default_disclaimer(),
            blocked_sender_keywords: default_blocked_senders(),
            min_body_chars: default_min_body_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retrieval.backend, RetrievalBackend::Memory);
        assert_eq!(config.pipeline.retrieve_k, 10);
        assert_eq!(config.pipeline.kmeans_seed, 42);
        assert!((config.pipeline.question_weight + config.pipeline.answer_weight - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cluster_count_breakpoints() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.cluster_count(0), None);
        assert_eq!(pipeline.cluster_count(3), None);
        assert_eq!(pipeline.cluster_count(4), Some(2));
        assert_eq!(pipeline.cluster_count(7), Some(2));
        assert_eq!(pipeline.cluster_count(8), Some(3));
        assert_eq!(pipeline.cluster_count(12), Some(3));
    }

    #[test]
    fn test_partial_pipeline_section_keeps_defaults() {
        let pipeline: PipelineConfig =
            serde_json::from_str(r#"{"high_confidence": 0.65}"#).unwrap();
        assert!((pipeline.high_confidence - 0.65).abs() < 1e-6);
        assert!((pipeline.medium_confidence - 0.50).abs() < 1e-6);
        assert_eq!(pipeline.max_sources, 3);
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("policyreply-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[pipeline]\nretrieve_k = 6\n\n[server]\nshutdown_timeout_secs = 5\n",
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.pipeline.retrieve_k, 6);
        assert_eq!(config.pipeline.max_sources, 3);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

        #[test]
    fn test_blocked_senders_default() {
        let mail = MailConfig::default();
        assert!(mail.blocked_sender_keywords.iter().any(|k| k == "mailer-daemon"));
        assert_eq!(mail.min_body_chars, 5);
    }
}
