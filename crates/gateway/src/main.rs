//! PolicyReply Gateway
//!
//! HTTP entry point for the answer pipeline.
//! Handles:
//! - Question answering and inbound mail triage
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use policyreply_common::{
    config::AppConfig,
    context::{AnswerPipeline, EntailmentScorer, QueryDecomposer},
    embeddings::{create_embedder, Embedder},
    llm::{create_completion_client, CompletionClient},
    metrics,
    retrieval::{create_retriever, Retriever},
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub retriever: Arc<dyn Retriever>,
    pub pipeline: Arc<AnswerPipeline>,
    pub decomposer: Arc<QueryDecomposer>,
    pub entailment: Arc<EntailmentScorer>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        retriever: Arc<dyn Retriever>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn CompletionClient>,
    ) -> Self {
        let pipeline = AnswerPipeline::new(
            retriever.clone(),
            embedder,
            llm.clone(),
            config.pipeline.clone(),
        )
        .with_disclaimer(config.mail.disclaimer.clone());

        Self {
            config: Arc::new(config),
            retriever,
            pipeline: Arc::new(pipeline),
            decomposer: Arc::new(QueryDecomposer::new(llm.clone())),
            entailment: Arc::new(EntailmentScorer::new(llm)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration; APP_CONFIG_FILE pins a single file instead of the layered lookup
    let config = match std::env::var("APP_CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path)?,
        Err(_) => AppConfig::load()?,
    };

    // Initialize tracing
    init_tracing(&config);

    info!(
        "Starting PolicyReply Gateway v{} ({})",
        policyreply_common::VERSION,
        config.observability.service_name
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let handle = install_metrics()?;
        tokio::spawn(serve_metrics(handle, config.observability.metrics_port));
    }

    // Service handles, built once and shared by every request
    let embedder = create_embedder(&config.embedding)?;
    let llm = create_completion_client(&config.llm)?;
    info!(
        embedding_model = embedder.model_name(),
        completion_model = llm.model_name(),
        "Model clients ready"
    );

    let retriever = create_retriever(&config, embedder.clone()).await?;
    info!(backend = retriever.backend(), "Retriever ready");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let shutdown_timeout = config.shutdown_timeout();
    let state = AppState::new(config, retriever, embedder, llm);

    // Build the router
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // In-flight requests get `shutdown_timeout` to drain after the signal
    let draining = Arc::new(Notify::new());
    let signal = {
        let draining = draining.clone();
        async move {
            shutdown_signal().await;
            draining.notify_one();
        }
    };
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = drain_deadline(&draining, shutdown_timeout) => {
            tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out, dropping open connections"
            );
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Install the global Prometheus recorder, then describe metrics against it.
/// Descriptions emitted before a recorder exists are dropped.
fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets(metrics::ANSWER_BUCKETS)?
        .install_recorder()?;
    metrics::register_metrics();
    Ok(handle)
}

/// Prometheus scrape endpoint on its own port
async fn serve_metrics(handle: PrometheusHandle, port: u16) {
    let app = Router::new().route("/metrics", get(move || async move { handle.render() }));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Metrics listening on {}", addr);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Metrics server stopped");
            }
        }
        Err(e) => tracing::error!(error = %e, port, "Failed to bind metrics port"),
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        .route("/answer", post(handlers::answer::answer))
        .route("/inbound", post(handlers::inbound::inbound))
        .route("/decompose", post(handlers::diagnostics::decompose))
        .route("/entailment", post(handlers::diagnostics::entailment));

    if state.config.rate_limit.enabled {
        let limiter = create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    let timeout = request_timeout_layer(state.config.request_timeout());

    // Compose the app; health checks stay outside the rate limit
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Requests running past `timeout` are answered with 408
fn request_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Resolves `timeout` after shutdown has been signalled
async fn drain_deadline(draining: &Notify, timeout: Duration) {
    draining.notified().await;
    tokio::time::sleep(timeout).await;
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use policyreply_common::embeddings::MockEmbedder;
    use policyreply_common::llm::MockCompletion;
    use policyreply_common::retrieval::InMemoryRetriever;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn test_router(reply: &str) -> Router {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(64));
        let retriever = InMemoryRetriever::from_texts(
            vec![
                (
                    "Refunds are issued within 14 days of purchase.".to_string(),
                    Some("refunds.md".to_string()),
                ),
                (
                    "Shipping takes five business days.".to_string(),
                    Some("shipping.md".to_string()),
                ),
            ],
            embedder.clone(),
        )
        .await
        .unwrap();

        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;

        create_router(AppState::new(
            config,
            Arc::new(retriever),
            embedder,
            Arc::new(MockCompletion::new(reply)),
        ))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_router("unused").await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_answer_endpoint() {
        let app = test_router("Refunds are issued within 14 days.").await;
        let response = app
            .oneshot(post_json(
                "/v1/answer",
                serde_json::json!({"question": "How are refunds issued?"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["answer"], "Refunds are issued within 14 days.");
        assert!(body["message"].as_str().unwrap().contains("Answer:\n"));
        assert!(body["sources"].as_array().unwrap().len() <= 3);
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let app = test_router("unused").await;
        let response = app
            .oneshot(post_json("/v1/answer", serde_json::json!({"question": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_inbound_skips_no_reply_sender() {
        let app = test_router("unused").await;
        let response = app
            .oneshot(post_json(
                "/v1/inbound",
                serde_json::json!({
                    "sender": "no-reply@billing.example.com",
                    "subject": "Invoice",
                    "body": "Your invoice is attached."
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["action"], "skip");
        assert_eq!(body["reason"], "automated_sender");
    }

    #[tokio::test]
    async fn test_inbound_reply() {
        let app = test_router("Refunds are issued within 14 days.").await;
        let response = app
            .oneshot(post_json(
                "/v1/inbound",
                serde_json::json!({
                    "sender": "customer@example.com",
                    "body": "How long do refunds take?"
                }),
            ))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["action"], "reply");
        assert_eq!(body["to"], "customer@example.com");
        assert_eq!(body["subject"], "Re: (no subject)");
        assert!(body["body"]
            .as_str()
            .unwrap()
            .starts_with("This is an auto-generated email."));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_format() {
        let app = test_router("unused").await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/answer")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"question\": "))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "INVALID_FORMAT");
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(request_timeout_layer(Duration::from_millis(20)));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_metric_descriptions_reach_exporter() {
        let handle = install_metrics().unwrap();
        metrics::record_inbound("replied");

        let rendered = handle.render();
        assert!(rendered.contains("policyreply_inbound_messages_total"));
        assert!(rendered.contains("Inbound messages by triage outcome"));
    }

    #[tokio::test]
    async fn test_drain_deadline_waits_for_signal() {
        let draining = Notify::new();
        let timeout = Duration::from_millis(10);

        let before_signal =
            tokio::time::timeout(Duration::from_millis(50), drain_deadline(&draining, timeout)).await;
        assert!(before_signal.is_err());

        draining.notify_one();
        let after_signal =
            tokio::time::timeout(Duration::from_secs(1), drain_deadline(&draining, timeout)).await;
        assert!(after_signal.is_ok());
    }
}
