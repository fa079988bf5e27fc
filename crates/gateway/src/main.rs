//! DocQA API Gateway
//!
//! HTTP front end for the question-answering pipeline.
//! Handles:
//! - Backend construction from configuration
//! - Request validation and routing
//! - Observability (logging, metrics, request ids)

mod handlers;

use axum::{
    extract::Request,
    routing::{get, post},
    Router,
};
use docqa_common::{
    config::AppConfig,
    db::DbPool,
    embeddings::create_embedder,
    errors::Result,
    llm::create_generator,
    metrics,
    telemetry::init_tracing,
    Embedder,
};
use docqa_context::{Collaborators, DocQa, DocQaSettings};
use docqa_search::{
    rerank::create_rerank_provider,
    retrieval::{create_lexical_index, PgVectorIndex},
    FusionPolicy,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub qa: Arc<DocQa>,
    pub embedder: Arc<dyn Embedder>,
    pub db: Option<Arc<DbPool>>,
    pub metrics: PrometheusHandle,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    init_tracing(&config.observability);
    info!("Starting DocQA API Gateway v{}", docqa_common::VERSION);

    // Initialize metrics
    let prometheus = PrometheusBuilder::new().install_recorder()?;
    metrics::register_metrics();

    // Initialize backends
    info!("Connecting to database...");
    let db = Arc::new(DbPool::new(&config.database).await?);
    let embedder = create_embedder(&config.embedding, config.retry.policy())?;
    let qa = build_pipeline(&config, db.clone(), embedder.clone())?;

    let state = AppState {
        config: config.clone(),
        qa: Arc::new(qa),
        embedder,
        db: Some(db),
        metrics: prometheus,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wire the configured backends into an orchestrator
fn build_pipeline(config: &AppConfig, db: Arc<DbPool>, embedder: Arc<dyn Embedder>) -> Result<DocQa> {
    let retry = config.retry.policy();

    let collaborators = Collaborators {
        embedder,
        vector_index: Arc::new(PgVectorIndex::new(db.clone(), &config.vector)?),
        lexical_index: create_lexical_index(db, &config.vector, &config.lexical)?,
        rerank_provider: create_rerank_provider(&config.rerank)?,
        generator: create_generator(&config.llm, retry.clone())?,
    };

    let fusion = FusionPolicy::from_config(&config.retrieval);
    info!(
        fusion = fusion.name(),
        lexical = ?config.lexical.backend,
        rerank = %config.rerank.provider,
        llm = %config.llm.provider,
        "Pipeline configured"
    );

    DocQa::new(collaborators, fusion, retry, DocQaSettings::from_config(config))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Request spans carry the service name into every pipeline log line
    let service = state.config.observability.service_name.clone();
    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request| {
        tracing::info_span!(
            "http_request",
            service = %service,
            method = %request.method(),
            uri = %request.uri()
        )
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/doc_qa", post(handlers::qa::doc_qa))
        .route("/embedding", post(handlers::embedding::embedding));

    Router::new()
        .nest("/v1", api_routes)
        .route("/metrics", get(handlers::health::metrics))
        .layer(trace)
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
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
            Ok(mut sig) => {
                sig.recv().await;
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
    use docqa_common::embeddings::MockEmbedder;
    use docqa_common::llm::MockGenerator;
    use docqa_common::retry::RetryPolicy;
    use docqa_search::rerank::MockReranker;
    use docqa_search::{Backend, LexicalIndex, Passage, RankedList, VectorIndex};
    use serde_json::Value;
    use tower::ServiceExt;

    struct FixedIndex(Vec<(Passage, f32)>);

    #[async_trait::async_trait]
    impl VectorIndex for FixedIndex {
        async fn search(&self, _embedding: &[f32], limit: usize) -> Result<RankedList> {
            Ok(RankedList::from_hits(Backend::Vector, self.0.iter().take(limit).cloned()))
        }

        fn name(&self) -> &str {
            "fixed_vector"
        }
    }

    #[async_trait::async_trait]
    impl LexicalIndex for FixedIndex {
        async fn search(&self, _query: &str, limit: usize) -> Result<RankedList> {
            Ok(RankedList::from_hits(Backend::Lexical, self.0.iter().take(limit).cloned()))
        }

        fn name(&self) -> &str {
            "fixed_lexical"
        }
    }

    fn test_state() -> AppState {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(8));
        let collaborators = Collaborators {
            embedder: embedder.clone(),
            vector_index: Arc::new(FixedIndex(vec![
                (Passage::new("The GPT store opened in January", "news.txt"), 0.92),
            ])),
            lexical_index: Arc::new(FixedIndex(vec![
                (Passage::new("Custom GPTs are listed in the store", "blog.md"), 6.5),
            ])),
            rerank_provider: Arc::new(MockReranker),
            generator: Arc::new(MockGenerator),
        };
        let qa = DocQa::new(
            collaborators,
            FusionPolicy::Union,
            RetryPolicy::none(),
            DocQaSettings::default(),
        )
        .unwrap();

        AppState {
            config: Arc::new(AppConfig::default()),
            qa: Arc::new(qa),
            embedder,
            db: None,
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_doc_qa_success() {
        let app = create_router(test_state());
        let (status, body) = post_json(
            app,
            "/v1/doc_qa",
            serde_json::json!({"query": "When did the GPT store open?"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["question"], "When did the GPT store open?");
        assert!(body["contexts"].as_str().unwrap().starts_with("<1>: "));
        assert!(body["sources"].as_str().unwrap().contains("news.txt"));
        assert_eq!(body["citations"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_doc_qa_model_override() {
        let app = create_router(test_state());
        let (status, body) = post_json(
            app,
            "/v1/doc_qa",
            serde_json::json!({"query": "store?", "model": "gpt-4"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].as_str().unwrap().contains("mock:gpt-4"));
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let app = create_router(test_state());
        let (status, body) = post_json(app, "/v1/doc_qa", serde_json::json!({"query": ""})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_blank_query_reports_query_and_stage() {
        let app = create_router(test_state());
        let (status, body) = post_json(app, "/v1/doc_qa", serde_json::json!({"query": "   "})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["stage"], "validate");
    }

    #[tokio::test]
    async fn test_embedding_endpoint() {
        let app = create_router(test_state());
        let (status, body) = post_json(
            app,
            "/v1/embedding",
            serde_json::json!({"text": "GPT store\nopening date"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "GPT store\nopening date");
        assert_eq!(body["dimensions"], 8);
        assert_eq!(body["embedding"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_embedding_replaces_newlines() {
        let app = create_router(test_state());
        let (_, with_newline) = post_json(
            app.clone(),
            "/v1/embedding",
            serde_json::json!({"text": "GPT store\nopening date"}),
        )
        .await;
        let (_, with_space) = post_json(
            app,
            "/v1/embedding",
            serde_json::json!({"text": "GPT store opening date"}),
        )
        .await;

        assert_eq!(with_newline["embedding"], with_space["embedding"]);
    }

    #[tokio::test]
    async fn test_embedding_rejects_empty_text() {
        let app = create_router(test_state());
        let (status, body) = post_json(app, "/v1/embedding", serde_json::json!({"text": ""})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["field"], "text");
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = create_router(test_state());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/v1/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["database"]["status"], "not_configured");
    }
}
