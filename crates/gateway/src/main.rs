//! AskDocs API Gateway
//!
//! HTTP front end for the question pipeline.
//! Handles:
//! - Session lifecycle and document uploads
//! - Question answering over documents, the web, or both
//! - Rate limiting
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;
mod session_store;

use anyhow::Context;
use askdocs_common::{
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    llm::create_language_model,
    metrics::{self, LATENCY_BUCKETS, METRICS_PREFIX, MODEL_BUCKETS},
    pipeline::{PipelineConfig, RagPipeline},
    web_search::create_web_search,
    VERSION,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use middleware::rate_limit::{rate_limit_middleware, GlobalRateLimit};
use middleware::request_metrics::track_metrics;
use session_store::SessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<RagPipeline>,
    pub sessions: SessionStore,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.observability);

    info!("Starting AskDocs API Gateway v{}", VERSION);

    let prometheus = install_metrics_recorder()?;
    metrics::register_metrics();

    let embedder = create_embedder(&config.embedding)?;
    let web_search = create_web_search(&config.web_search)?;
    let model = create_language_model(&config.llm)?;

    if !web_search.is_configured() {
        warn!(
            provider = web_search.provider_name(),
            "Web search is not configured; web and time-sensitive questions will get the empty-context advisory, hybrid questions will use documents only"
        );
    }

    info!(
        llm = model.model_name(),
        embedder = embedder.model_name(),
        web_search = web_search.provider_name(),
        "Pipeline adapters ready"
    );

    let pipeline = RagPipeline::new(embedder, web_search, model, PipelineConfig::from(&config));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let shutdown_timeout = config.shutdown_timeout();

    let state = AppState {
        config: Arc::new(config),
        pipeline: Arc::new(pipeline),
        sessions: SessionStore::new(),
        metrics: Some(prometheus),
    };

    if let Some(idle) = state.config.session_idle_timeout() {
        state.sessions.spawn_eviction(idle);
        info!(idle_secs = idle.as_secs(), "Idle session eviction enabled");
    }

    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tokio::spawn(async move {
                tokio::time::sleep(shutdown_timeout).await;
                warn!("Graceful shutdown timed out, exiting");
                std::process::exit(1);
            });
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_model_duration_seconds", METRICS_PREFIX)),
            MODEL_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_index_build_duration_seconds", METRICS_PREFIX)),
            MODEL_BUCKETS,
        )?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
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

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))

        // Session endpoints
        .route("/sessions", post(handlers::sessions::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route("/sessions/{id}/documents", post(handlers::documents::upload_documents))
        .route("/sessions/{id}/ask", post(handlers::ask::ask))
        .route_layer(from_fn(track_metrics));

    let mut app = Router::new().nest("/v1", api_routes);

    if state.config.rate_limit.enabled {
        let limit = GlobalRateLimit::from(&state.config.rate_limit);
        app = app.layer(from_fn_with_state(limit, rate_limit_middleware));
    }

    app.layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
    use askdocs_common::embeddings::HashEmbedder;
    use askdocs_common::llm::EchoLanguageModel;
    use askdocs_common::web_search::DisabledSearch;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state(config: AppConfig) -> AppState {
        let pipeline = RagPipeline::new(
            Arc::new(HashEmbedder::new(128)),
            Arc::new(DisabledSearch),
            Arc::new(EchoLanguageModel),
            PipelineConfig::from(&config),
        );

        AppState {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            sessions: SessionStore::new(),
            metrics: None,
        }
    }

    fn test_app() -> Router {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        create_router(test_state(config))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_request(uri: &str, files: &[(&str, &str)]) -> Request<Body> {
        let boundary = "askdocs-test-boundary";
        let mut body = String::new();
        for (name, content) in files {
            body.push_str(&format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n\
                 {content}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));

        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn create_session(app: &Router) -> String {
        let (status, body) = send(app, json_request("POST", "/v1/sessions", json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&test_app(), get_request("/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_adapters() {
        let (status, body) = send(&test_app(), get_request("/v1/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["llm_model"], "echo");
        assert_eq!(body["checks"]["web_search"]["configured"], false);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let app = test_app();
        let id = create_session(&app).await;

        let (status, body) = send(&app, get_request(&format!("/v1/sessions/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chunk_count"], 0);
        assert_eq!(body["history_length"], 0);
        assert_eq!(body["indexed"], false);

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/sessions/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, get_request(&format!("/v1/sessions/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_ask_without_documents_returns_advisory() {
        let app = test_app();
        let id = create_session(&app).await;

        let (status, body) = send(
            &app,
            json_request("POST", &format!("/v1/sessions/{id}/ask"), json!({ "question": "What is this about?" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "empty_context");
        assert_eq!(body["mode"], "doc");
        assert_eq!(body["document_sources"], json!([]));
    }

    #[tokio::test]
    async fn test_upload_then_ask() {
        let app = test_app();
        let id = create_session(&app).await;

        let (status, body) = send(
            &app,
            upload_request(
                &format!("/v1/sessions/{id}/documents"),
                &[("notes.txt", "Ducks need a pond or a deep water dish.")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["uploaded"], json!(["notes.txt"]));
        assert_eq!(body["chunk_count"], 1);

        let (status, body) = send(
            &app,
            json_request("POST", &format!("/v1/sessions/{id}/ask"), json!({ "question": "What do ducks need?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "answered");
        assert_eq!(body["document_sources"], json!(["notes.txt"]));
        assert_eq!(body["citations"][0]["source"], "notes.txt");

        let (_, body) = send(&app, get_request(&format!("/v1/sessions/{id}"))).await;
        assert_eq!(body["history_length"], 1);
        assert_eq!(body["indexed"], true);
    }

    #[tokio::test]
    async fn test_repeated_file_name_in_one_upload_is_indexed_once() {
        let app = test_app();
        let id = create_session(&app).await;

        let (status, body) = send(
            &app,
            upload_request(
                &format!("/v1/sessions/{id}/documents"),
                &[("a.txt", "Old draft about fences."), ("a.txt", "Final notes about gates.")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["chunk_count"], 1);

        let (_, body) = send(
            &app,
            json_request("POST", &format!("/v1/sessions/{id}/ask"), json!({ "question": "What about gates?" })),
        )
        .await;
        assert!(body["answer_text"].as_str().unwrap().contains("Final notes about gates."));
    }

    #[tokio::test]
    async fn test_unconfigured_web_search_degrades_by_mode() {
        let app = test_app();
        let id = create_session(&app).await;
        send(
            &app,
            upload_request(&format!("/v1/sessions/{id}/documents"), &[("coop.md", "The coop door closes at dusk.")]),
        )
        .await;
        let ask_uri = format!("/v1/sessions/{id}/ask");

        let (_, web) = send(
            &app,
            json_request("POST", &ask_uri, json!({ "question": "When does the coop close?", "web_search": true })),
        )
        .await;
        assert_eq!(web["mode"], "web");
        assert_eq!(web["status"], "empty_context");

        let (_, recent) = send(
            &app,
            json_request("POST", &ask_uri, json!({ "question": "Coop news today?" })),
        )
        .await;
        assert_eq!(recent["mode"], "web");
        assert_eq!(recent["status"], "empty_context");

        let (_, hybrid) = send(
            &app,
            json_request("POST", &ask_uri, json!({ "question": "When does the coop close?", "hybrid": true })),
        )
        .await;
        assert_eq!(hybrid["mode"], "hybrid");
        assert_eq!(hybrid["status"], "answered");
        assert_eq!(hybrid["document_sources"], json!(["coop.md"]));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let app = test_app();
        let first = create_session(&app).await;
        let second = create_session(&app).await;

        send(
            &app,
            upload_request(&format!("/v1/sessions/{first}/documents"), &[("a.md", "Private notes.")]),
        )
        .await;

        let (_, body) = send(
            &app,
            json_request("POST", &format!("/v1/sessions/{second}/ask"), json!({ "question": "Private notes?" })),
        )
        .await;
        assert_eq!(body["status"], "empty_context");
    }

    #[tokio::test]
    async fn test_unsupported_upload_is_rejected() {
        let app = test_app();
        let id = create_session(&app).await;

        let (status, body) = send(
            &app,
            upload_request(&format!("/v1/sessions/{id}/documents"), &[("data.csv", "a,b,c")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "UNSUPPORTED_DOCUMENT");

        let (_, body) = send(&app, get_request(&format!("/v1/sessions/{id}"))).await;
        assert_eq!(body["chunk_count"], 0);
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let app = test_app();
        let id = create_session(&app).await;

        let (status, body) = send(
            &app,
            json_request("POST", &format!("/v1/sessions/{id}/ask"), json!({ "question": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_ask_unknown_session() {
        let (status, _) = send(
            &test_app(),
            json_request(
                "POST",
                &format!("/v1/sessions/{}/ask", uuid::Uuid::new_v4()),
                json!({ "question": "hello?" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = create_router(test_state(config));

        let (first, _) = send(&app, get_request("/v1/health")).await;
        let (second, body) = send(&app, get_request("/v1/health")).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_new_sessions_are_seeded() {
        let dir = std::env::temp_dir().join(format!("askdocs-seed-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("handbook.md"), "Gates must be closed at night.").unwrap();

        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        config.retrieval.seed_dir = Some(dir.display().to_string());
        let app = create_router(test_state(config));

        let (status, body) = send(&app, json_request("POST", "/v1/sessions", json!({}))).await;
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["documents"][0]["name"], "handbook.md");
    }
}
