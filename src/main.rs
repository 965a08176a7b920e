use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use pif_rag::config::Settings;
use pif_rag::models::{AnswerRequest, RagAnswer};
use pif_rag::rag::RagEngine;

const MIN_QUESTION_CHARS: usize = 3;

struct AppState {
    engine: RagEngine,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let settings = Settings::from_env()?;
    tracing::info!("Connecting to embedding service: {}", settings.ollama_url);
    tracing::info!("Connecting to Qdrant: {}", settings.qdrant_url);
    tracing::info!("Connecting to LLM proxy: {}", settings.llm_proxy_url);

    // A broken deployment should fail here, not one question at a time.
    let engine = RagEngine::new(&settings).await?;
    let state = Arc::new(AppState { engine });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/answers", post(answer_handler))
        .route("/api/health", get(health_handler))
        .layer(cors)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("RAG server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");
}

async fn answer_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<RagAnswer>, (StatusCode, String)> {
    let question = request.question.trim();
    if let Err(reason) = validate_question(question) {
        return Err((StatusCode::BAD_REQUEST, reason.to_string()));
    }

    let request_id = Uuid::new_v4();
    tracing::info!(
        "Answering request {} ({} history turns)",
        request_id,
        request.history.len()
    );

    let answer = state
        .engine
        .answer_with_sources(question, &request.history)
        .await;

    tracing::info!(
        "Request {} answered from {} sources (confidence {:.2})",
        request_id,
        answer.sources.len(),
        answer.confidence
    );
    Ok(Json(answer))
}

fn validate_question(question: &str) -> Result<(), &'static str> {
    if question.chars().count() < MIN_QUESTION_CHARS {
        return Err("Question too short! Please enter at least 3 characters.");
    }
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let llm_healthy = state.engine.proxy_healthy().await;

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "llm_proxy": llm_healthy
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_question_rejects_short_input() {
        assert!(validate_question("").is_err());
        assert!(validate_question("ab").is_err());
    }

    #[test]
    fn test_validate_question_accepts_real_questions() {
        assert!(validate_question("ما هي استثمارات نيوم؟").is_ok());
        assert!(validate_question("How did the fund perform?").is_ok());
    }

    #[test]
    fn test_validate_question_counts_chars_not_bytes() {
        // Two Arabic characters are more than three bytes but still too short.
        assert!(validate_question("ما").is_err());
    }
}
