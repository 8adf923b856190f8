//! Single-page web front end and the JSON `/api/ask` endpoint.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::model::{GenerateBackend, ModelClient, ModelError};
use crate::normalize::{Normalization, normalize};

const INDEX_HTML: &str = include_str!("../static/index.html");

const NOT_CONFIGURED: &str = "Gemini service not configured. Please check your API key.";
const NO_QUESTION: &str = "No question provided";
const EMPTY_QUESTION: &str = "Question cannot be empty";
const NO_ANSWER: &str = "I couldn't generate a response. Please try again.";

/// Shared, read-only state handed to every handler.
pub struct AppState<B> {
    pub client: ModelClient<B>,
}

type AppStateArc<B> = Arc<AppState<B>>;

#[derive(Debug, Serialize)]
struct AskResponse<'a> {
    question: &'a str,
    answer: &'a str,
    preprocessing: &'a Normalization,
    status: &'static str,
}

pub fn router<B>(state: AppStateArc<B>) -> Router
where
    B: GenerateBackend + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/api/ask", post(ask::<B>))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve<B>(cfg: &Config, client: ModelClient<B>) -> Result<()>
where
    B: GenerateBackend + 'static,
{
    if !client.is_ready() {
        warn!("model client not initialized; /api/ask will report the service as not configured");
    }

    let app = router(Arc::new(AppState { client }));
    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
    info!(addr = %addr, model = %cfg.model, "server listening");
    println!("Server running at: http://{addr}");

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn extract_question(body: &[u8]) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    payload.get("question")?.as_str().map(str::to_string)
}

async fn ask<B>(State(state): State<AppStateArc<B>>, body: Bytes) -> Response
where
    B: GenerateBackend + 'static,
{
    if !state.client.is_ready() {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, NOT_CONFIGURED);
    }

    let Some(raw_question) = extract_question(&body) else {
        return error_response(StatusCode::BAD_REQUEST, NO_QUESTION);
    };
    let question = raw_question.trim();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, EMPTY_QUESTION);
    }

    let preprocessing = normalize(question);
    info!(
        tokens = preprocessing.tokens.len(),
        processed = %preprocessing.processed,
        "answering question"
    );

    match state.client.generate(question).await {
        Ok(answer) => {
            let answer = answer.as_deref().unwrap_or(NO_ANSWER);
            let body = AskResponse {
                question,
                answer,
                preprocessing: &preprocessing,
                status: "success",
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(ModelError::Provider(message)) => {
            error!(error = %message, "Gemini API error");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Gemini API Error: {message}"),
            )
        }
        Err(ModelError::NotReady) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, NOT_CONFIGURED)
        }
        Err(ModelError::Unexpected(message)) => {
            error!(error = %message, "unexpected error while answering");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An unexpected error occurred: {message}"),
            )
        }
    }
}
