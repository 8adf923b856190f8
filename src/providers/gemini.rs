use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiKey;
use crate::model::{GenerateBackend, GenerateFuture, Generation, ModelError};
use crate::providers::http_errors::provider_request_error;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<u16>,
    #[serde(default)]
    message: String,
    status: Option<String>,
}

fn generate_url(base_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    )
}

fn describe_api_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope.error.code.unwrap_or(status.as_u16());
            let label = envelope
                .error
                .status
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("UNKNOWN").to_string());
            format!("{code} {label}. {}", envelope.error.message)
        }
        Err(_) => format!("{status}: {}", body.trim()),
    }
}

pub struct GeminiBackend {
    http: Client,
    api_key: ApiKey,
    base_url: String,
    timeout_secs: Option<u64>,
}

impl GeminiBackend {
    pub fn new(
        api_key: ApiKey,
        base_url: impl Into<String>,
        timeout_secs: Option<u64>,
    ) -> reqwest::Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http: builder.build()?,
            api_key,
            base_url: base_url.into(),
            timeout_secs,
        })
    }

    async fn generate_content(&self, model: &str, prompt: &str) -> Generation {
        let api_url = generate_url(&self.base_url, model);
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        };
        debug!(api_url = %api_url, model = %model, "sending gemini generateContent request");

        let response = self
            .http
            .post(&api_url)
            .header(API_KEY_HEADER, self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(api_url = %api_url, model = %model, error = %err, "gemini request failed");
                provider_request_error(err, &api_url, self.timeout_secs)
            })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|err| provider_request_error(err, &api_url, self.timeout_secs))?;

        if !status.is_success() {
            warn!(
                api_url = %api_url,
                model = %model,
                status = %status,
                response_body_len = response_body.len(),
                "gemini returned non-success status"
            );
            return Err(ModelError::Provider(describe_api_error(
                status,
                &response_body,
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response_body)
            .map_err(|err| {
                ModelError::Unexpected(format!("Failed to parse model response: {err}"))
            })?;
        let text = parsed.into_text();
        debug!(
            model = %model,
            response_len = text.as_ref().map_or(0, String::len),
            "received gemini response"
        );
        Ok(text)
    }
}

impl GenerateBackend for GeminiBackend {
    fn generate<'a>(&'a self, model: &'a str, prompt: &'a str) -> GenerateFuture<'a> {
        Box::pin(self.generate_content(model, prompt))
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode, Uri, header};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    use super::{GeminiBackend, describe_api_error, generate_url};
    use crate::config::ApiKey;
    use crate::model::{GenerateBackend, ModelError, ModelErrorKind};

    #[derive(Debug, Clone)]
    struct RecordedRequest {
        path: String,
        api_key: Option<String>,
        body: Value,
    }

    async fn spawn_fake_gemini(
        status: StatusCode,
        body: &'static str,
    ) -> (String, Arc<Mutex<Vec<RecordedRequest>>>) {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&recorded);
        let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap, payload: Bytes| {
            let log = Arc::clone(&log);
            async move {
                log.lock().expect("request log lock").push(RecordedRequest {
                    path: uri.path().to_string(),
                    api_key: headers
                        .get("x-goog-api-key")
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string),
                    body: serde_json::from_slice(&payload).unwrap_or(Value::Null),
                });
                (status, [(header::CONTENT_TYPE, "application/json")], body)
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake server should run");
        });

        (format!("http://{addr}"), recorded)
    }

    fn backend(base_url: &str) -> GeminiBackend {
        let key = ApiKey::new("test-key").expect("key should be valid");
        GeminiBackend::new(key, base_url, Some(5)).expect("backend should build")
    }

    #[test]
    fn generate_url_trims_trailing_slash() {
        assert_eq!(
            generate_url("https://generativelanguage.googleapis.com/", "gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn describe_api_error_prefers_structured_body() {
        let body = r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            describe_api_error(StatusCode::FORBIDDEN, body),
            "403 PERMISSION_DENIED. API key not valid."
        );
    }

    #[test]
    fn describe_api_error_falls_back_to_raw_body() {
        assert_eq!(
            describe_api_error(StatusCode::BAD_GATEWAY, " upstream down \n"),
            "502 Bad Gateway: upstream down"
        );
    }

    #[tokio::test]
    async fn sends_prompt_and_key_and_joins_text_parts() {
        let (base_url, recorded) = spawn_fake_gemini(
            StatusCode::OK,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Paris"},{"text":" is the capital."}]}}]}"#,
        )
        .await;

        let answer = backend(&base_url)
            .generate("gemini-2.5-flash", "What Is, the Capital-of France?")
            .await
            .expect("generate should succeed");

        assert_eq!(answer.as_deref(), Some("Paris is the capital."));
        let requests = recorded.lock().expect("request log lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].path,
            "/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(requests[0].api_key.as_deref(), Some("test-key"));
        assert_eq!(
            requests[0].body["contents"][0]["parts"][0]["text"],
            "What Is, the Capital-of France?"
        );
        assert_eq!(requests[0].body["contents"][0]["role"], "user");
    }

    #[tokio::test]
    async fn missing_candidates_mean_no_answer() {
        let (base_url, _) = spawn_fake_gemini(StatusCode::OK, r#"{"candidates":[]}"#).await;

        let answer = backend(&base_url)
            .generate("gemini-2.5-flash", "q")
            .await
            .expect("generate should succeed");

        assert_eq!(answer, None);
    }

    #[tokio::test]
    async fn api_error_status_is_classified_as_provider_error() {
        let (base_url, _) = spawn_fake_gemini(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":429,"message":"Quota exceeded.","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .await;

        let err = backend(&base_url)
            .generate("gemini-2.5-flash", "q")
            .await
            .expect_err("generate should fail");

        assert_eq!(
            err,
            ModelError::Provider("429 RESOURCE_EXHAUSTED. Quota exceeded.".to_string())
        );
    }

    #[tokio::test]
    async fn unparseable_success_body_is_unexpected() {
        let (base_url, _) = spawn_fake_gemini(StatusCode::OK, "definitely not json").await;

        let err = backend(&base_url)
            .generate("gemini-2.5-flash", "q")
            .await
            .expect_err("generate should fail");

        assert_eq!(err.kind(), ModelErrorKind::Unexpected);
        assert!(
            err.to_string().contains("Failed to parse model response"),
            "unexpected message: {err}"
        );
    }
}
