use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::config::Config;
use crate::providers::gemini::GeminiBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    NotReady,
    Provider,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No credential, or the provider handle could not be built.
    NotReady,
    /// Failure classified by the provider: auth, quota, bad request, network.
    Provider(String),
    Unexpected(String),
}

impl ModelError {
    pub fn kind(&self) -> ModelErrorKind {
        match self {
            Self::NotReady => ModelErrorKind::NotReady,
            Self::Provider(_) => ModelErrorKind::Provider,
            Self::Unexpected(_) => ModelErrorKind::Unexpected,
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => f.write_str("Client not initialized"),
            Self::Provider(message) | Self::Unexpected(message) => f.write_str(message),
        }
    }
}

impl Error for ModelError {}

pub type Generation = Result<Option<String>, ModelError>;
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Generation> + Send + 'a>>;

pub trait GenerateBackend: Send + Sync {
    fn generate<'a>(&'a self, model: &'a str, prompt: &'a str) -> GenerateFuture<'a>;
}

pub struct ModelClient<B = GeminiBackend> {
    model: String,
    backend: Option<B>,
}

impl ModelClient<GeminiBackend> {
    pub fn from_config(cfg: &Config) -> Self {
        let Some(api_key) = cfg.api_key.clone() else {
            warn!("GEMINI_API_KEY is not set; model client left uninitialized");
            return Self::uninitialized(cfg.model.clone());
        };

        match GeminiBackend::new(api_key, &cfg.base_url, cfg.model_timeout_secs) {
            Ok(backend) => Self::with_backend(cfg.model.clone(), backend),
            Err(err) => {
                warn!(error = %err, "failed to build provider HTTP client");
                Self::uninitialized(cfg.model.clone())
            }
        }
    }
}

impl<B> ModelClient<B> {
    pub fn with_backend(model: impl Into<String>, backend: B) -> Self {
        Self {
            model: model.into(),
            backend: Some(backend),
        }
    }

    pub fn uninitialized(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            backend: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl<B> ModelClient<B>
where
    B: GenerateBackend,
{
    /// One round trip to the provider. Empty text comes back as `Ok(None)`.
    pub async fn generate(&self, prompt: &str) -> Generation {
        let Some(backend) = &self.backend else {
            return Err(ModelError::NotReady);
        };

        debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            "dispatching generate request"
        );
        let text = backend.generate(&self.model, prompt).await?;
        Ok(text.filter(|text| !text.is_empty()))
    }
}


#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::stub::StubBackend;
    use super::{ModelClient, ModelError, ModelErrorKind};
    use crate::config::{ApiKey, Config};

    fn test_config(api_key: Option<&str>, base_url: &str) -> Config {
        Config {
            api_key: api_key.and_then(ApiKey::new),
            model: "gemini-2.5-flash".to_string(),
            base_url: base_url.to_string(),
            model_timeout_secs: Some(1),
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }

    fn closed_local_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        drop(listener);
        format!("http://{addr}")
    }

    #[test]
    fn from_config_without_key_is_not_ready() {
        let client = ModelClient::from_config(&test_config(None, "http://localhost"));
        assert!(!client.is_ready());
        assert_eq!(client.model(), "gemini-2.5-flash");
    }

    #[test]
    fn from_config_with_key_is_ready() {
        let client = ModelClient::from_config(&test_config(Some("key"), "http://localhost"));
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn uninitialized_client_never_touches_the_network() {
        // Nothing listens here; a real call would surface a connection error.
        let client = ModelClient::from_config(&test_config(None, &closed_local_url()));

        let err = client
            .generate("anything")
            .await
            .expect_err("uninitialized client should fail");

        assert_eq!(err, ModelError::NotReady);
        assert_eq!(err.kind(), ModelErrorKind::NotReady);
        assert_eq!(err.to_string(), "Client not initialized");
    }

    #[tokio::test]
    async fn ready_client_forwards_prompt_verbatim() {
        let backend = StubBackend::text("Paris");
        let prompts = backend.prompt_log();
        let client = ModelClient::with_backend("gemini-2.5-flash", backend);

        let answer = client
            .generate("What Is, the Capital-of France?")
            .await
            .expect("generate should succeed");

        assert_eq!(answer.as_deref(), Some("Paris"));
        let prompts = prompts.lock().expect("prompt log lock");
        assert_eq!(prompts.as_slice(), ["What Is, the Capital-of France?"]);
    }

    #[tokio::test]
    async fn whitespace_answer_is_returned_verbatim() {
        let client = ModelClient::with_backend("m", StubBackend::text(" "));
        assert_eq!(client.generate("q").await, Ok(Some(" ".to_string())));
    }

    #[tokio::test]
    async fn empty_provider_text_becomes_no_answer() {
        let client = ModelClient::with_backend("m", StubBackend::text(""));
        assert_eq!(client.generate("q").await, Ok(None));

        let client = ModelClient::with_backend("m", StubBackend::empty());
        assert_eq!(client.generate("q").await, Ok(None));
    }

    #[tokio::test]
    async fn provider_errors_keep_their_kind_and_message() {
        let client = ModelClient::with_backend(
            "m",
            StubBackend::fail(ModelError::Provider("429 RESOURCE_EXHAUSTED. quota".into())),
        );

        let err = client.generate("q").await.expect_err("should fail");
        assert_eq!(err.kind(), ModelErrorKind::Provider);
        assert_eq!(err.to_string(), "429 RESOURCE_EXHAUSTED. quota");
    }

    #[tokio::test]
    async fn unexpected_errors_are_distinguished_from_provider_errors() {
        let client = ModelClient::with_backend(
            "m",
            StubBackend::fail(ModelError::Unexpected("bad payload".into())),
        );

        let err = client.generate("q").await.expect_err("should fail");
        assert_eq!(err.kind(), ModelErrorKind::Unexpected);
    }
}
