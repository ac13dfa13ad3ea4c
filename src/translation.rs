//! Translation gateway.
//!
//! Stateless boundary taking `(text, from, to)` language names and
//! returning translated text. Request validation and catalog lookup happen
//! here; the actual work is delegated to a swappable
//! [`TranslationBackend`].

use crate::config::{Config, TranslationBackendKind};
use crate::languages::{Language, LanguageSpec};
use crate::metrics::GatewayMetrics;
use crate::retry::{is_retryable_error, with_retry_if, ProviderStatusError, RetryConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    /// Missing or empty request fields
    #[error("{0}")]
    InvalidInput(String),

    /// Language name not in the catalog
    #[error("Unsupported language: {0}")]
    Unsupported(String),

    /// Provider unreachable or answered with an error
    #[error("Failed to translate text: {0}")]
    UpstreamFailure(String),
}

/// What the panel state machine needs from a translation service.
///
/// Implemented in-process by [`TranslationGateway`] and over HTTP by
/// `client::ApiClient`.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, from: &str, to: &str)
        -> Result<String, TranslationError>;
}

/// A translation provider. Receives catalog entries, never raw names.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate(&self, text: &str, from: &LanguageSpec, to: &LanguageSpec)
        -> Result<String>;
}

pub struct TranslationGateway {
    backend: Arc<dyn TranslationBackend>,
    metrics: Arc<GatewayMetrics>,
}

impl TranslationGateway {
    pub fn new(backend: Arc<dyn TranslationBackend>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { backend, metrics }
    }

    /// Build the gateway for the backend selected in config.
    pub fn from_config(
        config: &Config,
        client: reqwest::Client,
        metrics: Arc<GatewayMetrics>,
    ) -> Result<Self> {
        let backend: Arc<dyn TranslationBackend> = match config.translation_backend {
            TranslationBackendKind::Google => Arc::new(GoogleTranslateBackend::new(
                client,
                &config.google_translate_url,
            )),
            TranslationBackendKind::OpenAi => {
                let api_key = config
                    .openai_api_key
                    .clone()
                    .context("OPENAI_API_KEY not set")?;
                Arc::new(OpenAiTranslationBackend::new(
                    client,
                    &config.openai_api_url,
                    api_key,
                    &config.openai_model,
                ))
            }
        };
        Ok(Self::new(backend, metrics))
    }
}

#[async_trait]
impl Translator for TranslationGateway {
    async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<String, TranslationError> {
        if text.is_empty() || from.is_empty() || to.is_empty() {
            return Err(TranslationError::InvalidInput(
                "Missing required parameters".to_string(),
            ));
        }

        let from_lang =
            Language::from_name(from).map_err(|_| TranslationError::Unsupported(from.to_string()))?;
        let to_lang =
            Language::from_name(to).map_err(|_| TranslationError::Unsupported(to.to_string()))?;

        if from_lang == to_lang {
            return Ok(text.to_string());
        }

        self.metrics.record_translation_call();
        match self
            .backend
            .translate(text, from_lang.spec(), to_lang.spec())
            .await
        {
            Ok(translated) => {
                debug!("Translated {} chars {} -> {}", text.len(), from, to);
                Ok(translated)
            }
            Err(e) => {
                self.metrics.record_translation_failure();
                error!("Translation error ({} -> {}): {:#}", from, to, e);
                Err(TranslationError::UpstreamFailure(e.to_string()))
            }
        }
    }
}

// ==================== Google web-translate backend ====================

/// The keyless `translate_a/single` endpoint used by browser extensions.
pub struct GoogleTranslateBackend {
    client: reqwest::Client,
    url: String,
    retry: RetryConfig,
}

impl GoogleTranslateBackend {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            retry: RetryConfig::translation(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// The response is nested arrays; element 0 lists `[translated, original, ..]`
/// segments which concatenate to the full translation.
fn parse_google_response(body: &serde_json::Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(|v| v.as_array())
        .context("Google translate response has no segment list")?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(|s| s.as_str()))
        .collect();

    if translated.is_empty() {
        anyhow::bail!("Google translate response contained no translation");
    }
    Ok(translated)
}

#[async_trait]
impl TranslationBackend for GoogleTranslateBackend {
    async fn translate(
        &self,
        text: &str,
        from: &LanguageSpec,
        to: &LanguageSpec,
    ) -> Result<String> {
        with_retry_if(
            &self.retry,
            &format!("Translation {} -> {}", from.name, to.name),
            || async {
                let response = self
                    .client
                    .get(&self.url)
                    .query(&[
                        ("client", "gtx"),
                        ("sl", from.code),
                        ("tl", to.code),
                        ("dt", "t"),
                        ("q", text),
                    ])
                    .send()
                    .await
                    .context("Failed to send request to Google translate")?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
                    return Err(ProviderStatusError {
                        provider: "Google translate",
                        status,
                        body,
                    }
                    .into());
                }

                let body: serde_json::Value = response
                    .json()
                    .await
                    .context("Failed to parse Google translate response")?;
                parse_google_response(&body)
            },
            is_retryable_error,
        )
        .await
    }
}

// ==================== OpenAI backend ====================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Reasoning models reject a temperature parameter
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

fn build_system_prompt(from: &str, to: &str) -> String {
    format!(
        "You are a professional translator. Translate the user's message from {} to {}. \
         Reply with the translation only: no quotes, notes, or explanations. \
         Preserve line breaks, punctuation and emojis.",
        from, to
    )
}

pub struct OpenAiTranslationBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl OpenAiTranslationBackend {
    pub fn new(client: reqwest::Client, url: &str, api_key: String, model: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key,
            model: model.to_string(),
            retry: RetryConfig::translation(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl TranslationBackend for OpenAiTranslationBackend {
    async fn translate(
        &self,
        text: &str,
        from: &LanguageSpec,
        to: &LanguageSpec,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: build_system_prompt(from.name, to.name),
                },
                Message {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: if is_reasoning_model(&self.model) {
                None
            } else {
                Some(0.3)
            },
        };

        with_retry_if(
            &self.retry,
            &format!("Translation {} -> {}", from.name, to.name),
            || async {
                let response = self
                    .client
                    .post(&self.url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&request)
                    .send()
                    .await
                    .context("Failed to send translation request to OpenAI API")?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
                    return Err(ProviderStatusError {
                        provider: "OpenAI",
                        status,
                        body,
                    }
                    .into());
                }

                let chat_response: ChatResponse = response
                    .json()
                    .await
                    .context("Failed to parse OpenAI translation response")?;

                chat_response
                    .choices
                    .first()
                    .map(|c| c.message.content.trim().to_string())
                    .context("OpenAI translation response contained no choices")
            },
            is_retryable_error,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::LanguageRegistry;
    use std::sync::Mutex;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    /// Backend that records calls and answers from a closure
    struct FakeBackend {
        calls: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl FakeBackend {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl TranslationBackend for FakeBackend {
        async fn translate(
            &self,
            text: &str,
            from: &LanguageSpec,
            to: &LanguageSpec,
        ) -> Result<String> {
            self.calls.lock().unwrap().push((
                text.to_string(),
                from.code.to_string(),
                to.code.to_string(),
            ));
            if self.fail {
                anyhow::bail!("provider down");
            }
            Ok(format!("[{}] {}", to.code, text))
        }
    }

    fn spec(name: &str) -> &'static LanguageSpec {
        LanguageRegistry::get().lookup(name).unwrap()
    }

    fn google_body(segments: &[&str]) -> serde_json::Value {
        let parts: Vec<_> = segments
            .iter()
            .map(|s| serde_json::json!([s, "original", null, null, 10]))
            .collect();
        serde_json::json!([parts, null, "en"])
    }

    // ==================== Gateway Tests ====================

    #[tokio::test]
    async fn test_gateway_passes_codes_to_backend() {
        let backend = FakeBackend::new(false);
        let metrics = Arc::new(GatewayMetrics::new());
        let gateway = TranslationGateway::new(backend.clone(), metrics.clone());

        let result = gateway.translate("Hello", "English", "Spanish").await;

        assert_eq!(result.unwrap(), "[es] Hello");
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0], ("Hello".into(), "en".into(), "es".into()));
        assert_eq!(metrics.report().translation_calls, 1);
    }

    #[test]
    fn test_from_config_requires_openai_key() {
        let mut config = crate::config::test_config();
        let metrics = Arc::new(GatewayMetrics::new());
        assert!(TranslationGateway::from_config(&config, reqwest::Client::new(), metrics.clone()).is_ok());

        config.translation_backend = TranslationBackendKind::OpenAi;
        assert!(TranslationGateway::from_config(&config, reqwest::Client::new(), metrics.clone()).is_err());

        config.openai_api_key = Some("sk-test".to_string());
        assert!(TranslationGateway::from_config(&config, reqwest::Client::new(), metrics).is_ok());
    }

    #[tokio::test]
    async fn test_gateway_rejects_missing_params() {
        let gateway = TranslationGateway::new(FakeBackend::new(false), Arc::new(GatewayMetrics::new()));

        for (text, from, to) in [("", "English", "Spanish"), ("hi", "", "Spanish"), ("hi", "English", "")] {
            assert!(matches!(
                gateway.translate(text, from, to).await,
                Err(TranslationError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_gateway_rejects_unknown_language() {
        let backend = FakeBackend::new(false);
        let gateway = TranslationGateway::new(backend.clone(), Arc::new(GatewayMetrics::new()));

        let result = gateway.translate("Hello", "English", "Klingon").await;

        assert_eq!(result, Err(TranslationError::Unsupported("Klingon".to_string())));
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_same_language_skips_backend() {
        let backend = FakeBackend::new(false);
        let gateway = TranslationGateway::new(backend.clone(), Arc::new(GatewayMetrics::new()));

        let result = gateway.translate("Bonjour", "French", "French").await;

        assert_eq!(result.unwrap(), "Bonjour");
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_maps_backend_failure() {
        let metrics = Arc::new(GatewayMetrics::new());
        let gateway = TranslationGateway::new(FakeBackend::new(true), metrics.clone());

        let result = gateway.translate("Hello", "English", "German").await;

        assert!(matches!(result, Err(TranslationError::UpstreamFailure(_))));
        assert_eq!(metrics.report().translation_failures, 1);
    }

    // ==================== Google Backend Tests ====================

    #[test]
    fn test_parse_google_response_joins_segments() {
        let body = google_body(&["Hola. ", "¿Cómo estás?"]);
        assert_eq!(parse_google_response(&body).unwrap(), "Hola. ¿Cómo estás?");
    }

    #[test]
    fn test_parse_google_response_rejects_garbage() {
        assert!(parse_google_response(&serde_json::json!({"error": 1})).is_err());
        assert!(parse_google_response(&serde_json::json!([[]])).is_err());
    }

    #[tokio::test]
    async fn test_google_backend_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/translate_a/single"))
            .and(query_param("sl", "en"))
            .and(query_param("tl", "fr"))
            .and(query_param("q", "Good morning"))
            .respond_with(ResponseTemplate::new(200).set_body_json(google_body(&["Bonjour"])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = GoogleTranslateBackend::new(
            reqwest::Client::new(),
            &format!("{}/translate_a/single", mock_server.uri()),
        );

        let result = backend
            .translate("Good morning", spec("English"), spec("French"))
            .await
            .expect("Should succeed");

        assert_eq!(result, "Bonjour");
    }

    #[tokio::test]
    async fn test_google_backend_client_error_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = GoogleTranslateBackend::new(
            reqwest::Client::new(),
            &format!("{}/translate_a/single", mock_server.uri()),
        )
        .with_retry(RetryConfig::new(3, std::time::Duration::from_millis(1)));

        let result = backend.translate("x", spec("English"), spec("French")).await;

        assert!(result.unwrap_err().to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_google_backend_server_error_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&mock_server)
            .await;

        let backend = GoogleTranslateBackend::new(
            reqwest::Client::new(),
            &format!("{}/translate_a/single", mock_server.uri()),
        )
        .with_retry(RetryConfig::new(2, std::time::Duration::from_millis(1)));

        assert!(backend
            .translate("x", spec("English"), spec("French"))
            .await
            .is_err());
    }

    // ==================== OpenAI Backend Tests ====================

    fn create_openai_response(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [
                {
                    "index": 0,
                    "message": { "role": "assistant", "content": content },
                    "finish_reason": "stop"
                }
            ]
        })
    }

    #[test]
    fn test_system_prompt_names_both_languages() {
        let prompt = build_system_prompt("English", "Korean");
        assert!(prompt.contains("from English to Korean"));
        assert!(prompt.contains("translation only"));
    }

    #[test]
    fn test_reasoning_model_detection() {
        assert!(is_reasoning_model("o3-mini"));
        assert!(is_reasoning_model("gpt-5"));
        assert!(!is_reasoning_model("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_openai_backend_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-openai-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_openai_response("  Guten Tag \n")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = OpenAiTranslationBackend::new(
            reqwest::Client::new(),
            &format!("{}/v1/chat/completions", mock_server.uri()),
            "test-openai-key".to_string(),
            "gpt-4o-mini",
        );

        let result = backend
            .translate("Good day", spec("English"), spec("German"))
            .await
            .expect("Should succeed");

        assert_eq!(result, "Guten Tag");
    }

    #[tokio::test]
    async fn test_openai_backend_empty_choices() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&mock_server)
            .await;

        let backend = OpenAiTranslationBackend::new(
            reqwest::Client::new(),
            &format!("{}/v1/chat/completions", mock_server.uri()),
            "k".to_string(),
            "gpt-4o-mini",
        )
        .with_retry(RetryConfig::no_retry());

        let err = backend
            .translate("x", spec("English"), spec("German"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
