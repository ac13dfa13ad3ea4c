//! HTTP client for the translator API.
//!
//! Lets the panel state machine and the speech cache run against a
//! remote server through the same [`Translator`] and [`SpeechSource`]
//! seams the server uses in-process.

use crate::api::{ErrorBody, SpeechRequest, TranslateRequest, TranslateResponse};
use crate::languages::LanguageSpec;
use crate::speech::{SpeechError, SpeechSource};
use crate::translation::{TranslationError, Translator};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, base_url, token))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// The server's language catalog
    pub async fn languages(&self) -> Result<Vec<LanguageSpecDto>> {
        let response = self
            .authorize(self.client.get(self.url("/api/languages")))
            .send()
            .await
            .context("Failed to reach translator API")?;

        if !response.status().is_success() {
            anyhow::bail!("Language list failed with status {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse language list")
    }
}

/// Owned form of a [`LanguageSpec`] as served by `/api/languages`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct LanguageSpecDto {
    pub code: String,
    pub name: String,
    pub voice: String,
}

impl PartialEq<LanguageSpec> for LanguageSpecDto {
    fn eq(&self, other: &LanguageSpec) -> bool {
        self.code == other.code && self.name == other.name && self.voice == other.voice
    }
}

/// Status and server-provided message of a failed call
async fn error_message(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => format!("HTTP {}", status),
    };
    (status, message)
}

#[async_trait]
impl Translator for ApiClient {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, TranslationError> {
        let request = TranslateRequest {
            text: Some(text.to_string()),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
        };

        let response = self
            .authorize(self.client.post(self.url("/api/translate")))
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslationError::UpstreamFailure(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = error_message(response).await;
            debug!("Translate {} -> {} failed: {} {}", from, to, status, message);
            return Err(match status {
                StatusCode::BAD_REQUEST if message == "Invalid language" => {
                    TranslationError::Unsupported(format!("{} -> {}", from, to))
                }
                StatusCode::BAD_REQUEST => TranslationError::InvalidInput(message),
                _ => TranslationError::UpstreamFailure(message),
            });
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::UpstreamFailure(e.to_string()))?;
        Ok(body.translated_text)
    }
}

#[async_trait]
impl SpeechSource for ApiClient {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        let request = SpeechRequest {
            text: Some(text.to_string()),
            language: Some(language.to_string()),
        };

        let response = self
            .authorize(self.client.post(self.url("/api/speech")))
            .json(&request)
            .send()
            .await
            .map_err(|e| SpeechError::UpstreamFailure(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = error_message(response).await;
            return Err(match status {
                StatusCode::BAD_REQUEST if message == "Language not supported for speech" => {
                    SpeechError::Unsupported(language.to_string())
                }
                StatusCode::BAD_REQUEST => SpeechError::InvalidInput(message),
                _ => SpeechError::UpstreamFailure(message),
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SpeechError::UpstreamFailure(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), Some("secret".to_string())).unwrap()
    }

    // ==================== Translate Tests ====================

    #[tokio::test]
    async fn test_translate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/translate"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({"text": "hello", "from": "English", "to": "Spanish"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translatedText": "hola"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).await.translate("hello", "English", "Spanish").await;
        assert_eq!(result, Ok("hola".to_string()));
    }

    #[tokio::test]
    async fn test_translate_error_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/api/translate"))
            .and(body_json(json!({"text": "x", "from": "English", "to": "Klingon"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Invalid language"})))
            .mount(&server)
            .await;
        Mock::given(path("/api/translate"))
            .and(body_json(json!({"text": "x", "from": "English", "to": "German"})))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "Failed to translate text"})),
            )
            .mount(&server)
            .await;

        let client = client(&server).await;

        assert!(matches!(
            client.translate("x", "English", "Klingon").await,
            Err(TranslationError::Unsupported(_))
        ));
        assert_eq!(
            client.translate("x", "English", "German").await,
            Err(TranslationError::UpstreamFailure("Failed to translate text".to_string()))
        );
    }

    #[tokio::test]
    async fn test_translate_unreachable_server() {
        let client = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        assert!(matches!(
            client.translate("x", "English", "German").await,
            Err(TranslationError::UpstreamFailure(_))
        ));
    }

    // ==================== Speech Tests ====================

    #[tokio::test]
    async fn test_speech_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/speech"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![0xFF, 0xF3, 0x01]),
            )
            .mount(&server)
            .await;

        let audio = client(&server).await.synthesize("hola", "Spanish").await.unwrap();
        assert_eq!(audio, vec![0xFF, 0xF3, 0x01]);
    }

    #[tokio::test]
    async fn test_speech_unsupported_language() {
        let server = MockServer::start().await;
        Mock::given(path("/api/speech"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": "Language not supported for speech"})),
            )
            .mount(&server)
            .await;

        let result = client(&server).await.synthesize("hi", "Klingon").await;
        assert_eq!(result, Err(SpeechError::Unsupported("Klingon".to_string())));
    }

    // ==================== Catalog Tests ====================

    #[tokio::test]
    async fn test_languages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"code": "en", "name": "English", "voice": "af_jessica"}
            ])))
            .mount(&server)
            .await;

        let languages = client(&server).await.languages().await.unwrap();
        assert_eq!(languages.len(), 1);
        assert_eq!(languages[0].name, "English");
    }
}
