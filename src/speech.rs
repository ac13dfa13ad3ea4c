//! Speech gateway and audio cache.
//!
//! [`SpeechGateway`] validates `(text, language)` against the catalog and
//! delegates synthesis to a [`SpeechBackend`]. [`CachedSpeech`] wraps any
//! [`SpeechSource`] with an [`AudioCache`] keyed by `(language, exact
//! text)` so identical requests are synthesized once while they stay
//! cached. The cache is bounded since the server shares one across every
//! caller.

use crate::config::Config;
use crate::languages::{Language, LanguageSpec};
use crate::metrics::GatewayMetrics;
use crate::retry::{is_retryable_error, with_retry_if, ProviderStatusError, RetryConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Language not supported for speech: {0}")]
    Unsupported(String),

    #[error("Speech synthesis is not configured")]
    NotConfigured,

    #[error("Failed to synthesize speech: {0}")]
    UpstreamFailure(String),
}

/// Anything that turns `(text, language name)` into MP3 bytes.
#[async_trait]
pub trait SpeechSource: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError>;
}

/// A text-to-speech provider.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, text: &str, language: &LanguageSpec) -> Result<Vec<u8>>;
}

pub struct SpeechGateway {
    backend: Option<Arc<dyn SpeechBackend>>,
    metrics: Arc<GatewayMetrics>,
}

impl SpeechGateway {
    /// `None` yields a gateway that answers every request with
    /// [`SpeechError::NotConfigured`].
    pub fn new(backend: Option<Arc<dyn SpeechBackend>>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { backend, metrics }
    }

    pub fn from_config(config: &Config, client: reqwest::Client, metrics: Arc<GatewayMetrics>) -> Self {
        let backend = config.google_tts_api_key.as_ref().map(|key| {
            Arc::new(GoogleTtsBackend::new(client, &config.google_tts_url, key.clone()))
                as Arc<dyn SpeechBackend>
        });
        Self::new(backend, metrics)
    }
}

#[async_trait]
impl SpeechSource for SpeechGateway {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        if text.is_empty() || language.is_empty() {
            return Err(SpeechError::InvalidInput(
                "Missing required parameters".to_string(),
            ));
        }

        let language = Language::from_name(language)
            .map_err(|_| SpeechError::Unsupported(language.to_string()))?;

        let backend = self.backend.as_ref().ok_or(SpeechError::NotConfigured)?;

        self.metrics.record_speech_call();
        backend.synthesize(text, language.spec()).await.map_err(|e| {
            self.metrics.record_speech_failure();
            error!("Speech synthesis error ({}): {:#}", language.name(), e);
            SpeechError::UpstreamFailure(e.to_string())
        })
    }
}

// ==================== Audio cache ====================

/// Entry cap used when no explicit capacity is given.
pub const DEFAULT_AUDIO_CACHE_ENTRIES: usize = 256;

type CacheKey = (String, String);

#[derive(Debug, Default)]
struct CacheEntries {
    audio: HashMap<CacheKey, Vec<u8>>,
    /// Insertion order, oldest first
    order: VecDeque<CacheKey>,
}

/// Synthesized audio keyed by `(language name, exact text)`.
///
/// Holds at most `capacity` entries; inserting past the cap evicts the
/// oldest insertion.
#[derive(Debug)]
pub struct AudioCache {
    entries: Mutex<CacheEntries>,
    capacity: usize,
}

impl Default for AudioCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIO_CACHE_ENTRIES)
    }
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of zero disables caching.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(CacheEntries::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, language: &str, text: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .audio
            .get(&(language.to_string(), text.to_string()))
            .cloned()
    }

    pub fn insert(&self, language: &str, text: &str, audio: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }

        let key = (language.to_string(), text.to_string());
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.audio.insert(key.clone(), audio).is_some() {
            return;
        }
        entries.order.push_back(key);

        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.audio.remove(&oldest);
                debug!("Speech cache full, evicted ({}, {} chars)", oldest.0, oldest.1.len());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .audio
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache-first wrapper around a [`SpeechSource`]. Only successful
/// syntheses are cached.
pub struct CachedSpeech<S> {
    inner: S,
    cache: Arc<AudioCache>,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl<S: SpeechSource> CachedSpeech<S> {
    pub fn new(inner: S, cache: Arc<AudioCache>) -> Self {
        Self {
            inner,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl<S: SpeechSource> SpeechSource for CachedSpeech<S> {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        if text.is_empty() {
            return Err(SpeechError::InvalidInput("Nothing to speak".to_string()));
        }

        if let Some(audio) = self.cache.get(language, text) {
            debug!("Speech cache hit ({}, {} chars)", language, text.len());
            if let Some(metrics) = &self.metrics {
                metrics.record_speech_cache_hit();
            }
            return Ok(audio);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_speech_cache_miss();
        }
        let audio = self.inner.synthesize(text, language).await?;
        self.cache.insert(language, text, audio.clone());
        Ok(audio)
    }
}

// ==================== Google Cloud Text-to-Speech ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

pub struct GoogleTtsBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    retry: RetryConfig,
}

impl GoogleTtsBackend {
    pub fn new(client: reqwest::Client, url: &str, api_key: String) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key,
            retry: RetryConfig::speech(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl SpeechBackend for GoogleTtsBackend {
    async fn synthesize(&self, text: &str, language: &LanguageSpec) -> Result<Vec<u8>> {
        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: language.code,
                name: language.voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        };

        let response: SynthesizeResponse = with_retry_if(
            &self.retry,
            &format!("Speech synthesis ({})", language.name),
            || async {
                let response = self
                    .client
                    .post(&self.url)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&request)
                    .send()
                    .await
                    .context("Failed to send request to Google TTS")?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderStatusError {
                        provider: "Google TTS",
                        status,
                        body,
                    }
                    .into());
                }

                response
                    .json::<SynthesizeResponse>()
                    .await
                    .context("Failed to parse Google TTS response")
            },
            is_retryable_error,
        )
        .await?;

        base64::engine::general_purpose::STANDARD
            .decode(response.audio_content)
            .context("Google TTS returned invalid base64 audio")
    }
}
