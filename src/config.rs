use crate::speech::DEFAULT_AUDIO_CACHE_ENTRIES;
use anyhow::{bail, Context, Result};

/// Which upstream provider answers translation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationBackendKind {
    /// Public Google web-translate endpoint (no key required)
    Google,
    /// OpenAI chat completions
    OpenAi,
}

impl TranslationBackendKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            other => bail!("Unknown TRANSLATION_BACKEND '{}'. Expected google or openai", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub database_url: Option<String>,

    // Translation
    pub translation_backend: TranslationBackendKind,
    pub google_translate_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_url: String,

    // Speech
    pub google_tts_api_key: Option<String>,
    pub google_tts_url: String,
    pub audio_cache_entries: usize,

    // Access control: "user_id:ROLE:token" triples
    pub auth_tokens: Vec<String>,

    // Terminal client
    pub history_dir: String,
    pub api_url: String,
    pub api_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let translation_backend = TranslationBackendKind::parse(
            &optional_var("TRANSLATION_BACKEND").unwrap_or_else(|| "google".to_string()),
        )?;

        let openai_api_key = optional_var("OPENAI_API_KEY");
        if translation_backend == TranslationBackendKind::OpenAi && openai_api_key.is_none() {
            bail!("OPENAI_API_KEY not set (required when TRANSLATION_BACKEND=openai)");
        }

        Ok(Self {
            port: optional_var("PORT")
                .map(|v| v.parse().context("PORT must be a valid port number"))
                .transpose()?
                .unwrap_or(8080),
            database_url: optional_var("DATABASE_URL"),

            translation_backend,
            google_translate_url: optional_var("GOOGLE_TRANSLATE_URL").unwrap_or_else(|| {
                "https://translate.googleapis.com/translate_a/single".to_string()
            }),
            openai_api_key,
            openai_model: optional_var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_api_url: optional_var("OPENAI_API_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),

            google_tts_api_key: optional_var("GOOGLE_TTS_API_KEY"),
            google_tts_url: optional_var("GOOGLE_TTS_URL").unwrap_or_else(|| {
                "https://texttospeech.googleapis.com/v1/text:synthesize".to_string()
            }),
            audio_cache_entries: optional_var("AUDIO_CACHE_ENTRIES")
                .map(|v| v.trim().parse().context("AUDIO_CACHE_ENTRIES must be a number"))
                .transpose()?
                .unwrap_or(DEFAULT_AUDIO_CACHE_ENTRIES),

            auth_tokens: std::env::var("AUTH_TOKENS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            history_dir: optional_var("HISTORY_DIR").unwrap_or_else(|| ".translator".to_string()),
            api_url: optional_var("TRANSLATOR_API_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            api_token: optional_var("TRANSLATOR_TOKEN"),
        })
    }
}

/// Read an env var, treating empty values as unset
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        port: 0,
        database_url: None,
        translation_backend: TranslationBackendKind::Google,
        google_translate_url: "http://127.0.0.1:9/translate_a/single".to_string(),
        openai_api_key: None,
        openai_model: "gpt-4o-mini".to_string(),
        openai_api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
        google_tts_api_key: None,
        google_tts_url: "http://127.0.0.1:9/v1/text:synthesize".to_string(),
        audio_cache_entries: DEFAULT_AUDIO_CACHE_ENTRIES,
        auth_tokens: vec![],
        history_dir: ".translator".to_string(),
        api_url: "http://localhost:8080".to_string(),
        api_token: None,
    }
}
