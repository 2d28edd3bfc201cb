//! Text-to-speech for the simulated customer's lines.

use crate::audio::AudioClip;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const MAX_ERROR_BODY_CHARS: usize = 512;

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesizes `text` into a clip the UI can play directly.
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub api_base: String,
    pub voice_id: String,
    pub model_id: String,
    pub voice_settings: VoiceSettings,
    pub timeout_ms: u64,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: "https://api.elevenlabs.io".to_string(),
            voice_id: "EXAVITQu4vr4xnAvFiAl".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            voice_settings: VoiceSettings::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// A `TextToSpeech` implementation for the ElevenLabs HTTP API.
pub struct ElevenLabsClient {
    config: ElevenLabsConfig,
    client: Client,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("ElevenLabs api_key must not be empty");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .context("failed to initialize http client")?;

        let mut normalized = config;
        normalized.api_base = normalized.api_base.trim().trim_end_matches('/').to_string();
        Ok(Self {
            config: normalized,
            client,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.config.api_base, self.config.voice_id
        )
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let text = text.trim();
        if text.is_empty() {
            bail!("text must not be empty");
        }

        let response = self
            .client
            .post(self.endpoint_url())
            .header("xi-api-key", &self.config.api_key)
            .header("accept", "audio/mpeg")
            .json(&SpeechRequest {
                text,
                model_id: &self.config.model_id,
                voice_settings: &self.config.voice_settings,
            })
            .send()
            .await
            .context("text-to-speech request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            bail!("text-to-speech returned {status}: {body}");
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .context("failed to read text-to-speech audio")?;
        if bytes.is_empty() {
            bail!("text-to-speech returned no audio");
        }
        debug!(bytes = bytes.len(), %mime_type, "Synthesized speech");

        Ok(AudioClip {
            url: format!("data:{mime_type};base64,{}", BASE64_STANDARD.encode(&bytes)),
            mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ElevenLabsClient {
        let mut config = ElevenLabsConfig::new("test-key");
        config.api_base = format!("{}/", server.uri());
        config.voice_id = "voice-123".to_string();
        ElevenLabsClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_synthesize_returns_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-123"))
            .and(header("xi-api-key", "test-key"))
            .and(body_json(serde_json::json!({
                "text": "Hello there",
                "model_id": "eleven_multilingual_v2",
                "voice_settings": {"stability": 0.5, "similarity_boost": 0.75}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let clip = client_for(&server).synthesize("  Hello there ").await.unwrap();
        assert_eq!(clip.mime_type, "audio/mpeg");
        assert_eq!(clip.url, "data:audio/mpeg;base64,AQID");
    }

    #[tokio::test]
    async fn test_synthesize_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client_for(&server).synthesize("Hi").await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert!(client_for(&server).synthesize("   ").await.is_err());
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        assert!(ElevenLabsClient::new(ElevenLabsConfig::new(" ")).is_err());
    }
}
