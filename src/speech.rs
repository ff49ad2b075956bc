//! Narration of generated stories through a text-to-speech API.

use reqwest::Client;
use serde::Serialize;

use crate::config::{Config, SpeechConfig};
use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    pub speaking_rate: f32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub model_id: String,
    pub voice_settings: VoiceSettings,
    pub optimize_streaming_latency: u8,
}

pub fn speech_request_body(text: &str, cfg: &SpeechConfig) -> SpeechRequest {
    SpeechRequest {
        text: text.to_string(),
        model_id: cfg.model_id.clone(),
        voice_settings: VoiceSettings {
            stability: cfg.stability,
            similarity_boost: cfg.similarity_boost,
            style: cfg.style,
            use_speaker_boost: cfg.use_speaker_boost,
            speaking_rate: cfg.speaking_rate,
        },
        optimize_streaming_latency: 0,
    }
}

pub struct SpeechClient {
    client: Client,
    settings: SpeechConfig,
    base_url: String,
}

impl SpeechClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .read_timeout(cfg.request_timeout())
            .timeout(cfg.resource_timeout())
            .user_agent(cfg.client.user_agent.clone())
            .build()
            .map_err(|e| DispatchError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.speech.base_url.trim_end_matches('/').to_string(),
            settings: cfg.speech.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.settings.api_key.trim().is_empty()
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/text-to-speech/{}", self.base_url, self.settings.voice_id)
    }

    /// Returns MP3 audio for `text`
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if !self.is_configured() {
            return Err(DispatchError::Config("speech API key is not set".to_string()));
        }

        let body = speech_request_body(text, &self.settings);
        tracing::debug!(voice = %self.settings.voice_id, chars = text.len(), "Requesting narration");

        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.settings.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DispatchError::HttpStatus {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(DispatchError::MalformedResponse("empty audio body".to_string()));
        }
        tracing::info!(bytes = audio.len(), "Narration received");
        Ok(audio.to_vec())
    }
}
