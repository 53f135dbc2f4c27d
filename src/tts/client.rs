use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::params::VoiceProfile;
use crate::error::{SynthesisError, SynthesisStage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    #[serde(default)]
    pub styles: Vec<SpeakerStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: u32,
}

/// Turns text into playable audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Renders `text` with the speaker, style and parameters of `profile`.
    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> Result<Bytes, SynthesisError>;

    /// Lists the speakers the engine has installed.
    async fn speakers(&self) -> Result<Vec<Speaker>, SynthesisError>;
}

/// HTTP client for a VOICEVOX engine.
pub struct VoicevoxClient {
    client: reqwest::Client,
    base_url: String,
}

impl VoicevoxClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SynthesisError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("voicevox-speaker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Resolves a speaker/style pair to a style id.
    ///
    /// When nothing matches both names the first style of the first speaker is used,
    /// so a typo in `/vv voice` still produces speech.
    pub async fn resolve_speaker(&self, name: &str, style: &str) -> Result<u32, SynthesisError> {
        let speakers = self.fetch_speakers().await?;

        if let Some(id) = find_style(&speakers, name, style) {
            return Ok(id);
        }

        let fallback = speakers
            .first()
            .and_then(|speaker| speaker.styles.first().map(|st| (speaker, st)))
            .ok_or(SynthesisError::NoSpeakers)?;

        warn!(
            "🎙️ Voz '{} / {}' no encontrada, usando '{} / {}'",
            name, style, fallback.0.name, fallback.1.name
        );
        Ok(fallback.1.id)
    }

    /// Builds the synthesis recipe for `text`.
    ///
    /// Engines disagree on whether `text` travels in the query string or in a JSON body;
    /// the query string is tried first and the body is used only after a 4xx.
    pub async fn audio_query(
        &self,
        text: &str,
        speaker_id: u32,
    ) -> Result<Map<String, Value>, SynthesisError> {
        let url = self.endpoint("audio_query");
        let speaker = speaker_id.to_string();

        let primary = self
            .client
            .post(&url)
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await?;

        let response = if primary.status().is_client_error() {
            let status = primary.status();
            let body = primary.text().await.unwrap_or_default();
            debug!(
                "audio_query con query string rechazado ({}): {}, reintentando con cuerpo JSON",
                status, body
            );

            let fallback = self
                .client
                .post(&url)
                .query(&[("speaker", speaker.as_str())])
                .json(&json!({ "text": text }))
                .send()
                .await?;
            ensure_success(fallback, SynthesisStage::AudioQuery).await?
        } else {
            ensure_success(primary, SynthesisStage::AudioQuery).await?
        };

        let bytes = response.bytes().await?;
        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(recipe) => Ok(recipe),
            _ => Err(SynthesisError::InvalidRecipe),
        }
    }

    /// Renders a recipe to WAV bytes.
    pub async fn synthesis(
        &self,
        recipe: &Map<String, Value>,
        speaker_id: u32,
    ) -> Result<Bytes, SynthesisError> {
        let response = self
            .client
            .post(self.endpoint("synthesis"))
            .query(&[("speaker", speaker_id)])
            .json(recipe)
            .send()
            .await?;

        let response = ensure_success(response, SynthesisStage::Synthesis).await?;
        Ok(response.bytes().await?)
    }

    async fn fetch_speakers(&self) -> Result<Vec<Speaker>, SynthesisError> {
        let response = self.client.get(self.endpoint("speakers")).send().await?;
        let response = ensure_success(response, SynthesisStage::Speakers).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SpeechSynthesizer for VoicevoxClient {
    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> Result<Bytes, SynthesisError> {
        let speaker_id = self
            .resolve_speaker(&profile.speaker_name, &profile.style_name)
            .await?;

        let mut recipe = self.audio_query(text, speaker_id).await?;
        profile.params.apply_to(&mut recipe);

        let audio = self.synthesis(&recipe, speaker_id).await?;
        info!(
            "🗣️ Sintetizados {} bytes con speaker {} ({} caracteres)",
            audio.len(),
            speaker_id,
            text.chars().count()
        );
        Ok(audio)
    }

    async fn speakers(&self) -> Result<Vec<Speaker>, SynthesisError> {
        self.fetch_speakers().await
    }
}

fn find_style(speakers: &[Speaker], name: &str, style: &str) -> Option<u32> {
    speakers
        .iter()
        .filter(|speaker| speaker.name == name)
        .flat_map(|speaker| speaker.styles.iter())
        .find(|st| st.name == style)
        .map(|st| st.id)
}

async fn ensure_success(response: Response, stage: SynthesisStage) -> Result<Response, SynthesisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(upstream(stage, status, body))
}

fn upstream(stage: SynthesisStage, status: StatusCode, body: String) -> SynthesisError {
    SynthesisError::Upstream {
        stage,
        status: status.as_u16(),
        body,
    }
}
