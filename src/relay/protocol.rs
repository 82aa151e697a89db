//! # Relay Wire Protocol
//!
//! Message types for both legs of the relay, as closed tagged unions:
//!
//! - **Client → relay**: a JSON control message selecting the translation
//!   direction. (Audio arrives as binary WebSocket frames, not JSON.)
//! - **Relay → client**: `audio_response` / `text_response` events.
//! - **Relay → upstream**: `session.update` and `input_audio_buffer.append`.
//! - **Upstream → relay**: the realtime API event stream. Every event kind
//!   the relay reacts to (or logs) is a named variant; anything else lands
//!   in `Unknown`, so adding a handled kind is a compile-checked change.

use serde::{Deserialize, Serialize};

/// Control message from the browser selecting the translation direction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientControl {
    pub language_from: String,
    pub language_to: String,
}

/// Events sent to the browser client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// One completed turn of translated speech, as WAV container bytes.
    AudioResponse { audio: Vec<u8> },

    /// The transcript of a completed turn.
    TextResponse { text: String },
}

/// Requests sent to the upstream realtime API.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum UpstreamRequest {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    AudioAppend { audio: String },
}

/// Payload of a `session.update` request.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub turn_detection: TurnDetection,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub voice: String,
    pub instructions: String,
    pub modalities: Vec<String>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Events received from the upstream realtime API.
///
/// The first three variants drive relay behaviour. The rest are the kinds
/// considered worth logging when they arrive; they have no side effects.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: Option<String> },

    #[serde(rename = "response.done")]
    ResponseDone,

    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone { transcript: String },

    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "rate_limits.updated")]
    RateLimitsUpdated,

    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioCommitted,

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    #[serde(rename = "response.content.done")]
    ContentDone,

    #[serde(rename = "response.text.done")]
    TextDone,

    #[serde(rename = "error")]
    Error { error: serde_json::Value },

    #[serde(other)]
    Unknown,
}

impl UpstreamEvent {
    /// Stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            UpstreamEvent::AudioDelta { .. } => "response.audio.delta",
            UpstreamEvent::ResponseDone => "response.done",
            UpstreamEvent::TranscriptDone { .. } => "response.audio_transcript.done",
            UpstreamEvent::SessionCreated => "session.created",
            UpstreamEvent::RateLimitsUpdated => "rate_limits.updated",
            UpstreamEvent::InputAudioCommitted => "input_audio_buffer.committed",
            UpstreamEvent::SpeechStarted => "input_audio_buffer.speech_started",
            UpstreamEvent::SpeechStopped => "input_audio_buffer.speech_stopped",
            UpstreamEvent::ContentDone => "response.content.done",
            UpstreamEvent::TextDone => "response.text.done",
            UpstreamEvent::Error { .. } => "error",
            UpstreamEvent::Unknown => "unknown",
        }
    }
}

/// Build the natural-language instruction string for a translation pair.
///
/// The wording directs the model to translate verbatim and never answer a
/// question contained in the input.
pub fn translation_instructions(language_from: &str, language_to: &str) -> String {
    format!(
        "You are a helpful translator that will translate a message between two languages: \
         {from} and {to}. If the user speaks in {from}, then answer in {to}, and vice versa. \
         If a question is asked, DO NOT answer it, instead translate it word for word.",
        from = language_from,
        to = language_to
    )
}
