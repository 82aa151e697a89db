//! # Relay Core
//!
//! The per-connection relay logic, kept free of socket types so the turn
//! state machine is testable on its own:
//!
//! - [`LinkState`] — the explicit upstream link state. The sender handle
//!   only exists in `Open`, a send on any other state is a warn-and-drop,
//!   and `close` is idempotent.
//! - [`dispatch_upstream`] — the transition applied for each upstream
//!   event: deltas accumulate, completion drains and wraps, transcripts
//!   pass straight through, everything else is observed only.
//!
//! The actix actor in `crate::websocket` owns one [`session::Session`] and
//! one [`LinkState`] per connection and feeds them through these functions.

pub mod protocol;
pub mod session;
pub mod upstream;

use crate::audio::{codec, transcode};
use crate::config::{AudioConfig, UpstreamConfig};
use crate::error::RelayResult;
use protocol::{ClientEvent, SessionConfig, TurnDetection, UpstreamEvent, UpstreamRequest};
use session::Session;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// State of the upstream leg of a relay.
///
/// `Connecting → Open → Closed`, with `Closed` terminal. The sender handle
/// lives only inside `Open`; closing drops it, which ends the upstream task
/// and its socket.
pub enum LinkState {
    /// Upstream connection attempt in flight
    Connecting,

    /// Upstream socket open; requests go through this channel
    Open(UnboundedSender<UpstreamRequest>),

    /// Either leg terminated; terminal
    Closed,
}

impl LinkState {
    pub fn is_open(&self) -> bool {
        matches!(self, LinkState::Open(_))
    }

    /// Send a request if the link is open; otherwise drop it with a warning.
    /// Returns whether the request was handed to the upstream task.
    pub fn send(&self, request: UpstreamRequest) -> bool {
        match self {
            LinkState::Open(tx) => {
                if tx.send(request).is_err() {
                    warn!("Upstream task gone, dropping outbound request");
                    false
                } else {
                    true
                }
            }
            LinkState::Connecting => {
                warn!("Upstream link not open yet, dropping outbound request");
                false
            }
            LinkState::Closed => {
                warn!("Upstream link closed, dropping outbound request");
                false
            }
        }
    }

    /// Transition to `Closed`. Returns true only for the call that actually
    /// performed the transition, so double-close is a visible no-op.
    pub fn close(&mut self) -> bool {
        match self {
            LinkState::Closed => false,
            _ => {
                *self = LinkState::Closed;
                true
            }
        }
    }
}

/// Build the `session.update` request for a configured translation pair.
pub fn session_update_for(
    language_from: &str,
    language_to: &str,
    upstream: &UpstreamConfig,
) -> UpstreamRequest {
    UpstreamRequest::SessionUpdate {
        session: SessionConfig {
            turn_detection: TurnDetection {
                kind: "server_vad".to_string(),
            },
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            voice: upstream.voice.clone(),
            instructions: protocol::translation_instructions(language_from, language_to),
            modalities: vec!["text".to_string(), "audio".to_string()],
            temperature: upstream.temperature,
        },
    }
}

/// Apply one upstream event to the session, producing at most one event for
/// the client.
///
/// - `response.audio.delta` appends to the accumulator and emits nothing;
///   the client only ever sees assembled turns.
/// - `response.done` drains the accumulator and emits one `audio_response`
///   carrying the WAV container. An empty accumulator still emits, with an
///   empty payload.
/// - `response.audio_transcript.done` emits a `text_response` immediately.
/// - Remaining known kinds are logged; unknown kinds are logged at debug.
///
/// Errors (cap overflow, undecodable accumulated audio) leave the caller to
/// fail the turn; the connection itself always survives.
pub fn dispatch_upstream(
    session: &mut Session,
    event: UpstreamEvent,
    audio: &AudioConfig,
) -> RelayResult<Option<ClientEvent>> {
    match event {
        UpstreamEvent::AudioDelta { delta: Some(fragment) } => {
            session.append(&fragment)?;
            Ok(None)
        }
        UpstreamEvent::AudioDelta { delta: None } => Ok(None),

        UpstreamEvent::ResponseDone => {
            let accumulated = session.drain();
            let pcm = transcode::decode(&accumulated)?;
            let frame = codec::AudioFrame::from_pcm_bytes(pcm)?;
            let wav = codec::encode_wav(&frame, audio.sample_rate, audio.channels);
            Ok(Some(ClientEvent::AudioResponse { audio: wav }))
        }

        UpstreamEvent::TranscriptDone { transcript } => {
            Ok(Some(ClientEvent::TextResponse { text: transcript }))
        }

        UpstreamEvent::Error { error } => {
            warn!(%error, "Upstream reported an error event");
            Ok(None)
        }

        UpstreamEvent::Unknown => {
            debug!("Ignoring unknown upstream event kind");
            Ok(None)
        }

        // Log-only allow-list
        other => {
            info!(event = other.name(), "Upstream event");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::WAV_HEADER_LEN;
    use crate::config::AppConfig;
    use crate::error::RelayError;

    fn audio_config() -> AudioConfig {
        AppConfig::default().audio
    }

    fn upstream_config() -> UpstreamConfig {
        AppConfig::default().upstream
    }

    fn delta(text: &str) -> UpstreamEvent {
        UpstreamEvent::AudioDelta {
            delta: Some(text.to_string()),
        }
    }

    #[test]
    fn test_deltas_then_done_yields_one_assembled_response() {
        let mut session = Session::new(1024 * 1024);
        let cfg = audio_config();

        let pcm: Vec<u8> = (0..600i16).flat_map(|s| s.to_le_bytes()).collect();
        let (first, second) = pcm.split_at(402); // multiple of 3, mid-stream

        // Deltas produce nothing client-visible.
        assert!(dispatch_upstream(&mut session, delta(&transcode::encode(first)), &cfg)
            .unwrap()
            .is_none());
        assert!(dispatch_upstream(&mut session, delta(&transcode::encode(second)), &cfg)
            .unwrap()
            .is_none());

        let event = dispatch_upstream(&mut session, UpstreamEvent::ResponseDone, &cfg)
            .unwrap()
            .unwrap();
        match event {
            ClientEvent::AudioResponse { audio } => {
                assert_eq!(audio.len(), WAV_HEADER_LEN + pcm.len());
                assert_eq!(&audio[WAV_HEADER_LEN..], pcm.as_slice());
            }
            other => panic!("expected audio_response, got {:?}", other),
        }
    }

    #[test]
    fn test_done_resets_accumulator() {
        let mut session = Session::new(1024);
        let cfg = audio_config();

        dispatch_upstream(&mut session, delta(&transcode::encode(&[1, 2, 3])), &cfg).unwrap();
        dispatch_upstream(&mut session, UpstreamEvent::ResponseDone, &cfg).unwrap();

        // A second completion with no intervening deltas produces an
        // empty-payload container.
        let event = dispatch_upstream(&mut session, UpstreamEvent::ResponseDone, &cfg)
            .unwrap()
            .unwrap();
        match event {
            ClientEvent::AudioResponse { audio } => assert_eq!(audio.len(), WAV_HEADER_LEN),
            other => panic!("expected audio_response, got {:?}", other),
        }
    }

    #[test]
    fn test_transcript_passes_through_untouched() {
        let mut session = Session::new(1024);
        let cfg = audio_config();

        // Accumulator state must not matter.
        dispatch_upstream(&mut session, delta("YWJj"), &cfg).unwrap();

        let event = dispatch_upstream(
            &mut session,
            UpstreamEvent::TranscriptDone {
                transcript: "bonjour le monde".to_string(),
            },
            &cfg,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::TextResponse {
                text: "bonjour le monde".to_string()
            }
        );

        // The pending audio turn is still intact.
        assert_eq!(session.accumulated_len(), 4);
    }

    #[test]
    fn test_log_only_events_have_no_side_effect() {
        let mut session = Session::new(1024);
        let cfg = audio_config();

        dispatch_upstream(&mut session, delta("YWJj"), &cfg).unwrap();

        for event in [
            UpstreamEvent::SessionCreated,
            UpstreamEvent::RateLimitsUpdated,
            UpstreamEvent::SpeechStarted,
            UpstreamEvent::SpeechStopped,
            UpstreamEvent::InputAudioCommitted,
            UpstreamEvent::ContentDone,
            UpstreamEvent::TextDone,
            UpstreamEvent::Unknown,
        ] {
            assert!(dispatch_upstream(&mut session, event, &cfg).unwrap().is_none());
        }
        assert_eq!(session.accumulated_len(), 4);
    }

    #[test]
    fn test_overflow_surfaces_as_turn_failure() {
        let mut session = Session::new(4);
        let cfg = audio_config();

        let err = dispatch_upstream(&mut session, delta("YWJjZGVm"), &cfg).unwrap_err();
        assert!(matches!(err, RelayError::TurnOverflow { .. }));
    }

    #[test]
    fn test_undecodable_accumulated_audio_fails_turn() {
        let mut session = Session::new(1024);
        let cfg = audio_config();

        dispatch_upstream(&mut session, delta("!!!not-base64!!!"), &cfg).unwrap();
        let err = dispatch_upstream(&mut session, UpstreamEvent::ResponseDone, &cfg).unwrap_err();
        assert!(matches!(err, RelayError::AudioDecode(_)));

        // Drain already cleared the bad turn; the next one starts clean.
        assert_eq!(session.accumulated_len(), 0);
    }

    #[test]
    fn test_session_update_contents() {
        let req = session_update_for("en", "fr", &upstream_config());
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["type"], "session.update");
        let session = &json["session"];
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["input_audio_format"], "pcm16");
        assert_eq!(session["output_audio_format"], "pcm16");
        assert_eq!(session["voice"], "alloy");
        assert_eq!(session["modalities"], serde_json::json!(["text", "audio"]));

        let instructions = session["instructions"].as_str().unwrap();
        assert!(instructions.contains("en"));
        assert!(instructions.contains("fr"));
    }

    #[test]
    fn test_link_close_is_idempotent() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut link = LinkState::Open(tx);
        assert!(link.is_open());

        assert!(link.close());
        assert!(!link.is_open());
        assert!(!link.close());
        assert!(!link.close());
    }

    #[test]
    fn test_send_dropped_when_not_open() {
        let request = UpstreamRequest::AudioAppend {
            audio: "YWJj".to_string(),
        };

        let link = LinkState::Connecting;
        assert!(!link.send(request.clone()));

        let mut link = LinkState::Connecting;
        link.close();
        assert!(!link.send(request));
    }

    #[test]
    fn test_send_reaches_open_link() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let link = LinkState::Open(tx);

        assert!(link.send(UpstreamRequest::AudioAppend {
            audio: "YWJj".to_string(),
        }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            UpstreamRequest::AudioAppend { ref audio } if audio == "YWJj"
        ));
    }
}
