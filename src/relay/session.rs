//! # Relay Session State
//!
//! Per-connection mutable state for one in-flight turn: the base64 audio
//! accumulated across upstream delta events, and the translation direction
//! the client configured. Exactly one `Session` exists per relay and it is
//! never shared; the owning actor is the only code that touches it.
//!
//! The accumulator is bounded. A turn that exceeds the byte cap, or that
//! goes quiet past the inactivity deadline without a completion event, is
//! failed explicitly and cleared rather than growing without limit.

use crate::error::{RelayError, RelayResult};
use std::time::{Duration, Instant};

/// Session state for one relay connection.
#[derive(Debug)]
pub struct Session {
    /// Base64 audio fragments collected since the last completion event
    accumulated_audio: String,

    /// Configured translation direction (language_from, language_to)
    translation: Option<(String, String)>,

    /// Cap on the accumulator, in bytes of base64 text
    max_turn_bytes: usize,

    /// When the current turn last received a delta
    last_delta_at: Option<Instant>,
}

impl Session {
    /// Create an empty session with the given accumulator cap.
    pub fn new(max_turn_bytes: usize) -> Self {
        Self {
            accumulated_audio: String::new(),
            translation: None,
            max_turn_bytes,
            last_delta_at: None,
        }
    }

    /// Append one audio delta fragment to the accumulator.
    ///
    /// Fails with [`RelayError::TurnOverflow`] when the fragment would push
    /// the accumulator past its cap; the caller is expected to fail the turn
    /// by calling [`Session::reset_turn`].
    pub fn append(&mut self, fragment: &str) -> RelayResult<()> {
        let attempted = self.accumulated_audio.len() + fragment.len();
        if attempted > self.max_turn_bytes {
            return Err(RelayError::TurnOverflow {
                limit: self.max_turn_bytes,
                attempted,
            });
        }
        self.accumulated_audio.push_str(fragment);
        self.last_delta_at = Some(Instant::now());
        Ok(())
    }

    /// Take the accumulated audio, leaving the accumulator empty.
    pub fn drain(&mut self) -> String {
        self.last_delta_at = None;
        std::mem::take(&mut self.accumulated_audio)
    }

    /// Discard the in-flight turn (overflow or staleness).
    pub fn reset_turn(&mut self) {
        self.accumulated_audio.clear();
        self.last_delta_at = None;
    }

    /// Whether a turn is in flight and has been quiet longer than `timeout`.
    pub fn turn_stale(&self, timeout: Duration) -> bool {
        match self.last_delta_at {
            Some(at) => at.elapsed() > timeout,
            None => false,
        }
    }

    pub fn set_translation(&mut self, from: String, to: String) {
        self.translation = Some((from, to));
    }

    pub fn translation(&self) -> Option<&(String, String)> {
        self.translation.as_ref()
    }

    #[cfg(test)]
    pub fn accumulated_len(&self) -> usize {
        self.accumulated_audio.len()
    }
}
