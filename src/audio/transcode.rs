//! # Base64 Transcoding
//!
//! Standard-alphabet base64 for audio payloads on the upstream protocol.
//!
//! Encoding runs in bounded chunks: some encoders cap their per-call input
//! around 32 KiB, so large buffers are encoded piecewise and the pieces
//! concatenated. The chunk length is a multiple of 3 bytes, which keeps
//! every chunk encoding padding-free and makes the concatenation identical
//! to a single whole-input encoding. Chunk boundaries are byte boundaries,
//! not sample boundaries; a 2-byte sample may straddle two chunks without
//! corruption because base64 is byte-oriented.

use crate::error::{RelayError, RelayResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Per-call encoding ceiling: the largest multiple of 3 below 32 KiB.
const ENCODE_CHUNK_BYTES: usize = 32_766;

/// Encode bytes as standard base64, processing at most
/// [`ENCODE_CHUNK_BYTES`] per encoder call.
pub fn encode(bytes: &[u8]) -> String {
    // +3 rounds the 4/3 expansion up past padding
    let mut out = String::with_capacity(bytes.len() / 3 * 4 + 4);
    for chunk in bytes.chunks(ENCODE_CHUNK_BYTES) {
        out.push_str(&STANDARD.encode(chunk));
    }
    out
}

/// Decode standard base64 text back to bytes.
pub fn decode(text: &str) -> RelayResult<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| RelayError::AudioDecode(format!("base64 decode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let data = b"pcm16 audio payload".to_vec();
        let encoded = encode(&data);
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_chunked_encoding_matches_whole_encoding() {
        // Spans several chunks and is not a multiple of the chunk size.
        let data: Vec<u8> = (0..100_003u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(encode(&data), STANDARD.encode(&data));
    }

    #[test]
    fn test_chunk_size_keeps_concatenation_exact() {
        // A multiple of 3 under the 32 KiB ceiling, so no chunk encoding
        // carries padding and multi-byte samples survive the boundary.
        assert_eq!(ENCODE_CHUNK_BYTES % 3, 0);
        assert!(ENCODE_CHUNK_BYTES <= 32 * 1024);

        let samples: Vec<u8> = (0..40_000u32).flat_map(|i| (i as i16).to_le_bytes()).collect();
        assert_eq!(decode(&encode(&samples)).unwrap(), samples);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_rejects_invalid_text() {
        assert!(decode("not-base64!!!").is_err());
    }
}
