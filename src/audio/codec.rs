//! # PCM16 / WAV Codec
//!
//! Pure conversions between the three audio representations the relay deals
//! with: floating point samples in [-1.0, 1.0], raw little-endian 16-bit PCM
//! bytes, and the 44-byte-header WAV container sent to the client.
//!
//! All functions here are total and stateless; the header fields are fully
//! determined by the payload length and fixed format constants.

use crate::error::{RelayError, RelayResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Sample rate of audio produced by the realtime API (Hz).
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Channel count of audio produced by the realtime API.
pub const OUTPUT_CHANNELS: u16 = 1;

/// Fixed size of the WAV header in bytes.
pub const WAV_HEADER_LEN: usize = 44;

/// An ordered sequence of signed 16-bit samples as raw little-endian bytes.
///
/// Invariant: the byte length is always even (2 bytes per sample).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pcm: Vec<u8>,
}

impl AudioFrame {
    /// Wrap raw PCM16 bytes, rejecting odd-length input that would split a
    /// sample.
    pub fn from_pcm_bytes(pcm: Vec<u8>) -> RelayResult<Self> {
        if pcm.len() % 2 != 0 {
            return Err(RelayError::AudioDecode(format!(
                "PCM byte length {} is not sample-aligned",
                pcm.len()
            )));
        }
        Ok(Self { pcm })
    }

    /// Convert float samples to a PCM16 frame.
    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            pcm: samples_to_pcm16(samples),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pcm
    }

    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }
}

/// Convert float samples in [-1.0, 1.0] to raw little-endian PCM16 bytes.
///
/// Each sample is clamped, then scaled asymmetrically: negative values by
/// 32768 and non-negative values by 32767. The asymmetry matches the signed
/// 16-bit range exactly and must not be "fixed" to a single scale factor,
/// or output stops being bit-compatible with existing capture pipelines.
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let value = if s < 0.0 {
            (s * 32768.0) as i16
        } else {
            (s * 32767.0) as i16
        };
        // Vec<u8> writes cannot fail
        pcm.write_i16::<LittleEndian>(value).unwrap();
    }
    pcm
}

/// Wrap a PCM16 frame in a WAV container.
///
/// The header is the byte-exact 44-byte RIFF/WAVE layout: chunk size is
/// payload + 36, the fmt subchunk is 16 bytes of PCM description, and the
/// data subchunk size equals the payload length. Output length is always
/// 44 + payload length.
pub fn encode_wav(frame: &AudioFrame, sample_rate: u32, channels: u16) -> Vec<u8> {
    let payload = frame.as_bytes();
    let byte_rate = sample_rate * channels as u32 * 2; // 16 bits per sample
    let block_align = channels * 2;

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + payload.len());
    wav.extend_from_slice(b"RIFF");
    wav.write_u32::<LittleEndian>(payload.len() as u32 + 36).unwrap();
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.write_u32::<LittleEndian>(16).unwrap(); // fmt subchunk size
    wav.write_u16::<LittleEndian>(1).unwrap(); // audio format: PCM
    wav.write_u16::<LittleEndian>(channels).unwrap();
    wav.write_u32::<LittleEndian>(sample_rate).unwrap();
    wav.write_u32::<LittleEndian>(byte_rate).unwrap();
    wav.write_u16::<LittleEndian>(block_align).unwrap();
    wav.write_u16::<LittleEndian>(16).unwrap(); // bits per sample
    wav.extend_from_slice(b"data");
    wav.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
    wav.extend_from_slice(payload);
    wav
}

/// Parse a WAV container produced by [`encode_wav`], validating the header
/// and returning the PCM payload.
pub fn decode_wav(bytes: &[u8]) -> RelayResult<AudioFrame> {
    if bytes.len() < WAV_HEADER_LEN {
        return Err(RelayError::AudioDecode(format!(
            "WAV container too short: {} bytes",
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(bytes);
    let mut tag = [0u8; 4];

    std::io::Read::read_exact(&mut cursor, &mut tag)
        .map_err(|e| RelayError::AudioDecode(e.to_string()))?;
    if &tag != b"RIFF" {
        return Err(RelayError::AudioDecode("missing RIFF tag".to_string()));
    }

    let chunk_size = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| RelayError::AudioDecode(e.to_string()))?;

    std::io::Read::read_exact(&mut cursor, &mut tag)
        .map_err(|e| RelayError::AudioDecode(e.to_string()))?;
    if &tag != b"WAVE" {
        return Err(RelayError::AudioDecode("missing WAVE tag".to_string()));
    }

    // Skip the fmt subchunk (id, size, 16 bytes of PCM description).
    cursor.set_position(36);
    std::io::Read::read_exact(&mut cursor, &mut tag)
        .map_err(|e| RelayError::AudioDecode(e.to_string()))?;
    if &tag != b"data" {
        return Err(RelayError::AudioDecode("missing data tag".to_string()));
    }

    let data_len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| RelayError::AudioDecode(e.to_string()))? as usize;

    let payload = &bytes[WAV_HEADER_LEN..];
    if data_len != payload.len() {
        return Err(RelayError::AudioDecode(format!(
            "header declares {} payload bytes, found {}",
            data_len,
            payload.len()
        )));
    }
    if chunk_size as usize != payload.len() + 36 {
        return Err(RelayError::AudioDecode(format!(
            "header chunk size {} does not match payload length {}",
            chunk_size,
            payload.len()
        )));
    }

    AudioFrame::from_pcm_bytes(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn read_u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn test_wav_round_trip() {
        let payload: Vec<u8> = (0u16..512).flat_map(|s| s.to_le_bytes()).collect();
        let frame = AudioFrame::from_pcm_bytes(payload.clone()).unwrap();
        let wav = encode_wav(&frame, OUTPUT_SAMPLE_RATE, OUTPUT_CHANNELS);

        let decoded = decode_wav(&wav).unwrap();
        assert_eq!(decoded.as_bytes(), payload.as_slice());
    }

    #[test]
    fn test_wav_header_layout() {
        let frame = AudioFrame::from_pcm_bytes(vec![0u8; 1000]).unwrap();
        let wav = encode_wav(&frame, 24_000, 1);

        assert_eq!(wav.len(), WAV_HEADER_LEN + 1000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(read_u32_at(&wav, 4), 1000 + 36);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(read_u32_at(&wav, 16), 16);
        assert_eq!(read_u16_at(&wav, 20), 1); // PCM
        assert_eq!(read_u16_at(&wav, 22), 1); // mono
        assert_eq!(read_u32_at(&wav, 24), 24_000);
        assert_eq!(read_u32_at(&wav, 28), 48_000); // byte rate
        assert_eq!(read_u16_at(&wav, 32), 2); // block align
        assert_eq!(read_u16_at(&wav, 34), 16); // bits per sample
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(read_u32_at(&wav, 40), 1000);
    }

    #[test]
    fn test_empty_payload_container() {
        let frame = AudioFrame::from_pcm_bytes(Vec::new()).unwrap();
        let wav = encode_wav(&frame, 24_000, 1);

        assert_eq!(wav.len(), WAV_HEADER_LEN);
        assert_eq!(read_u32_at(&wav, 4), 36);
        assert_eq!(read_u32_at(&wav, 40), 0);
        assert!(decode_wav(&wav).unwrap().is_empty());
    }

    #[test]
    fn test_pcm16_scaling_is_asymmetric() {
        let pcm = samples_to_pcm16(&[-1.0, 1.0, 0.0, -0.5, 0.5]);
        let samples: Vec<i16> = pcm
            .chunks(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        assert_eq!(samples[0], -32768); // -1.0 * 32768
        assert_eq!(samples[1], 32767); // 1.0 * 32767
        assert_eq!(samples[2], 0);
        assert_eq!(samples[3], -16384); // -0.5 * 32768
        assert_eq!(samples[4], 16383); // 0.5 * 32767, truncated
    }

    #[test]
    fn test_pcm16_clamps_out_of_range() {
        let pcm = samples_to_pcm16(&[-3.5, 2.0]);
        let samples: Vec<i16> = pcm
            .chunks(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        assert_eq!(samples, vec![-32768, 32767]);
    }

    #[test]
    fn test_frame_rejects_odd_length() {
        assert!(AudioFrame::from_pcm_bytes(vec![0u8; 3]).is_err());
        assert!(AudioFrame::from_pcm_bytes(vec![0u8; 4]).is_ok());
    }

    #[test]
    fn test_decode_rejects_corrupt_header() {
        let frame = AudioFrame::from_pcm_bytes(vec![0u8; 8]).unwrap();
        let mut wav = encode_wav(&frame, 24_000, 1);

        wav[0] = b'X'; // break the RIFF tag
        assert!(decode_wav(&wav).is_err());
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let frame = AudioFrame::from_pcm_bytes(vec![0u8; 8]).unwrap();
        let mut wav = encode_wav(&frame, 24_000, 1);

        wav.truncate(wav.len() - 2); // payload shorter than declared
        assert!(decode_wav(&wav).is_err());
    }
}
