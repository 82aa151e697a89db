//! # Inbound Audio Decoding
//!
//! Decodes arbitrary audio blobs from the browser (whatever container the
//! client's recorder produced) into float samples via symphonia's format
//! probe. The relay is mono-only: channel 0 is kept and any additional
//! channels are silently discarded.
//!
//! Decoding is CPU-bound; callers run it on a blocking thread so relay
//! event handling is never stalled.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{RelayError, RelayResult};

/// Decode an audio blob to the float samples of its first channel.
pub fn decode_to_samples(data: &[u8]) -> RelayResult<Vec<f32>> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let hint = Hint::new();
    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();
    let decoder_opts = DecoderOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| RelayError::AudioDecode(format!("probe: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| RelayError::AudioDecode("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &decoder_opts)
        .map_err(|e| RelayError::AudioDecode(format!("codec: {}", e)))?;

    let mut samples_out: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(RelayError::AudioDecode(format!("packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                tracing::warn!(error = %e, "Skipping corrupt audio frame");
                continue;
            }
            Err(e) => {
                return Err(RelayError::AudioDecode(format!("decode: {}", e)));
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        if num_frames == 0 {
            continue;
        }

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let interleaved = sample_buf.samples();

        // Mono-only: keep channel 0, drop the rest.
        if channels > 1 {
            samples_out.extend(interleaved.iter().step_by(channels));
        } else {
            samples_out.extend_from_slice(interleaved);
        }
    }

    if samples_out.is_empty() {
        return Err(RelayError::AudioDecode(
            "no audio samples decoded".to_string(),
        ));
    }

    Ok(samples_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::{encode_wav, AudioFrame};

    #[test]
    fn test_decodes_wav_input() {
        // A 440-sample ramp, stored as the WAV our own codec emits.
        let samples: Vec<f32> = (0..440).map(|i| (i as f32 / 440.0) - 0.5).collect();
        let frame = AudioFrame::from_samples(&samples);
        let wav = encode_wav(&frame, 24_000, 1);

        let decoded = decode_to_samples(&wav).unwrap();
        assert_eq!(decoded.len(), samples.len());
        // PCM16 quantization is the only loss expected.
        for (got, want) in decoded.iter().zip(samples.iter()) {
            assert!((got - want).abs() < 1.0 / 16_384.0);
        }
    }

    #[test]
    fn test_keeps_only_channel_zero() {
        // Interleave a stereo signal: channel 0 is a ramp, channel 1 is
        // full-scale noise that must not leak into the output.
        let frames = 200usize;
        let mut pcm = Vec::with_capacity(frames * 4);
        for i in 0..frames {
            let left = (i as i16) * 50;
            let right = if i % 2 == 0 { i16::MAX } else { i16::MIN };
            pcm.extend_from_slice(&left.to_le_bytes());
            pcm.extend_from_slice(&right.to_le_bytes());
        }
        let frame = AudioFrame::from_pcm_bytes(pcm).unwrap();
        let wav = encode_wav(&frame, 24_000, 2);

        let decoded = decode_to_samples(&wav).unwrap();
        assert_eq!(decoded.len(), frames);
        // The ramp never reaches full scale, so any |sample| near 1.0 would
        // mean channel 1 leaked through.
        assert!(decoded.iter().all(|s| s.abs() < 0.5));
    }

    #[test]
    fn test_rejects_garbage_input() {
        assert!(decode_to_samples(&[0x00, 0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(decode_to_samples(&[]).is_err());
    }
}
