//! Audio pipeline: PCM16/WAV codec, base64 transcoding, and inbound blob
//! decoding.

pub mod codec;
pub mod decoder;
pub mod transcode;
