//! Audio transcoding for the voice pipeline.
//!
//! - [`pcm`]: float/PCM16 conversion and box-average downsampling
//! - [`transcoder`]: inbound frame conversion to recognizer-ready PCM
//! - [`envelope`]: numbered, base64-framed synthesized audio chunks
//! - [`playback`]: jitter-buffered playback scheduling

use thiserror::Error;

pub mod envelope;
pub mod pcm;
pub mod playback;
pub mod transcoder;

pub use envelope::{AudioChunkEnvelope, ChunkSequencer, ChunkTracker, WAV_BASE64_FORMAT};
pub use pcm::{decode_f32le, decode_pcm16, downsample, encode_pcm16, strip_wav_header};
pub use playback::{DEFAULT_JITTER_BUFFER, PlaybackScheduler};
pub use transcoder::{InputTranscoder, SampleEncoding};

/// Errors raised by audio conversion and chunk bookkeeping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("Cannot upsample from {source_rate} Hz to {target_rate} Hz")]
    UpsamplingUnsupported { source_rate: u32, target_rate: u32 },

    #[error("Unsupported audio encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Audio chunk out of sequence: expected {expected}, received {received}")]
    ChunkGap { expected: u32, received: u32 },
}
