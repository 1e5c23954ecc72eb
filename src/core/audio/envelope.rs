//! Audio chunk envelopes and their sequence numbering.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::AudioError;

/// Transport format tag for envelope payloads.
pub const WAV_BASE64_FORMAT: &str = "wav_base64";

/// One unit of synthesized audio in transit to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunkEnvelope {
    /// Correlates the chunk with its turn
    pub context_id: String,
    /// 1-based, strictly increasing and gapless within a context
    pub chunk_number: u32,
    /// Chunks emitted so far in this context, including this one
    pub total_chunks_so_far: u32,
    /// Base64 encoded audio payload
    pub audio: String,
    /// Payload format tag
    pub format: String,
    /// Whether the provider marked this chunk as its last
    pub is_final: bool,
    /// Suggested playback start relative to the first chunk's arrival, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_at_ms: Option<u64>,
}

/// Numbers the chunks of one synthesis context.
#[derive(Debug, Clone)]
pub struct ChunkSequencer {
    context_id: String,
    emitted: u32,
}

impl ChunkSequencer {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            emitted: 0,
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Number of envelopes produced so far.
    pub fn total(&self) -> u32 {
        self.emitted
    }

    /// Wrap `audio` in the next envelope of this context.
    pub fn next_envelope(
        &mut self,
        audio: &[u8],
        is_final: bool,
        play_at_ms: Option<u64>,
    ) -> AudioChunkEnvelope {
        self.emitted += 1;
        AudioChunkEnvelope {
            context_id: self.context_id.clone(),
            chunk_number: self.emitted,
            total_chunks_so_far: self.emitted,
            audio: BASE64.encode(audio),
            format: WAV_BASE64_FORMAT.to_string(),
            is_final,
            play_at_ms,
        }
    }
}

/// Receiver-side check that chunk numbers arrive as `1..=K` with no gaps.
#[derive(Debug, Clone, Default)]
pub struct ChunkTracker {
    received: u32,
}

impl ChunkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arriving chunk number.
    ///
    /// # Errors
    /// Returns [`AudioError::ChunkGap`] if `chunk_number` is not the next expected one.
    pub fn observe(&mut self, chunk_number: u32) -> Result<(), AudioError> {
        let expected = self.received + 1;
        if chunk_number != expected {
            return Err(AudioError::ChunkGap {
                expected,
                received: chunk_number,
            });
        }
        self.received = chunk_number;
        Ok(())
    }

    /// Validate the announced total against what was observed.
    pub fn finish(&self, total_chunks: u32) -> Result<(), AudioError> {
        if total_chunks != self.received {
            return Err(AudioError::ChunkGap {
                expected: total_chunks,
                received: self.received,
            });
        }
        Ok(())
    }

    pub fn received(&self) -> u32 {
        self.received
    }
}
