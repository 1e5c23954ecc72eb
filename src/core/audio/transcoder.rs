//! Conversion of client-captured frames into recognizer-ready PCM.

use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

use super::AudioError;
use super::pcm::{decode_f32le, decode_pcm16, downsample, encode_pcm16};

/// Sample encoding of inbound binary frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleEncoding {
    /// Signed 16-bit little-endian PCM
    #[default]
    Pcm16Le,
    /// 32-bit little-endian float, as produced by browser capture nodes
    F32Le,
}

impl SampleEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16Le => "pcm_s16le",
            Self::F32Le => "f32le",
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleEncoding {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pcm_s16le" | "pcm16" | "linear16" | "s16le" => Ok(Self::Pcm16Le),
            "f32le" | "float32" | "f32" => Ok(Self::F32Le),
            other => Err(AudioError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// Turns inbound frames into 16-bit PCM at the recognizer's sample rate.
#[derive(Debug, Clone, Copy)]
pub struct InputTranscoder {
    encoding: SampleEncoding,
    source_rate: u32,
    target_rate: u32,
}

impl InputTranscoder {
    /// # Errors
    /// Fails if either rate is zero or the target is above the source.
    pub fn new(
        encoding: SampleEncoding,
        source_rate: u32,
        target_rate: u32,
    ) -> Result<Self, AudioError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::InvalidSampleRate(source_rate.min(target_rate)));
        }
        if target_rate > source_rate {
            return Err(AudioError::UpsamplingUnsupported {
                source_rate,
                target_rate,
            });
        }
        Ok(Self {
            encoding,
            source_rate,
            target_rate,
        })
    }

    /// True when frames can be forwarded untouched.
    pub fn is_passthrough(&self) -> bool {
        self.encoding == SampleEncoding::Pcm16Le && self.source_rate == self.target_rate
    }

    pub fn transcode(&self, frame: Bytes) -> Result<Bytes, AudioError> {
        if self.is_passthrough() {
            return Ok(frame);
        }

        let samples = match self.encoding {
            SampleEncoding::Pcm16Le => decode_pcm16(&frame),
            SampleEncoding::F32Le => decode_f32le(&frame),
        };
        let resampled = downsample(&samples, self.source_rate, self.target_rate)?;
        Ok(Bytes::from(encode_pcm16(&resampled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_from_str() {
        assert_eq!(
            "pcm_s16le".parse::<SampleEncoding>().unwrap(),
            SampleEncoding::Pcm16Le
        );
        assert_eq!(
            "Float32".parse::<SampleEncoding>().unwrap(),
            SampleEncoding::F32Le
        );
        assert!("opus".parse::<SampleEncoding>().is_err());
    }

    #[test]
    fn test_passthrough_returns_same_bytes() {
        let transcoder = InputTranscoder::new(SampleEncoding::Pcm16Le, 16000, 16000).unwrap();
        assert!(transcoder.is_passthrough());
        let frame = Bytes::from_static(&[1, 2, 3, 4]);
        assert_eq!(transcoder.transcode(frame.clone()).unwrap(), frame);
    }

    #[test]
    fn test_float_frames_are_downsampled_and_encoded() {
        let transcoder = InputTranscoder::new(SampleEncoding::F32Le, 48000, 16000).unwrap();
        let mut frame = Vec::new();
        for _ in 0..4800 {
            frame.extend_from_slice(&0.5f32.to_le_bytes());
        }
        let out = transcoder.transcode(Bytes::from(frame)).unwrap();
        assert_eq!(out.len(), 1600 * 2);
        let first = i16::from_le_bytes([out[0], out[1]]);
        assert_eq!(first, (0.5f32 * 32767.0).round() as i16);
    }

    #[test]
    fn test_rejects_upsampling() {
        assert!(InputTranscoder::new(SampleEncoding::Pcm16Le, 8000, 16000).is_err());
    }
}
