//! Sample-level conversions between float audio and 16-bit PCM.

use super::AudioError;

/// Scale applied to negative samples when encoding (full i16 range).
const NEGATIVE_SCALE: f32 = 32768.0;

/// Scale applied to non-negative samples when encoding.
const POSITIVE_SCALE: f32 = 32767.0;

/// Box-average `samples` from `source_rate` down to `target_rate`.
///
/// Every output sample is the mean of the input window it covers, so the
/// result holds `ceil(len / ratio)` samples where `ratio = source_rate / target_rate`.
/// Equal rates return the input unchanged.
///
/// # Errors
/// Returns [`AudioError::InvalidSampleRate`] for a zero rate and
/// [`AudioError::UpsamplingUnsupported`] when `target_rate > source_rate`.
pub fn downsample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, AudioError> {
    if source_rate == 0 || target_rate == 0 {
        return Err(AudioError::InvalidSampleRate(source_rate.min(target_rate)));
    }
    if source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    if target_rate > source_rate {
        return Err(AudioError::UpsamplingUnsupported {
            source_rate,
            target_rate,
        });
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let start = (i as f64 * ratio).floor() as usize;
        let end = (((i + 1) as f64 * ratio).floor() as usize).min(samples.len());
        let window = &samples[start..end.max(start + 1).min(samples.len())];
        let sum: f32 = window.iter().sum();
        out.push(sum / window.len() as f32);
    }

    Ok(out)
}

/// Encode float samples in `[-1, 1]` as little-endian signed 16-bit PCM.
///
/// Out-of-range input is clamped. Negative samples scale by 32768 and
/// positive samples by 32767 so both ends of the i16 range are reachable.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(-1.0, 1.0)
        };
        let scaled = if s < 0.0 {
            s * NEGATIVE_SCALE
        } else {
            s * POSITIVE_SCALE
        };
        out.extend_from_slice(&(scaled.round() as i16).to_le_bytes());
    }
    out
}

/// Decode little-endian signed 16-bit PCM into float samples.
///
/// Every value is divided by 32768, so `i16::MAX` decodes just below 1.0.
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / NEGATIVE_SCALE)
        .collect()
}

/// Decode little-endian 32-bit float samples. A trailing partial sample is ignored.
pub fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect()
}

/// Return the PCM payload of a RIFF/WAVE buffer, or the input when it carries no header.
pub fn strip_wav_header(bytes: &[u8]) -> &[u8] {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return bytes;
    }

    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body = offset + 8;
        if id == b"data" {
            return &bytes[body..(body + size).min(bytes.len())];
        }
        // Chunks are word aligned
        offset = body + size + (size & 1);
    }

    &bytes[bytes.len()..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_equal_rates_is_identity() {
        let samples = vec![0.1, -0.2, 0.3, 0.9, -1.0];
        assert_eq!(downsample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn test_downsample_averages_windows() {
        let samples = vec![0.0, 0.3, 0.6, 1.0, 1.0, 1.0];
        let out = downsample(&samples, 48000, 16000).unwrap();
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_downsample_48k_to_16k_length() {
        let samples = vec![0.25f32; 16000];
        let out = downsample(&samples, 48000, 16000).unwrap();
        assert_eq!(out.len(), 5334);
        assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6));

        let bytes = encode_pcm16(&out);
        assert_eq!(bytes.len(), 2 * out.len());
    }

    #[test]
    fn test_downsample_non_integer_ratio() {
        let samples = vec![0.5f32; 441];
        let out = downsample(&samples, 44100, 16000).unwrap();
        assert_eq!(out.len(), (441.0f64 / (44100.0 / 16000.0)).ceil() as usize);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_downsample_rejects_upsampling_and_zero_rate() {
        assert!(matches!(
            downsample(&[0.0], 16000, 48000),
            Err(AudioError::UpsamplingUnsupported { .. })
        ));
        assert!(matches!(
            downsample(&[0.0], 0, 16000),
            Err(AudioError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn test_encode_uses_asymmetric_scale() {
        let bytes = encode_pcm16(&[-1.0, 1.0, 0.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MIN);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let bytes = encode_pcm16(&[-3.5, 2.0, f32::NAN]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MIN);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
    }

    #[test]
    fn test_round_trip_error_is_bounded() {
        let samples: Vec<f32> = (0..2001).map(|i| (i as f32 - 1000.0) / 1000.0).collect();
        let decoded = decode_pcm16(&encode_pcm16(&samples));
        assert_eq!(decoded.len(), samples.len());
        // Half a step of rounding plus the 32767/32768 skew at positive full scale
        for (orig, back) in samples.iter().zip(decoded.iter()) {
            assert!(
                (orig - back).abs() <= 1.5 / 32768.0,
                "sample {orig} decoded as {back}"
            );
        }
    }

    #[test]
    fn test_decode_divides_by_32768() {
        let decoded = decode_pcm16(&[i16::MAX.to_le_bytes(), i16::MIN.to_le_bytes(), 16384i16.to_le_bytes()].concat());
        assert_eq!(decoded, vec![32767.0 / 32768.0, -1.0, 0.5]);
        assert!(decoded[0] < 1.0);
    }

    #[test]
    fn test_decode_ignores_trailing_byte() {
        assert_eq!(decode_pcm16(&[0x00, 0x40, 0x7f]).len(), 1);
    }

    #[test]
    fn test_decode_f32le() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-0.25f32).to_le_bytes());
        bytes.push(0);
        assert_eq!(decode_f32le(&bytes), vec![0.5, -0.25]);
    }

    #[test]
    fn test_strip_wav_header() {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&40u32.to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&[0u8; 16]);
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(&[1, 2, 3, 4]);

        assert_eq!(strip_wav_header(&wav), &[1, 2, 3, 4]);
        assert_eq!(strip_wav_header(&[9, 9, 9]), &[9, 9, 9]);
    }
}
