//! Jitter-buffered playback scheduling for synthesized audio chunks.

use std::time::{Duration, Instant};

/// Default delay applied before the first chunk of a stream starts playing.
pub const DEFAULT_JITTER_BUFFER: Duration = Duration::from_millis(120);

/// Computes back-to-back start times for successive audio chunks.
///
/// Times are seconds relative to the scheduler's origin (its creation or the
/// last [`reset`](Self::reset)). The first chunk is delayed by the jitter
/// buffer; each later chunk starts exactly where the previous one ends. If
/// playback has run dry the buffer is primed again, so start times never
/// decrease.
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    jitter_buffer: Duration,
    origin: Instant,
    next_start: Option<f64>,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER_BUFFER)
    }
}

impl PlaybackScheduler {
    pub fn new(jitter_buffer: Duration) -> Self {
        Self {
            jitter_buffer,
            origin: Instant::now(),
            next_start: None,
        }
    }

    /// Schedule `chunk` using the wall clock, returning its start time in seconds.
    pub fn schedule_chunk(&mut self, chunk: &[f32], sample_rate: u32) -> f64 {
        let now = self.origin.elapsed().as_secs_f64();
        self.schedule_at(now, chunk.len(), sample_rate)
    }

    /// Schedule a chunk of `sample_count` samples as if the clock read `now` seconds.
    pub fn schedule_at(&mut self, now: f64, sample_count: usize, sample_rate: u32) -> f64 {
        let duration = if sample_rate == 0 {
            0.0
        } else {
            sample_count as f64 / sample_rate as f64
        };
        let jitter = self.jitter_buffer.as_secs_f64();

        let start = match self.next_start {
            Some(next) if next >= now => next,
            // Nothing queued yet, or playback underran
            Some(next) => (now + jitter).max(next),
            None => now + jitter,
        };

        self.next_start = Some(start + duration);
        start
    }

    /// Time at which the last scheduled chunk finishes, if any.
    pub fn scheduled_until(&self) -> Option<f64> {
        self.next_start
    }

    /// Forget queued playback and restart the clock for a new stream.
    pub fn reset(&mut self) {
        self.origin = Instant::now();
        self.next_start = None;
    }
}
