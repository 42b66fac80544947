//! The sample-stream surface shared with the rest of an audio pipeline.
use std::time::Duration;

use crate::error::DecodeError;

/// Channel layout and rate of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u8,
    /// Samples per second per channel (e.g. 44100)
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Playing time of `samples` samples per channel.
    pub fn duration(&self, samples: u64) -> Duration {
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }
}

/// Outcome of a read into a sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadProgress {
    /// Number of interleaved samples written to the front of the buffer.
    pub count: usize,
    /// The stream has no samples left.
    pub end_of_stream: bool,
}

/// A sequential interleaved-sample stream with optional random access.
pub trait SampleStream {
    /// The stream's layout, `None` when it holds no audio at all.
    fn format(&self) -> Option<AudioFormat>;

    /// Total number of samples per channel the stream declares.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read interleaved samples into `buf`, filling it unless the stream
    /// ends first.
    fn read_samples(&mut self, buf: &mut [i16]) -> Result<ReadProgress, DecodeError>;

    /// Like [`SampleStream::read_samples`] but scaled to `-1.0..=1.0`.
    fn read_samples_f32(&mut self, buf: &mut [f32]) -> Result<ReadProgress, DecodeError> {
        let mut scratch = vec![0i16; buf.len()];
        let progress = self.read_samples(&mut scratch)?;
        for (out, &sample) in buf.iter_mut().zip(&scratch[..progress.count]) {
            *out = f32::from(sample) / i16::MAX as f32;
        }
        Ok(progress)
    }

    /// Position the stream so the next read starts at `sample_index`
    /// (counted per channel). Fails with [`DecodeError::SeekUnsupported`] if
    /// the source cannot seek.
    fn seek(&mut self, sample_index: u64) -> Result<(), DecodeError>;
}
