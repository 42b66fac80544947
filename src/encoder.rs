use std::io::{self, Seek, SeekFrom, Write};

use log::{debug, trace};

use crate::bitstream::{pack_file_header, pack_lms, FrameHeader, SliceWriter};
use crate::error::EncodeError;
use crate::lms::QoaLms;
use crate::quant::{clamp_i16, quantize};
use crate::stream::AudioFormat;
use crate::tables::{QOA_FRAME_LEN, QOA_MAX_CHANNELS, QOA_MAX_SAMPLE_RATE, QOA_SLICE_LEN};

/// Where [`QoaEncoder::finish`] leaves the sink after patching the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndPosition {
    /// After the last byte written.
    #[default]
    End,
    /// At the first byte of the stream header.
    Start,
}

/// Encoder settings.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    frame_len: usize,
    end_position: EndPosition,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            frame_len: QOA_FRAME_LEN,
            end_position: EndPosition::End,
        }
    }
}

impl EncoderConfig {
    /// Samples per channel in every frame but the last. Must be in
    /// `1..=5120`; shorter frames give finer seeking at a small size cost.
    pub fn with_frame_len(mut self, frame_len: usize) -> Self {
        self.frame_len = frame_len;
        self
    }

    pub fn with_position_on_finish(mut self, position: EndPosition) -> Self {
        self.end_position = position;
        self
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn validate(&self) -> Result<(), EncodeError> {
        if self.frame_len == 0 || self.frame_len > QOA_FRAME_LEN {
            return Err(EncodeError::InvalidFormat(
                "frame length must be between 1 and 5120 samples",
            ));
        }
        Ok(())
    }
}

/// Streaming encoder for QOA files.
///
/// Interleaved 16-bit samples written with [`QoaEncoder::write_samples`] are
/// buffered and encoded one frame at a time. [`QoaEncoder::finish`] encodes
/// what is left and fills in the sample count of the stream header, which is
/// why the sink must be seekable.
///
/// The encoder never closes the sink. Pass `&mut W` to keep ownership.
#[derive(Debug)]
pub struct QoaEncoder<W: Write + Seek> {
    writer: W,
    channels: u8,
    sample_rate: u32,
    config: EncoderConfig,
    /// Stream position of the stream header.
    start: u64,
    /// Samples per channel encoded into frames so far.
    samples: u64,
    /// LMS state for each channel, carried from frame to frame
    lms: Vec<QoaLms>,
    buf: Vec<i16>,
    /// Set once a frame could not be written.
    failed: bool,
}

impl<W: Write + Seek> QoaEncoder<W> {
    /// Start a stream with the default configuration.
    pub fn new(writer: W, channels: u8, sample_rate: u32) -> Result<Self, EncodeError> {
        Self::with_config(writer, channels, sample_rate, EncoderConfig::default())
    }

    pub fn with_config(
        mut writer: W,
        channels: u8,
        sample_rate: u32,
        config: EncoderConfig,
    ) -> Result<Self, EncodeError> {
        if channels == 0 || channels as usize > QOA_MAX_CHANNELS {
            return Err(EncodeError::InvalidFormat("channels must be between 1 and 8"));
        }
        if sample_rate == 0 || sample_rate > QOA_MAX_SAMPLE_RATE {
            return Err(EncodeError::InvalidFormat(
                "sample rate must be between 1 and 16777215 Hz",
            ));
        }
        config.validate()?;

        let start = writer.stream_position()?;
        writer.write_all(&pack_file_header(0))?;

        Ok(QoaEncoder {
            writer,
            channels,
            sample_rate,
            config,
            start,
            samples: 0,
            lms: vec![QoaLms::default(); channels as usize],
            buf: Vec::new(),
            failed: false,
        })
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Samples per channel accepted so far, buffered ones included.
    pub fn samples_written(&self) -> u64 {
        self.samples + (self.buf.len() / self.channels as usize) as u64
    }

    /// Append interleaved samples, encoding every complete frame.
    ///
    /// The length of `samples` must be a multiple of the channel count. If a
    /// frame cannot be written the encoder is left failed and every later
    /// call returns [`EncodeError::Failed`].
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<(), EncodeError> {
        if self.failed {
            return Err(EncodeError::Failed);
        }
        let channels = self.channels as usize;
        if samples.len() % channels != 0 {
            return Err(EncodeError::InvalidFormat(
                "sample buffer length must be a multiple of the channel count",
            ));
        }
        self.buf.extend_from_slice(samples);

        let result = self.encode_full_frames();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    /// Encode frames from the front of the buffer while a whole frame is
    /// available. Only frames that reached the sink are counted and dropped
    /// from the buffer.
    fn encode_full_frames(&mut self) -> Result<(), EncodeError> {
        let frame_size = self.config.frame_len * self.channels as usize;
        let mut consumed = 0;
        let mut result = Ok(());
        while self.buf.len() - consumed >= frame_size {
            let frame = &self.buf[consumed..consumed + frame_size];
            let total = match checked_total(self.samples, self.config.frame_len) {
                Ok(total) => total,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            if let Err(e) = encode_frame(&mut self.writer, &mut self.lms, self.sample_rate, frame) {
                result = Err(e.into());
                break;
            }
            self.samples = total;
            consumed += frame_size;
        }
        self.buf.drain(..consumed);
        result
    }

    /// Append interleaved samples in `-1.0..=1.0`.
    pub fn write_samples_f32(&mut self, samples: &[f32]) -> Result<(), EncodeError> {
        let converted: Vec<i16> = samples
            .iter()
            .map(|&s| (s * i16::MAX as f32) as i16)
            .collect();
        self.write_samples(&converted)
    }

    /// Encode the buffered remainder as a final, shorter frame, write the
    /// total sample count into the stream header and return the sink.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        if self.failed {
            return Err(EncodeError::Failed);
        }
        if !self.buf.is_empty() {
            let frame = std::mem::take(&mut self.buf);
            let frame_len = frame.len() / self.channels as usize;
            let total = checked_total(self.samples, frame_len)?;
            encode_frame(&mut self.writer, &mut self.lms, self.sample_rate, &frame)?;
            self.samples = total;
        }

        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.start))?;
        self.writer.write_all(&pack_file_header(self.samples as u32))?;
        let resume = match self.config.end_position {
            EndPosition::End => end,
            EndPosition::Start => self.start,
        };
        self.writer.seek(SeekFrom::Start(resume))?;
        self.writer.flush()?;

        debug!(
            "finished qoa stream: {} samples per channel, {} bytes",
            self.samples,
            end - self.start
        );
        Ok(self.writer)
    }
}

fn checked_total(samples: u64, frame_len: usize) -> Result<u64, EncodeError> {
    let total = samples + frame_len as u64;
    if total > u64::from(u32::MAX) {
        return Err(EncodeError::TooManySamples);
    }
    Ok(total)
}

/// Encode one frame of interleaved `samples` and write it. `lms` holds one
/// state per channel and is advanced to the end of the frame.
fn encode_frame<W: Write>(
    writer: &mut W,
    lms: &mut [QoaLms],
    sample_rate: u32,
    samples: &[i16],
) -> io::Result<()> {
    let channels = lms.len();
    let frame_len = samples.len() / channels;
    let header = FrameHeader::new(channels as u8, sample_rate, frame_len as u16);

    let mut frame_data = Vec::with_capacity(header.frame_size as usize);
    frame_data.extend_from_slice(&header.pack().to_be_bytes());
    for state in lms.iter() {
        for word in pack_lms(state) {
            frame_data.extend_from_slice(&word.to_be_bytes());
        }
    }

    // Starting from the previous slice's scale factor makes near ties
    // resolve towards it.
    let mut prev_scalefactor = [0usize; QOA_MAX_CHANNELS];

    for sample_index in (0..frame_len).step_by(QOA_SLICE_LEN) {
        let slice_len = (frame_len - sample_index).min(QOA_SLICE_LEN);
        for (c, state) in lms.iter_mut().enumerate() {
            let channel_samples = &samples[sample_index * channels + c..];
            let best = encode_slice(state, channel_samples, channels, slice_len, prev_scalefactor[c]);

            prev_scalefactor[c] = best.scalefactor;
            *state = best.lms;
            frame_data.extend_from_slice(&best.slice.to_be_bytes());
        }
    }
    debug_assert_eq!(frame_data.len(), header.frame_size as usize);

    trace!(
        "encoded frame: {} samples per channel, {} bytes",
        frame_len,
        frame_data.len()
    );
    writer.write_all(&frame_data)
}

struct EncodedSlice {
    slice: u64,
    scalefactor: usize,
    lms: QoaLms,
}

/// Try all 16 scale factors on one slice of one channel and keep the one with
/// the lowest rank. `samples` starts at the slice's first sample and is
/// interleaved with `stride` channels.
fn encode_slice(
    lms: &QoaLms,
    samples: &[i16],
    stride: usize,
    slice_len: usize,
    prev_scalefactor: usize,
) -> EncodedSlice {
    let mut best_rank = u64::MAX;
    let mut best = EncodedSlice {
        slice: 0,
        scalefactor: 0,
        lms: *lms,
    };

    for sfi in 0..16 {
        let scalefactor = (sfi + prev_scalefactor) & 15;

        let mut lms = *lms;
        let mut slice = SliceWriter::new(scalefactor);
        let mut current_rank = 0u64;

        for &sample in samples.iter().step_by(stride).take(slice_len) {
            let predicted = lms.predict();
            let residual = i32::from(sample) - predicted;
            let (quantized, dequantized) = quantize(residual, scalefactor);
            let reconstructed = clamp_i16(predicted + i32::from(dequantized));

            let error = i64::from(sample) - i64::from(reconstructed);
            current_rank += (error * error) as u64 + lms.weights_penalty();
            if current_rank > best_rank {
                break;
            }

            lms.update(reconstructed, dequantized);
            slice.push(quantized);
        }

        if current_rank < best_rank {
            best_rank = current_rank;
            best = EncodedSlice {
                slice: slice.finish(),
                scalefactor,
                lms,
            };
        }
    }

    best
}
