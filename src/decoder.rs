use std::fs::File;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::bitstream::{
    read_array, read_exact_or_eof, unpack_file_header, unpack_lms, FrameHeader, SliceReader,
};
use crate::error::DecodeError;
use crate::index::{SeekIndex, SeekPoint};
use crate::io::MediaSource;
use crate::lms::QoaLms;
use crate::quant::{clamp_i16, dequantize};
use crate::stream::{AudioFormat, ReadProgress, SampleStream};
use crate::tables::{QOA_HEADER_SIZE, QOA_SLICE_LEN};

/// Where a [`QoaDecoder`] is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Nothing has been read yet.
    Uninitialized,
    /// The stream header was read and the next frame has not been loaded.
    HeaderRead,
    /// A frame was just decoded and none of its samples were returned yet.
    FrameLoaded,
    /// Samples of the current frame are being returned.
    Draining,
    /// The stream ended cleanly.
    Eof,
    /// A call failed. The decoder cannot be used any more.
    Error,
}

/// Decoder of QOA streams.
///
/// Samples are decoded one frame at a time and handed out from an internal
/// buffer, either through [`QoaDecoder::read_samples`] or by iterating. If the
/// source can seek, [`QoaDecoder::seek`] positions the decoder on any sample.
///
/// QoaDecoder reads each frame with two reads, so an unbuffered `File` works,
/// but [`QoaDecoder::open`] wraps it in a `BufReader` anyway.
#[derive(Debug)]
pub struct QoaDecoder<R> {
    reader: R,
    state: DecoderState,
    /// Samples per channel declared by the stream header.
    samples: u32,
    format: Option<AudioFormat>,
    lms: Vec<QoaLms>,
    current_frame: FrameHeader,
    frame_bytes: Vec<u8>,
    pending_samples: Vec<i16>,
    next_pending_sample_idx: usize,
    /// Index of the first sample (per channel) of the current frame.
    frame_start: u64,
    /// Byte offset of the first frame header in `reader`.
    first_frame_offset: u64,
    index: Option<SeekIndex>,
}

impl QoaDecoder<io::BufReader<File>> {
    /// Open a file, wrap it with BufReader and create a new decoder.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        QoaDecoder::new(io::BufReader::new(file))
    }
}

impl<R: MediaSource> QoaDecoder<R> {
    /// Read the stream header and the first frame from `reader`.
    ///
    /// The stream must start at the current position of `reader`. A stream
    /// without frames is valid and starts out at end of stream.
    pub fn new(reader: R) -> Result<Self, DecodeError> {
        let mut decoder = QoaDecoder {
            reader,
            state: DecoderState::Uninitialized,
            samples: 0,
            format: None,
            lms: Vec::new(),
            current_frame: FrameHeader::default(),
            frame_bytes: Vec::new(),
            pending_samples: Vec::new(),
            next_pending_sample_idx: 0,
            frame_start: 0,
            first_frame_offset: QOA_HEADER_SIZE as u64,
            index: None,
        };

        if decoder.reader.is_seekable() {
            decoder.first_frame_offset = decoder.reader.stream_position()? + QOA_HEADER_SIZE as u64;
        }

        let header = read_array(&mut decoder.reader).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => DecodeError::MalformedHeader,
            _ => DecodeError::Io(e),
        })?;
        decoder.samples = unpack_file_header(header)?;
        decoder.state = DecoderState::HeaderRead;

        if decoder.load_frame()? {
            decoder.state = DecoderState::FrameLoaded;
        } else {
            decoder.state = DecoderState::Eof;
            decoder.check_declared_length();
        }
        Ok(decoder)
    }

    /// Consume this `QoaDecoder` and return the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Channel count and sample rate, `None` if the stream holds no frames.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    /// Samples per channel declared by the stream header.
    pub fn len(&self) -> u64 {
        u64::from(self.samples)
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Index (per channel) of the next sample [`QoaDecoder::read_samples`]
    /// returns.
    pub fn position(&self) -> u64 {
        let channels = self.current_frame.num_channels.max(1) as usize;
        self.frame_start + (self.next_pending_sample_idx / channels) as u64
    }

    /// The header of the frame currently being processed.
    pub fn current_frame_header(&self) -> &FrameHeader {
        &self.current_frame
    }

    pub fn total_duration(&self) -> Option<Duration> {
        self.format.map(|format| format.duration(self.len()))
    }

    /// Copy decoded samples into `buf`, decoding further frames as needed,
    /// until `buf` is full or the stream ends.
    pub fn read_samples(&mut self, buf: &mut [i16]) -> Result<ReadProgress, DecodeError> {
        self.fill(buf, |sample| sample)
    }

    /// Like [`QoaDecoder::read_samples`], scaled to `-1.0..=1.0`.
    pub fn read_samples_f32(&mut self, buf: &mut [f32]) -> Result<ReadProgress, DecodeError> {
        self.fill(buf, |sample| f32::from(sample) / i16::MAX as f32)
    }

    fn fill<T>(
        &mut self,
        buf: &mut [T],
        convert: fn(i16) -> T,
    ) -> Result<ReadProgress, DecodeError> {
        if self.state == DecoderState::Error {
            return Err(DecodeError::Failed);
        }

        let mut count = 0;
        while count < buf.len() {
            let pending = &self.pending_samples[self.next_pending_sample_idx..];
            if !pending.is_empty() {
                let n = pending.len().min(buf.len() - count);
                for (out, &sample) in buf[count..count + n].iter_mut().zip(pending) {
                    *out = convert(sample);
                }
                self.next_pending_sample_idx += n;
                count += n;
                self.state = DecoderState::Draining;
                continue;
            }
            if self.state == DecoderState::Eof {
                break;
            }
            match self.load_frame() {
                Ok(true) => self.state = DecoderState::FrameLoaded,
                Ok(false) => {
                    self.state = DecoderState::Eof;
                    self.check_declared_length();
                }
                Err(e) => {
                    self.state = DecoderState::Error;
                    return Err(e);
                }
            }
        }

        Ok(ReadProgress {
            count,
            end_of_stream: self.state == DecoderState::Eof
                && self.next_pending_sample_idx >= self.pending_samples.len(),
        })
    }

    /// Position the decoder so the next sample returned is `sample_index`
    /// (counted per channel from the start of the stream).
    ///
    /// The first call scans all frame headers to build a seek index.
    pub fn seek(&mut self, sample_index: u64) -> Result<(), DecodeError> {
        self.check_can_seek()?;
        let result = self.seek_indexed(sample_index);
        self.settle(result)
    }

    /// Seek relative to the start, the current position or the end of the
    /// stream, in samples per channel. Returns the new position.
    ///
    /// `SeekFrom::End` counts from the samples actually present in the frames.
    /// `SeekFrom::Current(0)` only reports the position and works on any
    /// source.
    pub fn seek_from(&mut self, pos: SeekFrom) -> Result<u64, DecodeError> {
        if let SeekFrom::Current(0) = pos {
            if self.state == DecoderState::Error {
                return Err(DecodeError::Failed);
            }
            return Ok(QoaDecoder::position(self));
        }
        self.check_can_seek()?;

        let (base, delta) = match pos {
            SeekFrom::Start(target) => (target, 0),
            SeekFrom::Current(delta) => (QoaDecoder::position(self), delta),
            SeekFrom::End(delta) => {
                let total = self.load_index().map(|index| index.total_samples());
                (self.settle(total)?, delta)
            }
        };
        let target = base
            .checked_add_signed(delta)
            .ok_or(DecodeError::SeekBeforeStart)?;

        let result = self.seek_indexed(target);
        self.settle(result)?;
        Ok(target)
    }

    fn check_can_seek(&self) -> Result<(), DecodeError> {
        if self.state == DecoderState::Error {
            return Err(DecodeError::Failed);
        }
        if !self.reader.is_seekable() {
            return Err(DecodeError::SeekUnsupported);
        }
        Ok(())
    }

    /// Poison the decoder on any seek error except an out of range target.
    fn settle<T>(&mut self, result: Result<T, DecodeError>) -> Result<T, DecodeError> {
        if let Err(e) = &result {
            if !matches!(e, DecodeError::SeekOutOfBounds { .. } | DecodeError::SeekBeforeStart) {
                self.state = DecoderState::Error;
            }
        }
        result
    }

    /// The seek index, scanned on first use. The read position is kept.
    fn load_index(&mut self) -> Result<&SeekIndex, DecodeError> {
        let index = match self.index.take() {
            Some(index) => index,
            None => {
                let resume = self.reader.stream_position()?;
                let index = SeekIndex::build(&mut self.reader, self.first_frame_offset)?;
                self.reader.seek(SeekFrom::Start(resume))?;
                index
            }
        };
        Ok(self.index.insert(index))
    }

    fn seek_indexed(&mut self, sample_index: u64) -> Result<(), DecodeError> {
        let index = self.load_index()?;
        let total = index.total_samples();
        let point = index.locate(sample_index).ok_or(DecodeError::SeekOutOfBounds {
            target: sample_index,
            total,
        })?;
        debug!("seeking to sample {}: {:?}", sample_index, point);

        match point {
            SeekPoint::Frame { entry, skip } => {
                self.reader.seek(SeekFrom::Start(entry.offset))?;
                self.frame_start = sample_index - skip as u64;
                self.pending_samples.clear();
                self.next_pending_sample_idx = 0;
                self.state = DecoderState::HeaderRead;
                if !self.load_frame()? {
                    return Err(DecodeError::StreamCorrupt("truncated frame header"));
                }
                self.next_pending_sample_idx = skip * self.current_frame.num_channels as usize;
                self.state = DecoderState::FrameLoaded;
            }
            SeekPoint::End { offset } => {
                self.reader.seek(SeekFrom::Start(offset))?;
                self.frame_start = sample_index;
                self.pending_samples.clear();
                self.next_pending_sample_idx = 0;
                self.state = DecoderState::HeaderRead;
            }
        }
        Ok(())
    }

    /// Returns Ok(true) if a frame was decoded into the pending buffer.
    /// Returns Ok(false) if EOF was encountered before any bytes were read.
    fn load_frame(&mut self) -> Result<bool, DecodeError> {
        let mut word = [0u8; 8];
        let found = read_exact_or_eof(&mut self.reader, &mut word)
            .map_err(|e| DecodeError::truncated(e, "truncated frame header"))?;
        if !found {
            return Ok(false);
        }

        let header = FrameHeader::unpack(u64::from_be_bytes(word));
        header.validate()?;

        let frame_format = AudioFormat {
            channels: header.num_channels,
            sample_rate: header.sample_rate,
        };
        match self.format {
            Some(format) if format != frame_format => {
                return Err(DecodeError::StreamCorrupt(
                    "channel count or sample rate changed between frames",
                ));
            }
            Some(_) => (),
            None => {
                debug!(
                    "qoa stream: {} channels at {} Hz, {} samples per channel",
                    frame_format.channels, frame_format.sample_rate, self.samples
                );
                self.format = Some(frame_format);
                self.lms = vec![QoaLms::default(); header.num_channels as usize];
            }
        }

        self.frame_bytes
            .resize(header.frame_size as usize - QOA_HEADER_SIZE, 0);
        self.reader
            .read_exact(&mut self.frame_bytes)
            .map_err(|e| DecodeError::truncated(e, "truncated frame"))?;

        if self.state != DecoderState::Uninitialized && self.state != DecoderState::HeaderRead {
            // The samples of the previous frame have all been handed out.
            self.frame_start += u64::from(self.current_frame.num_samples_per_channel);
        }
        decode_frame(
            &header,
            &self.frame_bytes,
            &mut self.lms,
            &mut self.pending_samples,
        );
        self.current_frame = header;
        self.next_pending_sample_idx = 0;

        trace!(
            "decoded frame at sample {}: {} samples per channel",
            self.frame_start,
            header.num_samples_per_channel
        );
        Ok(true)
    }

    fn check_declared_length(&self) {
        let decoded = self.position();
        if self.samples != 0 && decoded != u64::from(self.samples) {
            warn!(
                "stream header declares {} samples per channel but {} were decoded",
                self.samples, decoded
            );
        }
    }
}

/// Decode the body of a frame (everything after its header) into
/// interleaved samples. `header` must have passed validation, which
/// guarantees `body` holds exactly the LMS states and slices it describes.
pub(crate) fn decode_frame(
    header: &FrameHeader,
    body: &[u8],
    lms: &mut [QoaLms],
    samples: &mut Vec<i16>,
) {
    let channels = header.num_channels as usize;
    let frame_len = header.num_samples_per_channel as usize;
    let mut words = body.chunks_exact(8).map(|chunk| {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        u64::from_be_bytes(word)
    });

    for state in lms.iter_mut().take(channels) {
        let history = words.next().unwrap_or_default();
        let weights = words.next().unwrap_or_default();
        *state = unpack_lms(history, weights);
    }

    samples.clear();
    samples.resize(frame_len * channels, 0);

    for sample_index in (0..frame_len).step_by(QOA_SLICE_LEN) {
        let slice_len = (frame_len - sample_index).min(QOA_SLICE_LEN);
        for (channel_idx, state) in lms.iter_mut().enumerate().take(channels) {
            let slice = SliceReader::new(words.next().unwrap_or_default());
            let scale_factor = slice.scalefactor();

            for i in 0..slice_len {
                let prediction = state.predict();
                let dequantized = dequantize(scale_factor, slice.code(i));
                let reconstructed = clamp_i16(prediction + i32::from(dequantized));

                samples[(sample_index + i) * channels + channel_idx] = reconstructed;
                state.update(reconstructed, dequantized);
            }
        }
    }
}

impl<R: MediaSource> Iterator for QoaDecoder<R> {
    type Item = Result<i16, DecodeError>;

    /// Get the next interleaved sample.
    ///
    /// After an error is returned, iteration is finished.
    fn next(&mut self) -> Option<Self::Item> {
        let mut sample = [0i16; 1];
        match self.read_samples(&mut sample) {
            Ok(progress) if progress.count == 1 => Some(Ok(sample[0])),
            Ok(_) | Err(DecodeError::Failed) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<R: MediaSource> SampleStream for QoaDecoder<R> {
    fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    fn len(&self) -> u64 {
        QoaDecoder::len(self)
    }

    fn read_samples(&mut self, buf: &mut [i16]) -> Result<ReadProgress, DecodeError> {
        QoaDecoder::read_samples(self, buf)
    }

    fn read_samples_f32(&mut self, buf: &mut [f32]) -> Result<ReadProgress, DecodeError> {
        QoaDecoder::read_samples_f32(self, buf)
    }

    fn seek(&mut self, sample_index: u64) -> Result<(), DecodeError> {
        QoaDecoder::seek(self, sample_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{pack_file_header, pack_lms};
    use crate::io::ReadOnlySource;
    use std::io::Cursor;

    /// Mono frames whose slices all use scale factor 0 and code 0 (+1),
    /// starting from an all-zero filter so every sample decodes to 1.
    fn ones_stream(frames: &[u16]) -> Vec<u8> {
        let mut bytes = pack_file_header(frames.iter().map(|&f| f as u32).sum()).to_vec();
        for &samples in frames {
            let header = FrameHeader::new(1, 8000, samples);
            bytes.extend_from_slice(&header.pack().to_be_bytes());
            let lms = QoaLms {
                history: [0; 4],
                weights: [0; 4],
            };
            for word in pack_lms(&lms) {
                bytes.extend_from_slice(&word.to_be_bytes());
            }
            for _ in 0..header.num_slices() {
                bytes.extend_from_slice(&0u64.to_be_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_flat_filter_counts_up() {
        // With zero weights the prediction stays 0 until the weights adapt,
        // and delta = 1 >> 4 = 0 keeps them at zero: every sample is 0 + 1.
        let mut decoder = QoaDecoder::new(Cursor::new(ones_stream(&[45]))).unwrap();
        assert_eq!(
            decoder.format(),
            Some(AudioFormat {
                channels: 1,
                sample_rate: 8000
            })
        );
        assert_eq!(decoder.state(), DecoderState::FrameLoaded);
        let mut buf = [0i16; 64];
        let progress = decoder.read_samples(&mut buf).unwrap();
        assert_eq!(progress.count, 45);
        assert!(progress.end_of_stream);
        assert!(buf[..45].iter().all(|&s| s == 1));
        assert_eq!(decoder.state(), DecoderState::Eof);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = ones_stream(&[20]);
        bytes[3] = b'g';
        assert!(matches!(
            QoaDecoder::new(Cursor::new(bytes)),
            Err(DecodeError::MalformedHeader)
        ));
        assert!(matches!(
            QoaDecoder::new(Cursor::new(b"qoa".to_vec())),
            Err(DecodeError::MalformedHeader)
        ));
    }

    #[test]
    fn test_empty_stream_is_at_eof() {
        let mut decoder = QoaDecoder::new(Cursor::new(ones_stream(&[]))).unwrap();
        assert_eq!(decoder.format(), None);
        assert!(decoder.is_empty());
        let mut buf = [0i16; 8];
        let progress = decoder.read_samples(&mut buf).unwrap();
        assert_eq!(
            progress,
            ReadProgress {
                count: 0,
                end_of_stream: true
            }
        );
    }

    #[test]
    fn test_reads_across_frames_in_small_chunks() {
        let mut decoder = QoaDecoder::new(Cursor::new(ones_stream(&[30, 30, 7]))).unwrap();
        let mut total = 0;
        let mut buf = [0i16; 11];
        loop {
            let progress = decoder.read_samples(&mut buf).unwrap();
            total += progress.count;
            if progress.end_of_stream {
                break;
            }
            assert_eq!(progress.count, buf.len());
        }
        assert_eq!(total, 67);
        assert_eq!(decoder.position(), 67);
    }

    #[test]
    fn test_channel_change_is_corrupt() {
        let mut bytes = ones_stream(&[20]);
        let header = FrameHeader::new(2, 8000, 20);
        bytes.extend_from_slice(&header.pack().to_be_bytes());
        bytes.resize(bytes.len() + header.frame_size as usize - 8, 0);

        let mut decoder = QoaDecoder::new(Cursor::new(bytes)).unwrap();
        let mut buf = [0i16; 64];
        assert!(matches!(
            decoder.read_samples(&mut buf),
            Err(DecodeError::StreamCorrupt(_))
        ));
        assert_eq!(decoder.state(), DecoderState::Error);
        assert!(matches!(decoder.read_samples(&mut buf), Err(DecodeError::Failed)));
    }

    #[test]
    fn test_sample_rate_change_is_corrupt() {
        let mut bytes = ones_stream(&[20]);
        let header = FrameHeader::new(1, 16000, 20);
        bytes.extend_from_slice(&header.pack().to_be_bytes());
        bytes.resize(bytes.len() + header.frame_size as usize - 8, 0);

        let mut decoder = QoaDecoder::new(Cursor::new(bytes)).unwrap();
        let mut buf = [0i16; 64];
        assert!(matches!(
            decoder.read_samples(&mut buf),
            Err(DecodeError::StreamCorrupt(
                "channel count or sample rate changed between frames"
            ))
        ));
        assert_eq!(decoder.state(), DecoderState::Error);
        assert!(matches!(decoder.read_samples(&mut buf), Err(DecodeError::Failed)));
    }

    #[test]
    fn test_read_samples_f32_scales_pending_samples() {
        let mut decoder = QoaDecoder::new(Cursor::new(ones_stream(&[30, 10]))).unwrap();
        let mut buf = [0f32; 25];
        let progress = decoder.read_samples_f32(&mut buf).unwrap();
        assert_eq!(progress.count, 25);
        assert!(buf.iter().all(|&s| s == 1.0 / 32767.0));

        let mut rest = [0f32; 25];
        let progress = SampleStream::read_samples_f32(&mut decoder, &mut rest).unwrap();
        assert_eq!(progress.count, 15);
        assert!(progress.end_of_stream);
        assert!(rest[..15].iter().all(|&s| s == 1.0 / 32767.0));
    }

    #[test]
    fn test_truncated_frame_is_not_eof() {
        let mut bytes = ones_stream(&[20, 20]);
        bytes.truncate(bytes.len() - 3);
        let mut decoder = QoaDecoder::new(Cursor::new(bytes)).unwrap();
        let mut buf = [0i16; 64];
        assert!(matches!(
            decoder.read_samples(&mut buf),
            Err(DecodeError::StreamCorrupt("truncated frame"))
        ));
    }

    #[test]
    fn test_seek_requires_seekable_source() {
        let bytes = ones_stream(&[20]);
        let mut decoder = QoaDecoder::new(ReadOnlySource::new(&bytes[..])).unwrap();
        assert!(matches!(decoder.seek(5), Err(DecodeError::SeekUnsupported)));
        // The decoder is still usable.
        assert_eq!(decoder.by_ref().count(), 20);
    }

    #[test]
    fn test_seek_positions() {
        let mut decoder = QoaDecoder::new(Cursor::new(ones_stream(&[30, 30, 7]))).unwrap();
        decoder.seek(45).unwrap();
        assert_eq!(decoder.position(), 45);
        assert_eq!(decoder.by_ref().count(), 22);

        decoder.seek(67).unwrap();
        let mut buf = [0i16; 4];
        assert!(decoder.read_samples(&mut buf).unwrap().end_of_stream);

        assert!(matches!(
            decoder.seek(68),
            Err(DecodeError::SeekOutOfBounds { target: 68, total: 67 })
        ));
        // Out of range seeks leave the decoder usable.
        decoder.seek(0).unwrap();
        assert_eq!(decoder.by_ref().count(), 67);
    }

    #[test]
    fn test_seek_from_relative_targets() {
        let mut decoder = QoaDecoder::new(Cursor::new(ones_stream(&[30, 30, 7]))).unwrap();
        assert_eq!(decoder.seek_from(SeekFrom::End(-7)).unwrap(), 60);
        assert_eq!(decoder.position(), 60);
        assert_eq!(decoder.seek_from(SeekFrom::Current(-10)).unwrap(), 50);
        assert_eq!(decoder.seek_from(SeekFrom::Start(5)).unwrap(), 5);
        assert_eq!(decoder.seek_from(SeekFrom::End(0)).unwrap(), 67);
        assert_eq!(decoder.by_ref().count(), 0);

        assert!(matches!(
            decoder.seek_from(SeekFrom::Current(-100)),
            Err(DecodeError::SeekBeforeStart)
        ));
        assert!(matches!(
            decoder.seek_from(SeekFrom::End(1)),
            Err(DecodeError::SeekOutOfBounds { target: 68, total: 67 })
        ));
        // Neither error moves or poisons the decoder.
        assert_eq!(decoder.seek_from(SeekFrom::Current(0)).unwrap(), 67);
        assert_eq!(decoder.seek_from(SeekFrom::Start(40)).unwrap(), 40);
        assert_eq!(decoder.by_ref().count(), 27);
    }

    #[test]
    fn test_seek_from_current_zero_on_unseekable_source() {
        let bytes = ones_stream(&[20]);
        let mut decoder = QoaDecoder::new(ReadOnlySource::new(&bytes[..])).unwrap();
        let mut buf = [0i16; 8];
        decoder.read_samples(&mut buf).unwrap();
        assert_eq!(decoder.seek_from(SeekFrom::Current(0)).unwrap(), 8);
        assert!(matches!(
            decoder.seek_from(SeekFrom::Current(1)),
            Err(DecodeError::SeekUnsupported)
        ));
    }

    #[test]
    fn test_failed_seek_keeps_read_position() {
        let mut decoder = QoaDecoder::new(Cursor::new(ones_stream(&[30, 30]))).unwrap();
        let mut buf = [0i16; 10];
        decoder.read_samples(&mut buf).unwrap();
        assert!(decoder.seek(100).is_err());
        assert_eq!(decoder.position(), 10);
        assert_eq!(decoder.by_ref().count(), 50);
    }
}
