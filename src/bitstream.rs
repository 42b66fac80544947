//! Packing and unpacking of the fixed-size QOA records.
//!
//! All records are big-endian 64-bit words, except the 4-byte sample count in
//! the stream header.
use std::io;

use crate::error::DecodeError;
use crate::lms::QoaLms;
use crate::tables::{
    MAX_SLICES_PER_CHANNEL_PER_FRAME, QOA_HEADER_SIZE, QOA_LMS_LEN, QOA_MAGIC, QOA_MAX_CHANNELS,
    QOA_SLICE_LEN,
};

/// Size in bytes of one channel's LMS state.
pub const LMS_STATE_SIZE: usize = QOA_LMS_LEN * 4;

/// The metadata at the beginning of each frame of slices.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FrameHeader {
    /// Number of channels in this frame
    pub num_channels: u8,
    /// Sample rate in HZ for this frame
    pub sample_rate: u32,
    /// Samples per channel in this frame
    pub num_samples_per_channel: u16,
    /// Size of the whole frame in bytes, header included
    pub frame_size: u16,
}

/// Calculate frame size for QOA encoding
pub const fn qoa_frame_size(channels: usize, slices: usize) -> usize {
    QOA_HEADER_SIZE + LMS_STATE_SIZE * channels + 8 * slices * channels
}

/// Number of slices needed for `samples` samples of one channel.
pub const fn slices_for(samples: usize) -> usize {
    samples.div_ceil(QOA_SLICE_LEN)
}

impl FrameHeader {
    /// Build the header of a frame holding `samples` per channel, with the
    /// size derived from the layout.
    pub fn new(num_channels: u8, sample_rate: u32, samples: u16) -> Self {
        let size = qoa_frame_size(num_channels as usize, slices_for(samples as usize));
        FrameHeader {
            num_channels,
            sample_rate,
            num_samples_per_channel: samples,
            frame_size: size as u16,
        }
    }

    pub fn pack(&self) -> u64 {
        ((self.num_channels as u64) << 56)
            | (((self.sample_rate & 0xff_ffff) as u64) << 32)
            | ((self.num_samples_per_channel as u64) << 16)
            | (self.frame_size as u64)
    }

    /// Split a frame header word into its fields. The result is untrusted
    /// until [`FrameHeader::validate`] accepts it.
    pub fn unpack(word: u64) -> Self {
        FrameHeader {
            num_channels: (word >> 56) as u8,
            sample_rate: ((word >> 32) & 0xff_ffff) as u32,
            num_samples_per_channel: (word >> 16) as u16,
            frame_size: word as u16,
        }
    }

    pub fn num_slices(&self) -> usize {
        slices_for(self.num_samples_per_channel as usize)
    }

    /// Check the header against the frame layout. Only a validated header may
    /// be used to size buffers or skip bytes.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.num_channels == 0 || self.num_channels as usize > QOA_MAX_CHANNELS {
            return Err(DecodeError::StreamCorrupt("invalid channel count in frame header"));
        }
        if self.sample_rate == 0 {
            return Err(DecodeError::StreamCorrupt("invalid sample rate in frame header"));
        }
        if self.num_slices() > MAX_SLICES_PER_CHANNEL_PER_FRAME {
            return Err(DecodeError::StreamCorrupt("too many slices in frame"));
        }
        let expected = qoa_frame_size(self.num_channels as usize, self.num_slices());
        if self.frame_size as usize != expected {
            return Err(DecodeError::StreamCorrupt("frame size does not match frame layout"));
        }
        Ok(())
    }
}

pub fn pack_file_header(samples: u32) -> [u8; QOA_HEADER_SIZE] {
    let mut bytes = [0u8; QOA_HEADER_SIZE];
    bytes[..4].copy_from_slice(&QOA_MAGIC.to_be_bytes());
    bytes[4..].copy_from_slice(&samples.to_be_bytes());
    bytes
}

/// Returns the total samples per channel stored in a stream header.
pub fn unpack_file_header(bytes: [u8; QOA_HEADER_SIZE]) -> Result<u32, DecodeError> {
    let (magic, samples) = bytes.split_at(4);
    if magic != QOA_MAGIC.to_be_bytes() {
        return Err(DecodeError::MalformedHeader);
    }
    let mut count = [0u8; 4];
    count.copy_from_slice(samples);
    Ok(u32::from_be_bytes(count))
}

/// Pack the history and weights of `lms` into two words.
pub fn pack_lms(lms: &QoaLms) -> [u64; 2] {
    let mut history = 0u64;
    let mut weights = 0u64;
    for i in 0..QOA_LMS_LEN {
        history = (history << 16) | (lms.history[i] as u16 as u64);
        weights = (weights << 16) | (lms.weights[i] as u16 as u64);
    }
    [history, weights]
}

pub fn unpack_lms(mut history: u64, mut weights: u64) -> QoaLms {
    let mut lms = QoaLms {
        history: [0; QOA_LMS_LEN],
        weights: [0; QOA_LMS_LEN],
    };
    for i in 0..QOA_LMS_LEN {
        lms.history[i] = (history >> 48) as i16;
        history <<= 16;
        lms.weights[i] = (weights >> 48) as i16;
        weights <<= 16;
    }
    lms
}

/// Accumulates the codes of one slice. The scale factor occupies the top
/// four bits once the slice is finished.
#[derive(Debug, Clone, Copy)]
pub struct SliceWriter {
    word: u64,
    len: usize,
}

impl SliceWriter {
    pub fn new(scalefactor: usize) -> Self {
        SliceWriter {
            word: scalefactor as u64 & 0xf,
            len: 0,
        }
    }

    #[inline(always)]
    pub fn push(&mut self, quantized: u8) {
        self.word = (self.word << 3) | (quantized & 0x7) as u64;
        self.len += 1;
    }

    /// The finished word, left-aligned when fewer than 20 codes were pushed.
    pub fn finish(self) -> u64 {
        self.word << ((QOA_SLICE_LEN - self.len) * 3)
    }
}

/// Reads the scale factor and codes of a slice word, most significant first.
#[derive(Debug, Clone, Copy)]
pub struct SliceReader {
    word: u64,
}

impl SliceReader {
    pub fn new(word: u64) -> Self {
        SliceReader { word }
    }

    pub fn scalefactor(&self) -> usize {
        (self.word >> 60) as usize
    }

    /// Code of sample `index` within the slice.
    #[inline(always)]
    pub fn code(&self, index: usize) -> usize {
        ((self.word >> (57 - 3 * index)) & 0x7) as usize
    }
}

pub(crate) fn read_array<R: io::Read, const LEN: usize>(mut reader: R) -> io::Result<[u8; LEN]> {
    let mut bytes = [0_u8; LEN];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Fill `buf` completely, or report `Ok(false)` when the source is already
/// exhausted. Running dry part way through is `UnexpectedEof`.
pub(crate) fn read_exact_or_eof<R: io::Read>(mut reader: R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_header_layout() {
        let header = FrameHeader::new(2, 44100, 5120);
        assert_eq!(header.frame_size as usize, 8 + 16 * 2 + 8 * 256 * 2);
        let word = header.pack();
        assert_eq!(word >> 56, 2);
        assert_eq!((word >> 32) & 0xff_ffff, 44100);
        assert_eq!((word >> 16) & 0xffff, 5120);
        assert_eq!(FrameHeader::unpack(word), header);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_frame_size_rounds_partial_slices_up() {
        let header = FrameHeader::new(1, 8000, 21);
        assert_eq!(header.num_slices(), 2);
        assert_eq!(header.frame_size, 8 + 16 + 16);
        assert_eq!(FrameHeader::new(3, 8000, 0).frame_size, 8 + 48);
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        let mut header = FrameHeader::new(1, 44100, 256);
        header.frame_size += 8;
        assert!(matches!(header.validate(), Err(DecodeError::StreamCorrupt(_))));

        let header = FrameHeader::new(9, 44100, 20);
        assert!(header.validate().is_err());

        let header = FrameHeader::new(1, 0, 20);
        assert!(header.validate().is_err());

        let header = FrameHeader::new(1, 44100, 5121);
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_file_header() {
        let bytes = pack_file_header(1234);
        assert_eq!(&bytes[..4], b"qoaf");
        assert_eq!(unpack_file_header(bytes).unwrap(), 1234);

        let mut bad = bytes;
        bad[0] = b'Q';
        assert!(matches!(
            unpack_file_header(bad),
            Err(DecodeError::MalformedHeader)
        ));
    }

    #[test]
    fn test_lms_packing() {
        let lms = QoaLms {
            history: [-1, 2, -300, 32767],
            weights: [-32768, 0, -8192, 16384],
        };
        let [history, weights] = pack_lms(&lms);
        assert_eq!(history >> 48, 0xffff);
        assert_eq!(weights & 0xffff, 16384);
        assert_eq!(unpack_lms(history, weights), lms);
    }

    #[test]
    fn test_slice_packing() {
        let mut writer = SliceWriter::new(13);
        for code in [1u8, 7, 0, 4] {
            writer.push(code);
        }
        let word = writer.finish();
        let reader = SliceReader::new(word);
        assert_eq!(reader.scalefactor(), 13);
        assert_eq!(reader.code(0), 1);
        assert_eq!(reader.code(1), 7);
        assert_eq!(reader.code(2), 0);
        assert_eq!(reader.code(3), 4);
        // Unused positions of a short slice are zero.
        for i in 4..QOA_SLICE_LEN {
            assert_eq!(reader.code(i), 0);
        }
    }

    #[test]
    fn test_full_slice_fills_word() {
        let mut writer = SliceWriter::new(0xf);
        for _ in 0..QOA_SLICE_LEN {
            writer.push(7);
        }
        assert_eq!(writer.finish(), u64::MAX);
    }

    #[test]
    fn test_read_exact_or_eof() {
        let mut buf = [0u8; 4];
        assert!(!read_exact_or_eof(Cursor::new(Vec::<u8>::new()), &mut buf).unwrap());
        assert!(read_exact_or_eof(Cursor::new(vec![1, 2, 3, 4, 5]), &mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3, 4]);
        let err = read_exact_or_eof(Cursor::new(vec![1, 2]), &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
