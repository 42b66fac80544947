#![forbid(unsafe_code)]
//! # QOA - Quite OK Audio Format
//!
//! A streaming encoder and decoder for qoa files.
//!
//! [`QoaEncoder`] accepts interleaved 16-bit samples in arbitrary chunks and
//! writes frames as they fill up. [`QoaDecoder`] hands samples out from any
//! [`MediaSource`] and can seek to any sample when the source is seekable.
//! [`FormatRegistry`] picks a decoder by the magic bytes of a source.
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

mod bitstream;
mod decoder;
mod encoder;
mod error;
mod index;
mod io;
mod lms;
mod quant;
mod registry;
#[cfg(feature = "rodio")]
mod rodio_source;
mod stream;
mod tables;

pub use bitstream::{qoa_frame_size, FrameHeader, LMS_STATE_SIZE};
pub use decoder::{DecoderState, QoaDecoder};
pub use encoder::{EncoderConfig, EndPosition, QoaEncoder};
pub use error::{DecodeError, EncodeError};
pub use index::{FrameIndexEntry, SeekIndex, SeekPoint};
pub use io::{MediaSource, ReadOnlySource};
pub use lms::QoaLms;
pub use registry::{FormatDescriptor, FormatRegistry, OpenFn, QOA_FORMAT};
#[cfg(feature = "rodio")]
pub use rodio_source::QoaRodioSource;
pub use stream::{AudioFormat, ReadProgress, SampleStream};
pub use tables::{
    MAX_SLICES_PER_CHANNEL_PER_FRAME, QOA_FRAME_LEN, QOA_HEADER_SIZE, QOA_LMS_LEN, QOA_MAGIC,
    QOA_MAX_CHANNELS, QOA_MAX_SAMPLE_RATE, QOA_SLICE_LEN,
};

/// A fully decoded QOA file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedQoa {
    /// Number of channels in `samples`, 0 if the stream holds no frames
    pub num_channels: u8,
    /// Sample rate in HZ of `samples`, 0 if the stream holds no frames
    pub sample_rate: u32,
    /// Interleaved samples of all channels (e.g. L-R-L-R-L-R... if there are
    /// two channels)
    pub samples: Vec<i16>,
}

/// Decode all samples of a QOA stream read from `reader`.
///
/// The reader is never asked to seek. Frames whose channel count or sample
/// rate differ from the first frame fail with [`DecodeError::StreamCorrupt`].
pub fn decode_all<R: Read>(reader: R) -> Result<DecodedQoa, DecodeError> {
    let mut decoder = QoaDecoder::new(ReadOnlySource::new(reader))?;
    let format = decoder.format();
    let channels = format.map_or(0, |f| f.channels);

    // The declared length is untrusted, so it only sizes a bounded reservation.
    let declared = decoder.len().min(1 << 22) as usize;
    let mut samples = Vec::with_capacity(declared * channels as usize);
    let mut chunk = vec![0i16; QOA_FRAME_LEN * channels.max(1) as usize];
    loop {
        let progress = decoder.read_samples(&mut chunk)?;
        samples.extend_from_slice(&chunk[..progress.count]);
        if progress.end_of_stream {
            break;
        }
    }

    Ok(DecodedQoa {
        num_channels: channels,
        sample_rate: format.map_or(0, |f| f.sample_rate),
        samples,
    })
}

/// Same as [`decode_all`] but open the file and wrap in a BufReader first.
pub fn open_and_decode_all<P: AsRef<Path>>(path: P) -> Result<DecodedQoa, DecodeError> {
    let file = File::open(path.as_ref())?;
    decode_all(BufReader::new(file))
}

/// Encode interleaved PCM samples to an in-memory QOA stream.
pub fn encode_all(sample_data: &[i16], format: AudioFormat) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = QoaEncoder::new(Cursor::new(Vec::new()), format.channels, format.sample_rate)?;
    encoder.write_samples(sample_data)?;
    Ok(encoder.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(channels: u8, sample_rate: u32, samples_per_channel: usize) -> Vec<i16> {
        let mut samples = Vec::with_capacity(samples_per_channel * channels as usize);
        for i in 0..samples_per_channel {
            let t = i as f64 / sample_rate as f64;
            for channel in 0..channels {
                let freq = 220.0 * f64::from(channel + 1);
                let sample = (t * freq * 2.0 * std::f64::consts::PI).sin() * 8000.0;
                samples.push(sample as i16);
            }
        }
        samples
    }

    #[test]
    fn test_encode_decode_stereo() {
        let format = AudioFormat {
            channels: 2,
            sample_rate: 44100,
        };
        // 100ms, split over two frames.
        let samples = sine(2, 44100, 4410 + QOA_FRAME_LEN);

        let encoded = encode_all(&samples, format).unwrap();
        assert_eq!(&encoded[..4], b"qoaf");

        let decoded = decode_all(&encoded[..]).unwrap();
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.num_channels, 2);
        assert_eq!(decoded.samples.len(), samples.len());

        let max_diff = samples
            .iter()
            .zip(&decoded.samples)
            .map(|(&a, &b)| (i32::from(a) - i32::from(b)).abs())
            .max()
            .unwrap();
        assert!(max_diff < 512, "Maximum difference too large: {}", max_diff);
    }

    #[test]
    fn test_decode_all_empty_stream() {
        let format = AudioFormat {
            channels: 1,
            sample_rate: 8000,
        };
        let encoded = encode_all(&[], format).unwrap();
        let decoded = decode_all(&encoded[..]).unwrap();
        assert_eq!(
            decoded,
            DecodedQoa {
                num_channels: 0,
                sample_rate: 0,
                samples: Vec::new(),
            }
        );
    }

    #[test]
    fn test_encoder_errors() {
        let samples = vec![0i16; 1000];
        let format = AudioFormat {
            channels: 0,
            sample_rate: 44100,
        };
        assert!(matches!(
            encode_all(&samples, format),
            Err(EncodeError::InvalidFormat(_))
        ));

        let format = AudioFormat {
            channels: 1,
            sample_rate: 0,
        };
        assert!(matches!(
            encode_all(&samples, format),
            Err(EncodeError::InvalidFormat(_))
        ));

        let format = AudioFormat {
            channels: 3,
            sample_rate: 44100,
        };
        assert!(matches!(
            encode_all(&samples, format),
            Err(EncodeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_open_and_decode_all_missing_file() {
        assert!(matches!(
            open_and_decode_all("does/not/exist.qoa"),
            Err(DecodeError::Io(_))
        ));
    }
}
