use std::io;

use thiserror::Error;

/// Errors returned while opening, reading or seeking a QOA stream.
///
/// Every error is fatal for the decoder that returned it, except the seek
/// errors `SeekUnsupported`, `SeekOutOfBounds` and `SeekBeforeStart`. A clean
/// end of stream is not an error, see [`crate::ReadProgress`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream does not start with a complete `qoaf` header.
    #[error("File is not a qoa file")]
    MalformedHeader,
    /// A frame is inconsistent with the stream or was cut short.
    #[error("Corrupt qoa stream: {0}")]
    StreamCorrupt(&'static str),
    /// The underlying source cannot seek.
    #[error("Source does not support seeking")]
    SeekUnsupported,
    /// The requested sample lies past the end of the stream.
    #[error("Seek to sample {target} is past the end of the stream ({total} samples)")]
    SeekOutOfBounds { target: u64, total: u64 },
    /// A relative seek would land before the first sample.
    #[error("Seek target lies before the start of the stream")]
    SeekBeforeStart,
    /// No registered format matches the leading bytes of the source.
    #[error("Unknown audio format")]
    UnknownFormat,
    /// A previous call on this decoder already failed.
    #[error("Decoder failed earlier and cannot continue")]
    Failed,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur during QOA encoding
///
/// Once writing a frame fails the encoder answers every later call with
/// `Failed`. Invalid arguments leave it usable.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Channel count, sample rate, frame length or sample buffer layout is
    /// not encodable.
    #[error("Invalid format: {0}")]
    InvalidFormat(&'static str),
    /// The stream holds more samples per channel than the header can count.
    #[error("Too many samples for a single qoa stream")]
    TooManySamples,
    /// A previous write on this encoder already failed.
    #[error("Encoder failed earlier and cannot continue")]
    Failed,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// Map an I/O error raised in the middle of a record. Running out of
    /// bytes there means the stream was truncated, not that it ended.
    pub(crate) fn truncated(err: io::Error, what: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::StreamCorrupt(what)
        } else {
            DecodeError::Io(err)
        }
    }
}
