//! Selecting a decoder by the magic bytes at the start of a source.
//!
//! The registry is a plain value: build one, register the formats the
//! application supports and pass it to whatever opens audio.
use std::fmt;
use std::io::{Read, Seek, SeekFrom};

use log::debug;

use crate::decoder::QoaDecoder;
use crate::error::DecodeError;
use crate::io::{MediaSource, ReplaySource};
use crate::stream::SampleStream;

/// Creates a sample stream from a source positioned at the start of the
/// format's data.
pub type OpenFn = fn(Box<dyn MediaSource>) -> Result<Box<dyn SampleStream>, DecodeError>;

/// A registered format.
#[derive(Clone, Copy)]
pub struct FormatDescriptor {
    /// Short name, like "qoa" or "wav".
    pub name: &'static str,
    /// Leading bytes of the format. `?` matches any byte.
    pub magic: &'static [u8],
    pub open: OpenFn,
}

impl fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FormatDescriptor")
            .field("name", &self.name)
            .field("magic", &String::from_utf8_lossy(self.magic))
            .finish()
    }
}

fn open_qoa(source: Box<dyn MediaSource>) -> Result<Box<dyn SampleStream>, DecodeError> {
    Ok(Box::new(QoaDecoder::new(source)?))
}

/// The QOA decoder of this crate.
pub const QOA_FORMAT: FormatDescriptor = FormatDescriptor {
    name: "qoa",
    magic: b"qoaf",
    open: open_qoa,
};

/// An ordered table of formats. The first registered match wins.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: Vec<FormatDescriptor>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that knows the QOA format.
    pub fn with_qoa() -> Self {
        let mut registry = Self::new();
        registry.register(QOA_FORMAT);
        registry
    }

    pub fn register(&mut self, format: FormatDescriptor) -> &mut Self {
        self.formats.push(format);
        self
    }

    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    /// The first format whose magic matches the start of `prefix`.
    pub fn sniff(&self, prefix: &[u8]) -> Option<&FormatDescriptor> {
        self.formats
            .iter()
            .find(|format| magic_matches(format.magic, prefix))
    }

    /// Identify the format of `source` and open it. Returns the format name
    /// together with the stream.
    ///
    /// Seekable sources are rewound after sniffing. For other sources the
    /// sniffed bytes are replayed in front of the rest of the data.
    pub fn open(
        &self,
        mut source: Box<dyn MediaSource>,
    ) -> Result<(&'static str, Box<dyn SampleStream>), DecodeError> {
        let longest = self.formats.iter().map(|f| f.magic.len()).max().unwrap_or(0);
        let mut prefix = Vec::with_capacity(longest);
        (&mut source).take(longest as u64).read_to_end(&mut prefix)?;

        let format = *self.sniff(&prefix).ok_or(DecodeError::UnknownFormat)?;
        debug!("probed format {}", format.name);

        let source: Box<dyn MediaSource> = if source.is_seekable() {
            source.seek(SeekFrom::Current(-(prefix.len() as i64)))?;
            source
        } else {
            Box::new(ReplaySource::new(prefix, source))
        };
        let stream = (format.open)(source)?;
        Ok((format.name, stream))
    }
}

fn magic_matches(magic: &[u8], bytes: &[u8]) -> bool {
    magic.len() <= bytes.len()
        && magic
            .iter()
            .zip(bytes)
            .all(|(&m, &b)| m == b'?' || m == b)
}
