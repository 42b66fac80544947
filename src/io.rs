//! Byte sources the decoder can read from.
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};

/// A byte source for the decoder.
///
/// Seeking is a capability that is checked at runtime: a source that cannot
/// seek still implements [`Seek`] but returns `false` from
/// [`MediaSource::is_seekable`], and the decoder refuses random access on it.
pub trait MediaSource: Read + Seek {
    /// Returns if the source can seek.
    fn is_seekable(&self) -> bool;
}

impl MediaSource for File {
    /// Regular files can seek, pipes and other special files cannot.
    fn is_seekable(&self) -> bool {
        self.metadata().map(|m| m.is_file()).unwrap_or(false)
    }
}

impl<T: AsRef<[u8]>> MediaSource for Cursor<T> {
    fn is_seekable(&self) -> bool {
        true
    }
}

impl<R: MediaSource> MediaSource for BufReader<R> {
    fn is_seekable(&self) -> bool {
        self.get_ref().is_seekable()
    }
}

impl<S: MediaSource + ?Sized> MediaSource for &mut S {
    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }
}

impl<S: MediaSource + ?Sized> MediaSource for Box<S> {
    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }
}

/// `ReadOnlySource` wraps any [`Read`] in an unseekable [`MediaSource`].
#[derive(Debug)]
pub struct ReadOnlySource<R> {
    inner: R,
}

impl<R: Read> ReadOnlySource<R> {
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Seek for ReadOnlySource<R> {
    fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "source does not support seeking"))
    }
}

impl<R: Read> MediaSource for ReadOnlySource<R> {
    fn is_seekable(&self) -> bool {
        false
    }
}

/// An unseekable source that first replays bytes already taken from `inner`.
///
/// Used when sniffing a format consumed the leading bytes of a stream that
/// cannot be rewound.
#[derive(Debug)]
pub(crate) struct ReplaySource<R> {
    prefix: Cursor<Vec<u8>>,
    inner: R,
}

impl<R: Read> ReplaySource<R> {
    pub(crate) fn new(prefix: Vec<u8>, inner: R) -> Self {
        ReplaySource {
            prefix: Cursor::new(prefix),
            inner,
        }
    }
}

impl<R: Read> Read for ReplaySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.prefix.read(buf)?;
        if n > 0 {
            return Ok(n);
        }
        self.inner.read(buf)
    }
}

impl<R: Read> Seek for ReplaySource<R> {
    fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "source does not support seeking"))
    }
}

impl<R: Read> MediaSource for ReplaySource<R> {
    fn is_seekable(&self) -> bool {
        false
    }
}
