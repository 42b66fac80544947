use std::time::Duration;

use crate::decoder::QoaDecoder;
use crate::io::MediaSource;

/// Plays a [`QoaDecoder`] through rodio.
pub struct QoaRodioSource<R> {
    decoder: QoaDecoder<R>,
}

impl<R: MediaSource> QoaRodioSource<R> {
    /// Wrap a decoder as a Rodio Source for playback.
    pub fn new(decoder: QoaDecoder<R>) -> QoaRodioSource<R> {
        Self { decoder }
    }

    pub fn into_inner(self) -> QoaDecoder<R> {
        self.decoder
    }
}

impl<R: MediaSource> Iterator for QoaRodioSource<R> {
    type Item = i16;

    /// Return samples of i16 for Rodio. Errors stop playback.
    fn next(&mut self) -> Option<Self::Item> {
        match self.decoder.next() {
            Some(Ok(sample)) => Some(sample),
            Some(Err(e)) => {
                log::error!("qoa playback stopped: {}", e);
                None
            }
            None => None,
        }
    }
}

impl<R: MediaSource> rodio::Source for QoaRodioSource<R> {
    /// Channels and rate never change within a stream, so there are no frame
    /// boundaries to report.
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.decoder.format().map_or(1, |f| f.channels.into())
    }

    fn sample_rate(&self) -> u32 {
        self.decoder.format().map_or(44100, |f| f.sample_rate)
    }

    fn total_duration(&self) -> Option<Duration> {
        self.decoder.total_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::QoaEncoder;
    use rodio::Source;
    use std::io::Cursor;

    #[test]
    fn test_source_reports_format() {
        let mut encoder = QoaEncoder::new(Cursor::new(Vec::new()), 2, 48000).unwrap();
        encoder.write_samples(&[0; 96]).unwrap();
        let bytes = encoder.finish().unwrap().into_inner();

        let source = QoaRodioSource::new(QoaDecoder::new(Cursor::new(bytes)).unwrap());
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 48000);
        assert_eq!(source.total_duration(), Some(Duration::from_millis(1)));
        assert_eq!(source.count(), 96);
    }
}
