use std::io::SeekFrom;

use log::debug;

use crate::bitstream::{read_exact_or_eof, FrameHeader};
use crate::error::DecodeError;
use crate::io::MediaSource;
use crate::tables::QOA_HEADER_SIZE;

/// Location of one frame in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndexEntry {
    /// Byte offset of the frame header within the source.
    pub offset: u64,
    /// Samples per channel in the frame.
    pub samples: u16,
}

/// Where a seek target lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPoint {
    /// Inside a frame: decode it and drop `skip` samples per channel.
    Frame { entry: FrameIndexEntry, skip: usize },
    /// Exactly at the end of the stream.
    End { offset: u64 },
}

/// Table of frame offsets, built once by scanning the frame headers.
#[derive(Debug, Clone, Default)]
pub struct SeekIndex {
    entries: Vec<FrameIndexEntry>,
    end_offset: u64,
    total_samples: u64,
}

impl SeekIndex {
    /// Scan every frame header of `source`, starting at `first_frame` (the
    /// byte right after the stream header), and leave the source positioned
    /// there again.
    pub fn build<S: MediaSource + ?Sized>(
        source: &mut S,
        first_frame: u64,
    ) -> Result<Self, DecodeError> {
        let mut index = SeekIndex::default();
        let mut offset = source.seek(SeekFrom::Start(first_frame))?;

        loop {
            let mut word = [0u8; 8];
            let found = read_exact_or_eof(&mut *source, &mut word)
                .map_err(|e| DecodeError::truncated(e, "truncated frame header"))?;
            if !found {
                break;
            }
            let header = FrameHeader::unpack(u64::from_be_bytes(word));
            header.validate()?;

            index.entries.push(FrameIndexEntry {
                offset,
                samples: header.num_samples_per_channel,
            });
            index.total_samples += u64::from(header.num_samples_per_channel);

            let body = (header.frame_size as usize - QOA_HEADER_SIZE) as i64;
            offset = source.seek(SeekFrom::Current(body))?;
        }

        index.end_offset = offset;
        source.seek(SeekFrom::Start(first_frame))?;

        debug!(
            "built seek index: {} frames, {} samples per channel",
            index.entries.len(),
            index.total_samples
        );
        Ok(index)
    }

    pub fn entries(&self) -> &[FrameIndexEntry] {
        &self.entries
    }

    /// Sum of the samples per channel of all indexed frames.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Find the frame holding `target` (samples per channel from the start).
    pub fn locate(&self, target: u64) -> Option<SeekPoint> {
        let mut start = 0u64;
        for entry in &self.entries {
            let end = start + u64::from(entry.samples);
            if target < end {
                return Some(SeekPoint::Frame {
                    entry: *entry,
                    skip: (target - start) as usize,
                });
            }
            start = end;
        }
        if target == start {
            Some(SeekPoint::End {
                offset: self.end_offset,
            })
        } else {
            None
        }
    }
}
