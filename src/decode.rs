// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For decoding FLAC files to PCM samples

use crate::Error;
use crate::audio::SampleBlock;
use crate::bitstream::{BigEndian, BitReader};
use crate::frame::Frame;
use crate::metadata::{Block, Metadata, Streaminfo, read_blocks};
use crate::pcm::{ChannelMask, PcmReader};
use crate::stream::{FrameHeader, FrameNumber};
use crate::tags::VorbisComment;
use std::io::Read;
use std::path::Path;

// smallest window of bytes frames are parsed from
const MIN_WINDOW: usize = 1 << 16;

// most PCM frames reserved up front by read_all
const MAX_RESERVE: u64 = 1 << 22;

/// Reads whole frames from a byte stream
///
/// Frames are parsed from an in-memory window which grows
/// until it holds at least one complete frame.
struct FrameReader<R> {
    reader: R,
    buffer: Vec<u8>,
    // bytes of buffer already consumed
    position: usize,
    // stream offset of buffer[position]
    offset: u64,
    window: usize,
    eof: bool,
}

impl<R: Read> FrameReader<R> {
    fn new(reader: R, offset: u64, streaminfo: &Streaminfo) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            position: 0,
            offset,
            window: streaminfo
                .maximum_frame_size
                .map(|s| s.get() as usize)
                .unwrap_or_default()
                .max(MIN_WINDOW),
            eof: false,
        }
    }

    /// Appends more data to the window, returning whether any was read
    fn fill(&mut self) -> Result<bool, Error> {
        if self.eof {
            return Ok(false);
        }

        self.buffer.drain(..self.position);
        self.position = 0;

        let start = self.buffer.len();
        self.buffer.resize(start + self.window, 0);
        let read = loop {
            match self.reader.read(&mut self.buffer[start..]) {
                Ok(read) => break read,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buffer.truncate(start);
                    return Err(err.into());
                }
            }
        };
        self.buffer.truncate(start + read);
        self.eof = read == 0;
        Ok(read > 0)
    }

    /// Returns next frame's offset, size in bytes and contents
    fn next_frame(&mut self, streaminfo: &Streaminfo) -> Result<Option<(u64, usize, Frame)>, Error> {
        loop {
            if self.position == self.buffer.len() && !self.fill()? {
                return Ok(None);
            }

            let mut r = BitReader::endian(&self.buffer[self.position..], BigEndian);
            match Frame::read(&mut r, streaminfo) {
                Ok(frame) => {
                    let size = r.byte_position();
                    let offset = self.offset;
                    self.position += size;
                    self.offset += size as u64;
                    return Ok(Some((offset, size, frame)));
                }
                // a frame may straddle the end of our window
                Err(Error::EndOfStream) if self.fill()? => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

/// Counts the bytes read through it
struct Counter<R> {
    reader: R,
    count: u64,
}

impl<R: Read> Read for Counter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.reader.read(buf)?;
        self.count += read as u64;
        Ok(read)
    }
}

/// Reads every metadata block, returning STREAMINFO, the rest,
/// and the number of bytes consumed
fn read_metadata<R: Read>(reader: R) -> Result<(Streaminfo, Vec<Block>, R, u64), Error> {
    let mut blocks = read_blocks(Counter { reader, count: 0 });
    let mut streaminfo = None;
    let mut metadata = Vec::new();

    for block in blocks.by_ref() {
        match block? {
            Block::Streaminfo(s) => {
                streaminfo = Some(s);
            }
            block => metadata.push(block),
        }
    }

    let Counter { reader, count } = blocks.into_inner();

    match streaminfo {
        Some(streaminfo) => Ok((streaminfo, metadata, reader, count)),
        // read_blocks should check for this already
        // but we'll add a second check to be certain
        None => Err(Error::MissingStreaminfo),
    }
}

/// A FLAC decoder
///
/// # Example
///
/// ```
/// use flac_engine::{SampleBlock, decode::Decoder, encode::{Encoder, EncodingOptions}};
/// use std::io::Cursor;
///
/// let block = SampleBlock::from_channels(&[vec![0, 10, 20, 30, 40]], 16).unwrap();
///
/// let mut flac = Cursor::new(vec![]);
/// let mut encoder = Encoder::new(
///     &mut flac,
///     EncodingOptions::default(),
///     44100,
///     16,
///     1,
///     None,
/// ).unwrap();
/// encoder.encode(&block).unwrap();
/// encoder.finalize().unwrap();
///
/// flac.set_position(0);
/// let mut decoder = Decoder::new(flac).unwrap();
/// assert_eq!(decoder.streaminfo().total_samples.map(|s| s.get()), Some(5));
/// assert_eq!(decoder.read_frame().unwrap(), Some(block));
/// assert_eq!(decoder.read_frame().unwrap(), None);
/// ```
pub struct Decoder<R> {
    frames: FrameReader<R>,
    streaminfo: Streaminfo,
    metadata: Vec<Block>,
    channel_mask: ChannelMask,
    frame_number: FrameNumber,
    samples_read: u64,
    md5: md5::Context,
    pending: SampleBlock,
}

impl<R: Read> Decoder<R> {
    /// Builds a new FLAC decoder from the given stream
    ///
    /// This assumes the stream is positioned at the start
    /// of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial FLAC metadata
    /// is invalid or an I/O error occurs reading
    /// the initial metadata.
    pub fn new(reader: R) -> Result<Self, Error> {
        let (streaminfo, metadata, reader, offset) = read_metadata(reader)?;

        let channel_mask = VorbisComment::from_blocks(&metadata)
            .ok()
            .flatten()
            .and_then(|comment| comment.channel_mask())
            .unwrap_or(ChannelMask::from_channels(streaminfo.channels.get()));

        Ok(Self {
            frames: FrameReader::new(reader, offset, &streaminfo),
            pending: SampleBlock::empty(
                usize::from(streaminfo.channels.get()),
                streaminfo.bits_per_sample,
            )?,
            metadata,
            channel_mask,
            frame_number: FrameNumber::default(),
            samples_read: 0,
            md5: md5::Context::new(),
            streaminfo,
        })
    }

    /// The stream's STREAMINFO block
    pub fn streaminfo(&self) -> &Streaminfo {
        &self.streaminfo
    }

    /// Every metadata block other than STREAMINFO, in stream order
    pub fn metadata(&self) -> &[Block] {
        &self.metadata
    }

    fn check_frame_number(&self, header: &FrameHeader) -> Result<(), Error> {
        let expected = match header.blocking_strategy {
            false => self.frame_number.0,
            true => self.samples_read,
        };
        match header.frame_number.0 == expected {
            true => Ok(()),
            false => Err(Error::FrameNumberMismatch),
        }
    }

    /// Reads and decodes the next whole FLAC frame
    ///
    /// Returns `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs when reading
    /// the stream, or if the stream data is invalid.
    /// A stream which ends before the total samples
    /// indicated by STREAMINFO yields [`Error::EndOfStream`].
    pub fn read_frame(&mut self) -> Result<Option<SampleBlock>, Error> {
        match self.frames.next_frame(&self.streaminfo)? {
            Some((_, size, frame)) => {
                self.check_frame_number(&frame.header)?;
                let block = frame.decode()?;

                self.samples_read += block.pcm_frames() as u64;
                if let Some(total) = self.streaminfo.total_samples {
                    if self.samples_read > total.get() {
                        return Err(Error::ExcessiveTotalSamples);
                    }
                }
                if !frame.header.blocking_strategy {
                    self.frame_number.try_increment()?;
                }

                log::debug!(
                    "frame {} : {} samples, {}, {} bytes",
                    frame.header.frame_number,
                    block.pcm_frames(),
                    frame.header.channel_assignment,
                    size
                );

                block.update_md5(&mut self.md5);
                Ok(Some(block))
            }
            None => match self.streaminfo.total_samples {
                Some(total) if self.samples_read < total.get() => Err(Error::EndOfStream),
                _ => Ok(None),
            },
        }
    }

    /// Decodes every remaining frame into a single block
    ///
    /// # Errors
    ///
    /// Returns any error from [`Decoder::read_frame`].
    pub fn read_all(&mut self) -> Result<SampleBlock, Error> {
        let empty = SampleBlock::empty(
            usize::from(self.streaminfo.channels.get()),
            self.streaminfo.bits_per_sample,
        )?;
        let mut all = std::mem::replace(&mut self.pending, empty);

        // size the output once from STREAMINFO's total, when known,
        // without trusting a corrupt total for more than a bounded amount
        if let Some(total) = self.streaminfo.total_samples {
            let left = total.get().saturating_sub(self.samples_read);
            all.reserve(usize::try_from(left.min(MAX_RESERVE)).unwrap_or(0));
        }

        while let Some(block) = self.read_frame()? {
            all.extend(&block)?;
        }
        Ok(all)
    }

    /// Compares the MD5 of every sample decoded so far
    /// against the one stored in STREAMINFO
    ///
    /// Meaningful only once the whole stream has been decoded.
    pub fn verify_md5(&self) -> Verified {
        match self.streaminfo.md5 {
            Some(expected) if self.md5.clone().compute().0 == expected => Verified::MD5Match,
            Some(_) => {
                log::warn!("decoded MD5 differs from STREAMINFO");
                Verified::MD5Mismatch
            }
            None => Verified::NoMD5,
        }
    }
}

impl<R: Read> Metadata for Decoder<R> {
    fn channel_count(&self) -> u8 {
        self.streaminfo.channel_count()
    }

    fn channel_mask(&self) -> ChannelMask {
        self.channel_mask
    }

    fn sample_rate(&self) -> u32 {
        self.streaminfo.sample_rate()
    }

    fn bits_per_sample(&self) -> u32 {
        self.streaminfo.bits_per_sample()
    }

    fn total_samples(&self) -> Option<u64> {
        self.streaminfo.total_samples()
    }

    fn md5(&self) -> Option<&[u8; 16]> {
        self.streaminfo.md5()
    }
}

impl<R: Read> PcmReader for Decoder<R> {
    fn read(&mut self, bytes: usize) -> Result<SampleBlock, Error> {
        let wanted = self.frames_for(bytes);

        while self.pending.pcm_frames() < wanted {
            match self.read_frame()? {
                Some(block) => self.pending.extend(&block)?,
                None => break,
            }
        }

        Ok(self.pending.take(wanted))
    }
}

/// The result of a FLAC file verification
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Verified {
    /// All frames are valid and MD5 matches
    MD5Match,
    /// All frames are valid, but MD5 does not match
    MD5Mismatch,
    /// All frames are valid, and no MD5 is present
    NoMD5,
}

/// Verifies FLAC file for correctness
///
/// # Errors
///
/// Returns any error from opening or decoding the file.
pub fn verify<P: AsRef<Path>>(path: P) -> Result<Verified, Error> {
    let mut decoder = std::fs::File::open(path.as_ref())
        .map(std::io::BufReader::new)
        .map_err(Error::Io)
        .and_then(Decoder::new)?;

    while decoder.read_frame()?.is_some() {}

    let verified = decoder.verify_md5();
    if verified == Verified::MD5Mismatch {
        log::warn!("{} : MD5 mismatch", path.as_ref().display());
    }
    Ok(verified)
}

/// Verifies many FLAC files, in the same order as given
///
/// With the `rayon` feature enabled, files are verified in parallel.
#[cfg(not(feature = "rayon"))]
pub fn verify_all<P: AsRef<Path> + Sync>(paths: &[P]) -> Vec<Result<Verified, Error>> {
    paths.iter().map(verify).collect()
}

/// Verifies many FLAC files, in the same order as given
///
/// With the `rayon` feature enabled, files are verified in parallel.
#[cfg(feature = "rayon")]
pub fn verify_all<P: AsRef<Path> + Sync>(paths: &[P]) -> Vec<Result<Verified, Error>> {
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    paths.par_iter().map(verify).collect()
}

/// A single step through a FLAC stream
#[derive(Debug)]
pub enum DecodeEvent {
    /// A metadata block, including STREAMINFO
    Metadata(Block),
    /// A parsed but undecoded frame
    Frame {
        /// The frame's byte offset from the start of the stream
        offset: u64,
        /// The frame's size in bytes, including its checksums
        size: usize,
        /// The frame's header and every subframe's model
        frame: Frame,
    },
}

/// Iterates over a FLAC stream's structure
///
/// Yields every metadata block followed by every frame,
/// with each subframe's model and residuals intact.
/// The iterator ends after the last frame or the first error
/// and cannot be resumed.
///
/// # Example
///
/// ```
/// use flac_engine::{SampleBlock, decode::{Analyzer, DecodeEvent}};
/// use flac_engine::encode::{Encoder, EncodingOptions};
/// use std::io::Cursor;
///
/// let block = SampleBlock::from_channels(&[vec![5; 100]], 16).unwrap();
///
/// let mut flac = Cursor::new(vec![]);
/// let mut encoder = Encoder::new(
///     &mut flac,
///     EncodingOptions::default().padding(0).unwrap(),
///     44100,
///     16,
///     1,
///     None,
/// ).unwrap();
/// encoder.encode(&block).unwrap();
/// encoder.finalize().unwrap();
///
/// flac.set_position(0);
/// let events = Analyzer::new(flac).unwrap().collect::<Result<Vec<_>, _>>().unwrap();
/// assert_eq!(events.len(), 2);
/// assert!(matches!(events[0], DecodeEvent::Metadata(_)));
/// assert!(matches!(events[1], DecodeEvent::Frame { offset: 42, .. }));
/// ```
pub struct Analyzer<R> {
    streaminfo: Streaminfo,
    blocks: std::vec::IntoIter<Block>,
    frames: FrameReader<R>,
    failed: bool,
}

impl<R: Read> Analyzer<R> {
    /// Opens the stream for analysis
    ///
    /// # Errors
    ///
    /// Returns an error if the stream's metadata is invalid.
    pub fn new(reader: R) -> Result<Self, Error> {
        let (streaminfo, metadata, reader, offset) = read_metadata(reader)?;

        Ok(Self {
            frames: FrameReader::new(reader, offset, &streaminfo),
            blocks: std::iter::once(Block::Streaminfo(streaminfo.clone()))
                .chain(metadata)
                .collect::<Vec<_>>()
                .into_iter(),
            streaminfo,
            failed: false,
        })
    }
}

impl<R: Read> Iterator for Analyzer<R> {
    type Item = Result<DecodeEvent, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if let Some(block) = self.blocks.next() {
            return Some(Ok(DecodeEvent::Metadata(block)));
        }

        match self.frames.next_frame(&self.streaminfo) {
            Ok(Some((offset, size, frame))) => Some(Ok(DecodeEvent::Frame {
                offset,
                size,
                frame,
            })),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
