// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Streaming sources and sinks of PCM samples
//!
//! A [`PcmReader`] hands out [`SampleBlock`]s on request
//! until it runs dry, at which point it returns an empty block.
//! A [`PcmWriter`] accepts blocks until it's closed.
//! The stream encoder and decoder consume and produce
//! samples through these two interfaces.

use crate::Error;
use crate::audio::SampleBlock;
use crate::metadata::Metadata;

/// A pull-based source of PCM samples
pub trait PcmReader: Metadata {
    /// Reads approximately `bytes` bytes worth of PCM frames
    ///
    /// At least one PCM frame is returned if any remain.
    /// An empty block indicates the end of the stream.
    ///
    /// # Errors
    ///
    /// Passes along any error from the underlying stream.
    fn read(&mut self, bytes: usize) -> Result<SampleBlock, Error>;

    /// Releases any resources held by the reader
    ///
    /// # Errors
    ///
    /// Passes along any error from the underlying stream.
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// The number of bytes a single PCM frame occupies
    fn bytes_per_frame(&self) -> usize {
        usize::from(self.channel_count()) * self.bits_per_sample().div_ceil(8) as usize
    }

    /// The number of whole PCM frames `bytes` bytes hold, at least 1
    fn frames_for(&self, bytes: usize) -> usize {
        (bytes / self.bytes_per_frame().max(1)).max(1)
    }
}

/// A sink of PCM samples
pub trait PcmWriter {
    /// Writes block of samples to the sink
    ///
    /// # Errors
    ///
    /// Returns an error if the block's parameters don't match
    /// the sink's, or an I/O error occurs.
    fn write(&mut self, block: &SampleBlock) -> Result<(), Error>;

    /// Completes the stream, flushing anything buffered
    ///
    /// # Errors
    ///
    /// Passes along any error from the underlying stream.
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Copies all samples from reader to writer, then closes both
///
/// Returns the number of PCM frames transferred.
///
/// # Errors
///
/// Passes along any error from the reader or writer.
pub fn transfer<R, W>(reader: &mut R, writer: &mut W, bytes_per_read: usize) -> Result<u64, Error>
where
    R: PcmReader + ?Sized,
    W: PcmWriter + ?Sized,
{
    let mut frames = 0;
    loop {
        let block = reader.read(bytes_per_read)?;
        if block.is_empty() {
            break;
        }
        frames += block.pcm_frames() as u64;
        writer.write(&block)?;
    }
    reader.close()?;
    writer.close()?;
    Ok(frames)
}

/// A PCM source over samples held in memory
#[derive(Clone, Debug)]
pub struct MemoryReader {
    block: SampleBlock,
    // PCM frames handed out so far
    position: usize,
    sample_rate: u32,
    channel_mask: ChannelMask,
    total_samples: u64,
}

impl MemoryReader {
    /// Builds reader over the given samples with a default channel mask
    pub fn new(block: SampleBlock, sample_rate: u32) -> Self {
        let channel_mask = ChannelMask::from_channels(block.channel_count() as u8);
        Self::with_mask(block, sample_rate, channel_mask)
    }

    /// Builds reader over the given samples and channel mask
    pub fn with_mask(block: SampleBlock, sample_rate: u32, channel_mask: ChannelMask) -> Self {
        Self {
            total_samples: block.pcm_frames() as u64,
            block,
            position: 0,
            sample_rate,
            channel_mask,
        }
    }

    /// Builds reader which hands out the given blocks in turn
    ///
    /// # Errors
    ///
    /// Returns an error if the blocks have differing parameters.
    pub fn from_blocks(blocks: &[SampleBlock], sample_rate: u32) -> Result<Self, Error> {
        match blocks.split_first() {
            Some((first, rest)) => {
                let mut all = first.clone();
                rest.iter().try_for_each(|b| all.extend(b))?;
                Ok(Self::new(all, sample_rate))
            }
            None => Err(Error::InvalidSampleCount),
        }
    }
}

impl Metadata for MemoryReader {
    fn channel_count(&self) -> u8 {
        self.block.channel_count() as u8
    }

    fn channel_mask(&self) -> ChannelMask {
        self.channel_mask
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u32 {
        self.block.bits_per_sample()
    }

    fn total_samples(&self) -> Option<u64> {
        Some(self.total_samples)
    }
}

impl PcmReader for MemoryReader {
    fn read(&mut self, bytes: usize) -> Result<SampleBlock, Error> {
        let head = self.block.slice(self.position, self.frames_for(bytes));
        self.position += head.pcm_frames();
        Ok(head)
    }
}

/// A PCM sink which collects samples in memory
#[derive(Clone, Debug)]
pub struct MemoryWriter {
    block: SampleBlock,
}

impl MemoryWriter {
    /// Builds empty writer for the given parameters
    ///
    /// # Errors
    ///
    /// Returns an error if there are no channels or
    /// `bits_per_sample` isn't between 1 and 32.
    pub fn new(channels: usize, bits_per_sample: u32) -> Result<Self, Error> {
        Ok(Self {
            block: SampleBlock::empty(channels, bits_per_sample)?,
        })
    }

    /// Returns all the samples written so far
    pub fn into_block(self) -> SampleBlock {
        self.block
    }
}

impl PcmWriter for MemoryWriter {
    fn write(&mut self, block: &SampleBlock) -> Result<(), Error> {
        self.block.extend(block)
    }
}

/// A PCM source which calculates the MD5 of all samples read through it
pub struct Md5Reader<R> {
    reader: R,
    md5: md5::Context,
}

impl<R: PcmReader> Md5Reader<R> {
    /// Wraps reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            md5: md5::Context::new(),
        }
    }

    /// Returns the MD5 sum of all samples read so far
    pub fn digest(&self) -> [u8; 16] {
        self.md5.clone().compute().0
    }

    /// Returns the wrapped reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: PcmReader> Metadata for Md5Reader<R> {
    fn channel_count(&self) -> u8 {
        self.reader.channel_count()
    }

    fn channel_mask(&self) -> ChannelMask {
        self.reader.channel_mask()
    }

    fn sample_rate(&self) -> u32 {
        self.reader.sample_rate()
    }

    fn bits_per_sample(&self) -> u32 {
        self.reader.bits_per_sample()
    }

    fn total_samples(&self) -> Option<u64> {
        self.reader.total_samples()
    }
}

impl<R: PcmReader> PcmReader for Md5Reader<R> {
    fn read(&mut self, bytes: usize) -> Result<SampleBlock, Error> {
        let block = self.reader.read(bytes)?;
        block.update_md5(&mut self.md5);
        Ok(block)
    }

    fn close(&mut self) -> Result<(), Error> {
        self.reader.close()
    }
}

/// A speaker assignment for each channel in a stream
///
/// # Example
///
/// ```
/// use flac_engine::pcm::{Channel, ChannelMask};
///
/// let mask = "0x003F".parse::<ChannelMask>().unwrap();
///
/// let mut channels = mask.channels();
/// assert_eq!(channels.next(), Some(Channel::FrontLeft));
/// assert_eq!(channels.next(), Some(Channel::FrontRight));
/// assert_eq!(channels.next(), Some(Channel::FrontCenter));
/// assert_eq!(channels.next(), Some(Channel::Lfe));
/// assert_eq!(channels.next(), Some(Channel::BackLeft));
/// assert_eq!(channels.next(), Some(Channel::BackRight));
/// assert_eq!(channels.next(), None);
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChannelMask {
    mask: u32,
}

impl ChannelMask {
    /// Iterates over all the mask's defined channels
    pub fn channels(&self) -> impl Iterator<Item = Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| (*channel as u32 & self.mask) != 0)
    }

    /// Number of channels in the mask
    pub fn len(&self) -> usize {
        self.channels().count()
    }

    /// Whether the mask assigns no channels
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Returns the default assignment for the given channel count
    ///
    /// Counts beyond 8 have no default assignment.
    pub fn from_channels(channels: u8) -> Self {
        use Channel::*;

        let assigned: &[Channel] = match channels {
            1 => &[FrontCenter],
            2 => &[FrontLeft, FrontRight],
            3 => &[FrontLeft, FrontRight, FrontCenter],
            4 => &[FrontLeft, FrontRight, BackLeft, BackRight],
            5 => &[FrontLeft, FrontRight, FrontCenter, SideLeft, SideRight],
            6 => &[FrontLeft, FrontRight, FrontCenter, Lfe, SideLeft, SideRight],
            7 => &[
                FrontLeft,
                FrontRight,
                FrontCenter,
                Lfe,
                BackCenter,
                SideLeft,
                SideRight,
            ],
            8 => &[
                FrontLeft,
                FrontRight,
                FrontCenter,
                Lfe,
                BackLeft,
                BackRight,
                SideLeft,
                SideRight,
            ],
            _ => &[],
        };

        Self {
            mask: assigned.iter().fold(0, |mask, c| mask | *c as u32),
        }
    }
}

impl std::str::FromStr for ChannelMask {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('x').ok_or(())? {
            ("0", hex) => u32::from_str_radix(hex, 16)
                .map(|mask| ChannelMask { mask })
                .map_err(|_| ()),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "0x{:04x}", self.mask)
    }
}

impl From<ChannelMask> for u32 {
    fn from(mask: ChannelMask) -> u32 {
        mask.mask
    }
}

impl From<u32> for ChannelMask {
    fn from(mask: u32) -> ChannelMask {
        ChannelMask { mask }
    }
}

/// An individual speaker position
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[allow(missing_docs)]
pub enum Channel {
    FrontLeft = 0x1,
    FrontRight = 0x2,
    FrontCenter = 0x4,
    Lfe = 0x8,
    BackLeft = 0x10,
    BackRight = 0x20,
    FrontLeftOfCenter = 0x40,
    FrontRightOfCenter = 0x80,
    BackCenter = 0x100,
    SideLeft = 0x200,
    SideRight = 0x400,
    TopCenter = 0x800,
    TopFrontLeft = 0x1000,
    TopFrontCenter = 0x2000,
    TopFrontRight = 0x4000,
    TopRearLeft = 0x8000,
    TopRearCenter = 0x10000,
    TopRearRight = 0x20000,
}

impl Channel {
    /// Every channel, in mask bit order
    pub const ALL: [Channel; 18] = [
        Self::FrontLeft,
        Self::FrontRight,
        Self::FrontCenter,
        Self::Lfe,
        Self::BackLeft,
        Self::BackRight,
        Self::FrontLeftOfCenter,
        Self::FrontRightOfCenter,
        Self::BackCenter,
        Self::SideLeft,
        Self::SideRight,
        Self::TopCenter,
        Self::TopFrontLeft,
        Self::TopFrontCenter,
        Self::TopFrontRight,
        Self::TopRearLeft,
        Self::TopRearCenter,
        Self::TopRearRight,
    ];
}
