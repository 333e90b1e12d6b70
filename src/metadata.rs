// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling a FLAC stream's metadata blocks
//!
//! Only STREAMINFO is needed to encode and decode a stream.
//! PADDING and APPLICATION blocks are understood structurally,
//! while every other block type is carried as opaque bytes
//! for higher layers (such as [`crate::tags`]) to interpret.
//!
//! | Block Type | Representation |
//! |-----------:|---------|
//! | STREAMINFO | [`Streaminfo`] |
//! | PADDING | [`Padding`] |
//! | APPLICATION | [`Application`] |
//! | everything else | [`Opaque`] |

use crate::Error;
use crate::pcm::ChannelMask;
use bitstream_io::{BigEndian, BitRead, BitWrite, FromBitStream, ToBitStream};
use std::num::NonZero;

/// The tag every FLAC stream starts with
pub const FLAC_TAG: &[u8; 4] = b"fLaC";

/// Stream parameters common to every PCM source
///
/// Implemented by decoders, WAVE readers, in-memory readers
/// and STREAMINFO itself.
pub trait Metadata {
    /// Number of channels, from 1 to 8
    fn channel_count(&self) -> u8;

    /// Speaker assignment of each channel
    ///
    /// Defaults to the usual assignment for our channel count
    fn channel_mask(&self) -> ChannelMask {
        ChannelMask::from_channels(self.channel_count())
    }

    /// Samples per second, per channel
    fn sample_rate(&self) -> u32;

    /// Significant bits in each sample, from 4 to 32
    fn bits_per_sample(&self) -> u32;

    /// PCM frames in the whole stream, if known
    fn total_samples(&self) -> Option<u64> {
        None
    }

    /// MD5 of the decoded stream, if known
    ///
    /// Samples are hashed as signed little-endian values,
    /// each padded out to whole bytes.
    fn md5(&self) -> Option<&[u8; 16]> {
        None
    }

    /// Size of the whole stream as PCM bytes, if known
    fn decoded_len(&self) -> Option<u64> {
        self.total_samples().map(|s| {
            s * u64::from(self.channel_count()) * u64::from(self.bits_per_sample().div_ceil(8))
        })
    }

    /// Playback length of the whole stream, if known
    fn duration(&self) -> Option<std::time::Duration> {
        let rate = u64::from(self.sample_rate());
        let total = self.total_samples().filter(|_| rate > 0)?;
        let nanos = (total % rate) * 1_000_000_000 / rate;
        Some(std::time::Duration::new(
            total / rate,
            u32::try_from(nanos).unwrap_or_default(),
        ))
    }
}

/// A FLAC metadata block header
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 1    | `last` | final metadata block in stream |
/// | 7    | `block_type` | type of block |
/// | 24   | `size` | block size, in bytes |
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_engine::metadata::{BlockHeader, BlockType};
///
/// let data: &[u8] = &[0b1_0000000, 0x00, 0x00, 0x22];
/// let mut r = BitReader::endian(data, BigEndian);
/// assert_eq!(
///     r.parse::<BlockHeader>().unwrap(),
///     BlockHeader {
///         last: true,
///         block_type: BlockType::Streaminfo,
///         size: 0x22,
///     },
/// );
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    /// Whether we are the final block
    pub last: bool,
    /// Our block type
    pub block_type: BlockType,
    /// Our block size, in bytes
    pub size: u32,
}

impl BlockHeader {
    /// The largest possible block size, in bytes
    pub const MAX_SIZE: u32 = (1 << 24) - 1;
}

impl FromBitStream for BlockHeader {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        Ok(Self {
            last: r.read_bit()?,
            block_type: r.parse()?,
            size: r.read::<24, u32>()?,
        })
    }
}

impl ToBitStream for BlockHeader {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        if self.size > Self::MAX_SIZE {
            return Err(Error::ExcessiveBlockSize);
        }
        w.write_bit(self.last)?;
        w.build(&self.block_type)?;
        w.write::<24, u32>(self.size)?;
        Ok(())
    }
}

/// A FLAC metadata block type
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub enum BlockType {
    /// The STREAMINFO block
    Streaminfo,
    /// The PADDING block
    Padding,
    /// The APPLICATION block
    Application,
    /// The SEEKTABLE block
    SeekTable,
    /// The VORBIS_COMMENT block
    VorbisComment,
    /// The CUESHEET block
    Cuesheet,
    /// The PICTURE block
    Picture,
    /// A reserved block type, from 7 to 126
    Reserved(u8),
}

impl From<BlockType> for u8 {
    fn from(block_type: BlockType) -> u8 {
        match block_type {
            BlockType::Streaminfo => 0,
            BlockType::Padding => 1,
            BlockType::Application => 2,
            BlockType::SeekTable => 3,
            BlockType::VorbisComment => 4,
            BlockType::Cuesheet => 5,
            BlockType::Picture => 6,
            BlockType::Reserved(t) => t,
        }
    }
}

impl TryFrom<u8> for BlockType {
    type Error = Error;

    fn try_from(t: u8) -> Result<Self, Error> {
        match t {
            0 => Ok(Self::Streaminfo),
            1 => Ok(Self::Padding),
            2 => Ok(Self::Application),
            3 => Ok(Self::SeekTable),
            4 => Ok(Self::VorbisComment),
            5 => Ok(Self::Cuesheet),
            6 => Ok(Self::Picture),
            t @ 7..=126 => Ok(Self::Reserved(t)),
            _ => Err(Error::InvalidMetadataBlock),
        }
    }
}

impl FromBitStream for BlockType {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        r.read::<7, u8>()?.try_into()
    }
}

impl ToBitStream for BlockType {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        match *self {
            // reserved types must not alias a defined one
            Self::Reserved(t) if !(7..=126).contains(&t) => Err(Error::InvalidMetadataBlock),
            block_type => w.write::<7, u8>(u8::from(block_type)).map_err(Error::Io),
        }
    }
}

/// A STREAMINFO metadata block
///
/// Every stream has exactly one, and it always comes first.
/// The encoder writes a placeholder when a stream starts
/// and rewrites it in place once the frame size bounds,
/// total samples and MD5 are known.
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 16   | `minimum_block_size` | smallest block, in samples
/// | 16   | `maximum_block_size` | largest block, in samples
/// | 24   | `minimum_frame_size` | smallest frame in bytes, 0 if unknown
/// | 24   | `maximum_frame_size` | largest frame in bytes, 0 if unknown
/// | 20   | `sample_rate` | in Hz
/// | 3    | `channels` | channel count minus 1
/// | 5    | `bits_per_sample` | bits-per-sample minus 1
/// | 36   | `total_samples` | PCM frames in stream, 0 if unknown
/// | 16×8 | `md5` | MD5 of decoded samples, all 0 if unknown
///
/// # Example
/// ```
/// use bitstream_io::{BitReader, BitRead, BigEndian};
/// use flac_engine::metadata::Streaminfo;
/// use std::num::NonZero;
///
/// let mut data = vec![
///     0x04, 0x80,
///     0x04, 0x80,
///     0x00, 0x00, 0x00,
///     0x00, 0x00, 0x00,
///     0b0000_1011, 0b1011_1000, 0b0000_001_1, 0b0111_0000,
///     0x00, 0x00, 0x00, 0x00,
/// ];
/// data.extend([0; 16]);
///
/// let mut r = BitReader::endian(data.as_slice(), BigEndian);
/// assert_eq!(
///     r.parse::<Streaminfo>().unwrap(),
///     Streaminfo {
///         minimum_block_size: 1152,
///         maximum_block_size: 1152,
///         minimum_frame_size: None,
///         maximum_frame_size: None,
///         sample_rate: 48000,
///         channels: NonZero::new(2).unwrap(),
///         bits_per_sample: 24,
///         total_samples: None,
///         md5: None,
///     },
/// );
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Streaminfo {
    /// Smallest block size in samples, not counting the final block
    pub minimum_block_size: u16,
    /// Largest block size in samples, not counting the final block
    pub maximum_block_size: u16,
    /// Smallest frame size in bytes, if known
    pub minimum_frame_size: Option<NonZero<u32>>,
    /// Largest frame size in bytes, if known
    pub maximum_frame_size: Option<NonZero<u32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count, from 1 to 8
    pub channels: NonZero<u8>,
    /// Bits-per-sample, from 4 to 32
    pub bits_per_sample: u32,
    /// PCM frames in the whole stream, if known
    pub total_samples: Option<NonZero<u64>>,
    /// MD5 of the decoded samples, if known
    pub md5: Option<[u8; 16]>,
}

impl Streaminfo {
    /// The size of a STREAMINFO block, in bytes
    pub const SIZE: u32 = 34;

    /// The maximum size of a frame, in bytes (2²⁴ - 1)
    pub const MAX_FRAME_SIZE: u32 = (1 << 24) - 1;

    /// The maximum sample rate, in Hz (2²⁰ - 1)
    pub const MAX_SAMPLE_RATE: u32 = (1 << 20) - 1;

    /// The maximum number of channels (8)
    pub const MAX_CHANNELS: u8 = 8;

    /// The smallest block size permitted, excluding the last block
    pub const MIN_BLOCK_SIZE: u16 = 16;

    /// The maximum number of total samples (2³⁶ - 1)
    pub const MAX_TOTAL_SAMPLES: u64 = (1 << 36) - 1;

    /// Ensures our fields are within the format's limits
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStreamInfo`] describing
    /// the first field out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.minimum_block_size == 0 || self.maximum_block_size == 0 {
            Err(Error::InvalidStreamInfo("zero block size"))
        } else if self.minimum_block_size > self.maximum_block_size {
            Err(Error::InvalidStreamInfo(
                "minimum block size exceeds maximum",
            ))
        } else if self.minimum_block_size < Self::MIN_BLOCK_SIZE
            && self.minimum_block_size != self.maximum_block_size
        {
            Err(Error::InvalidStreamInfo("minimum block size too small"))
        } else if matches!(
            (self.minimum_frame_size, self.maximum_frame_size),
            (Some(min), Some(max)) if min > max
        ) {
            Err(Error::InvalidStreamInfo(
                "minimum frame size exceeds maximum",
            ))
        } else if self.sample_rate == 0 || self.sample_rate > Self::MAX_SAMPLE_RATE {
            Err(Error::InvalidStreamInfo("invalid sample rate"))
        } else if self.channels.get() > Self::MAX_CHANNELS {
            Err(Error::InvalidStreamInfo("too many channels"))
        } else if !(4..=32).contains(&self.bits_per_sample) {
            Err(Error::InvalidStreamInfo("invalid bits-per-sample"))
        } else {
            Ok(())
        }
    }
}

impl Metadata for Streaminfo {
    fn channel_count(&self) -> u8 {
        self.channels.get()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    fn total_samples(&self) -> Option<u64> {
        self.total_samples.map(|s| s.get())
    }

    fn md5(&self) -> Option<&[u8; 16]> {
        self.md5.as_ref()
    }
}

impl FromBitStream for Streaminfo {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        let streaminfo = Self {
            minimum_block_size: r.read_to()?,
            maximum_block_size: r.read_to()?,
            minimum_frame_size: NonZero::new(r.read::<24, u32>()?),
            maximum_frame_size: NonZero::new(r.read::<24, u32>()?),
            sample_rate: r.read::<20, u32>()?,
            channels: NonZero::<u8>::MIN.saturating_add(r.read::<3, u8>()?),
            bits_per_sample: r.read::<5, u32>()? + 1,
            total_samples: NonZero::new(r.read::<36, u64>()?),
            md5: r
                .read_to()
                .map(|md5: [u8; 16]| md5.iter().any(|b| *b != 0).then_some(md5))?,
        };
        streaminfo.validate()?;
        Ok(streaminfo)
    }
}

impl ToBitStream for Streaminfo {
    type Error = Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> Result<(), Self::Error> {
        let frame_size = |s: Option<NonZero<u32>>| match s.map(|s| s.get()) {
            Some(s) if s > Self::MAX_FRAME_SIZE => 0,
            Some(s) => s,
            None => 0,
        };

        w.write_from(self.minimum_block_size)?;
        w.write_from(self.maximum_block_size)?;
        w.write::<24, u32>(frame_size(self.minimum_frame_size))?;
        w.write::<24, u32>(frame_size(self.maximum_frame_size))?;
        w.write::<20, u32>(self.sample_rate)?;
        w.write::<3, u8>(self.channels.get() - 1)?;
        w.write::<5, u32>(self.bits_per_sample - 1)?;
        w.write::<36, u64>(self.total_samples.map(|s| s.get()).unwrap_or(0))?;
        w.write_from(self.md5.unwrap_or([0; 16]))?;
        Ok(())
    }
}

/// A PADDING metadata block
///
/// The contents of a PADDING block are all 0 bytes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Padding {
    /// The size of the padding, in bytes
    pub size: u32,
}

/// An APPLICATION metadata block
///
/// | Bits | Field | Meaning |
/// |-----:|------:|---------|
/// | 32   | `id` | registered application ID
/// | rest of block | `data` | application-specific data
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Application {
    /// A registered application ID
    pub id: u32,
    /// Application-specific data
    pub data: Vec<u8>,
}

/// A metadata block whose contents are kept as raw bytes
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Opaque {
    /// The block's type
    pub block_type: BlockType,
    /// The block's contents, minus its header
    pub data: Vec<u8>,
}

/// Any possible FLAC metadata block
///
/// Each block consists of a [`BlockHeader`] followed by the block's contents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Block {
    /// The STREAMINFO block
    Streaminfo(Streaminfo),
    /// The PADDING block
    Padding(Padding),
    /// The APPLICATION block
    Application(Application),
    /// Any other block
    Opaque(Opaque),
}

impl Block {
    /// Our block type
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Streaminfo(_) => BlockType::Streaminfo,
            Self::Padding(_) => BlockType::Padding,
            Self::Application(_) => BlockType::Application,
            Self::Opaque(o) => o.block_type,
        }
    }

    /// Parses block contents of the given type
    ///
    /// # Errors
    ///
    /// Returns an error if the contents are invalid
    /// or don't match their declared size.
    pub fn parse(block_type: BlockType, data: Vec<u8>) -> Result<Self, Error> {
        match block_type {
            BlockType::Streaminfo => {
                if data.len() != Streaminfo::SIZE as usize {
                    return Err(Error::InvalidMetadataBlockSize);
                }
                let mut r = bitstream_io::BitReader::endian(data.as_slice(), BigEndian);
                Ok(Self::Streaminfo(r.parse()?))
            }
            BlockType::Padding => Ok(Self::Padding(Padding {
                size: data.len() as u32,
            })),
            BlockType::Application => match data.split_first_chunk::<4>() {
                Some((id, rest)) => Ok(Self::Application(Application {
                    id: u32::from_be_bytes(*id),
                    data: rest.to_vec(),
                })),
                None => Err(Error::InsufficientApplicationBlock),
            },
            block_type => Ok(Self::Opaque(Opaque { block_type, data })),
        }
    }

    /// Returns our contents, minus the block header
    ///
    /// # Errors
    ///
    /// Returns an error if the contents can't be serialized.
    pub fn contents(&self) -> Result<Vec<u8>, Error> {
        match self {
            Self::Streaminfo(streaminfo) => {
                let mut w = bitstream_io::BitWriter::endian(Vec::new(), BigEndian);
                w.build(streaminfo)?;
                Ok(w.into_writer())
            }
            Self::Padding(Padding { size }) => Ok(vec![0; *size as usize]),
            Self::Application(Application { id, data }) => {
                let mut contents = id.to_be_bytes().to_vec();
                contents.extend_from_slice(data);
                Ok(contents)
            }
            Self::Opaque(Opaque { data, .. }) => Ok(data.clone()),
        }
    }
}

impl From<Streaminfo> for Block {
    fn from(streaminfo: Streaminfo) -> Self {
        Self::Streaminfo(streaminfo)
    }
}

impl From<Padding> for Block {
    fn from(padding: Padding) -> Self {
        Self::Padding(padding)
    }
}

impl From<Application> for Block {
    fn from(application: Application) -> Self {
        Self::Application(application)
    }
}

impl From<Opaque> for Block {
    fn from(opaque: Opaque) -> Self {
        Self::Opaque(opaque)
    }
}

/// An iterator over FLAC metadata blocks
///
/// Iteration stops after the block marked last,
/// leaving the reader positioned at the first frame,
/// or after the first error.
pub struct BlockReader<R: std::io::Read> {
    reader: R,
    failed: bool,
    tag_read: bool,
    streaminfo_read: bool,
    finished: bool,
}

impl<R: std::io::Read> BlockReader<R> {
    /// Creates an iterator over something that implements `Read`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            failed: false,
            tag_read: false,
            streaminfo_read: false,
            finished: false,
        }
    }

    /// Returns the wrapped reader
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_block(&mut self) -> Option<Result<Block, Error>> {
        (!self.finished).then(|| {
            let mut header = [0; 4];
            self.reader.read_exact(&mut header)?;
            let header: BlockHeader =
                bitstream_io::BitReader::endian(header.as_slice(), BigEndian).parse()?;

            let mut data = vec![0; header.size as usize];
            self.reader.read_exact(&mut data)?;

            let block = Block::parse(header.block_type, data)?;
            self.finished = header.last;
            Ok(block)
        })
    }
}

impl<R: std::io::Read> Iterator for BlockReader<R> {
    type Item = Result<Block, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            // once we hit an error, stop any further reads
            None
        } else if !self.tag_read {
            // "fLaC" tag must come before anything else
            let mut tag = [0; 4];
            match self.reader.read_exact(&mut tag) {
                Ok(()) => match &tag {
                    FLAC_TAG => {
                        self.tag_read = true;
                        self.next()
                    }
                    _ => {
                        self.failed = true;
                        Some(Err(Error::MissingFlacTag))
                    }
                },
                Err(err) => {
                    self.failed = true;
                    Some(Err(err.into()))
                }
            }
        } else if !self.streaminfo_read {
            // STREAMINFO block must be first in stream
            match self.read_block() {
                block @ Some(Ok(Block::Streaminfo(_))) => {
                    self.streaminfo_read = true;
                    block
                }
                Some(Err(err)) => {
                    self.failed = true;
                    Some(Err(err))
                }
                _ => {
                    self.failed = true;
                    Some(Err(Error::MissingStreaminfo))
                }
            }
        } else {
            match self.read_block() {
                Some(Ok(Block::Streaminfo(_))) => {
                    self.failed = true;
                    Some(Err(Error::MultipleStreaminfo))
                }
                block @ Some(Err(_)) => {
                    self.failed = true;
                    block
                }
                block => block,
            }
        }
    }
}

/// Returns iterator of blocks from the given reader
///
/// Because this may perform many small reads,
/// using a buffered reader may greatly improve performance
/// when reading from a raw `File`.
pub fn read_blocks<R: std::io::Read>(r: R) -> BlockReader<R> {
    BlockReader::new(r)
}

/// Writes the "fLaC" tag and iterator of blocks to the given writer.
///
/// The final block is automatically marked last.
///
/// # Errors
///
/// Passes along any I/O errors from the underlying stream.
/// Returns [`Error::MissingStreaminfo`] if STREAMINFO isn't the
/// first block, [`Error::MultipleStreaminfo`] if it occurs again,
/// or [`Error::ExcessiveBlockSize`] if any block is too large.
/// Nothing is written unless all blocks are valid.
pub fn write_blocks<'b>(
    blocks: impl IntoIterator<Item = &'b Block>,
    mut w: impl std::io::Write,
) -> Result<(), Error> {
    fn iter_last<T>(i: impl Iterator<Item = T>) -> impl Iterator<Item = (bool, T)> {
        struct LastIterator<I: std::iter::Iterator> {
            iter: std::iter::Peekable<I>,
        }

        impl<T, I: std::iter::Iterator<Item = T>> Iterator for LastIterator<I> {
            type Item = (bool, T);

            fn next(&mut self) -> Option<Self::Item> {
                let item = self.iter.next()?;
                Some((self.iter.peek().is_none(), item))
            }
        }

        LastIterator { iter: i.peekable() }
    }

    let mut output = bitstream_io::BitWriter::endian(FLAC_TAG.to_vec(), BigEndian);
    let mut blocks = iter_last(blocks.into_iter());

    let mut write_block = |last: bool, block: &Block| -> Result<(), Error> {
        let contents = block.contents()?;
        let size = u32::try_from(contents.len())
            .ok()
            .filter(|size| *size <= BlockHeader::MAX_SIZE)
            .ok_or(Error::ExcessiveBlockSize)?;
        output.build(&BlockHeader {
            last,
            block_type: block.block_type(),
            size,
        })?;
        output.write_bytes(&contents)?;
        Ok(())
    };

    // STREAMINFO block must be present and must be first in stream
    match blocks.next() {
        Some((last, block)) if matches!(block, Block::Streaminfo(_)) => write_block(last, block)?,
        _ => return Err(Error::MissingStreaminfo),
    }

    blocks.try_for_each(|(last, block)| match block {
        Block::Streaminfo(_) => Err(Error::MultipleStreaminfo),
        block => write_block(last, block),
    })?;

    w.write_all(&output.into_writer())?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn streaminfo() -> Streaminfo {
        Streaminfo {
            minimum_block_size: 4096,
            maximum_block_size: 4096,
            minimum_frame_size: NonZero::new(14),
            maximum_frame_size: NonZero::new(3000),
            sample_rate: 44100,
            channels: NonZero::new(2).unwrap(),
            bits_per_sample: 16,
            total_samples: NonZero::new(44100),
            md5: Some([1; 16]),
        }
    }

    #[test]
    fn test_stream_length() {
        let mut s = streaminfo();
        assert_eq!(s.decoded_len(), Some(44100 * 2 * 2));
        assert_eq!(s.duration(), Some(std::time::Duration::from_secs(1)));

        s.total_samples = NonZero::new(66150);
        assert_eq!(s.duration(), Some(std::time::Duration::from_millis(1500)));

        s.total_samples = None;
        assert_eq!(s.decoded_len(), None);
        assert_eq!(s.duration(), None);
    }

    #[test]
    fn test_streaminfo_roundtrip() {
        let blocks = vec![
            Block::from(streaminfo()),
            Padding { size: 10 }.into(),
            Application {
                id: 0x7269_6666,
                data: b"chunk".to_vec(),
            }
            .into(),
            Opaque {
                block_type: BlockType::Reserved(42),
                data: vec![1, 2, 3],
            }
            .into(),
        ];

        let mut flac = Vec::new();
        write_blocks(&blocks, &mut flac).unwrap();
        assert_eq!(&flac[0..4], FLAC_TAG);
        assert_eq!(flac.len(), 4 + (4 + 34) + (4 + 10) + (4 + 9) + (4 + 3));

        flac.extend_from_slice(b"frames");
        let mut r = std::io::Cursor::new(flac);
        let read = read_blocks(&mut r)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(read, blocks);

        // reader stops at the first frame byte
        assert_eq!(r.position(), 4 + 38 + 14 + 13 + 7);
    }

    #[test]
    fn test_write_order() {
        assert!(matches!(
            write_blocks(&[Padding { size: 1 }.into()], std::io::sink()),
            Err(Error::MissingStreaminfo)
        ));

        assert!(matches!(
            write_blocks(
                &[streaminfo().into(), streaminfo().into()],
                std::io::sink()
            ),
            Err(Error::MultipleStreaminfo)
        ));

        let mut output = Vec::new();
        assert!(matches!(
            write_blocks(
                &[
                    streaminfo().into(),
                    Padding {
                        size: BlockHeader::MAX_SIZE + 1
                    }
                    .into()
                ],
                &mut output
            ),
            Err(Error::ExcessiveBlockSize)
        ));
        assert!(output.is_empty());

        let oversized = Opaque {
            block_type: BlockType::Reserved(50),
            data: vec![0; 1 << 24],
        };
        assert!(matches!(
            write_blocks(&[streaminfo().into(), oversized.into()], &mut output),
            Err(Error::ExcessiveBlockSize)
        ));
        assert!(output.is_empty());

        let largest = Padding {
            size: BlockHeader::MAX_SIZE,
        };
        write_blocks(&[streaminfo().into(), largest.into()], &mut output).unwrap();
        assert_eq!(output.len(), 4 + 38 + 4 + (1 << 24) - 1);
    }

    #[test]
    fn test_reserved_block_types() {
        // reserved types may not stand in for defined ones or 127
        for t in [0, 3, 6, 127, 255] {
            let block = Opaque {
                block_type: BlockType::Reserved(t),
                data: vec![1],
            };
            let mut output = Vec::new();
            assert!(matches!(
                write_blocks(&[streaminfo().into(), block.into()], &mut output),
                Err(Error::InvalidMetadataBlock)
            ));
            assert!(output.is_empty());
        }

        for t in [7, 126] {
            let block = Block::from(Opaque {
                block_type: BlockType::Reserved(t),
                data: vec![1],
            });
            let mut output = Vec::new();
            write_blocks(&[streaminfo().into(), block.clone()], &mut output).unwrap();
            assert_eq!(output[4 + 38], 0x80 | t);

            let read = read_blocks(output.as_slice())
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            assert_eq!(read[1], block);
        }
    }

    #[test]
    fn test_read_order() {
        let mut flac = Vec::new();
        write_blocks(&[streaminfo().into(), Padding { size: 4 }.into()], &mut flac).unwrap();

        // swap STREAMINFO's type with PADDING's
        let mut swapped = flac.clone();
        swapped[4] = 0x01;
        swapped[4 + 38] = 0x80;
        assert!(matches!(
            read_blocks(swapped.as_slice()).next(),
            Some(Err(Error::MissingStreaminfo))
        ));

        let mut bad_tag = flac.clone();
        bad_tag[0] = b'F';
        assert!(matches!(
            read_blocks(bad_tag.as_slice()).next(),
            Some(Err(Error::MissingFlacTag))
        ));

        // reserved type 127
        let mut invalid = flac.clone();
        invalid[4 + 38] = 0xFF;
        let mut blocks = read_blocks(invalid.as_slice());
        assert!(matches!(blocks.next(), Some(Ok(Block::Streaminfo(_)))));
        assert!(matches!(blocks.next(), Some(Err(Error::InvalidMetadataBlock))));
        assert!(blocks.next().is_none());

        // truncated mid-block
        assert!(matches!(
            read_blocks(&flac[0..20]).next(),
            Some(Err(Error::EndOfStream))
        ));
    }

    #[test]
    fn test_streaminfo_validation() {
        let check = |f: fn(&mut Streaminfo)| {
            let mut s = streaminfo();
            f(&mut s);
            let block = Block::from(s).contents().unwrap();
            Block::parse(BlockType::Streaminfo, block)
        };

        assert!(check(|_| {}).is_ok());
        assert!(matches!(
            check(|s| s.minimum_block_size = 8),
            Err(Error::InvalidStreamInfo(_))
        ));
        assert!(matches!(
            check(|s| s.maximum_block_size = 1024),
            Err(Error::InvalidStreamInfo(_))
        ));
        assert!(matches!(
            check(|s| s.minimum_frame_size = NonZero::new(5000)),
            Err(Error::InvalidStreamInfo(_))
        ));
        assert!(matches!(
            check(|s| s.sample_rate = 0),
            Err(Error::InvalidStreamInfo(_))
        ));
        assert!(matches!(
            check(|s| s.bits_per_sample = 3),
            Err(Error::InvalidStreamInfo(_))
        ));

        // a single short frame has equal minimum and maximum
        assert!(
            check(|s| {
                s.minimum_block_size = 5;
                s.maximum_block_size = 5;
            })
            .is_ok()
        );

        assert!(matches!(
            Block::parse(BlockType::Streaminfo, vec![0; 33]),
            Err(Error::InvalidMetadataBlockSize)
        ));
        assert!(matches!(
            Block::parse(BlockType::Application, vec![0; 3]),
            Err(Error::InsufficientApplicationBlock)
        ));
    }
}
