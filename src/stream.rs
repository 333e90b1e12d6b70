// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling common FLAC stream items
//!
//! A FLAC frame is laid out as:
//!
//! | Bits | Field |
//! |-----:|-------|
//! | 15   | sync code `0b111111111111100` |
//! | 1    | blocking strategy |
//! | 4    | block size code |
//! | 4    | sample rate code |
//! | 4    | channel assignment |
//! | 3    | bits-per-sample code |
//! | 1    | reserved |
//! | 8-56 | frame or sample number, UTF-8 style |
//! | 0/8/16 | block size escape |
//! | 0/8/16 | sample rate escape |
//! | 8    | CRC-8 of the header |
//! |      | one subframe per channel |
//! |      | padding to byte boundary |
//! | 16   | CRC-16 of the whole frame |

use crate::Error;
use crate::bitstream::{BigEndian, BitReader, BitWriter};
use crate::crc::{Checksum, Crc8};
use crate::metadata::Streaminfo;
use crate::residual::Residuals;
use arrayvec::ArrayVec;
use std::num::NonZero;

/// The maximum order of an LPC subframe
pub const MAX_LPC_ORDER: usize = 32;

/// The maximum order of a fixed subframe
pub const MAX_FIXED_ORDER: usize = 4;

/// A frame's number, or its first sample's number in variable-blocking streams
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct FrameNumber(pub u64);

impl FrameNumber {
    /// The largest frame number for fixed-blocking streams (2³¹ - 1)
    pub const MAX_FRAME_NUMBER: u64 = (1 << 31) - 1;

    /// The largest sample number for variable-blocking streams (2³⁶ - 1)
    pub const MAX_SAMPLE_NUMBER: u64 = (1 << 36) - 1;

    /// Moves on to the next frame number
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrameNumber`] if the number
    /// would be too large to encode.
    pub fn try_increment(&mut self) -> Result<(), Error> {
        match self.0 {
            n if n < Self::MAX_FRAME_NUMBER => {
                self.0 += 1;
                Ok(())
            }
            _ => Err(Error::InvalidFrameNumber),
        }
    }

    fn read(r: &mut BitReader<'_, BigEndian>) -> Result<Self, Error> {
        let bytes = match r.limited_unary(false, 8) {
            Ok(bytes) => bytes,
            Err(Error::LimitExceeded) => return Err(Error::InvalidFrameNumber),
            Err(err) => return Err(err),
        };

        match bytes {
            0 => Ok(Self(r.read(7)?.into())),
            1 => Err(Error::InvalidFrameNumber),
            bytes => {
                let mut number = u64::from(r.read(7 - bytes)?);
                for _ in 1..bytes {
                    match r.read(2)? {
                        0b10 => {
                            number = (number << 6) | u64::from(r.read(6)?);
                        }
                        _ => return Err(Error::InvalidFrameNumber),
                    }
                }
                Ok(Self(number))
            }
        }
    }

    fn write(&self, w: &mut BitWriter<BigEndian>) -> Result<(), Error> {
        let bytes: u32 = match self.0 {
            0..0x80 => return w.write(8, self.0 as u32),
            0x80..0x800 => 2,
            0x800..0x1_0000 => 3,
            0x1_0000..0x20_0000 => 4,
            0x20_0000..0x400_0000 => 5,
            0x400_0000..0x8000_0000 => 6,
            0x8000_0000..0x10_0000_0000 => 7,
            _ => return Err(Error::InvalidFrameNumber),
        };

        w.write(bytes, (1 << bytes) - 1)?;
        w.write_bit(false)?;
        w.write64(7 - bytes, self.0 >> (6 * (bytes - 1)))?;
        for byte in (0..bytes - 1).rev() {
            w.write(2, 0b10)?;
            w.write64(6, (self.0 >> (6 * byte)) & 0x3F)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// How a frame's channels are stored
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelAssignment {
    /// Channels stored independently, 1 to 8 of them
    Independent(u8),
    /// Channel 0 is left, channel 1 is side (left - right)
    LeftSide,
    /// Channel 0 is side (left - right), channel 1 is right
    SideRight,
    /// Channel 0 is mid (average), channel 1 is side (left - right)
    MidSide,
}

impl ChannelAssignment {
    /// Total number of channels in the frame
    pub fn count(&self) -> usize {
        match self {
            Self::Independent(c) => usize::from(*c),
            Self::LeftSide | Self::SideRight | Self::MidSide => 2,
        }
    }

    /// The index of the channel holding the side signal, if any
    ///
    /// That channel is stored with one extra bit-per-sample.
    pub fn side_channel(&self) -> Option<usize> {
        match self {
            Self::Independent(_) => None,
            Self::LeftSide | Self::MidSide => Some(1),
            Self::SideRight => Some(0),
        }
    }

    /// The effective bits-per-sample of the given channel
    pub fn channel_bps(&self, channel: usize, bits_per_sample: u32) -> u32 {
        match self.side_channel() {
            Some(side) if side == channel => bits_per_sample + 1,
            _ => bits_per_sample,
        }
    }

    fn code(&self) -> u32 {
        match self {
            Self::Independent(c) => u32::from(*c) - 1,
            Self::LeftSide => 0b1000,
            Self::SideRight => 0b1001,
            Self::MidSide => 0b1010,
        }
    }
}

impl std::fmt::Display for ChannelAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Independent(c) => write!(f, "independent ({c})"),
            Self::LeftSide => "left-side".fmt(f),
            Self::SideRight => "side-right".fmt(f),
            Self::MidSide => "mid-side".fmt(f),
        }
    }
}

/// A FLAC frame header
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    /// Whether the stream uses variable block sizes
    pub blocking_strategy: bool,
    /// The frame's number, or its first sample number if variable
    pub frame_number: FrameNumber,
    /// The number of PCM frames in the frame
    pub block_size: u32,
    /// The frame's sample rate, in Hz
    pub sample_rate: u32,
    /// How the frame's channels are stored
    pub channel_assignment: ChannelAssignment,
    /// The frame's bits-per-sample
    pub bits_per_sample: u32,
}

impl FrameHeader {
    const SYNC_CODE: u32 = 0b111111111111100;

    /// Reads frame header, including its CRC-8
    ///
    /// Values deferred to STREAMINFO are taken from `streaminfo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid,
    /// or [`Error::CorruptHeader`] if its CRC-8 doesn't match.
    pub fn read(r: &mut BitReader<'_, BigEndian>, streaminfo: &Streaminfo) -> Result<Self, Error> {
        debug_assert!(r.byte_aligned());
        let start = r.byte_position();

        if r.read(15)? != Self::SYNC_CODE {
            return Err(Error::InvalidSyncCode);
        }
        let blocking_strategy = r.read_bit()?;
        let encoded_block_size = r.read(4)?;
        let encoded_sample_rate = r.read(4)?;
        let encoded_channels = r.read(4)?;
        let encoded_bps = r.read(3)?;
        if r.read_bit()? {
            return Err(Error::CorruptHeader);
        }
        let frame_number = FrameNumber::read(r)?;
        if !blocking_strategy && frame_number.0 > FrameNumber::MAX_FRAME_NUMBER {
            return Err(Error::InvalidFrameNumber);
        }

        let header = Self {
            blocking_strategy,
            frame_number,
            block_size: match encoded_block_size {
                0b0000 => return Err(Error::InvalidBlockSize),
                0b0001 => 192,
                v @ 0b0010..=0b0101 => 576 << (v - 2),
                0b0110 => r.read(8)? + 1,
                0b0111 => r.read(16)? + 1,
                v => 256 << (v - 8),
            },
            sample_rate: match encoded_sample_rate {
                0b0000 => streaminfo.sample_rate,
                0b0001 => 88200,
                0b0010 => 176400,
                0b0011 => 192000,
                0b0100 => 8000,
                0b0101 => 16000,
                0b0110 => 22050,
                0b0111 => 24000,
                0b1000 => 32000,
                0b1001 => 44100,
                0b1010 => 48000,
                0b1011 => 96000,
                0b1100 => r.read(8)? * 1000,
                0b1101 => r.read(16)?,
                0b1110 => r.read(16)? * 10,
                _ => return Err(Error::InvalidSampleRate),
            },
            channel_assignment: match encoded_channels {
                c @ 0b0000..=0b0111 => ChannelAssignment::Independent(c as u8 + 1),
                0b1000 => ChannelAssignment::LeftSide,
                0b1001 => ChannelAssignment::SideRight,
                0b1010 => ChannelAssignment::MidSide,
                _ => return Err(Error::InvalidChannels),
            },
            bits_per_sample: match encoded_bps {
                0b000 => streaminfo.bits_per_sample,
                0b001 => 8,
                0b010 => 12,
                0b011 => return Err(Error::InvalidBitsPerSample),
                0b100 => 16,
                0b101 => 20,
                0b110 => 24,
                _ => 32,
            },
        };

        // CRC-8 covers everything from the sync code onward
        r.skip(8)?;
        match Crc8::of(&r.data()[start..r.byte_position()]) {
            0 => Ok(header),
            _ => Err(Error::CorruptHeader),
        }
    }

    /// Writes frame header, including its CRC-8
    ///
    /// The writer must be byte-aligned.
    ///
    /// # Errors
    ///
    /// Returns an error if any header field can't be encoded.
    pub fn write(&self, w: &mut BitWriter<BigEndian>) -> Result<(), Error> {
        enum Escape {
            None,
            Bits8(u32),
            Bits16(u32),
        }

        impl Escape {
            fn write(&self, w: &mut BitWriter<BigEndian>) -> Result<(), Error> {
                match self {
                    Self::None => Ok(()),
                    Self::Bits8(v) => w.write(8, *v),
                    Self::Bits16(v) => w.write(16, *v),
                }
            }
        }

        let (block_size_code, block_size_escape) = match self.block_size {
            192 => (0b0001, Escape::None),
            576 => (0b0010, Escape::None),
            1152 => (0b0011, Escape::None),
            2304 => (0b0100, Escape::None),
            4608 => (0b0101, Escape::None),
            256 => (0b1000, Escape::None),
            512 => (0b1001, Escape::None),
            1024 => (0b1010, Escape::None),
            2048 => (0b1011, Escape::None),
            4096 => (0b1100, Escape::None),
            8192 => (0b1101, Escape::None),
            16384 => (0b1110, Escape::None),
            32768 => (0b1111, Escape::None),
            s @ 1..=256 => (0b0110, Escape::Bits8(s - 1)),
            s @ 257..=65536 => (0b0111, Escape::Bits16(s - 1)),
            _ => return Err(Error::InvalidBlockSize),
        };

        let (sample_rate_code, sample_rate_escape) = match self.sample_rate {
            88200 => (0b0001, Escape::None),
            176400 => (0b0010, Escape::None),
            192000 => (0b0011, Escape::None),
            8000 => (0b0100, Escape::None),
            16000 => (0b0101, Escape::None),
            22050 => (0b0110, Escape::None),
            24000 => (0b0111, Escape::None),
            32000 => (0b1000, Escape::None),
            44100 => (0b1001, Escape::None),
            48000 => (0b1010, Escape::None),
            96000 => (0b1011, Escape::None),
            rate if rate % 1000 == 0 && rate / 1000 <= 255 => {
                (0b1100, Escape::Bits8(rate / 1000))
            }
            rate if rate <= 0xFFFF => (0b1101, Escape::Bits16(rate)),
            rate if rate % 10 == 0 && rate / 10 <= 0xFFFF => (0b1110, Escape::Bits16(rate / 10)),
            // defer to STREAMINFO
            _ => (0b0000, Escape::None),
        };

        let bps_code = match self.bits_per_sample {
            8 => 0b001,
            12 => 0b010,
            16 => 0b100,
            20 => 0b101,
            24 => 0b110,
            32 => 0b111,
            _ => 0b000,
        };

        let mut header = BitWriter::endian(BigEndian);
        header.write(15, Self::SYNC_CODE)?;
        header.write_bit(self.blocking_strategy)?;
        header.write(4, block_size_code)?;
        header.write(4, sample_rate_code)?;
        header.write(4, self.channel_assignment.code())?;
        header.write(3, bps_code)?;
        header.write_bit(false)?;
        self.frame_number.write(&mut header)?;
        block_size_escape.write(&mut header)?;
        sample_rate_escape.write(&mut header)?;

        let mut header = header.into_bytes()?;
        header.push(Crc8::of(&header));
        w.write_bytes(&header)
    }
}

/// The type of a subframe, along with its predictor order
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubframeHeaderType {
    /// All samples are the same
    Constant,
    /// Samples are stored as-is
    Verbatim,
    /// A fixed predictor of order 0 to 4
    Fixed(u8),
    /// An LPC predictor of order 1 to 32
    Lpc(NonZero<u8>),
}

/// A FLAC subframe header
///
/// | Bits | Field |
/// |-----:|-------|
/// | 1    | zero pad |
/// | 6    | subframe type and order |
/// | 1+k  | wasted bits flag, then unary count of k - 1 |
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SubframeHeader {
    /// The subframe's type
    pub type_: SubframeHeaderType,
    /// Number of low bits all samples have as 0
    pub wasted_bps: u32,
}

impl SubframeHeader {
    /// Reads subframe header
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubframeHeader`] for reserved types.
    pub fn read(r: &mut BitReader<'_, BigEndian>) -> Result<Self, Error> {
        if r.read_bit()? {
            return Err(Error::InvalidSubframeHeader);
        }

        let type_ = match r.read(6)? {
            0b000000 => SubframeHeaderType::Constant,
            0b000001 => SubframeHeaderType::Verbatim,
            v @ 0b001000..=0b001100 => SubframeHeaderType::Fixed((v & 0b111) as u8),
            v @ 0b100000..=0b111111 => {
                SubframeHeaderType::Lpc(NonZero::<u8>::MIN.saturating_add((v & 0b11111) as u8))
            }
            _ => return Err(Error::InvalidSubframeHeader),
        };

        let wasted_bps = match r.read_bit()? {
            false => 0,
            true => r.unary(true)? + 1,
        };

        Ok(Self { type_, wasted_bps })
    }

    /// Writes subframe header
    pub fn write(&self, w: &mut BitWriter<BigEndian>) -> Result<(), Error> {
        w.write_bit(false)?;
        w.write(
            6,
            match self.type_ {
                SubframeHeaderType::Constant => 0b000000,
                SubframeHeaderType::Verbatim => 0b000001,
                SubframeHeaderType::Fixed(order) => 0b001000 | u32::from(order),
                SubframeHeaderType::Lpc(order) => 0b100000 | (u32::from(order.get()) - 1),
            },
        )?;
        match self.wasted_bps {
            0 => w.write_bit(false),
            wasted => {
                w.write_bit(true)?;
                w.unary(true, wasted - 1)
            }
        }
    }

    /// Size of the header, in bits
    pub fn bits(&self) -> u64 {
        8 + u64::from(self.wasted_bps)
    }
}

/// LPC predictor parameters, as stored in a subframe
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LpcParameters {
    /// Quantized coefficient precision, from 1 to 15 bits
    pub precision: u32,
    /// Right shift applied to each prediction, from 0 to 31
    pub shift: u32,
    /// Quantized coefficients, one per order
    pub coefficients: ArrayVec<i32, MAX_LPC_ORDER>,
}

/// A single channel's encoded contribution to a frame
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Subframe {
    /// Every sample has the same value
    Constant {
        /// The sample, minus wasted bits
        sample: i64,
        /// The number of samples in the block
        block_size: u32,
        /// Low bits shifted out of the sample
        wasted_bps: u32,
    },
    /// Samples stored unencoded
    Verbatim {
        /// The samples, minus wasted bits
        samples: Vec<i64>,
        /// Low bits shifted out of every sample
        wasted_bps: u32,
    },
    /// Samples predicted by a fixed polynomial
    Fixed {
        /// The first `order` samples, minus wasted bits
        warm_up: ArrayVec<i64, MAX_FIXED_ORDER>,
        /// The prediction residuals
        residuals: Residuals,
        /// Low bits shifted out of every sample
        wasted_bps: u32,
    },
    /// Samples predicted by quantized LPC coefficients
    Lpc {
        /// The first `order` samples, minus wasted bits
        warm_up: ArrayVec<i64, MAX_LPC_ORDER>,
        /// The predictor's parameters
        parameters: LpcParameters,
        /// The prediction residuals
        residuals: Residuals,
        /// Low bits shifted out of every sample
        wasted_bps: u32,
    },
}

impl Subframe {
    /// The subframe's header
    pub fn header(&self) -> SubframeHeader {
        match self {
            Self::Constant { wasted_bps, .. } => SubframeHeader {
                type_: SubframeHeaderType::Constant,
                wasted_bps: *wasted_bps,
            },
            Self::Verbatim { wasted_bps, .. } => SubframeHeader {
                type_: SubframeHeaderType::Verbatim,
                wasted_bps: *wasted_bps,
            },
            Self::Fixed {
                warm_up,
                wasted_bps,
                ..
            } => SubframeHeader {
                type_: SubframeHeaderType::Fixed(warm_up.len() as u8),
                wasted_bps: *wasted_bps,
            },
            Self::Lpc {
                warm_up,
                wasted_bps,
                ..
            } => SubframeHeader {
                type_: SubframeHeaderType::Lpc(
                    NonZero::new(warm_up.len() as u8).unwrap_or(NonZero::<u8>::MIN),
                ),
                wasted_bps: *wasted_bps,
            },
        }
    }

    /// The number of samples the subframe decodes to
    pub fn block_size(&self) -> usize {
        match self {
            Self::Constant { block_size, .. } => *block_size as usize,
            Self::Verbatim { samples, .. } => samples.len(),
            Self::Fixed {
                warm_up, residuals, ..
            } => warm_up.len() + residuals.len(),
            Self::Lpc {
                warm_up, residuals, ..
            } => warm_up.len() + residuals.len(),
        }
    }

    /// A short name for the subframe's type
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "CONSTANT",
            Self::Verbatim { .. } => "VERBATIM",
            Self::Fixed { .. } => "FIXED",
            Self::Lpc { .. } => "LPC",
        }
    }
}
