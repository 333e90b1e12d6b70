// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A lossless FLAC-style audio codec engine
//!
//! This crate encodes PCM samples into bit-exact compressed FLAC
//! streams, decodes them back, and verifies that decoded output
//! matches the original signal's MD5 sum.
//!
//! # Layers
//!
//! | Module | Purpose |
//! |-------:|---------|
//! | [`bitstream`] | bit-granular reading and writing of byte buffers |
//! | [`audio`] | the [`SampleBlock`] PCM container |
//! | [`predictor`] | fixed and LPC predictors |
//! | [`residual`] | partitioned Rice coding of prediction residuals |
//! | [`frame`] | encoding and decoding of whole FLAC frames |
//! | [`metadata`] | STREAMINFO and other metadata blocks |
//! | [`encode`] / [`decode`] | whole-stream encoding and decoding |
//! | [`pcm`] | PCM sources, sinks and transfers between them |
//! | [`tags`] | textual tags and their semantic fields |
//! | [`wave`] / [`probe`] | RIFF WAVE files and opening files by content |
//!
//! # Example
//!
//! ```
//! use flac_engine::{SampleBlock, decode::Decoder, encode::{Encoder, EncodingOptions}};
//! use std::io::Cursor;
//!
//! let block = SampleBlock::from_samples(
//!     &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
//!     2,
//!     16,
//!     true,
//! ).unwrap();
//!
//! let mut flac = Cursor::new(vec![]);
//! let mut encoder = Encoder::new(
//!     &mut flac,
//!     EncodingOptions::default(),
//!     44100,
//!     16,
//!     2,
//!     None,
//! ).unwrap();
//! encoder.encode(&block).unwrap();
//! encoder.finalize().unwrap();
//!
//! flac.set_position(0);
//! let mut decoder = Decoder::new(flac).unwrap();
//! assert_eq!(decoder.read_all().unwrap(), block);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod audio;
pub mod bitstream;
pub mod byteorder;
mod crc;
pub mod decode;
pub mod encode;
pub mod frame;
pub mod metadata;
pub mod pcm;
pub mod predictor;
pub mod probe;
pub mod residual;
pub mod stream;
pub mod tags;
pub mod wave;

pub use audio::SampleBlock;

/// A unified error type for all codec operations
#[derive(Debug)]
pub enum Error {
    /// An I/O error from an underlying stream
    Io(std::io::Error),
    /// A UTF-8 error from a metadata string
    Utf8(std::string::FromUtf8Error),
    /// An attempt to read beyond the end of the data
    EndOfStream,
    /// No stop bit occurred within a limited unary read
    LimitExceeded,
    /// More than one bit was pushed back onto a reader
    ExcessiveUnread,
    /// A value is too large for the bits it is written in
    ExcessiveValue,
    /// Sample count is not a multiple of the channel count
    InvalidSampleCount,
    /// Channels of a sample block have different lengths
    ChannelLengthMismatch,
    /// A sample is outside the range of its bits-per-sample
    ExcessiveSample,
    /// A frame or channel index is out of range
    IndexOutOfRange {
        /// The requested index
        index: usize,
        /// The number of items available
        len: usize,
    },
    /// Channel counts differ between sample blocks or streams
    ChannelsMismatch,
    /// Bits-per-sample differ between sample blocks or streams
    BitsPerSampleMismatch,
    /// Sample rates differ between streams
    SampleRateMismatch,
    /// Bits-per-sample is out of range
    InvalidBitsPerSample,
    /// The stream does not start with the "fLaC" tag
    MissingFlacTag,
    /// STREAMINFO is not the first metadata block
    MissingStreaminfo,
    /// More than one STREAMINFO block is present
    MultipleStreaminfo,
    /// STREAMINFO contains values out of the format's range
    InvalidStreamInfo(&'static str),
    /// A metadata block of invalid type 127
    InvalidMetadataBlock,
    /// A metadata block whose contents do not match its size
    InvalidMetadataBlockSize,
    /// A metadata block too large to fit in 24 bits
    ExcessiveBlockSize,
    /// An APPLICATION block too small to hold its ID
    InsufficientApplicationBlock,
    /// A metadata string too long for its length field
    ExcessiveStringLength,
    /// A frame does not begin with a sync code
    InvalidSyncCode,
    /// A frame header has an invalid block size
    InvalidBlockSize,
    /// A frame header has an invalid sample rate
    InvalidSampleRate,
    /// A frame header has an invalid channel assignment
    InvalidChannels,
    /// A frame header has an invalid frame number
    InvalidFrameNumber,
    /// A frame's number is not the next in sequence
    FrameNumberMismatch,
    /// A frame header disagrees with STREAMINFO
    FrameParametersMismatch,
    /// A frame header's CRC-8 does not match
    CorruptHeader,
    /// A frame's CRC-16 does not match
    CorruptFrame,
    /// A subframe header has a reserved type
    InvalidSubframeHeader,
    /// A subframe's wasted bits exceed its bits-per-sample
    ExcessiveWastedBits,
    /// An LPC subframe has an invalid coefficient precision
    InvalidLpcPrecision,
    /// An LPC subframe has a negative shift
    NegativeLpcShift,
    /// A residual uses a reserved coding method
    InvalidCodingMethod,
    /// A residual's partition order does not fit its block
    InvalidPartitionOrder,
    /// A reconstructed sample or residual overflows
    ExcessiveResidual,
    /// An encoding parameter is outside the format's limits
    UnsupportedParameter(&'static str),
    /// More samples were written than declared
    ExcessiveTotalSamples,
    /// Fewer samples were written than declared
    SampleCountMismatch,
    /// Samples were written after the stream was finalized
    StreamFinalized,
    /// A RIFF WAVE file is malformed or unsupported
    InvalidWave,
    /// No probe recognized the stream's format
    UnknownFormat,
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::EndOfStream,
            _ => Self::Io(error),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::Utf8(error)
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::EndOfStream => "unexpected end of stream".fmt(f),
            Self::LimitExceeded => "no stop bit within limit".fmt(f),
            Self::ExcessiveUnread => "only one bit may be unread".fmt(f),
            Self::ExcessiveValue => "value too large for bit count".fmt(f),
            Self::InvalidSampleCount => "sample count not a multiple of channel count".fmt(f),
            Self::ChannelLengthMismatch => "channels have different lengths".fmt(f),
            Self::ExcessiveSample => "sample out of range for bits-per-sample".fmt(f),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::ChannelsMismatch => "channel count mismatch".fmt(f),
            Self::BitsPerSampleMismatch => "bits-per-sample mismatch".fmt(f),
            Self::SampleRateMismatch => "sample rate mismatch".fmt(f),
            Self::InvalidBitsPerSample => "invalid bits-per-sample".fmt(f),
            Self::MissingFlacTag => "missing FLAC tag".fmt(f),
            Self::MissingStreaminfo => "STREAMINFO block not first in file".fmt(f),
            Self::MultipleStreaminfo => "multiple STREAMINFO blocks found in file".fmt(f),
            Self::InvalidStreamInfo(reason) => write!(f, "invalid STREAMINFO: {reason}"),
            Self::InvalidMetadataBlock => "invalid metadata block".fmt(f),
            Self::InvalidMetadataBlockSize => "invalid metadata block size".fmt(f),
            Self::ExcessiveBlockSize => "metadata block too large".fmt(f),
            Self::InsufficientApplicationBlock => "APPLICATION block too small for data".fmt(f),
            Self::ExcessiveStringLength => "metadata string too long".fmt(f),
            Self::InvalidSyncCode => "invalid frame sync code".fmt(f),
            Self::InvalidBlockSize => "invalid frame block size".fmt(f),
            Self::InvalidSampleRate => "invalid frame sample rate".fmt(f),
            Self::InvalidChannels => "invalid frame channel assignment".fmt(f),
            Self::InvalidFrameNumber => "invalid frame number".fmt(f),
            Self::FrameNumberMismatch => "frame number out of sequence".fmt(f),
            Self::FrameParametersMismatch => "frame header mismatches STREAMINFO".fmt(f),
            Self::CorruptHeader => "CRC-8 mismatch in frame header".fmt(f),
            Self::CorruptFrame => "CRC-16 mismatch in frame".fmt(f),
            Self::InvalidSubframeHeader => "invalid subframe header".fmt(f),
            Self::ExcessiveWastedBits => "excessive wasted bits in subframe".fmt(f),
            Self::InvalidLpcPrecision => "invalid LPC coefficient precision".fmt(f),
            Self::NegativeLpcShift => "negative LPC shift".fmt(f),
            Self::InvalidCodingMethod => "invalid residual coding method".fmt(f),
            Self::InvalidPartitionOrder => "invalid residual partition order".fmt(f),
            Self::ExcessiveResidual => "residual or sample overflow".fmt(f),
            Self::UnsupportedParameter(param) => write!(f, "unsupported encoding parameter: {param}"),
            Self::ExcessiveTotalSamples => "total samples exceed declared count".fmt(f),
            Self::SampleCountMismatch => "total samples differ from declared count".fmt(f),
            Self::StreamFinalized => "stream already finalized".fmt(f),
            Self::InvalidWave => "invalid RIFF WAVE file".fmt(f),
            Self::UnknownFormat => "unknown audio format".fmt(f),
        }
    }
}
