// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For encoding PCM samples to FLAC files

use crate::Error;
use crate::audio::SampleBlock;
use crate::frame::Frame;
use crate::metadata::{Block, Padding, Streaminfo, write_blocks};
use crate::pcm::PcmWriter;
use crate::residual::{MAX_PARTITION_ORDER, ResidualOptions};
use crate::stream::{FrameNumber, MAX_FIXED_ORDER, MAX_LPC_ORDER};
use std::io::{Seek, SeekFrom, Write};
use std::num::NonZero;

/// How stereo channels are decorrelated
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StereoMode {
    /// Always store left and right channels independently
    Independent,
    /// Pick channel assignment from a quick estimate
    Adaptive,
    /// Encode all four channel assignments and keep the smallest
    #[default]
    Exhaustive,
}

/// A preset from 0 (fastest) to 8 (smallest)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// The fastest level
    pub const FASTEST: Self = Self(0);

    /// The smallest level
    pub const BEST: Self = Self(8);

    /// Builds level from 0 to 8
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if level is out of range.
    pub fn new(level: u8) -> Result<Self, Error> {
        match level {
            0..=8 => Ok(Self(level)),
            _ => Err(Error::UnsupportedParameter("compression level")),
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(5)
    }
}

/// FLAC encoding options
#[derive(Clone, Debug)]
pub struct EncodingOptions {
    pub(crate) block_size: u16,
    pub(crate) max_lpc_order: usize,
    pub(crate) max_fixed_order: usize,
    pub(crate) min_partition_order: u32,
    pub(crate) max_partition_order: u32,
    pub(crate) qlp_precision: Option<u32>,
    pub(crate) stereo: StereoMode,
    pub(crate) exhaustive_model_search: bool,
    padding: u32,
    metadata: Vec<Block>,
}

impl EncodingOptions {
    /// Options for the given compression level
    ///
    /// | level | block size | LPC order | fixed order | partition order | stereo |
    /// |------:|-----------:|----------:|------------:|----------------:|--------|
    /// | 0 | 1152 | 0  | 2 | 0-3 | independent |
    /// | 1 | 1152 | 0  | 2 | 0-3 | adaptive |
    /// | 2 | 1152 | 0  | 2 | 0-3 | exhaustive |
    /// | 3 | 4096 | 6  | 4 | 0-4 | independent |
    /// | 4 | 4096 | 8  | 4 | 0-4 | adaptive |
    /// | 5 | 4096 | 8  | 4 | 0-5 | exhaustive |
    /// | 6 | 4096 | 8  | 4 | 0-6 | exhaustive |
    /// | 7 | 4096 | 8  | 4 | 0-6 | exhaustive, with exhaustive model search |
    /// | 8 | 4096 | 12 | 4 | 0-6 | exhaustive, with exhaustive model search |
    pub fn level(level: CompressionLevel) -> Self {
        let (block_size, max_lpc_order, max_fixed_order, max_partition_order, stereo, exhaustive) =
            match level.0 {
                0 => (1152, 0, 2, 3, StereoMode::Independent, false),
                1 => (1152, 0, 2, 3, StereoMode::Adaptive, false),
                2 => (1152, 0, 2, 3, StereoMode::Exhaustive, false),
                3 => (4096, 6, 4, 4, StereoMode::Independent, false),
                4 => (4096, 8, 4, 4, StereoMode::Adaptive, false),
                5 => (4096, 8, 4, 5, StereoMode::Exhaustive, false),
                6 => (4096, 8, 4, 6, StereoMode::Exhaustive, false),
                7 => (4096, 8, 4, 6, StereoMode::Exhaustive, true),
                _ => (4096, 12, 4, 6, StereoMode::Exhaustive, true),
            };

        Self {
            block_size,
            max_lpc_order,
            max_fixed_order,
            min_partition_order: 0,
            max_partition_order,
            qlp_precision: None,
            stereo,
            exhaustive_model_search: exhaustive,
            padding: 4096,
            metadata: Vec::new(),
        }
    }

    /// Assigns new block size to options
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if the block size
    /// is smaller than 16.
    pub fn block_size(self, block_size: u16) -> Result<Self, Error> {
        match block_size {
            Streaminfo::MIN_BLOCK_SIZE.. => Ok(Self { block_size, ..self }),
            _ => Err(Error::UnsupportedParameter("block size")),
        }
    }

    /// Assigns maximum LPC order, where 0 disables LPC subframes
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if order exceeds 32.
    pub fn max_lpc_order(self, max_lpc_order: usize) -> Result<Self, Error> {
        match max_lpc_order {
            0..=MAX_LPC_ORDER => Ok(Self {
                max_lpc_order,
                ..self
            }),
            _ => Err(Error::UnsupportedParameter("maximum LPC order")),
        }
    }

    /// Assigns maximum fixed predictor order
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if order exceeds 4.
    pub fn max_fixed_order(self, max_fixed_order: usize) -> Result<Self, Error> {
        match max_fixed_order {
            0..=MAX_FIXED_ORDER => Ok(Self {
                max_fixed_order,
                ..self
            }),
            _ => Err(Error::UnsupportedParameter("maximum fixed order")),
        }
    }

    /// Assigns range of residual partition orders to search
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if `min` exceeds `max`
    /// or `max` exceeds 15.
    pub fn partition_orders(self, min: u32, max: u32) -> Result<Self, Error> {
        if min > max || max > MAX_PARTITION_ORDER {
            Err(Error::UnsupportedParameter("partition order"))
        } else {
            Ok(Self {
                min_partition_order: min,
                max_partition_order: max,
                ..self
            })
        }
    }

    /// Assigns quantized LPC coefficient precision
    ///
    /// `None` picks a precision from the block size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if precision
    /// isn't between 1 and 15 bits.
    pub fn qlp_precision(self, qlp_precision: Option<u32>) -> Result<Self, Error> {
        match qlp_precision {
            None | Some(1..=15) => Ok(Self {
                qlp_precision,
                ..self
            }),
            Some(_) => Err(Error::UnsupportedParameter("QLP precision")),
        }
    }

    /// Assigns stereo decorrelation mode
    pub fn stereo(self, stereo: StereoMode) -> Self {
        Self { stereo, ..self }
    }

    /// Whether to try every model order and Rice parameter
    /// rather than estimating the best ones
    pub fn exhaustive_model_search(self, exhaustive_model_search: bool) -> Self {
        Self {
            exhaustive_model_search,
            ..self
        }
    }

    /// Assigns size of PADDING block, where 0 omits it
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if padding
    /// doesn't fit in a metadata block.
    pub fn padding(self, padding: u32) -> Result<Self, Error> {
        match padding {
            0..0x100_0000 => Ok(Self { padding, ..self }),
            _ => Err(Error::UnsupportedParameter("padding")),
        }
    }

    /// Adds metadata block to be written after STREAMINFO
    ///
    /// # Errors
    ///
    /// Returns [`Error::MultipleStreaminfo`] if the block
    /// is a STREAMINFO block.
    pub fn metadata(mut self, block: impl Into<Block>) -> Result<Self, Error> {
        match block.into() {
            Block::Streaminfo(_) => Err(Error::MultipleStreaminfo),
            block => {
                self.metadata.push(block);
                Ok(self)
            }
        }
    }

    pub(crate) fn residual_options(&self) -> ResidualOptions {
        ResidualOptions {
            min_partition_order: self.min_partition_order,
            max_partition_order: self.max_partition_order,
            exhaustive: self.exhaustive_model_search,
        }
    }
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self::level(CompressionLevel::default())
    }
}

/// A FLAC encoder
///
/// Samples are buffered until a whole block is available.
/// The encoder must be finalized to write any final partial
/// block and update STREAMINFO with the stream's total samples
/// and MD5 sum.
/// Dropping an encoder without finalizing it discards
/// any buffered samples, but every frame already written
/// is complete.
pub struct Encoder<W: Write + Seek> {
    writer: W,
    // position of STREAMINFO's contents
    streaminfo_position: u64,
    options: EncodingOptions,
    streaminfo: Streaminfo,
    frame_number: FrameNumber,
    samples_written: u64,
    pending: SampleBlock,
    md5: md5::Context,
    finalized: bool,
}

impl<W: Write + Seek> Encoder<W> {
    /// Creates new encoder with the given parameters
    ///
    /// `sample_rate` must be between 1 and 1048575 (a 20 bit field).
    ///
    /// `bits_per_sample` must be between 4 and 32.
    ///
    /// `channels` must be between 1 and 8.
    ///
    /// `total_samples`, if known, must be between
    /// 1 and 68_719_476_735 (a 36 bit field).
    ///
    /// Note that if `total_samples` is indicated,
    /// the number written *must* be equal to that value
    /// or an error will occur when writing or finalizing the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if any
    /// of the encoding parameters are invalid,
    /// in which case nothing is written.
    /// Returns I/O error if unable to write initial
    /// metadata blocks.
    pub fn new(
        mut writer: W,
        options: EncodingOptions,
        sample_rate: u32,
        bits_per_sample: u32,
        channels: u8,
        total_samples: Option<u64>,
    ) -> Result<Self, Error> {
        let streaminfo = Streaminfo {
            minimum_block_size: options.block_size,
            maximum_block_size: options.block_size,
            minimum_frame_size: None,
            maximum_frame_size: None,
            sample_rate: match sample_rate {
                1..=Streaminfo::MAX_SAMPLE_RATE => sample_rate,
                _ => return Err(Error::UnsupportedParameter("sample rate")),
            },
            channels: NonZero::new(channels)
                .filter(|c| c.get() <= Streaminfo::MAX_CHANNELS)
                .ok_or(Error::UnsupportedParameter("channel count"))?,
            bits_per_sample: match bits_per_sample {
                4..=32 => bits_per_sample,
                _ => return Err(Error::UnsupportedParameter("bits per sample")),
            },
            total_samples: match total_samples {
                None => None,
                Some(total @ 1..=Streaminfo::MAX_TOTAL_SAMPLES) => NonZero::new(total),
                Some(_) => return Err(Error::UnsupportedParameter("total samples")),
            },
            md5: None,
        };

        let blocks = std::iter::once(Block::from(streaminfo.clone()))
            .chain(
                (options.padding > 0).then_some(Block::from(Padding {
                    size: options.padding,
                })),
            )
            .chain(options.metadata.iter().cloned())
            .collect::<Vec<_>>();

        // "fLaC" tag and STREAMINFO block header precede its contents
        let streaminfo_position = writer.stream_position()? + 8;
        write_blocks(&blocks, &mut writer)?;

        let mut pending = SampleBlock::empty(channels.into(), bits_per_sample)?;
        pending.reserve(usize::from(options.block_size));

        Ok(Self {
            writer,
            streaminfo_position,
            pending,
            options,
            streaminfo,
            frame_number: FrameNumber::default(),
            samples_written: 0,
            md5: md5::Context::new(),
            finalized: false,
        })
    }

    /// The stream's STREAMINFO as it currently stands
    pub fn streaminfo(&self) -> &Streaminfo {
        &self.streaminfo
    }

    /// Encodes block of PCM samples
    ///
    /// Depending on the encoder's chosen block size,
    /// this may encode zero or more FLAC frames to disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the underlying stream,
    /// or if the block's parameters are not a match
    /// for the encoder's.
    pub fn encode(&mut self, block: &SampleBlock) -> Result<(), Error> {
        if self.finalized {
            return Err(Error::StreamFinalized);
        } else if block.channel_count() != usize::from(self.streaminfo.channels.get()) {
            return Err(Error::ChannelsMismatch);
        } else if block.bits_per_sample() != self.streaminfo.bits_per_sample {
            return Err(Error::BitsPerSampleMismatch);
        }

        let samples_written = self.samples_written + block.pcm_frames() as u64;
        if let Some(total_samples) = self.streaminfo.total_samples {
            if samples_written > total_samples.get() {
                return Err(Error::ExcessiveTotalSamples);
            }
        } else if samples_written > Streaminfo::MAX_TOTAL_SAMPLES {
            return Err(Error::ExcessiveTotalSamples);
        }
        self.samples_written = samples_written;

        block.update_md5(&mut self.md5);
        self.pending.extend(block)?;

        // encode whole blocks in order, then drop them all at once
        let block_size = usize::from(self.options.block_size);
        let mut start = 0;
        while self.pending.pcm_frames() - start >= block_size {
            let frame = self.pending.slice(start, block_size);
            self.encode_frame(&frame)?;
            start += block_size;
        }
        self.pending.discard(start);

        Ok(())
    }

    fn encode_frame(&mut self, block: &SampleBlock) -> Result<(), Error> {
        let frame = Frame::encode(
            block,
            self.frame_number,
            self.streaminfo.sample_rate,
            &self.options,
        )?;

        let size = frame.write(&mut self.writer)?;

        log::debug!(
            "frame {} : {} samples, {}, {} bytes",
            self.frame_number,
            block.pcm_frames(),
            frame.header.channel_assignment,
            size
        );

        self.frame_number.try_increment()?;

        // update minimum and maximum frame size values
        if let s @ Some(size) = u32::try_from(size)
            .ok()
            .filter(|size| *size <= Streaminfo::MAX_FRAME_SIZE)
            .and_then(NonZero::new)
        {
            match &mut self.streaminfo.minimum_frame_size {
                Some(min_size) => {
                    *min_size = size.min(*min_size);
                }
                min_size @ None => {
                    *min_size = s;
                }
            }

            match &mut self.streaminfo.maximum_frame_size {
                Some(max_size) => {
                    *max_size = size.max(*max_size);
                }
                max_size @ None => {
                    *max_size = s;
                }
            }
        }

        Ok(())
    }

    fn finalize_inner(&mut self) -> Result<(), Error> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        if !self.pending.is_empty() {
            let remaining = self.pending.pcm_frames();
            let pending = self.pending.take(remaining);
            self.encode_frame(&pending)?;
        }

        match self.streaminfo.total_samples {
            Some(expected) => {
                if expected.get() != self.samples_written {
                    log::warn!(
                        "expected {} total samples, but {} were written",
                        expected,
                        self.samples_written
                    );
                    return Err(Error::SampleCountMismatch);
                }
            }
            None => {
                self.streaminfo.total_samples = NonZero::new(self.samples_written);
            }
        }

        self.streaminfo.md5 = Some(self.md5.clone().compute().0);

        let end = self.writer.stream_position()?;
        self.writer
            .seek(SeekFrom::Start(self.streaminfo_position))?;
        self.writer
            .write_all(&Block::from(self.streaminfo.clone()).contents()?)?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        Ok(())
    }

    /// Attempt to finalize stream, returning the inner writer
    ///
    /// It is necessary to finalize the FLAC encoder
    /// so that it will write any partially unwritten samples
    /// to the stream and update the STREAMINFO block
    /// with its final values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SampleCountMismatch`] if the number of samples
    /// written differs from the total given at creation,
    /// or any I/O error from the underlying stream.
    pub fn finalize(mut self) -> Result<W, Error> {
        self.finalize_inner()?;
        Ok(self.writer)
    }
}

impl<W: Write + Seek> PcmWriter for Encoder<W> {
    #[inline]
    fn write(&mut self, block: &SampleBlock) -> Result<(), Error> {
        self.encode(block)
    }

    #[inline]
    fn close(&mut self) -> Result<(), Error> {
        self.finalize_inner()
    }
}
