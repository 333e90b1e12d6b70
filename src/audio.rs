// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Containers for multi-channel PCM samples

use crate::Error;
use crate::byteorder::{BigEndian, Endianness, LittleEndian};

/// The inclusive range of values a signed sample of `bits_per_sample` may hold
#[inline]
pub(crate) fn sample_range(bits_per_sample: u32) -> std::ops::RangeInclusive<i64> {
    debug_assert!((1..=33).contains(&bits_per_sample));
    -(1 << (bits_per_sample - 1))..=(1 << (bits_per_sample - 1)) - 1
}

/// A block of fixed-point PCM samples
///
/// Every channel holds the same number of samples
/// and every sample fits within the block's bits-per-sample.
/// Samples are always stored signed; unsigned input
/// is re-centered around 0 as it's read in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleBlock {
    // one buffer per channel, each channel_len samples long
    samples: Vec<Vec<i32>>,

    // total length of each channel in samples
    channel_len: usize,

    // bits-per-sample
    bits_per_sample: u32,
}

impl SampleBlock {
    /// Returns empty block which can be extended as needed
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSampleCount`] if there are no channels
    /// or [`Error::InvalidBitsPerSample`] if `bits_per_sample`
    /// isn't between 1 and 32.
    #[inline]
    pub fn empty(channels: usize, bits_per_sample: u32) -> Result<Self, Error> {
        Self::validate(channels, bits_per_sample)?;

        Ok(Self {
            samples: vec![Vec::new(); channels],
            channel_len: 0,
            bits_per_sample,
        })
    }

    fn validate(channels: usize, bits_per_sample: u32) -> Result<(), Error> {
        if channels == 0 {
            Err(Error::InvalidSampleCount)
        } else if !(1..=32).contains(&bits_per_sample) {
            Err(Error::InvalidBitsPerSample)
        } else {
            Ok(())
        }
    }

    /// Builds block from interleaved samples
    ///
    /// If `signed` is false, samples are taken to be unsigned values
    /// between 0 and 2 ^ `bits_per_sample`, and are re-centered.
    /// For 32 bits-per-sample unsigned input, each `i32`'s bit pattern
    /// is taken as its unsigned value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSampleCount`] if the number of samples
    /// isn't evenly divisible by `channels`,
    /// [`Error::InvalidBitsPerSample`] if `bits_per_sample` isn't
    /// between 1 and 32, or [`Error::ExcessiveSample`] if
    /// any sample is out of range.
    ///
    /// # Example
    ///
    /// ```
    /// use flac_engine::SampleBlock;
    ///
    /// let block = SampleBlock::from_samples(&[0, 255, 128, 127], 2, 8, false).unwrap();
    /// assert_eq!(block.channel(0).unwrap(), &[-128, 0]);
    /// assert_eq!(block.channel(1).unwrap(), &[127, -1]);
    /// ```
    pub fn from_samples(
        samples: &[i32],
        channels: usize,
        bits_per_sample: u32,
        signed: bool,
    ) -> Result<Self, Error> {
        Self::validate(channels, bits_per_sample)?;

        if samples.len() % channels != 0 {
            return Err(Error::InvalidSampleCount);
        }

        let channel_len = samples.len() / channels;
        let recenter = |s: &i32| -> Result<i32, Error> {
            match (signed, bits_per_sample) {
                (true, _) => Ok(*s),
                (false, 32) => Ok((*s as u32 ^ 0x8000_0000) as i32),
                (false, bps) => match i64::from(*s) {
                    u if (0..(1 << bps)).contains(&u) => Ok((u - (1 << (bps - 1))) as i32),
                    _ => Err(Error::ExcessiveSample),
                },
            }
        };

        let block = Self {
            samples: (0..channels)
                .map(|c| {
                    samples
                        .iter()
                        .skip(c)
                        .step_by(channels)
                        .map(recenter)
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?,
            channel_len,
            bits_per_sample,
        };
        block.check_range()?;
        Ok(block)
    }

    /// Builds block from a list of signed channels
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelLengthMismatch`] if channels
    /// have different lengths, [`Error::InvalidSampleCount`] if
    /// there are no channels, or [`Error::ExcessiveSample`] if
    /// any sample is out of range.
    pub fn from_channels<C: AsRef<[i32]>>(
        channels: &[C],
        bits_per_sample: u32,
    ) -> Result<Self, Error> {
        Self::validate(channels.len(), bits_per_sample)?;

        let channel_len = channels[0].as_ref().len();
        if channels.iter().any(|c| c.as_ref().len() != channel_len) {
            return Err(Error::ChannelLengthMismatch);
        }

        let block = Self {
            samples: channels.iter().map(|c| c.as_ref().to_vec()).collect(),
            channel_len,
            bits_per_sample,
        };
        block.check_range()?;
        Ok(block)
    }

    fn check_range(&self) -> Result<(), Error> {
        let range = sample_range(self.bits_per_sample);
        match self
            .channels()
            .flatten()
            .all(|s| range.contains(&i64::from(*s)))
        {
            true => Ok(()),
            false => Err(Error::ExcessiveSample),
        }
    }

    /// Returns total number of channels
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.samples.len()
    }

    /// Returns PCM frame count
    #[inline]
    pub fn pcm_frames(&self) -> usize {
        self.channel_len
    }

    /// Returns bits-per-sample
    #[inline]
    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Returns total number of samples across all channels
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len() * self.channel_len
    }

    /// Whether the block contains no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns bytes-per-sample
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample.div_ceil(8) as usize
    }

    /// Returns the samples of a single PCM frame, one per channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the frame doesn't exist.
    pub fn frame(&self, index: usize) -> Result<Vec<i32>, Error> {
        if index < self.channel_len {
            Ok(self.samples.iter().map(|c| c[index]).collect())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.channel_len,
            })
        }
    }

    /// Returns all the samples of a single channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the channel doesn't exist.
    pub fn channel(&self, index: usize) -> Result<&[i32], Error> {
        self.samples
            .get(index)
            .map(Vec::as_slice)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.samples.len(),
            })
    }

    /// Iterates over all channels
    #[inline]
    pub fn channels(&self) -> impl Iterator<Item = &[i32]> {
        self.samples.iter().map(Vec::as_slice)
    }

    /// Iterates over all samples in interleaved order
    pub fn iter(&self) -> impl Iterator<Item = i32> {
        (0..self.channel_len).flat_map(|i| self.samples.iter().map(move |c| c[i]))
    }

    /// Copies up to `frames` PCM frames starting at `start`
    ///
    /// The range is clamped to the block's length,
    /// so only the requested samples are copied.
    pub fn slice(&self, start: usize, frames: usize) -> Self {
        let start = start.min(self.channel_len);
        let end = start.saturating_add(frames).min(self.channel_len);

        Self {
            samples: self.channels().map(|c| c[start..end].to_vec()).collect(),
            channel_len: end - start,
            bits_per_sample: self.bits_per_sample,
        }
    }

    /// Splits block into its first `frames` PCM frames and the remainder
    ///
    /// `frames` beyond the block's length returns the
    /// whole block and an empty remainder.
    pub fn split(&self, frames: usize) -> (Self, Self) {
        (self.slice(0, frames), self.slice(frames, usize::MAX))
    }

    /// Drops up to `frames` PCM frames from the start of the block
    ///
    /// The remaining samples are shifted down in place,
    /// so cost is proportional to what remains.
    pub fn discard(&mut self, frames: usize) {
        let frames = frames.min(self.channel_len);
        for c in self.samples.iter_mut() {
            c.drain(..frames);
        }
        self.channel_len -= frames;
    }

    /// Removes and returns up to `frames` PCM frames from the start of the block
    pub fn take(&mut self, frames: usize) -> Self {
        let head = self.slice(0, frames);
        self.discard(head.channel_len);
        head
    }

    /// Reserves capacity for at least `frames` more PCM frames
    pub fn reserve(&mut self, frames: usize) {
        for c in self.samples.iter_mut() {
            c.reserve(frames);
        }
    }

    /// Appends the samples of another block onto this one
    ///
    /// Each channel grows in place, so cost is
    /// proportional to `other`'s length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelsMismatch`] or
    /// [`Error::BitsPerSampleMismatch`] if the blocks'
    /// parameters differ.
    pub fn extend(&mut self, other: &SampleBlock) -> Result<(), Error> {
        if self.samples.len() != other.samples.len() {
            return Err(Error::ChannelsMismatch);
        } else if self.bits_per_sample != other.bits_per_sample {
            return Err(Error::BitsPerSampleMismatch);
        }

        for (ours, theirs) in self.samples.iter_mut().zip(other.channels()) {
            ours.extend_from_slice(theirs);
        }
        self.channel_len += other.channel_len;
        Ok(())
    }

    /// Concatenates two blocks into a new block
    ///
    /// # Errors
    ///
    /// Returns an error if the blocks' parameters differ.
    pub fn concat(&self, other: &SampleBlock) -> Result<Self, Error> {
        let mut block = self.clone();
        block.extend(other)?;
        Ok(block)
    }

    /// Fills buffer with our interleaved samples in the given byte order
    ///
    /// `buf` must be [`SampleBlock::bytes_len`] bytes long.
    pub fn to_buf<E: Endianness>(&self, signed: bool, buf: &mut [u8]) {
        let offset = match signed {
            true => 0,
            false => 1i64 << (self.bits_per_sample - 1),
        };

        for (sample, bytes) in self
            .iter()
            .zip(buf.chunks_exact_mut(self.bytes_per_sample()))
        {
            E::sample_to_bytes((i64::from(sample) + offset) as i32, bytes);
        }
    }

    /// Returns total length of our samples in bytes
    #[inline]
    pub fn bytes_len(&self) -> usize {
        self.bytes_per_sample() * self.len()
    }

    /// Serializes samples in interleaved order
    /// at the minimal byte width for our bits-per-sample
    pub fn to_bytes(&self, big_endian: bool, signed: bool) -> Vec<u8> {
        let mut buf = vec![0; self.bytes_len()];
        match big_endian {
            true => self.to_buf::<BigEndian>(signed, &mut buf),
            false => self.to_buf::<LittleEndian>(signed, &mut buf),
        }
        buf
    }

    /// Builds block from interleaved samples in the given byte order
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSampleCount`] if the bytes
    /// don't hold a whole number of PCM frames.
    pub fn from_buf<E: Endianness>(
        buf: &[u8],
        channels: usize,
        bits_per_sample: u32,
        signed: bool,
    ) -> Result<Self, Error> {
        Self::validate(channels, bits_per_sample)?;

        let bytes_per_sample = bits_per_sample.div_ceil(8) as usize;
        if buf.len() % (bytes_per_sample * channels) != 0 {
            return Err(Error::InvalidSampleCount);
        }

        let samples = buf
            .chunks_exact(bytes_per_sample)
            .map(|bytes| match signed {
                true => E::bytes_to_sample(bytes),
                false => E::bytes_to_unsigned(bytes) as i32,
            })
            .collect::<Vec<_>>();

        Self::from_samples(&samples, channels, bits_per_sample, signed)
    }

    /// Builds block from interleaved bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes don't hold
    /// a whole number of in-range PCM frames.
    pub fn from_bytes(
        bytes: &[u8],
        channels: usize,
        bits_per_sample: u32,
        big_endian: bool,
        signed: bool,
    ) -> Result<Self, Error> {
        match big_endian {
            true => Self::from_buf::<BigEndian>(bytes, channels, bits_per_sample, signed),
            false => Self::from_buf::<LittleEndian>(bytes, channels, bits_per_sample, signed),
        }
    }

    /// Adds our samples to a running MD5 calculation
    ///
    /// Samples are hashed as signed, little-endian values
    /// at the minimal byte width for their bits-per-sample.
    pub fn update_md5(&self, md5: &mut md5::Context) {
        md5.consume(self.to_bytes(false, true));
    }

    /// Converts our samples to floating point values
    /// between -1.0 and 1.0
    pub fn to_float(&self) -> FloatBlock {
        // a defaulted block has no channels and no bits-per-sample
        let scale = match self.bits_per_sample {
            0 => 1.0,
            bps => (1u64 << (bps - 1)) as f64,
        };
        FloatBlock {
            samples: self
                .channels()
                .flatten()
                .map(|s| f64::from(*s) / scale)
                .collect(),
            channels: self.samples.len(),
            channel_len: self.channel_len,
        }
    }
}

/// A block of floating-point PCM samples
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatBlock {
    // all samples, stacked by channel
    samples: Vec<f64>,
    channels: usize,
    channel_len: usize,
}

impl FloatBlock {
    /// Returns total number of channels
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Returns PCM frame count
    #[inline]
    pub fn pcm_frames(&self) -> usize {
        self.channel_len
    }

    /// Returns all the samples of a single channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if the channel doesn't exist.
    pub fn channel(&self, index: usize) -> Result<&[f64], Error> {
        if index < self.channels {
            Ok(&self.samples[index * self.channel_len..(index + 1) * self.channel_len])
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.channels,
            })
        }
    }

    /// Converts our samples back to fixed-point values
    ///
    /// Out-of-range values are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBitsPerSample`] if
    /// `bits_per_sample` isn't between 1 and 32.
    pub fn to_int(&self, bits_per_sample: u32) -> Result<SampleBlock, Error> {
        if !(1..=32).contains(&bits_per_sample) {
            return Err(Error::InvalidBitsPerSample);
        }

        let scale = (1u64 << (bits_per_sample - 1)) as f64;
        let range = sample_range(bits_per_sample);
        let (min, max) = (*range.start() as f64, *range.end() as f64);

        Ok(SampleBlock {
            samples: (0..self.channels)
                .map(|c| {
                    self.samples[c * self.channel_len..(c + 1) * self.channel_len]
                        .iter()
                        .map(|s| (s * scale).round().clamp(min, max) as i32)
                        .collect()
                })
                .collect(),
            channel_len: self.channel_len,
            bits_per_sample,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stereo() -> SampleBlock {
        SampleBlock::from_samples(&[1, -1, 2, -2, 3, -3, 4, -4, 5, -5], 2, 16, true).unwrap()
    }

    #[test]
    fn test_from_samples() {
        let block = stereo();
        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.pcm_frames(), 5);
        assert_eq!(block.len(), 10);
        assert_eq!(block.channel(0).unwrap(), &[1, 2, 3, 4, 5]);
        assert_eq!(block.channel(1).unwrap(), &[-1, -2, -3, -4, -5]);
        assert_eq!(block.frame(2).unwrap(), vec![3, -3]);
        assert_eq!(
            block.iter().collect::<Vec<_>>(),
            vec![1, -1, 2, -2, 3, -3, 4, -4, 5, -5]
        );

        assert!(matches!(
            SampleBlock::from_samples(&[1, 2, 3], 2, 16, true),
            Err(Error::InvalidSampleCount)
        ));
        assert!(matches!(
            SampleBlock::from_samples(&[128], 1, 8, true),
            Err(Error::ExcessiveSample)
        ));
        assert!(matches!(
            SampleBlock::from_samples(&[256], 1, 8, false),
            Err(Error::ExcessiveSample)
        ));
        assert!(matches!(
            SampleBlock::from_samples(&[0], 1, 33, true),
            Err(Error::InvalidBitsPerSample)
        ));
    }

    #[test]
    fn test_index_errors() {
        let block = stereo();
        assert!(matches!(
            block.frame(5),
            Err(Error::IndexOutOfRange { index: 5, len: 5 })
        ));
        assert!(matches!(
            block.channel(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_from_channels() {
        let block = SampleBlock::from_channels(&[[1, 2, 3, 4, 5], [-1, -2, -3, -4, -5]], 16).unwrap();
        assert_eq!(block, stereo());

        assert!(matches!(
            SampleBlock::from_channels(&[vec![1, 2], vec![1]], 16),
            Err(Error::ChannelLengthMismatch)
        ));
    }

    #[test]
    fn test_split() {
        let block = stereo();

        for n in 0..8 {
            let (head, tail) = block.split(n);
            assert_eq!(head.pcm_frames(), n.min(5));
            assert_eq!(tail.pcm_frames(), 5 - n.min(5));
            assert_eq!(head.concat(&tail).unwrap(), block);
        }

        let (head, tail) = block.split(2);
        assert_eq!(head.channel(1).unwrap(), &[-1, -2]);
        assert_eq!(tail.channel(0).unwrap(), &[3, 4, 5]);
    }

    #[test]
    fn test_concat_mismatch() {
        let block = stereo();
        let mono = SampleBlock::from_samples(&[1, 2], 1, 16, true).unwrap();
        let wide = SampleBlock::from_samples(&[1, 2], 2, 24, true).unwrap();
        assert!(matches!(block.concat(&mono), Err(Error::ChannelsMismatch)));
        assert!(matches!(block.concat(&wide), Err(Error::BitsPerSampleMismatch)));

        let mut empty = SampleBlock::empty(2, 16).unwrap();
        empty.extend(&block).unwrap();
        assert_eq!(empty, block);
    }

    #[test]
    fn test_empty_validation() {
        assert!(matches!(
            SampleBlock::empty(2, 0),
            Err(Error::InvalidBitsPerSample)
        ));
        assert!(matches!(
            SampleBlock::empty(2, 33),
            Err(Error::InvalidBitsPerSample)
        ));
        assert!(matches!(
            SampleBlock::empty(0, 16),
            Err(Error::InvalidSampleCount)
        ));

        let empty = SampleBlock::empty(1, 1).unwrap();
        assert_eq!(empty.to_float().pcm_frames(), 0);
        assert_eq!(SampleBlock::default().to_float().channel_count(), 0);
    }

    #[test]
    fn test_take_and_slice() {
        let mut block = stereo();

        let middle = block.slice(1, 3);
        assert_eq!(middle.channel(0).unwrap(), &[2, 3, 4]);
        assert_eq!(middle.channel(1).unwrap(), &[-2, -3, -4]);
        assert_eq!(block.slice(4, 10).pcm_frames(), 1);
        assert!(block.slice(9, 1).is_empty());

        let head = block.take(2);
        assert_eq!(head.channel(0).unwrap(), &[1, 2]);
        assert_eq!(block.channel(0).unwrap(), &[3, 4, 5]);
        assert_eq!(block.channel(1).unwrap(), &[-3, -4, -5]);
        assert_eq!(block.len(), 6);

        block.discard(10);
        assert!(block.is_empty());
        assert_eq!(block.channel_count(), 2);
    }

    #[test]
    fn test_extend_in_place() {
        let chunk = stereo();
        let mut block = SampleBlock::empty(2, 16).unwrap();
        block.reserve(5 * 1000);
        for _ in 0..1000 {
            block.extend(&chunk).unwrap();
        }
        assert_eq!(block.pcm_frames(), 5000);
        assert_eq!(block.frame(4999).unwrap(), vec![5, -5]);
        assert_eq!(
            block.iter().take(4).collect::<Vec<_>>(),
            vec![1, -1, 2, -2]
        );
    }

    #[test]
    fn test_bytes() {
        let block = SampleBlock::from_samples(&[0x1234, -2], 1, 16, true).unwrap();
        assert_eq!(block.to_bytes(false, true), vec![0x34, 0x12, 0xFE, 0xFF]);
        assert_eq!(block.to_bytes(true, true), vec![0x12, 0x34, 0xFF, 0xFE]);
        assert_eq!(block.to_bytes(true, false), vec![0x92, 0x34, 0x7F, 0xFE]);

        for big_endian in [false, true] {
            for signed in [false, true] {
                assert_eq!(
                    SampleBlock::from_bytes(
                        &block.to_bytes(big_endian, signed),
                        1,
                        16,
                        big_endian,
                        signed
                    )
                    .unwrap(),
                    block
                );
            }
        }

        let block = SampleBlock::from_samples(&[-8388608, 8388607, 1, -1], 2, 24, true).unwrap();
        assert_eq!(block.to_bytes(false, true).len(), 12);
        assert_eq!(
            SampleBlock::from_bytes(&block.to_bytes(true, true), 2, 24, true, true).unwrap(),
            block
        );

        assert!(matches!(
            SampleBlock::from_bytes(&[0, 0, 0], 1, 16, false, true),
            Err(Error::InvalidSampleCount)
        ));
    }

    #[test]
    fn test_unsigned_32() {
        let block = SampleBlock::from_samples(&[0, -1], 1, 32, false).unwrap();
        assert_eq!(block.channel(0).unwrap(), &[i32::MIN, i32::MAX]);
        assert_eq!(
            SampleBlock::from_bytes(&block.to_bytes(false, false), 1, 32, false, false).unwrap(),
            block
        );
    }

    #[test]
    fn test_float_roundtrip() {
        for bps in [8, 16, 24] {
            let range = sample_range(bps);
            let samples = [*range.start(), -1, 0, 1, *range.end()]
                .into_iter()
                .map(|s| s as i32)
                .collect::<Vec<_>>();
            let block = SampleBlock::from_samples(&samples, 1, bps, true).unwrap();
            let float = block.to_float();
            assert_eq!(float.channel(0).unwrap()[0], -1.0);
            assert_eq!(float.to_int(bps).unwrap(), block);
        }

        let block = SampleBlock::from_samples(&[-128, 127], 2, 8, true).unwrap();
        let float = block.to_float();
        assert_eq!(float.to_int(16).unwrap().channel(0).unwrap(), &[-32768]);
    }
}
