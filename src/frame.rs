// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For encoding and decoding whole FLAC frames
//!
//! Decoding a frame proceeds by reading its header
//! (which must pass its own CRC-8), then one subframe per channel,
//! and finally the frame's CRC-16 which covers everything before it.
//! Encoding picks the cheapest model for each channel and,
//! for stereo frames, the cheapest channel assignment.

use crate::Error;
use crate::audio::SampleBlock;
use crate::bitstream::{BigEndian, BitReader, BitWriter};
use crate::crc::{Checksum, Crc16, CrcWriter};
use crate::encode::{EncodingOptions, StereoMode};
use crate::metadata::Streaminfo;
use crate::predictor;
use crate::residual::{ResidualOptions, Residuals};
use crate::stream::{
    ChannelAssignment, FrameHeader, FrameNumber, LpcParameters, MAX_FIXED_ORDER, MAX_LPC_ORDER,
    Subframe, SubframeHeader, SubframeHeaderType,
};
use arrayvec::ArrayVec;

/// A complete FLAC frame, with every subframe's model
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    /// The frame's header
    pub header: FrameHeader,
    /// One subframe per channel, in channel assignment order
    pub subframes: Vec<Subframe>,
}

impl Frame {
    /// Reads whole frame, including both checksums
    ///
    /// The reader must be positioned at the start of the frame,
    /// and is left positioned just after it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptHeader`] or [`Error::CorruptFrame`]
    /// if either checksum fails, [`Error::FrameParametersMismatch`]
    /// if the frame disagrees with STREAMINFO, [`Error::EndOfStream`]
    /// if the frame is truncated, or a structural error
    /// if the frame is otherwise invalid.
    pub fn read(r: &mut BitReader<'_, BigEndian>, streaminfo: &Streaminfo) -> Result<Self, Error> {
        let start = r.byte_position();

        let header = FrameHeader::read(r, streaminfo)?;
        if header.channel_assignment.count() != usize::from(streaminfo.channels.get())
            || header.bits_per_sample != streaminfo.bits_per_sample
            || header.sample_rate != streaminfo.sample_rate
            || header.block_size > u32::from(streaminfo.maximum_block_size)
        {
            return Err(Error::FrameParametersMismatch);
        }

        let subframes = (0..header.channel_assignment.count())
            .map(|channel| {
                Subframe::read(
                    r,
                    header.block_size as usize,
                    header
                        .channel_assignment
                        .channel_bps(channel, header.bits_per_sample),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        r.byte_align();
        r.skip(16)?;

        match Crc16::of(&r.data()[start..r.byte_position()]) {
            0 => Ok(Self { header, subframes }),
            _ => Err(Error::CorruptFrame),
        }
    }

    /// Writes whole frame, including both checksums
    ///
    /// Returns the frame's size in bytes.
    pub fn write<W: std::io::Write>(&self, writer: W) -> Result<usize, Error> {
        use std::io::Write;

        let mut w = BitWriter::endian(BigEndian);
        self.header.write(&mut w)?;
        for (channel, subframe) in self.subframes.iter().enumerate() {
            subframe.write(
                &mut w,
                self.header
                    .channel_assignment
                    .channel_bps(channel, self.header.bits_per_sample),
            )?;
        }

        let mut crc16: CrcWriter<W, Crc16> = CrcWriter::new(writer);
        crc16.write_all(&w.into_bytes()?)?;
        let checksum = crc16.checksum();
        let size = crc16.count() + 2;
        crc16.into_inner().write_all(&checksum.to_be_bytes())?;
        Ok(size)
    }

    /// Number of PCM frames in the frame
    #[inline]
    pub fn block_size(&self) -> usize {
        self.header.block_size as usize
    }

    /// Reconstructs frame's samples
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveResidual`] if the subframes
    /// predict samples outside their range, or
    /// [`Error::ExcessiveSample`] if decorrelated samples
    /// don't fit the frame's bits-per-sample.
    pub fn decode(&self) -> Result<SampleBlock, Error> {
        let bits_per_sample = self.header.bits_per_sample;
        let assignment = self.header.channel_assignment;

        let mut channels = self
            .subframes
            .iter()
            .enumerate()
            .map(|(channel, subframe)| {
                subframe.decode(assignment.channel_bps(channel, bits_per_sample))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if channels.iter().any(|c| c.len() != self.block_size()) {
            return Err(Error::ChannelLengthMismatch);
        }

        match assignment {
            ChannelAssignment::Independent(_) => {}
            ChannelAssignment::LeftSide => {
                let (left, side) = channels.split_at_mut(1);
                left[0]
                    .iter()
                    .zip(side[0].iter_mut())
                    .for_each(|(left, side)| *side = *left - *side);
            }
            ChannelAssignment::SideRight => {
                let (side, right) = channels.split_at_mut(1);
                side[0]
                    .iter_mut()
                    .zip(right[0].iter())
                    .for_each(|(side, right)| *side += *right);
            }
            ChannelAssignment::MidSide => {
                let (mid, side) = channels.split_at_mut(1);
                mid[0]
                    .iter_mut()
                    .zip(side[0].iter_mut())
                    .for_each(|(mid, side)| {
                        let sum = (*mid << 1) | (*side & 1);
                        (*mid, *side) = ((sum + *side) >> 1, (sum - *side) >> 1);
                    });
            }
        }

        SampleBlock::from_channels(
            &channels
                .into_iter()
                .map(|channel| {
                    channel
                        .into_iter()
                        .map(|s| i32::try_from(s).map_err(|_| Error::ExcessiveSample))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?,
            bits_per_sample,
        )
    }

    /// Encodes block of samples to a frame
    ///
    /// The block must have between 1 and 65536 PCM frames.
    pub fn encode(
        block: &SampleBlock,
        frame_number: FrameNumber,
        sample_rate: u32,
        options: &EncodingOptions,
    ) -> Result<Self, Error> {
        let block_size = block.pcm_frames();
        if !(1..=65536).contains(&block_size) {
            return Err(Error::InvalidBlockSize);
        }
        let bits_per_sample = block.bits_per_sample();

        let channels = block
            .channels()
            .map(|c| c.iter().copied().map(i64::from).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        let (channel_assignment, subframes) = match channels.as_slice() {
            [left, right] if options.stereo != StereoMode::Independent => {
                encode_stereo(left, right, bits_per_sample, options)
            }
            channels => (
                ChannelAssignment::Independent(channels.len() as u8),
                channels
                    .iter()
                    .map(|c| encode_subframe(c, bits_per_sample, options))
                    .collect(),
            ),
        };

        Ok(Self {
            header: FrameHeader {
                blocking_strategy: false,
                frame_number,
                block_size: block_size as u32,
                sample_rate,
                channel_assignment,
                bits_per_sample,
            },
            subframes,
        })
    }
}

fn encode_stereo(
    left: &[i64],
    right: &[i64],
    bits_per_sample: u32,
    options: &EncodingOptions,
) -> (ChannelAssignment, Vec<Subframe>) {
    let side = left
        .iter()
        .zip(right)
        .map(|(l, r)| l - r)
        .collect::<Vec<_>>();
    let mid = left
        .iter()
        .zip(right)
        .map(|(l, r)| (l + r) >> 1)
        .collect::<Vec<_>>();

    match options.stereo {
        StereoMode::Exhaustive => {
            let left = encode_subframe(left, bits_per_sample, options);
            let right = encode_subframe(right, bits_per_sample, options);
            let mid = encode_subframe(&mid, bits_per_sample, options);
            let side = encode_subframe(&side, bits_per_sample + 1, options);

            let (l, r, m, s) = (
                left.bits(bits_per_sample),
                right.bits(bits_per_sample),
                mid.bits(bits_per_sample),
                side.bits(bits_per_sample + 1),
            );

            match cheapest([l + r, l + s, s + r, m + s]) {
                ChannelAssignment::LeftSide => (ChannelAssignment::LeftSide, vec![left, side]),
                ChannelAssignment::SideRight => (ChannelAssignment::SideRight, vec![side, right]),
                ChannelAssignment::MidSide => (ChannelAssignment::MidSide, vec![mid, side]),
                independent => (independent, vec![left, right]),
            }
        }
        _ => {
            let estimate = |samples: &[i64]| {
                (0..=MAX_FIXED_ORDER.min(samples.len() - 1))
                    .map(|order| predictor::fixed_magnitude(order, samples))
                    .min()
                    .unwrap_or(0)
            };
            let (l, r, m, s) = (
                estimate(left),
                estimate(right),
                estimate(&mid),
                estimate(&side),
            );

            let assignment = cheapest([l + r, l + s, s + r, m + s]);

            let (first, second): (&[i64], &[i64]) = match assignment {
                ChannelAssignment::LeftSide => (left, &side),
                ChannelAssignment::SideRight => (&side, right),
                ChannelAssignment::MidSide => (&mid, &side),
                ChannelAssignment::Independent(_) => (left, right),
            };

            (
                assignment,
                vec![
                    encode_subframe(first, assignment.channel_bps(0, bits_per_sample), options),
                    encode_subframe(second, assignment.channel_bps(1, bits_per_sample), options),
                ],
            )
        }
    }
}

/// Picks stereo assignment from costs ordered as
/// independent, left-side, side-right and mid-side
fn cheapest(costs: [u64; 4]) -> ChannelAssignment {
    [
        ChannelAssignment::Independent(2),
        ChannelAssignment::LeftSide,
        ChannelAssignment::SideRight,
        ChannelAssignment::MidSide,
    ]
    .into_iter()
    .zip(costs)
    .min_by_key(|(_, cost)| *cost)
    .map(|(assignment, _)| assignment)
    .unwrap_or(ChannelAssignment::Independent(2))
}

/// Encodes channel's samples to the smallest available subframe
///
/// `samples` must not be empty and must fit in `bits_per_sample`.
pub fn encode_subframe(samples: &[i64], bits_per_sample: u32, options: &EncodingOptions) -> Subframe {
    debug_assert!(!samples.is_empty());

    if let [first, rest @ ..] = samples {
        if rest.iter().all(|s| s == first) {
            log::trace!("CONSTANT subframe of {} samples", samples.len());
            return Subframe::Constant {
                sample: *first,
                block_size: samples.len() as u32,
                wasted_bps: 0,
            };
        }
    }

    let wasted_bps = predictor::wasted_bits(samples);
    let shifted;
    let samples = match wasted_bps {
        0 => samples,
        wasted => {
            shifted = samples.iter().map(|s| s >> wasted).collect::<Vec<_>>();
            shifted.as_slice()
        }
    };
    let effective_bps = bits_per_sample - wasted_bps;
    let residual_options = options.residual_options();

    let mut best = Subframe::Verbatim {
        samples: samples.to_vec(),
        wasted_bps,
    };
    let mut best_bits = best.bits(bits_per_sample);

    let mut consider = |candidate: Subframe| {
        let bits = candidate.bits(bits_per_sample);
        if bits < best_bits {
            best = candidate;
            best_bits = bits;
        }
    };

    let max_fixed_order = options.max_fixed_order.min(samples.len() - 1);
    let fixed_orders = match options.exhaustive_model_search {
        true => 0..=max_fixed_order,
        false => {
            let order = (0..=max_fixed_order)
                .min_by_key(|order| predictor::fixed_magnitude(*order, samples))
                .unwrap_or(0);
            order..=order
        }
    };
    for order in fixed_orders {
        if let Some(subframe) = fixed_subframe(samples, order, wasted_bps, &residual_options) {
            consider(subframe);
        }
    }

    if options.max_lpc_order > 0 && samples.len() > 1 {
        lpc_subframes(
            samples,
            effective_bps,
            wasted_bps,
            options,
            &residual_options,
            &mut consider,
        );
    }

    log::trace!(
        "{} subframe of {} samples, {} wasted bits, {} bits",
        best.kind(),
        best.block_size(),
        wasted_bps,
        best_bits,
    );

    best
}

fn fixed_subframe(
    samples: &[i64],
    order: usize,
    wasted_bps: u32,
    options: &ResidualOptions,
) -> Option<Subframe> {
    let residuals = predictor::fixed_residuals(order, samples)?;
    Some(Subframe::Fixed {
        warm_up: samples[0..order].iter().copied().collect(),
        residuals: Residuals::encode(&residuals, samples.len(), order, options)?,
        wasted_bps,
    })
}

fn lpc_subframes(
    samples: &[i64],
    effective_bps: u32,
    wasted_bps: u32,
    options: &EncodingOptions,
    residual_options: &ResidualOptions,
    mut consider: impl FnMut(Subframe),
) {
    let max_order = options
        .max_lpc_order
        .min(MAX_LPC_ORDER)
        .min(samples.len() - 1);

    let windowed = predictor::tukey_window(samples.len(), 0.5)
        .into_iter()
        .zip(samples)
        .map(|(w, s)| w * *s as f64)
        .collect::<Vec<_>>();

    let lp = predictor::lp_coefficients(&predictor::autocorrelation(&windowed, max_order));
    if lp.max_order() == 0 {
        return;
    }

    let precision = options
        .qlp_precision
        .unwrap_or_else(|| predictor::qlp_precision(effective_bps, samples.len()));

    let orders = match options.exhaustive_model_search {
        true => 1..=lp.max_order(),
        false => {
            let order = predictor::estimate_order(&lp.errors, samples.len(), effective_bps + 5);
            order..=order
        }
    };

    for order in orders {
        let quantized = predictor::quantize(lp.order(order), precision);
        let Some(residuals) = predictor::residuals(&quantized.widened(), quantized.shift, samples)
        else {
            continue;
        };
        let Some(residuals) = Residuals::encode(&residuals, samples.len(), order, residual_options)
        else {
            continue;
        };

        consider(Subframe::Lpc {
            warm_up: samples[0..order].iter().copied().collect(),
            parameters: LpcParameters {
                precision,
                shift: quantized.shift,
                coefficients: quantized.coefficients,
            },
            residuals,
            wasted_bps,
        });
    }
}

impl Subframe {
    /// Reads subframe of the given block size
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveWastedBits`] if wasted bits
    /// consume every bit of the sample, or a structural error
    /// if the subframe is otherwise invalid.
    pub fn read(
        r: &mut BitReader<'_, BigEndian>,
        block_size: usize,
        bits_per_sample: u32,
    ) -> Result<Self, Error> {
        let header = SubframeHeader::read(r)?;
        let wasted_bps = header.wasted_bps;
        let effective_bps = match bits_per_sample.checked_sub(wasted_bps) {
            Some(bps @ 1..) => bps,
            _ => return Err(Error::ExcessiveWastedBits),
        };

        fn read_samples<const N: usize>(
            r: &mut BitReader<'_, BigEndian>,
            count: usize,
            bits: u32,
        ) -> Result<ArrayVec<i64, N>, Error> {
            (0..count).map(|_| r.read_signed64(bits)).collect()
        }

        match header.type_ {
            SubframeHeaderType::Constant => Ok(Self::Constant {
                sample: r.read_signed64(effective_bps)?,
                block_size: block_size as u32,
                wasted_bps,
            }),
            SubframeHeaderType::Verbatim => Ok(Self::Verbatim {
                samples: (0..block_size)
                    .map(|_| r.read_signed64(effective_bps))
                    .collect::<Result<_, _>>()?,
                wasted_bps,
            }),
            SubframeHeaderType::Fixed(order) => {
                let order = usize::from(order);
                if order > block_size {
                    return Err(Error::InvalidPartitionOrder);
                }
                Ok(Self::Fixed {
                    warm_up: read_samples(r, order, effective_bps)?,
                    residuals: Residuals::read(r, block_size, order)?,
                    wasted_bps,
                })
            }
            SubframeHeaderType::Lpc(order) => {
                let order = usize::from(order.get());
                if order > block_size {
                    return Err(Error::InvalidPartitionOrder);
                }
                let warm_up = read_samples(r, order, effective_bps)?;
                let precision = match r.read(4)? {
                    0b1111 => return Err(Error::InvalidLpcPrecision),
                    p => p + 1,
                };
                let shift = match r.read_signed(5)? {
                    shift if shift < 0 => return Err(Error::NegativeLpcShift),
                    shift => shift as u32,
                };
                let coefficients = (0..order)
                    .map(|_| r.read_signed(precision))
                    .collect::<Result<_, _>>()?;

                Ok(Self::Lpc {
                    warm_up,
                    parameters: LpcParameters {
                        precision,
                        shift,
                        coefficients,
                    },
                    residuals: Residuals::read(r, block_size, order)?,
                    wasted_bps,
                })
            }
        }
    }

    /// Writes subframe whose channel has the given bits-per-sample
    pub fn write(&self, w: &mut BitWriter<BigEndian>, bits_per_sample: u32) -> Result<(), Error> {
        let header = self.header();
        header.write(w)?;
        let effective_bps = bits_per_sample - header.wasted_bps;

        match self {
            Self::Constant { sample, .. } => w.write_signed64(effective_bps, *sample),
            Self::Verbatim { samples, .. } => samples
                .iter()
                .try_for_each(|s| w.write_signed64(effective_bps, *s)),
            Self::Fixed {
                warm_up, residuals, ..
            } => {
                warm_up
                    .iter()
                    .try_for_each(|s| w.write_signed64(effective_bps, *s))?;
                residuals.write(w)
            }
            Self::Lpc {
                warm_up,
                parameters,
                residuals,
                ..
            } => {
                warm_up
                    .iter()
                    .try_for_each(|s| w.write_signed64(effective_bps, *s))?;
                w.write(4, parameters.precision - 1)?;
                w.write_signed(5, parameters.shift as i32)?;
                parameters
                    .coefficients
                    .iter()
                    .try_for_each(|c| w.write_signed(parameters.precision, *c))?;
                residuals.write(w)
            }
        }
    }

    /// Size of subframe, in bits
    pub fn bits(&self, bits_per_sample: u32) -> u64 {
        let header = self.header();
        let effective_bps = u64::from(bits_per_sample - header.wasted_bps);

        header.bits()
            + match self {
                Self::Constant { .. } => effective_bps,
                Self::Verbatim { samples, .. } => effective_bps * samples.len() as u64,
                Self::Fixed {
                    warm_up, residuals, ..
                } => effective_bps * warm_up.len() as u64 + residuals.bits(),
                Self::Lpc {
                    warm_up,
                    parameters,
                    residuals,
                    ..
                } => {
                    effective_bps * warm_up.len() as u64
                        + 4
                        + 5
                        + u64::from(parameters.precision) * parameters.coefficients.len() as u64
                        + residuals.bits()
                }
            }
    }

    /// Reconstructs subframe's samples
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveResidual`] if predicted samples
    /// fall outside of `bits_per_sample`.
    pub fn decode(&self, bits_per_sample: u32) -> Result<Vec<i64>, Error> {
        let wasted_bps = self.header().wasted_bps;
        let effective_bps = bits_per_sample
            .checked_sub(wasted_bps)
            .filter(|bps| *bps > 0)
            .ok_or(Error::ExcessiveWastedBits)?;

        let mut samples = match self {
            Self::Constant {
                sample, block_size, ..
            } => vec![*sample; *block_size as usize],
            Self::Verbatim { samples, .. } => samples.clone(),
            Self::Fixed {
                warm_up, residuals, ..
            } => predictor::restore(
                predictor::FIXED_COEFFICIENTS[warm_up.len()],
                0,
                effective_bps,
                warm_up,
                residuals.iter(),
            )?,
            Self::Lpc {
                warm_up,
                parameters,
                residuals,
                ..
            } => predictor::restore(
                &parameters
                    .coefficients
                    .iter()
                    .copied()
                    .map(i64::from)
                    .collect::<ArrayVec<i64, MAX_LPC_ORDER>>(),
                parameters.shift,
                effective_bps,
                warm_up,
                residuals.iter(),
            )?,
        };

        if wasted_bps > 0 {
            samples.iter_mut().for_each(|s| *s <<= wasted_bps);
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::CompressionLevel;
    use std::num::NonZero;

    fn streaminfo(channels: u8, bits_per_sample: u32) -> Streaminfo {
        Streaminfo {
            minimum_block_size: 4096,
            maximum_block_size: 4096,
            minimum_frame_size: None,
            maximum_frame_size: None,
            sample_rate: 44100,
            channels: NonZero::new(channels).unwrap(),
            bits_per_sample,
            total_samples: None,
            md5: None,
        }
    }

    fn roundtrip(block: &SampleBlock, options: &EncodingOptions) -> Frame {
        let frame = Frame::encode(block, FrameNumber(3), 44100, options).unwrap();

        let mut bytes = Vec::new();
        let size = frame.write(&mut bytes).unwrap();
        assert_eq!(size, bytes.len());

        let mut r = BitReader::endian(&bytes, BigEndian);
        let read = Frame::read(
            &mut r,
            &streaminfo(block.channel_count() as u8, block.bits_per_sample()),
        )
        .unwrap();
        assert_eq!(r.remaining_bits(), 0);
        assert_eq!(read, frame);
        assert_eq!(&read.decode().unwrap(), block);
        frame
    }

    fn sine(len: usize, bits_per_sample: u32, step: f64) -> Vec<i32> {
        let amplitude = ((1i64 << (bits_per_sample - 1)) - 1) as f64 * 0.8;
        (0..len)
            .map(|i| ((i as f64 * step).sin() * amplitude) as i32)
            .collect()
    }

    #[test]
    fn test_constant() {
        let block = SampleBlock::from_channels(&[vec![0; 4096], vec![-7; 4096]], 16).unwrap();
        let frame = roundtrip(&block, &EncodingOptions::default());
        assert!(
            frame
                .subframes
                .iter()
                .all(|s| matches!(s, Subframe::Constant { .. }))
        );
    }

    #[test]
    fn test_short_sequences() {
        for samples in [
            vec![-32768],
            vec![-32768, 32767],
            vec![-25, 0, 25, 50, 100],
            vec![0, 1, 0, -1, 0, 1, 0, -1],
        ] {
            for level in 0..=8 {
                let options = EncodingOptions::level(CompressionLevel::new(level).unwrap());
                roundtrip(
                    &SampleBlock::from_channels(&[samples.as_slice()], 16).unwrap(),
                    &options,
                );
                roundtrip(
                    &SampleBlock::from_channels(&[samples.as_slice(), samples.as_slice()], 16)
                        .unwrap(),
                    &options,
                );
            }
        }
    }

    #[test]
    fn test_sine_uses_prediction() {
        let block = SampleBlock::from_channels(&[sine(4096, 16, 0.01)], 16).unwrap();
        let frame = roundtrip(&block, &EncodingOptions::default());
        assert!(matches!(
            frame.subframes[0],
            Subframe::Fixed { .. } | Subframe::Lpc { .. }
        ));

        let mut bytes = Vec::new();
        // far smaller than 16 bits per sample
        assert!(frame.write(&mut bytes).unwrap() < 4096);
    }

    #[test]
    fn test_wasted_bits() {
        let samples = sine(1000, 16, 0.3)
            .into_iter()
            .map(|s| (s >> 3) << 3)
            .collect::<Vec<_>>();
        let block = SampleBlock::from_channels(&[samples], 16).unwrap();
        let frame = roundtrip(&block, &EncodingOptions::default());
        assert_eq!(frame.subframes[0].header().wasted_bps, 3);
    }

    #[test]
    fn test_stereo_modes() {
        let left = sine(4096, 16, 0.02);
        let right = left.iter().map(|s| s / 2 + 3).collect::<Vec<_>>();
        let block = SampleBlock::from_channels(&[left, right], 16).unwrap();

        for stereo in [
            StereoMode::Independent,
            StereoMode::Adaptive,
            StereoMode::Exhaustive,
        ] {
            let frame = roundtrip(&block, &EncodingOptions::default().stereo(stereo));
            if stereo == StereoMode::Independent {
                assert_eq!(
                    frame.header.channel_assignment,
                    ChannelAssignment::Independent(2)
                );
            }
        }

        // identical channels have an all-zero side channel
        let samples = sine(1024, 16, 0.05);
        let block = SampleBlock::from_channels(&[samples.clone(), samples], 16).unwrap();
        let frame = roundtrip(
            &block,
            &EncodingOptions::default().stereo(StereoMode::Exhaustive),
        );
        assert_ne!(
            frame.header.channel_assignment,
            ChannelAssignment::Independent(2)
        );
        assert!(frame.subframes.iter().any(|s| matches!(
            s,
            Subframe::Constant { sample: 0, .. }
        )));
    }

    #[test]
    fn test_full_scale_32_bit() {
        // side channel of full scale 32-bit stereo needs 33 bits
        let left = (0..256)
            .map(|i| if i % 2 == 0 { i32::MAX } else { i32::MIN })
            .collect::<Vec<_>>();
        let right = left.iter().map(|s| !s).collect::<Vec<_>>();
        let block = SampleBlock::from_channels(&[left, right], 32).unwrap();

        for level in [0, 5, 8] {
            roundtrip(
                &block,
                &EncodingOptions::level(CompressionLevel::new(level).unwrap()),
            );
        }
    }

    #[test]
    fn test_noise() {
        let mut rng = fastrand::Rng::with_seed(0xF1AC);
        for bits_per_sample in [8, 16, 24] {
            let range = crate::audio::sample_range(bits_per_sample);
            let channels = (0..3)
                .map(|_| {
                    (0..1152)
                        .map(|_| rng.i64(range.clone()) as i32)
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();
            let block = SampleBlock::from_channels(&channels, bits_per_sample).unwrap();
            roundtrip(&block, &EncodingOptions::default());
        }
    }

    #[test]
    fn test_corrupt_frame() {
        let block = SampleBlock::from_channels(&[sine(1024, 16, 0.1)], 16).unwrap();
        let frame = Frame::encode(&block, FrameNumber(0), 44100, &EncodingOptions::default())
            .unwrap();
        let mut bytes = Vec::new();
        frame.write(&mut bytes).unwrap();

        let last = bytes.len() - 1;
        bytes[last] ^= 0x10;
        assert!(matches!(
            Frame::read(&mut BitReader::endian(&bytes, BigEndian), &streaminfo(1, 16)),
            Err(Error::CorruptFrame)
        ));

        bytes[last] ^= 0x10;
        assert!(matches!(
            Frame::read(&mut BitReader::endian(&bytes, BigEndian), &streaminfo(2, 16)),
            Err(Error::FrameParametersMismatch)
        ));

        assert!(matches!(
            Frame::read(
                &mut BitReader::endian(&bytes[0..last], BigEndian),
                &streaminfo(1, 16)
            ),
            Err(Error::EndOfStream)
        ));
    }

    #[test]
    fn test_block_size_bound() {
        let block = SampleBlock::from_channels(&[sine(2048, 16, 0.1)], 16).unwrap();
        let frame = Frame::encode(&block, FrameNumber(0), 44100, &EncodingOptions::default())
            .unwrap();
        let mut bytes = Vec::new();
        frame.write(&mut bytes).unwrap();

        let mut small = streaminfo(1, 16);
        small.minimum_block_size = 1024;
        small.maximum_block_size = 1024;
        assert!(matches!(
            Frame::read(&mut BitReader::endian(&bytes, BigEndian), &small),
            Err(Error::FrameParametersMismatch)
        ));

        // exactly the maximum is fine
        small.maximum_block_size = 2048;
        assert_eq!(
            Frame::read(&mut BitReader::endian(&bytes, BigEndian), &small).unwrap(),
            frame
        );
    }

    #[test]
    fn test_invalid_subframes() {
        // wasted bits consume whole sample
        let mut w = BitWriter::endian(BigEndian);
        SubframeHeader {
            type_: SubframeHeaderType::Constant,
            wasted_bps: 8,
        }
        .write(&mut w)
        .unwrap();
        let bytes = w.into_bytes().unwrap();
        assert!(matches!(
            Subframe::read(&mut BitReader::endian(&bytes, BigEndian), 16, 8),
            Err(Error::ExcessiveWastedBits)
        ));

        // LPC order 1, warm-up sample 0, precision 0b1111
        let mut w = BitWriter::endian(BigEndian);
        SubframeHeader {
            type_: SubframeHeaderType::Lpc(NonZero::new(1).unwrap()),
            wasted_bps: 0,
        }
        .write(&mut w)
        .unwrap();
        w.write(8, 0).unwrap();
        w.write(4, 0b1111).unwrap();
        let bytes = w.into_bytes().unwrap();
        assert!(matches!(
            Subframe::read(&mut BitReader::endian(&bytes, BigEndian), 16, 8),
            Err(Error::InvalidLpcPrecision)
        ));

        // LPC order 1, warm-up sample 0, precision 4, shift -1
        let mut w = BitWriter::endian(BigEndian);
        SubframeHeader {
            type_: SubframeHeaderType::Lpc(NonZero::new(1).unwrap()),
            wasted_bps: 0,
        }
        .write(&mut w)
        .unwrap();
        w.write(8, 0).unwrap();
        w.write(4, 3).unwrap();
        w.write_signed(5, -1).unwrap();
        let bytes = w.into_bytes().unwrap();
        assert!(matches!(
            Subframe::read(&mut BitReader::endian(&bytes, BigEndian), 16, 8),
            Err(Error::NegativeLpcShift)
        ));
    }
}
