// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Partitioned Rice coding of prediction residuals
//!
//! | Bits | Field |
//! |-----:|-------|
//! | 2    | coding method (0 = 4-bit parameters, 1 = 5-bit parameters) |
//! | 4    | partition order |
//! |      | 2ᵖ partitions |
//!
//! Each partition starts with its Rice parameter.
//! A parameter of all 1 bits is an escape code
//! followed by a 5-bit width and that many bits
//! per residual, stored as-is.
//!
//! The first partition holds `(block_size >> order) - predictor_order`
//! residuals and all others hold `block_size >> order`.

use crate::Error;
use crate::bitstream::{BigEndian, BitReader, BitWriter};

/// The largest partition order which may be stored
pub const MAX_PARTITION_ORDER: u32 = 15;

/// The largest Rice parameter of any coding method
pub const MAX_RICE_PARAMETER: u32 = 30;

/// A residual coding method
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CodingMethod {
    /// 4-bit Rice parameters, with 0b1111 as escape
    Rice,
    /// 5-bit Rice parameters, with 0b11111 as escape
    Rice2,
}

impl CodingMethod {
    /// Size of each partition's parameter, in bits
    #[inline]
    pub fn parameter_bits(&self) -> u32 {
        match self {
            Self::Rice => 4,
            Self::Rice2 => 5,
        }
    }

    /// The parameter value reserved for escaped partitions
    #[inline]
    pub fn escape(&self) -> u32 {
        (1 << self.parameter_bits()) - 1
    }

    /// The largest Rice parameter available
    #[inline]
    pub fn max_parameter(&self) -> u32 {
        self.escape() - 1
    }
}

/// A single partition of residuals
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResidualPartition {
    /// Residuals Rice coded with the given parameter
    Rice {
        /// The Rice parameter
        parameter: u32,
        /// The partition's residuals
        residuals: Vec<i32>,
    },
    /// Residuals stored as signed values of the given width
    Escaped {
        /// Bits per residual, where 0 means all residuals are 0
        bits: u32,
        /// The partition's residuals
        residuals: Vec<i32>,
    },
}

impl ResidualPartition {
    /// The partition's residuals
    pub fn residuals(&self) -> &[i32] {
        match self {
            Self::Rice { residuals, .. } | Self::Escaped { residuals, .. } => residuals,
        }
    }

    /// Size of the partition, in bits, including its parameter
    pub fn bits(&self, method: CodingMethod) -> u64 {
        u64::from(method.parameter_bits())
            + match self {
                Self::Rice {
                    parameter,
                    residuals,
                } => rice_bits(residuals, *parameter),
                Self::Escaped { bits, residuals } => 5 + u64::from(*bits) * residuals.len() as u64,
            }
    }

    fn read(
        r: &mut BitReader<'_, BigEndian>,
        method: CodingMethod,
        len: usize,
    ) -> Result<Self, Error> {
        match r.read(method.parameter_bits())? {
            escape if escape == method.escape() => {
                let bits = r.read(5)?;
                Ok(Self::Escaped {
                    bits,
                    residuals: match bits {
                        0 => vec![0; len],
                        bits => (0..len)
                            .map(|_| r.read_signed(bits))
                            .collect::<Result<_, _>>()?,
                    },
                })
            }
            parameter => Ok(Self::Rice {
                parameter,
                residuals: (0..len)
                    .map(|_| {
                        let msb = u64::from(r.unary(true)?);
                        let lsb = r.read64(parameter)?;
                        unzigzag((msb << parameter) | lsb)
                    })
                    .collect::<Result<_, _>>()?,
            }),
        }
    }

    fn write(&self, w: &mut BitWriter<BigEndian>, method: CodingMethod) -> Result<(), Error> {
        match self {
            Self::Rice {
                parameter,
                residuals,
            } => {
                w.write(method.parameter_bits(), *parameter)?;
                let mask = (1u64 << parameter) - 1;
                residuals.iter().try_for_each(|residual| {
                    let unsigned = zigzag(*residual);
                    let msb = u32::try_from(unsigned >> parameter)
                        .map_err(|_| Error::ExcessiveResidual)?;
                    w.unary(true, msb)?;
                    w.write64(*parameter, unsigned & mask)
                })
            }
            Self::Escaped { bits, residuals } => {
                w.write(method.parameter_bits(), method.escape())?;
                w.write(5, *bits)?;
                match bits {
                    0 => Ok(()),
                    bits => residuals
                        .iter()
                        .try_for_each(|residual| w.write_signed(*bits, *residual)),
                }
            }
        }
    }
}

/// Maps signed residuals onto unsigned values: 0, -1, 1, -2, 2, ...
#[inline]
fn zigzag(residual: i32) -> u64 {
    let residual = i64::from(residual);
    ((residual << 1) ^ (residual >> 63)) as u64
}

#[inline]
fn unzigzag(unsigned: u64) -> Result<i32, Error> {
    let signed = ((unsigned >> 1) as i64) ^ -((unsigned & 1) as i64);
    i32::try_from(signed).map_err(|_| Error::ExcessiveResidual)
}

/// Exact size of residuals Rice coded with the given parameter
fn rice_bits(residuals: &[i32], parameter: u32) -> u64 {
    residuals
        .iter()
        .map(|r| 1 + u64::from(parameter) + (zigzag(*r) >> parameter))
        .sum()
}

/// Bits needed to store every residual as a signed value
///
/// Returns 0 if all residuals are 0.
fn escape_bits(residuals: &[i32]) -> u32 {
    residuals
        .iter()
        .map(|r| match *r {
            0 => 0,
            r if r > 0 => 33 - r.leading_zeros(),
            r => 33 - (!r).leading_zeros(),
        })
        .max()
        .unwrap_or(0)
}

/// Options for encoding residuals
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResidualOptions {
    /// Smallest partition order to try
    pub min_partition_order: u32,
    /// Largest partition order to try
    pub max_partition_order: u32,
    /// Whether to search Rice parameters by exact size
    /// instead of estimating them
    pub exhaustive: bool,
}

impl Default for ResidualOptions {
    fn default() -> Self {
        Self {
            min_partition_order: 0,
            max_partition_order: 5,
            exhaustive: false,
        }
    }
}

/// Partitioned residuals of a fixed or LPC subframe
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Residuals {
    /// How partition parameters are stored
    pub method: CodingMethod,
    /// Base-2 log of the partition count
    pub partition_order: u32,
    /// The partitions themselves
    pub partitions: Vec<ResidualPartition>,
}

impl Residuals {
    /// Whether the given partition order fits a block
    ///
    /// The block size must be evenly divisible by the partition count
    /// and the first partition must not be empty.
    pub fn valid_partition_order(order: u32, block_size: usize, predictor_order: usize) -> bool {
        order <= MAX_PARTITION_ORDER
            && block_size % (1 << order) == 0
            && (block_size >> order) > predictor_order
    }

    /// Encodes residuals with the cheapest partition order and parameters
    ///
    /// Returns `None` if no partition order within the options
    /// fits the block.
    pub fn encode(
        residuals: &[i32],
        block_size: usize,
        predictor_order: usize,
        options: &ResidualOptions,
    ) -> Option<Self> {
        debug_assert_eq!(residuals.len() + predictor_order, block_size);

        (options.min_partition_order..=options.max_partition_order.min(MAX_PARTITION_ORDER))
            .filter(|order| Self::valid_partition_order(*order, block_size, predictor_order))
            .map(|order| Self::encode_partitioned(residuals, block_size, predictor_order, order, options))
            .min_by_key(|residuals| residuals.bits())
    }

    fn encode_partitioned(
        residuals: &[i32],
        block_size: usize,
        predictor_order: usize,
        partition_order: u32,
        options: &ResidualOptions,
    ) -> Self {
        let partition_len = block_size >> partition_order;

        let mut partitions = Vec::with_capacity(1 << partition_order);
        let (first, rest) = residuals.split_at(partition_len - predictor_order);
        partitions.push(encode_partition(first, options.exhaustive));
        partitions.extend(
            rest.chunks(partition_len)
                .map(|chunk| encode_partition(chunk, options.exhaustive)),
        );

        Self {
            method: match partitions.iter().any(|p| {
                matches!(p, ResidualPartition::Rice { parameter, .. }
                         if *parameter > CodingMethod::Rice.max_parameter())
            }) {
                true => CodingMethod::Rice2,
                false => CodingMethod::Rice,
            },
            partition_order,
            partitions,
        }
    }

    /// Total number of residuals
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.residuals().len()).sum()
    }

    /// Whether there are no residuals at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all residuals, in order
    pub fn iter(&self) -> impl Iterator<Item = i32> {
        self.partitions
            .iter()
            .flat_map(|p| p.residuals().iter().copied())
    }

    /// Size of the residual block, in bits
    pub fn bits(&self) -> u64 {
        2 + 4
            + self
                .partitions
                .iter()
                .map(|p| p.bits(self.method))
                .sum::<u64>()
    }

    /// Reads residuals for a subframe
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCodingMethod`] for reserved methods,
    /// or [`Error::InvalidPartitionOrder`] if the partition order
    /// doesn't fit the block.
    pub fn read(
        r: &mut BitReader<'_, BigEndian>,
        block_size: usize,
        predictor_order: usize,
    ) -> Result<Self, Error> {
        let method = match r.read(2)? {
            0 => CodingMethod::Rice,
            1 => CodingMethod::Rice2,
            _ => return Err(Error::InvalidCodingMethod),
        };

        let partition_order = r.read(4)?;
        if block_size % (1 << partition_order) != 0 {
            return Err(Error::InvalidPartitionOrder);
        }
        let partition_len = block_size >> partition_order;
        let first_len = partition_len
            .checked_sub(predictor_order)
            .ok_or(Error::InvalidPartitionOrder)?;

        let mut partitions = Vec::with_capacity(1 << partition_order);
        partitions.push(ResidualPartition::read(r, method, first_len)?);
        for _ in 1..(1 << partition_order) {
            partitions.push(ResidualPartition::read(r, method, partition_len)?);
        }

        Ok(Self {
            method,
            partition_order,
            partitions,
        })
    }

    /// Writes residuals for a subframe
    pub fn write(&self, w: &mut BitWriter<BigEndian>) -> Result<(), Error> {
        w.write(
            2,
            match self.method {
                CodingMethod::Rice => 0,
                CodingMethod::Rice2 => 1,
            },
        )?;
        w.write(4, self.partition_order)?;
        self.partitions
            .iter()
            .try_for_each(|p| p.write(w, self.method))
    }
}

/// Encodes a single partition with its cheapest representation
fn encode_partition(residuals: &[i32], exhaustive: bool) -> ResidualPartition {
    let parameter = match exhaustive {
        true => (0..=MAX_RICE_PARAMETER)
            .min_by_key(|parameter| rice_bits(residuals, *parameter))
            .unwrap_or(0),
        false => estimate_parameter(residuals),
    };

    let rice_size = rice_bits(residuals, parameter);

    match escape_bits(residuals) {
        // escape widths are limited to 5 bits
        bits if bits < 32 && 5 + u64::from(bits) * residuals.len() as u64 <= rice_size => {
            ResidualPartition::Escaped {
                bits,
                residuals: residuals.to_vec(),
            }
        }
        _ => ResidualPartition::Rice {
            parameter,
            residuals: residuals.to_vec(),
        },
    }
}

/// Estimates Rice parameter from the mean residual magnitude
fn estimate_parameter(residuals: &[i32]) -> u32 {
    let len = residuals.len() as u64;
    let sum = residuals.iter().map(|r| zigzag(*r)).sum::<u64>();

    let mut parameter = 0;
    while parameter < MAX_RICE_PARAMETER && (len << (parameter + 1)) < sum {
        parameter += 1;
    }
    parameter
}
