// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Byte order for PCM samples
//!
//! Samples are stored in 1 to 4 bytes each,
//! depending on their bits-per-sample.

/// Sample byte order
pub trait Endianness {
    /// Whether this is big-endian order
    const BIG_ENDIAN: bool;

    /// Converts unsigned value to bytes in this byte order
    ///
    /// The number of bytes written is the length of `bytes`,
    /// which must be between 1 and 4.
    fn unsigned_to_bytes(value: u32, bytes: &mut [u8]);

    /// Converts bytes in this byte order to an unsigned value
    ///
    /// `bytes` must have a length between 1 and 4.
    fn bytes_to_unsigned(bytes: &[u8]) -> u32;

    /// Converts two's complement sample to bytes in this byte order
    #[inline]
    fn sample_to_bytes(sample: i32, bytes: &mut [u8]) {
        Self::unsigned_to_bytes(sample as u32 & width_mask(bytes.len()), bytes)
    }

    /// Converts bytes in this byte order to a two's complement sample
    #[inline]
    fn bytes_to_sample(bytes: &[u8]) -> i32 {
        let bits = bytes.len() as u32 * 8;
        ((Self::bytes_to_unsigned(bytes) << (32 - bits)) as i32) >> (32 - bits)
    }
}

#[inline]
fn width_mask(bytes: usize) -> u32 {
    debug_assert!((1..=4).contains(&bytes));
    u32::MAX >> (32 - bytes * 8)
}

/// Little-endian byte order
#[derive(Copy, Clone, Debug)]
pub struct LittleEndian;

impl Endianness for LittleEndian {
    const BIG_ENDIAN: bool = false;

    #[inline]
    fn unsigned_to_bytes(value: u32, bytes: &mut [u8]) {
        let len = bytes.len();
        bytes.copy_from_slice(&value.to_le_bytes()[0..len]);
    }

    #[inline]
    fn bytes_to_unsigned(bytes: &[u8]) -> u32 {
        bytes
            .iter()
            .rev()
            .fold(0, |acc, b| (acc << 8) | u32::from(*b))
    }
}

/// Big-endian byte order
#[derive(Copy, Clone, Debug)]
pub struct BigEndian;

impl Endianness for BigEndian {
    const BIG_ENDIAN: bool = true;

    #[inline]
    fn unsigned_to_bytes(value: u32, bytes: &mut [u8]) {
        let len = bytes.len();
        bytes.copy_from_slice(&value.to_be_bytes()[4 - len..]);
    }

    #[inline]
    fn bytes_to_unsigned(bytes: &[u8]) -> u32 {
        bytes.iter().fold(0, |acc, b| (acc << 8) | u32::from(*b))
    }
}

#[cfg(test)]
fn check_widths<E: Endianness>(reference: fn(i64) -> [u8; 8]) {
    for width in 1..=4 {
        let bits = width as u32 * 8;
        let (min, max) = (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1);
        let step = ((max - min) / 40_000).max(1) as usize;

        for sample in (min..=max).step_by(step).chain([max]) {
            let expected = reference(sample);
            let expected = match E::BIG_ENDIAN {
                true => &expected[8 - width..],
                false => &expected[..width],
            };

            let mut buf = [0; 4];
            E::sample_to_bytes(sample as i32, &mut buf[..width]);
            assert_eq!(&buf[..width], expected);
            assert_eq!(E::bytes_to_sample(&buf[..width]), sample as i32);
        }
    }
}

#[test]
fn test_samples_le() {
    check_widths::<LittleEndian>(i64::to_le_bytes)
}

#[test]
fn test_samples_be() {
    check_widths::<BigEndian>(i64::to_be_bytes)
}

#[test]
fn test_unsigned() {
    let mut buf = [0; 3];
    LittleEndian::unsigned_to_bytes(0x123456, &mut buf);
    assert_eq!(buf, [0x56, 0x34, 0x12]);
    assert_eq!(LittleEndian::bytes_to_unsigned(&buf), 0x123456);

    BigEndian::unsigned_to_bytes(0x123456, &mut buf);
    assert_eq!(buf, [0x12, 0x34, 0x56]);
    assert_eq!(BigEndian::bytes_to_unsigned(&buf), 0x123456);
}
