// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bit-granular readers and writers over byte buffers
//!
//! These wrap [`bitstream_io`]'s readers and writers with
//! a contract suited to frame parsing:
//!
//! * reads are bounds-checked against the underlying buffer
//!   and a failed read leaves the reader exactly where it was
//! * unary values may be read with an upper limit
//! * a single bit may be pushed back onto the reader
//!
//! Both bit orders are supported by choosing the
//! [`BigEndian`] or [`LittleEndian`] type parameter.
//!
//! # Example
//!
//! ```
//! use flac_engine::bitstream::{BigEndian, BitReader};
//!
//! let data = [0b1010_1100, 0b0000_0000];
//! let mut r = BitReader::endian(&data, BigEndian);
//! assert_eq!(r.read(3).unwrap(), 0b101);
//! assert_eq!(r.unary(true).unwrap(), 1);     // "01"
//! assert_eq!(r.read_signed(4).unwrap(), -8); // "1000"
//! ```

use crate::Error;
use std::marker::PhantomData;

pub use bitstream_io::{BigEndian, LittleEndian};

/// A bit order our readers and writers can be built with
pub trait BitOrder: bitstream_io::Endianness {
    /// Combines a bit read first with the `rest_bits`-bit value read after it
    fn push_front(bit: bool, rest: u64, rest_bits: u32) -> u64;
}

impl BitOrder for BigEndian {
    #[inline]
    fn push_front(bit: bool, rest: u64, rest_bits: u32) -> u64 {
        (u64::from(bit) << rest_bits) | rest
    }
}

impl BitOrder for LittleEndian {
    #[inline]
    fn push_front(bit: bool, rest: u64, _rest_bits: u32) -> u64 {
        (rest << 1) | u64::from(bit)
    }
}

/// Sign-extends the lowest `bits` bits of `value`
#[inline]
fn sign_extend(value: u64, bits: u32) -> i64 {
    debug_assert!((1..=64).contains(&bits));
    ((value << (64 - bits)) as i64) >> (64 - bits)
}

/// A bit reader over a borrowed byte buffer
#[derive(Clone, Debug)]
pub struct BitReader<'d, E: BitOrder> {
    data: &'d [u8],
    // absolute position in the buffer, in bits
    position: u64,
    // a bit pushed back by `unread`
    pending: Option<bool>,
    phantom: PhantomData<E>,
}

impl<'d, E: BitOrder> BitReader<'d, E> {
    /// Creates reader over the given data in the given bit order
    pub fn endian(data: &'d [u8], _endianness: E) -> Self {
        Self::new(data)
    }

    /// Creates reader over the given data
    pub fn new(data: &'d [u8]) -> Self {
        Self {
            data,
            position: 0,
            pending: None,
            phantom: PhantomData,
        }
    }

    /// The number of bits which remain to be read
    #[inline]
    pub fn remaining_bits(&self) -> u64 {
        (self.data.len() as u64 * 8 - self.position) + u64::from(self.pending.is_some())
    }

    /// Our position in the buffer, in whole bytes
    ///
    /// A pushed-back bit is not counted.
    #[inline]
    pub fn byte_position(&self) -> usize {
        (self.position / 8) as usize
    }

    /// The entire buffer being read
    #[inline]
    pub fn data(&self) -> &'d [u8] {
        self.data
    }

    /// Whether the reader sits on a byte boundary
    #[inline]
    pub fn byte_aligned(&self) -> bool {
        self.pending.is_none() && self.position % 8 == 0
    }

    // a bitstream-io reader positioned at our current bit
    fn cursor(&self) -> Result<bitstream_io::BitReader<&'d [u8], E>, Error> {
        use bitstream_io::BitRead;

        let mut r = bitstream_io::BitReader::new(&self.data[self.byte_position()..]);
        match (self.position % 8) as u32 {
            0 => Ok(r),
            skip => {
                r.skip(skip)?;
                Ok(r)
            }
        }
    }

    // reads bits from the buffer, ignoring any pending bit
    fn read_buffered(&mut self, bits: u32) -> Result<u64, Error> {
        use bitstream_io::BitRead;

        debug_assert!(bits <= 64);

        match bits {
            0 => Ok(0),
            bits if u64::from(bits) > self.data.len() as u64 * 8 - self.position => {
                Err(Error::EndOfStream)
            }
            bits => {
                let value = self.cursor()?.read_var::<u64>(bits)?;
                self.position += u64::from(bits);
                Ok(value)
            }
        }
    }

    /// Reads an unsigned value of up to 64 bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] if insufficient bits remain,
    /// in which case nothing is consumed.
    pub fn read64(&mut self, bits: u32) -> Result<u64, Error> {
        assert!(bits <= 64, "excessive bit count");

        if u64::from(bits) > self.remaining_bits() {
            return Err(Error::EndOfStream);
        }

        match (bits, self.pending.take()) {
            (0, pending) => {
                self.pending = pending;
                Ok(0)
            }
            (bits, Some(bit)) => self
                .read_buffered(bits - 1)
                .map(|rest| E::push_front(bit, rest, bits - 1))
                .inspect_err(|_| self.pending = Some(bit)),
            (bits, None) => self.read_buffered(bits),
        }
    }

    /// Reads an unsigned value of up to 32 bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] if insufficient bits remain,
    /// in which case nothing is consumed.
    #[inline]
    pub fn read(&mut self, bits: u32) -> Result<u32, Error> {
        assert!(bits <= 32, "excessive bit count");
        self.read64(bits).map(|v| v as u32)
    }

    /// Reads a two's complement value of 1 to 64 bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] if insufficient bits remain.
    pub fn read_signed64(&mut self, bits: u32) -> Result<i64, Error> {
        assert!((1..=64).contains(&bits), "invalid signed bit count");
        self.read64(bits).map(|v| sign_extend(v, bits))
    }

    /// Reads a two's complement value of 1 to 32 bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] if insufficient bits remain.
    #[inline]
    pub fn read_signed(&mut self, bits: u32) -> Result<i32, Error> {
        assert!((1..=32).contains(&bits), "invalid signed bit count");
        self.read_signed64(bits).map(|v| v as i32)
    }

    /// Reads a single bit
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool, Error> {
        self.read64(1).map(|b| b == 1)
    }

    /// Counts the bits read until `stop_bit` is encountered
    ///
    /// The stop bit itself is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] if the stop bit never occurs,
    /// in which case nothing is consumed.
    pub fn unary(&mut self, stop_bit: bool) -> Result<u32, Error> {
        use bitstream_io::BitRead;

        let prefix = match self.pending {
            Some(bit) if bit == stop_bit => {
                self.pending = None;
                return Ok(0);
            }
            Some(_) => 1,
            None => 0,
        };

        let mut r = self.cursor()?;
        let count = match stop_bit {
            false => r.read_unary::<0>()?,
            true => r.read_unary::<1>()?,
        };

        self.pending = None;
        self.position += u64::from(count) + 1;
        Ok(count + prefix)
    }

    /// Counts the bits read until `stop_bit` is encountered,
    /// reading no more than `maximum` bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::LimitExceeded`] if no stop bit occurs
    /// within `maximum` bits, or [`Error::EndOfStream`] if the
    /// buffer runs out first.
    /// In either case, nothing is consumed.
    pub fn limited_unary(&mut self, stop_bit: bool, maximum: u32) -> Result<u32, Error> {
        let (position, pending) = (self.position, self.pending);

        let mut count = 0;
        let result = loop {
            if count == maximum {
                break Err(Error::LimitExceeded);
            }
            match self.read_bit() {
                Ok(bit) if bit == stop_bit => break Ok(count),
                Ok(_) => count += 1,
                Err(err) => break Err(err),
            }
        };

        if result.is_err() {
            self.position = position;
            self.pending = pending;
        }
        result
    }

    /// Pushes a single bit back onto the stream to be read next
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveUnread`] if a bit is already pending.
    pub fn unread(&mut self, bit: bool) -> Result<(), Error> {
        match self.pending {
            Some(_) => Err(Error::ExcessiveUnread),
            None => {
                self.pending = Some(bit);
                Ok(())
            }
        }
    }

    /// Skips the given number of bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] if insufficient bits remain.
    pub fn skip(&mut self, bits: u64) -> Result<(), Error> {
        if bits > self.remaining_bits() {
            return Err(Error::EndOfStream);
        }
        match (bits, self.pending.take()) {
            (0, pending) => self.pending = pending,
            (bits, Some(_)) => self.position += bits - 1,
            (bits, None) => self.position += bits,
        }
        Ok(())
    }

    /// Discards any bits remaining in the current byte
    pub fn byte_align(&mut self) {
        self.pending = None;
        self.position = self.position.next_multiple_of(8);
    }

    /// Fills the buffer with bytes from the stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] if insufficient bytes remain.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() as u64 * 8 > self.remaining_bits() {
            return Err(Error::EndOfStream);
        }

        if self.byte_aligned() {
            let start = self.byte_position();
            buf.copy_from_slice(&self.data[start..start + buf.len()]);
            self.position += buf.len() as u64 * 8;
        } else {
            for b in buf.iter_mut() {
                *b = self.read(8)? as u8;
            }
        }
        Ok(())
    }
}

/// A bit writer which accumulates its output in memory
pub struct BitWriter<E: BitOrder> {
    writer: bitstream_io::BitWriter<Vec<u8>, E>,
    written: u64,
}

impl<E: BitOrder> Default for BitWriter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BitOrder> BitWriter<E> {
    /// Creates empty writer in the given bit order
    pub fn endian(_endianness: E) -> Self {
        Self::new()
    }

    /// Creates empty writer
    pub fn new() -> Self {
        Self {
            writer: bitstream_io::BitWriter::new(Vec::new()),
            written: 0,
        }
    }

    /// Total number of bits written so far
    #[inline]
    pub fn bits_written(&self) -> u64 {
        self.written
    }

    /// Whether the writer sits on a byte boundary
    #[inline]
    pub fn byte_aligned(&self) -> bool {
        self.written % 8 == 0
    }

    /// Writes an unsigned value of up to 64 bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveValue`] if the value doesn't fit.
    pub fn write64(&mut self, bits: u32, value: u64) -> Result<(), Error> {
        use bitstream_io::BitWrite;

        assert!(bits <= 64, "excessive bit count");

        match bits {
            0 if value == 0 => Ok(()),
            0 => Err(Error::ExcessiveValue),
            64 => {
                self.writer.write_var::<u64>(64, value)?;
                self.written += 64;
                Ok(())
            }
            bits if value >> bits != 0 => Err(Error::ExcessiveValue),
            bits => {
                self.writer.write_var::<u64>(bits, value)?;
                self.written += u64::from(bits);
                Ok(())
            }
        }
    }

    /// Writes an unsigned value of up to 32 bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveValue`] if the value doesn't fit.
    #[inline]
    pub fn write(&mut self, bits: u32, value: u32) -> Result<(), Error> {
        assert!(bits <= 32, "excessive bit count");
        self.write64(bits, value.into())
    }

    /// Writes a two's complement value of 1 to 64 bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveValue`] if the value doesn't fit.
    pub fn write_signed64(&mut self, bits: u32, value: i64) -> Result<(), Error> {
        assert!((1..=64).contains(&bits), "invalid signed bit count");

        if bits < 64 && !(-(1i64 << (bits - 1))..(1i64 << (bits - 1))).contains(&value) {
            return Err(Error::ExcessiveValue);
        }

        let mask = match bits {
            64 => u64::MAX,
            bits => (1 << bits) - 1,
        };
        self.write64(bits, (value as u64) & mask)
    }

    /// Writes a two's complement value of 1 to 32 bits
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExcessiveValue`] if the value doesn't fit.
    #[inline]
    pub fn write_signed(&mut self, bits: u32, value: i32) -> Result<(), Error> {
        assert!((1..=32).contains(&bits), "invalid signed bit count");
        self.write_signed64(bits, value.into())
    }

    /// Writes a single bit
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<(), Error> {
        self.write64(1, u64::from(bit))
    }

    /// Writes `value` bits which are not `stop_bit`, followed by `stop_bit`
    pub fn unary(&mut self, stop_bit: bool, value: u32) -> Result<(), Error> {
        use bitstream_io::BitWrite;

        match stop_bit {
            false => self.writer.write_unary::<0>(value)?,
            true => self.writer.write_unary::<1>(value)?,
        }
        self.written += u64::from(value) + 1;
        Ok(())
    }

    /// Writes whole bytes to the stream
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        use bitstream_io::BitWrite;

        self.writer.write_bytes(bytes)?;
        self.written += bytes.len() as u64 * 8;
        Ok(())
    }

    /// Pads the stream with 0 bits to the next byte boundary
    pub fn byte_align(&mut self) -> Result<(), Error> {
        use bitstream_io::BitWrite;

        self.writer.byte_align()?;
        self.written = self.written.next_multiple_of(8);
        Ok(())
    }

    /// Pads the stream to a byte boundary and returns its bytes
    pub fn into_bytes(mut self) -> Result<Vec<u8>, Error> {
        self.byte_align()?;
        Ok(self.writer.into_writer())
    }
}
