// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CRC-8 and CRC-16 checksums used by FLAC frames

/// A running checksum over a stream of bytes
pub trait Checksum: Default {
    /// The checksum's output type
    type Output: Copy + Eq + Into<u32>;

    /// Updates checksum with the given byte
    fn update(&mut self, byte: u8);

    /// Returns our checksum of all bytes so far
    fn checksum(&self) -> Self::Output;

    /// Updates checksum with all the given bytes
    #[inline]
    fn update_all(&mut self, bytes: &[u8]) {
        bytes.iter().for_each(|b| self.update(*b))
    }

    /// Returns checksum of the given bytes
    fn of(bytes: &[u8]) -> Self::Output {
        let mut c = Self::default();
        c.update_all(bytes);
        c.checksum()
    }

    /// Whether the checksum, having consumed its own value
    /// from the end of a stream, is valid
    fn valid(&self) -> bool {
        self.checksum().into() == 0
    }
}

/// CRC-8 with polynomial 0x07, as used by frame headers
#[derive(Copy, Clone, Debug, Default)]
pub struct Crc8(u8);

impl Crc8 {
    const TABLE: [u8; 256] = {
        let mut table = [0; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u8;
            let mut bit = 0;
            while bit < 8 {
                crc = match crc & 0x80 {
                    0 => crc << 1,
                    _ => (crc << 1) ^ 0x07,
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };
}

impl Checksum for Crc8 {
    type Output = u8;

    #[inline]
    fn update(&mut self, byte: u8) {
        self.0 = Self::TABLE[usize::from(self.0 ^ byte)];
    }

    #[inline]
    fn checksum(&self) -> u8 {
        self.0
    }
}

/// CRC-16 with polynomial 0x8005, as used by whole frames
#[derive(Copy, Clone, Debug, Default)]
pub struct Crc16(u16);

impl Crc16 {
    const TABLE: [u16; 256] = {
        let mut table = [0; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u16) << 8;
            let mut bit = 0;
            while bit < 8 {
                crc = match crc & 0x8000 {
                    0 => crc << 1,
                    _ => (crc << 1) ^ 0x8005,
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };
}

impl Checksum for Crc16 {
    type Output = u16;

    #[inline]
    fn update(&mut self, byte: u8) {
        self.0 = (self.0 << 8) ^ Self::TABLE[usize::from((self.0 >> 8) as u8 ^ byte)];
    }

    #[inline]
    fn checksum(&self) -> u16 {
        self.0
    }
}

/// A writer which checksums all bytes written through it
pub struct CrcWriter<W, C> {
    writer: W,
    checksum: C,
    count: usize,
}

impl<W: std::io::Write, C: Checksum> CrcWriter<W, C> {
    /// Wraps writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            checksum: C::default(),
            count: 0,
        }
    }

    /// Checksum of all bytes written so far
    #[inline]
    pub fn checksum(&self) -> C::Output {
        self.checksum.checksum()
    }

    /// Total bytes written so far
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: std::io::Write, C: Checksum> std::io::Write for CrcWriter<W, C> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.checksum.update_all(&buf[0..written]);
        self.count += written;
        Ok(written)
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[test]
fn test_check_values() {
    assert_eq!(Crc8::of(b"123456789"), 0xF4);
    assert_eq!(Crc16::of(b"123456789"), 0xFEE8);
    assert_eq!(Crc8::of(&[]), 0);
}

#[test]
fn test_self_validating() {
    let mut data = b"some frame bytes".to_vec();
    let crc = Crc16::of(&data);
    data.extend(crc.to_be_bytes());

    let mut c = Crc16::default();
    c.update_all(&data);
    assert!(c.valid());

    let mut data = b"header".to_vec();
    data.push(Crc8::of(&data));
    let mut c = Crc8::default();
    c.update_all(&data);
    assert!(c.valid());
}

#[test]
fn test_writer() {
    use std::io::Write;

    let mut w: CrcWriter<_, Crc16> = CrcWriter::new(Vec::new());
    w.write_all(b"1234").unwrap();
    w.write_all(b"56789").unwrap();
    assert_eq!(w.checksum(), 0xFEE8);
    assert_eq!(w.count(), 9);
    assert_eq!(w.into_inner(), b"123456789");
}
