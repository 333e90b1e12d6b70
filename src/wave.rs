// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For reading and writing RIFF WAVE files of integer PCM samples
//!
//! Samples of 8 bits are stored unsigned and larger samples signed,
//! all little-endian in whole bytes.
//! Samples whose bits-per-sample aren't a multiple of 8 are stored
//! left-justified in the next larger byte width, which requires
//! a `WAVE_FORMAT_EXTENSIBLE` `fmt ` chunk.

use crate::Error;
use crate::audio::SampleBlock;
use crate::metadata::Metadata;
use crate::pcm::{ChannelMask, PcmReader, PcmWriter};
use bitstream_io::{BitRead, BitWrite, LittleEndian};
use std::io::{Read, Seek, SeekFrom, Write};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

// largest fmt chunk we'll accept
const MAX_FMT_SIZE: u32 = 256;

// KSDATAFORMAT_SUBTYPE_PCM
const SUBTYPE_PCM: [u8; 16] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

/// The contents of a `fmt ` chunk
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Format {
    channels: u8,
    sample_rate: u32,
    bits_per_sample: u32,
    container_bits: u32,
    channel_mask: ChannelMask,
}

impl Format {
    fn new(
        channels: u8,
        sample_rate: u32,
        bits_per_sample: u32,
        channel_mask: ChannelMask,
    ) -> Result<Self, Error> {
        match (channels, sample_rate, bits_per_sample) {
            (1..=8, 1.., 4..=32) => Ok(Self {
                channels,
                sample_rate,
                bits_per_sample,
                container_bits: bits_per_sample.div_ceil(8) * 8,
                channel_mask,
            }),
            _ => Err(Error::UnsupportedParameter("WAVE format")),
        }
    }

    fn block_align(&self) -> u32 {
        u32::from(self.channels) * self.container_bits / 8
    }

    fn extensible(&self) -> bool {
        self.channels > 2 || self.bits_per_sample != self.container_bits
    }

    fn parse(data: &[u8]) -> Result<Self, Error> {
        let mut r = bitstream_io::BitReader::endian(data, LittleEndian);

        let format_tag = r.read_to::<u16>()?;
        let channels = u8::try_from(r.read_to::<u16>()?).map_err(|_| Error::InvalidWave)?;
        let sample_rate = r.read_to::<u32>()?;
        let _byte_rate = r.read_to::<u32>()?;
        let block_align = r.read_to::<u16>()?;
        let container_bits = u32::from(r.read_to::<u16>()?);

        let (bits_per_sample, channel_mask) = match format_tag {
            WAVE_FORMAT_PCM => (container_bits, ChannelMask::from_channels(channels)),
            WAVE_FORMAT_EXTENSIBLE => {
                if r.read_to::<u16>()? < 22 {
                    return Err(Error::InvalidWave);
                }
                let valid_bits = u32::from(r.read_to::<u16>()?);
                let channel_mask = ChannelMask::from(r.read_to::<u32>()?);
                if r.read_to::<[u8; 16]>()? != SUBTYPE_PCM {
                    return Err(Error::InvalidWave);
                }
                (valid_bits, channel_mask)
            }
            _ => return Err(Error::InvalidWave),
        };

        let format = Self::new(channels, sample_rate, bits_per_sample, channel_mask)
            .map_err(|_| Error::InvalidWave)?;
        if format.container_bits != container_bits || format.block_align() != u32::from(block_align) {
            return Err(Error::InvalidWave);
        }
        Ok(format)
    }

    fn build(&self) -> Result<Vec<u8>, Error> {
        let mut w = bitstream_io::BitWriter::endian(Vec::new(), LittleEndian);

        w.write_from(match self.extensible() {
            true => WAVE_FORMAT_EXTENSIBLE,
            false => WAVE_FORMAT_PCM,
        })?;
        w.write_from(u16::from(self.channels))?;
        w.write_from(self.sample_rate)?;
        w.write_from(self.sample_rate * self.block_align())?;
        w.write_from(self.block_align() as u16)?;
        w.write_from(self.container_bits as u16)?;
        if self.extensible() {
            w.write_from::<u16>(22)?;
            w.write_from(self.bits_per_sample as u16)?;
            w.write_from(u32::from(self.channel_mask))?;
            w.write_bytes(&SUBTYPE_PCM)?;
        }

        Ok(w.into_writer())
    }

    fn to_block(&self, data: &[u8]) -> Result<SampleBlock, Error> {
        let container = SampleBlock::from_bytes(
            data,
            usize::from(self.channels),
            self.container_bits,
            false,
            self.container_bits > 8,
        )?;

        match self.container_bits - self.bits_per_sample {
            0 => Ok(container),
            shift => SampleBlock::from_channels(
                &container
                    .channels()
                    .map(|c| c.iter().map(|s| s >> shift).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
                self.bits_per_sample,
            ),
        }
    }

    fn to_bytes(&self, block: &SampleBlock) -> Result<Vec<u8>, Error> {
        let container = match self.container_bits - self.bits_per_sample {
            0 => block.clone(),
            shift => SampleBlock::from_channels(
                &block
                    .channels()
                    .map(|c| c.iter().map(|s| s << shift).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
                self.container_bits,
            )?,
        };
        Ok(container.to_bytes(false, self.container_bits > 8))
    }
}

/// A RIFF WAVE reader
pub struct WaveReader<R> {
    reader: R,
    format: Format,
    // bytes of sample data remaining
    remaining: u64,
}

impl<R: Read> WaveReader<R> {
    /// Opens WAVE stream and reads up to the start of its samples
    ///
    /// Chunks other than `fmt ` and `data` are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWave`] if the stream isn't
    /// a supported RIFF WAVE file, or any I/O error.
    pub fn new(mut reader: R) -> Result<Self, Error> {
        let (format, remaining) = read_header(reader.by_ref())?;
        Ok(Self {
            reader,
            format,
            remaining,
        })
    }
}

/// Reads RIFF header and chunks up to the start of sample data,
/// returning the stream's format and the data chunk's size
fn read_header<R: Read>(reader: R) -> Result<(Format, u64), Error> {
    let mut r = bitstream_io::BitReader::endian(reader, LittleEndian);
    if &r.read_to::<[u8; 4]>()? != b"RIFF" {
        return Err(Error::InvalidWave);
    }
    let _riff_size = r.read_to::<u32>()?;
    if &r.read_to::<[u8; 4]>()? != b"WAVE" {
        return Err(Error::InvalidWave);
    }

    let mut format = None;
    loop {
        let chunk_id = r.read_to::<[u8; 4]>()?;
        let chunk_size = r.read_to::<u32>()?;
        match &chunk_id {
            b"fmt " if chunk_size <= MAX_FMT_SIZE => {
                let data = r.read_to_vec(chunk_size as usize)?;
                format = Some(Format::parse(&data)?);
            }
            b"fmt " => return Err(Error::InvalidWave),
            b"data" => {
                return format
                    .map(|format| (format, u64::from(chunk_size)))
                    .ok_or(Error::InvalidWave);
            }
            _ => {
                let mut remaining = chunk_size;
                while remaining > 0 {
                    let step = remaining.min(1 << 16);
                    r.skip(step * 8)?;
                    remaining -= step;
                }
            }
        }

        // chunks are padded to an even size
        if chunk_size % 2 == 1 {
            r.read_to::<u8>()?;
        }
    }
}

impl<R> Metadata for WaveReader<R> {
    fn channel_count(&self) -> u8 {
        self.format.channels
    }

    fn channel_mask(&self) -> ChannelMask {
        self.format.channel_mask
    }

    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    fn bits_per_sample(&self) -> u32 {
        self.format.bits_per_sample
    }

    fn total_samples(&self) -> Option<u64> {
        Some(self.remaining / u64::from(self.format.block_align()))
    }
}

impl<R: Read> PcmReader for WaveReader<R> {
    fn read(&mut self, bytes: usize) -> Result<SampleBlock, Error> {
        let block_align = u64::from(self.format.block_align());
        let frames = (self.frames_for(bytes) as u64).min(self.remaining / block_align);

        let mut data = vec![0; (frames * block_align) as usize];
        self.reader.read_exact(&mut data)?;
        self.remaining -= data.len() as u64;

        self.format.to_block(&data)
    }
}

/// A RIFF WAVE writer
///
/// The writer must be finalized to fill in the file's chunk sizes.
///
/// # Example
///
/// ```
/// use flac_engine::{SampleBlock, pcm::PcmReader, wave::{WaveReader, WaveWriter}};
/// use std::io::Cursor;
///
/// let block = SampleBlock::from_channels(&[vec![-8, 0, 7]], 4).unwrap();
///
/// let mut wave = WaveWriter::new(Cursor::new(vec![]), 44100, 1, 4, None).unwrap();
/// wave.encode(&block).unwrap();
/// let wave = wave.finalize().unwrap().into_inner();
///
/// let mut reader = WaveReader::new(wave.as_slice()).unwrap();
/// assert_eq!(reader.read(4096).unwrap(), block);
/// ```
pub struct WaveWriter<W: Write + Seek> {
    writer: W,
    format: Format,
    start: u64,
    header_size: u32,
    data_size: u32,
    finalized: bool,
}

impl<W: Write + Seek> WaveWriter<W> {
    /// Writes WAVE header for the given parameters
    ///
    /// `channel_mask` defaults to the usual assignment
    /// for the channel count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if the parameters
    /// can't be stored, or any I/O error.
    pub fn new(
        mut writer: W,
        sample_rate: u32,
        channels: u8,
        bits_per_sample: u32,
        channel_mask: Option<ChannelMask>,
    ) -> Result<Self, Error> {
        let format = Format::new(
            channels,
            sample_rate,
            bits_per_sample,
            channel_mask.unwrap_or(ChannelMask::from_channels(channels)),
        )?;
        let fmt = format.build()?;

        let start = writer.stream_position()?;
        let mut w = bitstream_io::BitWriter::endian(Vec::new(), LittleEndian);
        w.write_bytes(b"RIFF")?;
        w.write_from::<u32>(0)?;
        w.write_bytes(b"WAVE")?;
        w.write_bytes(b"fmt ")?;
        w.write_from(fmt.len() as u32)?;
        w.write_bytes(&fmt)?;
        w.write_bytes(b"data")?;
        w.write_from::<u32>(0)?;
        let header = w.into_writer();
        writer.write_all(&header)?;

        Ok(Self {
            writer,
            format,
            start,
            header_size: header.len() as u32,
            data_size: 0,
            finalized: false,
        })
    }

    /// Writes block of samples
    ///
    /// # Errors
    ///
    /// Returns an error if the block's parameters don't match
    /// the writer's, if the file would grow beyond 4 GiB,
    /// or any I/O error.
    pub fn encode(&mut self, block: &SampleBlock) -> Result<(), Error> {
        if self.finalized {
            return Err(Error::StreamFinalized);
        } else if block.channel_count() != usize::from(self.format.channels) {
            return Err(Error::ChannelsMismatch);
        } else if block.bits_per_sample() != self.format.bits_per_sample {
            return Err(Error::BitsPerSampleMismatch);
        }

        let bytes = self.format.to_bytes(block)?;
        self.data_size = u32::try_from(bytes.len())
            .ok()
            .and_then(|len| self.data_size.checked_add(len))
            .filter(|size| size.checked_add(self.header_size + 1).is_some())
            .ok_or(Error::ExcessiveValue)?;
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    fn finalize_inner(&mut self) -> Result<(), Error> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let padding = self.data_size % 2;
        if padding == 1 {
            self.writer.write_all(&[0])?;
        }

        let end = self.writer.stream_position()?;

        // RIFF size excludes its own 8 byte chunk header
        self.writer.seek(SeekFrom::Start(self.start + 4))?;
        self.writer
            .write_all(&(self.header_size - 8 + self.data_size + padding).to_le_bytes())?;

        self.writer
            .seek(SeekFrom::Start(self.start + u64::from(self.header_size) - 4))?;
        self.writer.write_all(&self.data_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        Ok(())
    }

    /// Fills in chunk sizes, returning the inner writer
    ///
    /// # Errors
    ///
    /// Returns any I/O error.
    pub fn finalize(mut self) -> Result<W, Error> {
        self.finalize_inner()?;
        Ok(self.writer)
    }
}

impl<W: Write + Seek> PcmWriter for WaveWriter<W> {
    fn write(&mut self, block: &SampleBlock) -> Result<(), Error> {
        self.encode(block)
    }

    fn close(&mut self) -> Result<(), Error> {
        self.finalize_inner()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn write(block: &SampleBlock, channel_mask: Option<ChannelMask>) -> Vec<u8> {
        let mut wave = WaveWriter::new(
            Cursor::new(Vec::new()),
            44100,
            block.channel_count() as u8,
            block.bits_per_sample(),
            channel_mask,
        )
        .unwrap();
        wave.encode(block).unwrap();
        wave.finalize().unwrap().into_inner()
    }

    #[test]
    fn test_pcm_header() {
        let block = SampleBlock::from_channels(&[vec![1, -1], vec![2, -2]], 16).unwrap();
        let wave = write(&block, None);

        assert_eq!(
            wave,
            [
                b'R', b'I', b'F', b'F', 44, 0, 0, 0, b'W', b'A', b'V', b'E', // RIFF
                b'f', b'm', b't', b' ', 16, 0, 0, 0, // fmt header
                1, 0, 2, 0, // PCM, 2 channels
                0x44, 0xAC, 0, 0, // 44100 Hz
                0x10, 0xB1, 0x02, 0, // 176400 bytes per second
                4, 0, 16, 0, // block align, bits per sample
                b'd', b'a', b't', b'a', 8, 0, 0, 0, // data header
                1, 0, 2, 0, 0xFF, 0xFF, 0xFE, 0xFF, // samples
            ]
        );
    }

    #[test]
    fn test_unsigned_8_bit() {
        let block = SampleBlock::from_channels(&[vec![-128, 0, 127]], 8).unwrap();
        let wave = write(&block, None);

        // 3 samples plus 1 byte of padding
        assert_eq!(&wave[44..], &[0x00, 0x80, 0xFF, 0x00]);
        assert_eq!(&wave[4..8], &(36u32 + 4).to_le_bytes());
        assert_eq!(&wave[40..44], &3u32.to_le_bytes());

        let mut reader = WaveReader::new(wave.as_slice()).unwrap();
        assert_eq!(reader.total_samples(), Some(3));
        assert_eq!(reader.read(4096).unwrap(), block);
        assert!(reader.read(4096).unwrap().is_empty());
    }

    #[test]
    fn test_extensible() {
        let mut rng = fastrand::Rng::with_seed(20);
        let channels = (0..6)
            .map(|_| (0..100).map(|_| rng.i32(-(1 << 19)..1 << 19)).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let block = SampleBlock::from_channels(&channels, 20).unwrap();
        let mask = ChannelMask::from(0x3F);
        let wave = write(&block, Some(mask));

        // WAVE_FORMAT_EXTENSIBLE with a 40 byte fmt chunk
        assert_eq!(&wave[16..22], &[40, 0, 0, 0, 0xFE, 0xFF]);

        let mut reader = WaveReader::new(wave.as_slice()).unwrap();
        assert_eq!(reader.channel_count(), 6);
        assert_eq!(reader.bits_per_sample(), 20);
        assert_eq!(reader.channel_mask(), mask);

        // read in several pieces
        let mut read = SampleBlock::empty(6, 20).unwrap();
        loop {
            let next = reader.read(18 * 7).unwrap();
            if next.is_empty() {
                break;
            }
            read.extend(&next).unwrap();
        }
        assert_eq!(read, block);
    }

    #[test]
    fn test_skipped_chunks() {
        let block = SampleBlock::from_channels(&[vec![5, 6, 7]], 16).unwrap();
        let wave = write(&block, None);

        // an odd-sized chunk between fmt and data
        let mut with_chunk = wave[..36].to_vec();
        with_chunk.extend_from_slice(b"LIST");
        with_chunk.extend_from_slice(&3u32.to_le_bytes());
        with_chunk.extend_from_slice(&[1, 2, 3, 0]);
        with_chunk.extend_from_slice(&wave[36..]);

        let mut reader = WaveReader::new(with_chunk.as_slice()).unwrap();
        assert_eq!(reader.read(4096).unwrap(), block);
    }

    #[test]
    fn test_invalid_waves() {
        assert!(matches!(
            WaveReader::new(b"RIFX\0\0\0\0WAVE".as_slice()),
            Err(Error::InvalidWave)
        ));

        // data chunk before fmt chunk
        let mut wave = b"RIFF\0\0\0\0WAVE".to_vec();
        wave.extend_from_slice(b"data\0\0\0\0");
        assert!(matches!(
            WaveReader::new(wave.as_slice()),
            Err(Error::InvalidWave)
        ));

        // floating point samples
        let block = SampleBlock::from_channels(&[vec![0]], 32).unwrap();
        let mut wave = write(&block, None);
        wave[20] = 3;
        assert!(matches!(
            WaveReader::new(wave.as_slice()),
            Err(Error::InvalidWave)
        ));

        // truncated header
        assert!(matches!(
            WaveReader::new(b"RIFF\0\0".as_slice()),
            Err(Error::EndOfStream)
        ));

        assert!(WaveWriter::new(Cursor::new(Vec::new()), 44100, 9, 16, None).is_err());
        assert!(WaveWriter::new(Cursor::new(Vec::new()), 0, 2, 16, None).is_err());
    }

    #[test]
    fn test_parameter_mismatch() {
        let mut wave = WaveWriter::new(Cursor::new(Vec::new()), 44100, 2, 16, None).unwrap();
        let block = SampleBlock::from_channels(&[vec![1, 2]], 16).unwrap();
        assert!(matches!(wave.encode(&block), Err(Error::ChannelsMismatch)));
        let block = SampleBlock::from_channels(&[vec![1, 2], vec![3, 4]], 24).unwrap();
        assert!(matches!(
            wave.encode(&block),
            Err(Error::BitsPerSampleMismatch)
        ));
        wave.close().unwrap();
        assert!(matches!(wave.encode(&block), Err(Error::StreamFinalized)));
    }
}
