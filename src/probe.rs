// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For identifying and opening audio files by their contents

use crate::Error;
use crate::audio::SampleBlock;
use crate::decode::Decoder;
use crate::metadata::{FLAC_TAG, Metadata};
use crate::pcm::{ChannelMask, PcmReader};
use crate::wave::WaveReader;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Number of leading bytes every probe needs
pub const HEADER_SIZE: usize = 12;

/// A file format identified by probing
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Format {
    /// A FLAC stream
    Flac,
    /// A RIFF WAVE file
    Wave,
    /// No probe matched
    Unknown,
}

/// Tests whether a file's leading bytes are of a given format
pub type Probe = fn(&[u8]) -> bool;

/// Every supported format's probe, in the order they are tried
pub const FORMATS: &[(Format, Probe)] = &[(Format::Flac, is_flac), (Format::Wave, is_wave)];

fn is_flac(header: &[u8]) -> bool {
    header.starts_with(FLAC_TAG)
}

fn is_wave(header: &[u8]) -> bool {
    header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE"
}

/// Identifies format from a file's leading bytes
///
/// # Example
///
/// ```
/// use flac_engine::probe::{Format, probe};
///
/// assert_eq!(probe(b"fLaC\0\0\0\x22"), Format::Flac);
/// assert_eq!(probe(b"RIFF\x24\0\0\0WAVEfmt "), Format::Wave);
/// assert_eq!(probe(b"OggS"), Format::Unknown);
/// ```
pub fn probe(header: &[u8]) -> Format {
    FORMATS
        .iter()
        .find_map(|(format, probe)| probe(header).then_some(*format))
        .unwrap_or(Format::Unknown)
}

/// An opened audio file of any supported format
pub enum AudioFile<R> {
    /// A FLAC file
    Flac(Decoder<R>),
    /// A RIFF WAVE file
    Wave(WaveReader<R>),
}

impl<R: Read + Seek> AudioFile<R> {
    /// Probes stream from its current position and opens it
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFormat`] if no probe matches,
    /// or any error from opening the matched format.
    pub fn new(mut reader: R) -> Result<Self, Error> {
        let start = reader.stream_position()?;
        let mut header = Vec::with_capacity(HEADER_SIZE);
        reader
            .by_ref()
            .take(HEADER_SIZE as u64)
            .read_to_end(&mut header)?;
        reader.seek(SeekFrom::Start(start))?;

        match probe(&header) {
            Format::Flac => Decoder::new(reader).map(Self::Flac),
            Format::Wave => WaveReader::new(reader).map(Self::Wave),
            Format::Unknown => Err(Error::UnknownFormat),
        }
    }

    /// The opened file's format
    pub fn format(&self) -> Format {
        match self {
            Self::Flac(_) => Format::Flac,
            Self::Wave(_) => Format::Wave,
        }
    }
}

/// Opens audio file of any supported format
///
/// # Errors
///
/// Returns any error from opening the file,
/// or from [`AudioFile::new`].
pub fn open<P: AsRef<Path>>(path: P) -> Result<AudioFile<std::io::BufReader<std::fs::File>>, Error> {
    std::fs::File::open(path.as_ref())
        .map(std::io::BufReader::new)
        .map_err(Error::Io)
        .and_then(AudioFile::new)
}

impl<R: Read> Metadata for AudioFile<R> {
    fn channel_count(&self) -> u8 {
        match self {
            Self::Flac(f) => f.channel_count(),
            Self::Wave(w) => w.channel_count(),
        }
    }

    fn channel_mask(&self) -> ChannelMask {
        match self {
            Self::Flac(f) => f.channel_mask(),
            Self::Wave(w) => w.channel_mask(),
        }
    }

    fn sample_rate(&self) -> u32 {
        match self {
            Self::Flac(f) => f.sample_rate(),
            Self::Wave(w) => w.sample_rate(),
        }
    }

    fn bits_per_sample(&self) -> u32 {
        match self {
            Self::Flac(f) => f.bits_per_sample(),
            Self::Wave(w) => w.bits_per_sample(),
        }
    }

    fn total_samples(&self) -> Option<u64> {
        match self {
            Self::Flac(f) => f.total_samples(),
            Self::Wave(w) => w.total_samples(),
        }
    }

    fn md5(&self) -> Option<&[u8; 16]> {
        match self {
            Self::Flac(f) => f.md5(),
            Self::Wave(w) => w.md5(),
        }
    }
}

impl<R: Read> PcmReader for AudioFile<R> {
    fn read(&mut self, bytes: usize) -> Result<SampleBlock, Error> {
        match self {
            Self::Flac(f) => f.read(bytes),
            Self::Wave(w) => w.read(bytes),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::{Encoder, EncodingOptions};
    use crate::wave::WaveWriter;
    use std::io::Cursor;

    fn block() -> SampleBlock {
        SampleBlock::from_channels(
            &[
                (0..1000).map(|i| (i % 50) * 100).collect::<Vec<_>>(),
                (0..1000).map(|i| -(i % 30) * 50).collect::<Vec<_>>(),
            ],
            16,
        )
        .unwrap()
    }

    fn read_all(file: &mut impl PcmReader) -> SampleBlock {
        let mut all =
            SampleBlock::empty(usize::from(file.channel_count()), file.bits_per_sample())
                .unwrap();
        loop {
            let block = file.read(4096).unwrap();
            if block.is_empty() {
                break all;
            }
            all.extend(&block).unwrap();
        }
    }

    #[test]
    fn test_probe_order() {
        assert_eq!(FORMATS[0].0, Format::Flac);
        assert_eq!(probe(b""), Format::Unknown);
        assert_eq!(probe(b"RIFF\0\0\0\0AVI "), Format::Unknown);
        assert_eq!(probe(b"RIFF"), Format::Unknown);
    }

    #[test]
    fn test_open_flac() {
        let mut flac = Cursor::new(Vec::new());
        let mut encoder =
            Encoder::new(&mut flac, EncodingOptions::default(), 48000, 16, 2, None).unwrap();
        encoder.encode(&block()).unwrap();
        encoder.finalize().unwrap();
        flac.set_position(0);

        let mut file = AudioFile::new(flac).unwrap();
        assert_eq!(file.format(), Format::Flac);
        assert_eq!(file.sample_rate(), 48000);
        assert_eq!(file.total_samples(), Some(1000));
        assert!(file.md5().is_some());
        assert_eq!(read_all(&mut file), block());
    }

    #[test]
    fn test_open_wave() {
        let mut wave = WaveWriter::new(Cursor::new(Vec::new()), 8000, 2, 16, None).unwrap();
        wave.encode(&block()).unwrap();
        let mut wave = wave.finalize().unwrap();
        wave.set_position(0);

        let mut file = AudioFile::new(wave).unwrap();
        assert_eq!(file.format(), Format::Wave);
        assert_eq!(file.sample_rate(), 8000);
        assert_eq!(file.md5(), None);
        assert_eq!(read_all(&mut file), block());
    }

    #[test]
    fn test_unknown() {
        assert!(matches!(
            AudioFile::new(Cursor::new(b"ID3\x04\0\0\0\0\0\0\0\0".to_vec())),
            Err(Error::UnknownFormat)
        ));
        assert!(matches!(
            open("/nonexistent/file.flac"),
            Err(Error::Io(_))
        ));
    }
}
