// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling textual metadata tags
//!
//! Each tag format stores fields under its own names.
//! A [`TagMap`] holds a format's raw name/value pairs in order,
//! while the [`SemanticTags`] trait resolves common fields
//! such as track title or track number through a per-format
//! table of [`Field`] names.

use crate::Error;
use crate::metadata::{Block, BlockType, Opaque};
use crate::pcm::ChannelMask;
use bitstream_io::{BitRead, BitWrite, LittleEndian};

/// A single tag value
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TagValue {
    /// A textual value
    Text(String),
    /// A binary value, such as embedded artwork
    Binary(Vec<u8>),
}

impl TagValue {
    /// Returns value as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

/// An ordered map of tag names to one or more values
///
/// Names are matched case-insensitively,
/// but retain their original case.
///
/// # Example
///
/// ```
/// use flac_engine::tags::{TagMap, TagValue};
///
/// let mut tags = TagMap::default();
/// tags.insert("ARTIST", "Artist 1");
/// tags.insert("artist", "Artist 2");
/// tags.insert("TITLE", "Title");
///
/// assert_eq!(tags.get("Artist"), Some(&TagValue::from("Artist 1")));
/// assert_eq!(tags.all("ARTIST").count(), 2);
/// assert_eq!(tags.len(), 3);
///
/// tags.set("ARTIST", "Artist 3");
/// assert_eq!(
///     tags.iter().collect::<Vec<_>>(),
///     vec![
///         ("TITLE", &TagValue::from("Title")),
///         ("ARTIST", &TagValue::from("Artist 3")),
///     ],
/// );
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TagMap {
    entries: Vec<(String, TagValue)>,
}

impl TagMap {
    /// Given a name, returns its first value, if any
    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.all(name).next()
    }

    /// Given a name, iterates over all its values in order
    pub fn all(&self, name: &str) -> impl Iterator<Item = &TagValue> {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Appends another value for the given name
    pub fn insert(&mut self, name: &str, value: impl Into<TagValue>) {
        self.entries.push((name.to_owned(), value.into()));
    }

    /// Replaces every value of the given name with a single value
    pub fn set(&mut self, name: &str, value: impl Into<TagValue>) {
        self.remove(name);
        self.insert(name, value);
    }

    /// Removes every value of the given name, returning them
    pub fn remove(&mut self, name: &str) -> Vec<TagValue> {
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition::<Vec<_>, _>(|(key, _)| key.eq_ignore_ascii_case(name));
        self.entries = kept;
        removed.into_iter().map(|(_, value)| value).collect()
    }

    /// Iterates over every name and value, in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Total number of values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no values
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A common metadata field, independent of tag format
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(missing_docs)]
pub enum Field {
    Title,
    Artist,
    Album,
    Performer,
    Composer,
    Conductor,
    Publisher,
    Catalog,
    Isrc,
    Copyright,
    Media,
    Date,
    Comment,
    TrackNumber,
    TrackTotal,
    AlbumNumber,
    AlbumTotal,
}

/// Accessors for common fields over a format's raw tags
///
/// Implementors supply their raw [`TagMap`] and a table
/// mapping each supported [`Field`] to its name in that format.
pub trait SemanticTags {
    /// Each supported field and its name in this format
    fn field_names(&self) -> &'static [(Field, &'static str)];

    /// The raw tags
    fn tags(&self) -> &TagMap;

    /// The raw tags, mutably
    fn tags_mut(&mut self) -> &mut TagMap;

    /// This format's name for the given field, if supported
    fn field_name(&self, field: Field) -> Option<&'static str> {
        self.field_names()
            .iter()
            .find_map(|(f, name)| (*f == field).then_some(*name))
    }

    /// Returns the field's first textual value
    fn text(&self, field: Field) -> Option<&str> {
        self.field_name(field)
            .and_then(|name| self.tags().get(name))
            .and_then(|value| value.as_text())
    }

    /// Replaces the field's values with the given text
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if the format
    /// has no name for the field.
    fn set_text(&mut self, field: Field, text: &str) -> Result<(), Error> {
        let name = self
            .field_name(field)
            .ok_or(Error::UnsupportedParameter("tag field"))?;
        self.tags_mut().set(name, text);
        Ok(())
    }

    /// Name of current work
    fn title(&self) -> Option<&str> {
        self.text(Field::Title)
    }

    /// Name of the artist responsible for the current work
    fn artist(&self) -> Option<&str> {
        self.text(Field::Artist)
    }

    /// Name of the collection the work belongs to
    fn album(&self) -> Option<&str> {
        self.text(Field::Album)
    }

    /// Release date of work
    fn date(&self) -> Option<&str> {
        self.text(Field::Date)
    }

    /// Generic comment
    fn comment(&self) -> Option<&str> {
        self.text(Field::Comment)
    }

    /// Track number in album
    ///
    /// A value such as `"3/12"` yields 3.
    fn track_number(&self) -> Option<u32> {
        self.text(Field::TrackNumber)
            .and_then(|n| number(n.split('/').next()?))
    }

    /// Total tracks in album
    ///
    /// Falls back to the total in a track number such as `"3/12"`.
    fn track_total(&self) -> Option<u32> {
        self.text(Field::TrackTotal)
            .and_then(number)
            .or_else(|| {
                self.text(Field::TrackNumber)
                    .and_then(|n| number(n.split_once('/')?.1))
            })
    }

    /// Disc number in a multi-disc set
    fn album_number(&self) -> Option<u32> {
        self.text(Field::AlbumNumber)
            .and_then(|n| number(n.split('/').next()?))
    }

    /// Total discs in a multi-disc set
    fn album_total(&self) -> Option<u32> {
        self.text(Field::AlbumTotal)
            .and_then(number)
            .or_else(|| {
                self.text(Field::AlbumNumber)
                    .and_then(|n| number(n.split_once('/')?.1))
            })
    }
}

// leading digits of a value, ignoring surrounding whitespace
fn number(s: &str) -> Option<u32> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find_map(|(i, c)| (!c.is_ascii_digit()).then_some(i))
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Vorbis comment field names
pub mod fields {
    /// Name of current work
    pub const TITLE: &str = "TITLE";

    /// Name of the artist generally responsible for the current work
    pub const ARTIST: &str = "ARTIST";

    /// Name of the collection the current work belongs to
    pub const ALBUM: &str = "ALBUM";

    /// Release date of work
    pub const DATE: &str = "DATE";

    /// Generic comment
    pub const COMMENT: &str = "COMMENT";

    /// Track number in album
    pub const TRACK_NUMBER: &str = "TRACKNUMBER";

    /// Total tracks in album
    pub const TRACK_TOTAL: &str = "TRACKTOTAL";

    /// The channel mask of multi-channel audio streams
    pub const CHANNEL_MASK: &str = "WAVEFORMATEXTENSIBLE_CHANNEL_MASK";
}

const VORBIS_FIELDS: &[(Field, &str)] = &[
    (Field::Title, fields::TITLE),
    (Field::Artist, fields::ARTIST),
    (Field::Album, fields::ALBUM),
    (Field::Performer, "PERFORMER"),
    (Field::Composer, "COMPOSER"),
    (Field::Conductor, "CONDUCTOR"),
    (Field::Publisher, "PUBLISHER"),
    (Field::Catalog, "CATALOG"),
    (Field::Isrc, "ISRC"),
    (Field::Copyright, "COPYRIGHT"),
    (Field::Media, "SOURCE MEDIUM"),
    (Field::Date, fields::DATE),
    (Field::Comment, fields::COMMENT),
    (Field::TrackNumber, fields::TRACK_NUMBER),
    (Field::TrackTotal, fields::TRACK_TOTAL),
    (Field::AlbumNumber, "DISCNUMBER"),
    (Field::AlbumTotal, "DISCTOTAL"),
];

/// A VORBIS_COMMENT metadata block's contents
///
/// | Bits      | Field | Meaning |
/// |----------:|------:|---------|
/// | 32        | vendor string len | length of vendor string, in bytes
/// | `len`×8   | vendor string | vendor string, in UTF-8
/// | 32        | field count | number of vendor string fields
/// | 32        | field₀ len | length of field₀, in bytes
/// | `len`×8   | field₀ value | field₀ value, in UTF-8
/// | ⋮         |  |  |
///
/// Unlike the rest of a FLAC file, the Vorbis comment's
/// length fields are stored in little-endian format.
/// Each field is stored as `NAME=value`.
///
/// # Example
///
/// ```
/// use flac_engine::tags::{SemanticTags, VorbisComment};
///
/// let data: &[u8] = &[
///     0x06, 0x00, 0x00, 0x00,  // 6 byte vendor string
///     0x76, 0x65, 0x6e, 0x64, 0x6f, 0x72,
///     0x02, 0x00, 0x00, 0x00,  // 2 fields
///     0x0d, 0x00, 0x00, 0x00,  // 13 byte field 1
///     0x54, 0x49, 0x54, 0x4c, 0x45, 0x3d, 0x54, 0x65,
///     0x73, 0x74, 0x69, 0x6e, 0x67,
///     0x0d, 0x00, 0x00, 0x00,  // 13 byte field 2
///     0x54, 0x52, 0x41, 0x43, 0x4b, 0x4e, 0x55, 0x4d,
///     0x42, 0x45, 0x52, 0x3d, 0x33,
/// ];
///
/// let comment = VorbisComment::parse(data).unwrap();
/// assert_eq!(comment.vendor, "vendor");
/// assert_eq!(comment.title(), Some("Testing"));
/// assert_eq!(comment.track_number(), Some(3));
/// assert_eq!(comment.artist(), None);
/// assert_eq!(comment.to_bytes().unwrap(), data);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VorbisComment {
    /// The vendor string
    pub vendor: String,
    /// The individual fields
    pub tags: TagMap,
}

impl Default for VorbisComment {
    fn default() -> Self {
        Self {
            vendor: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_owned(),
            tags: TagMap::default(),
        }
    }
}

impl VorbisComment {
    /// Parses the contents of a VORBIS_COMMENT block
    ///
    /// Fields lacking a `=` separator are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMetadataBlockSize`] if a length
    /// runs past the end of the data, or [`Error::Utf8`]
    /// if a string isn't valid UTF-8.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let mut r = bitstream_io::BitReader::endian(data, LittleEndian);
        let mut remaining = data.len();

        let mut read_string = |r: &mut bitstream_io::BitReader<&[u8], LittleEndian>| {
            let size = usize::try_from(r.read_as_to::<LittleEndian, u32>()?)
                .map_err(|_| Error::InvalidMetadataBlockSize)?;
            remaining = remaining
                .checked_sub(4 + size)
                .ok_or(Error::InvalidMetadataBlockSize)?;
            Ok::<_, Error>(String::from_utf8(r.read_to_vec(size)?)?)
        };

        let vendor = read_string(&mut r)?;
        let count = r.read_as_to::<LittleEndian, u32>()?;

        let mut tags = TagMap::default();
        for _ in 0..count {
            if let Some((name, value)) = read_string(&mut r)?.split_once('=') {
                tags.insert(name, value);
            }
        }

        Ok(Self { vendor, tags })
    }

    /// Serializes comment to a VORBIS_COMMENT block's contents
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if any value is binary,
    /// or [`Error::ExcessiveStringLength`] if a string is too long.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        fn write_string<W: BitWrite>(w: &mut W, s: &str) -> Result<(), Error> {
            w.write_as_from::<LittleEndian, u32>(
                s.len()
                    .try_into()
                    .map_err(|_| Error::ExcessiveStringLength)?,
            )?;
            w.write_bytes(s.as_bytes())?;
            Ok(())
        }

        let mut w = bitstream_io::BitWriter::endian(Vec::new(), LittleEndian);
        write_string(&mut w, &self.vendor)?;
        w.write_as_from::<LittleEndian, u32>(
            self.tags
                .len()
                .try_into()
                .map_err(|_| Error::ExcessiveStringLength)?,
        )?;
        for (name, value) in self.tags.iter() {
            match value {
                TagValue::Text(text) => write_string(&mut w, &format!("{name}={text}"))?,
                TagValue::Binary(_) => {
                    return Err(Error::UnsupportedParameter("binary Vorbis comment value"));
                }
            }
        }
        Ok(w.into_writer())
    }

    /// Returns the first VORBIS_COMMENT among the given blocks, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the block is present but invalid.
    pub fn from_blocks<'b>(
        blocks: impl IntoIterator<Item = &'b Block>,
    ) -> Result<Option<Self>, Error> {
        blocks
            .into_iter()
            .find_map(|block| match block {
                Block::Opaque(Opaque {
                    block_type: BlockType::VorbisComment,
                    data,
                }) => Some(data),
                _ => None,
            })
            .map(|data| Self::parse(data))
            .transpose()
    }

    /// Builds VORBIS_COMMENT metadata block
    ///
    /// # Errors
    ///
    /// Returns any error from [`VorbisComment::to_bytes`].
    pub fn to_block(&self) -> Result<Block, Error> {
        Ok(Block::Opaque(Opaque {
            block_type: BlockType::VorbisComment,
            data: self.to_bytes()?,
        }))
    }

    /// Returns channel mask of multi-channel streams, if present
    pub fn channel_mask(&self) -> Option<ChannelMask> {
        self.tags
            .get(fields::CHANNEL_MASK)
            .and_then(|value| value.as_text())
            .and_then(|mask| mask.parse().ok())
    }
}

impl SemanticTags for VorbisComment {
    fn field_names(&self) -> &'static [(Field, &'static str)] {
        VORBIS_FIELDS
    }

    fn tags(&self) -> &TagMap {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut TagMap {
        &mut self.tags
    }
}
