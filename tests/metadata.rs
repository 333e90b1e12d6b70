// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_engine::decode::Decoder;
use flac_engine::encode::{Encoder, EncodingOptions};
use flac_engine::metadata::{
    Application, Block, BlockType, Metadata, Opaque, Padding, read_blocks, write_blocks,
};
use flac_engine::pcm::ChannelMask;
use flac_engine::tags::{SemanticTags, VorbisComment, fields};
use flac_engine::{Error, SampleBlock};
use std::io::Cursor;

fn comment() -> VorbisComment {
    let mut comment = VorbisComment::default();
    comment.tags.insert(fields::TITLE, "Test Title");
    comment.tags.insert(fields::ARTIST, "Someone");
    comment.tags.insert(fields::TRACK_NUMBER, "2/9");
    comment
}

fn encode(options: EncodingOptions) -> Vec<u8> {
    let block = SampleBlock::from_channels(
        &[(0..5000).map(|i| (i % 300) - 150).collect::<Vec<_>>()],
        16,
    )
    .unwrap();

    let mut flac = Cursor::new(Vec::new());
    let mut encoder = Encoder::new(&mut flac, options, 44100, 16, 1, None).unwrap();
    encoder.encode(&block).unwrap();
    encoder.finalize().unwrap();
    flac.into_inner()
}

fn with_metadata() -> Vec<u8> {
    encode(
        EncodingOptions::default()
            .padding(100)
            .unwrap()
            .metadata(Application {
                id: 0x74657374,
                data: b"application data".to_vec(),
            })
            .unwrap()
            .metadata(comment().to_block().unwrap())
            .unwrap()
            .metadata(Opaque {
                block_type: BlockType::Reserved(42),
                data: vec![1, 2, 3, 4],
            })
            .unwrap(),
    )
}

#[test]
fn test_block_roundtrips() {
    use std::io::Read;

    for flac in [encode(EncodingOptions::default()), with_metadata()] {
        let mut data = Cursor::new(flac.as_slice());
        let blocks = read_blocks(data.by_ref())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        let mut output = Vec::new();
        write_blocks(&blocks, &mut output).unwrap();
        std::io::copy(&mut data, &mut output).unwrap();
        assert_eq!(flac, output);
    }
}

#[test]
fn test_block_order() {
    let flac = with_metadata();
    let types = read_blocks(flac.as_slice())
        .map(|b| b.map(|b| b.block_type()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(
        types,
        vec![
            BlockType::Streaminfo,
            BlockType::Padding,
            BlockType::Application,
            BlockType::VorbisComment,
            BlockType::Reserved(42),
        ]
    );
}

fn perform_test(f: impl FnOnce(&mut Vec<Block>)) -> Result<(), Error> {
    let flac = encode(EncodingOptions::default());
    let mut blocks = read_blocks(flac.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    f(&mut blocks);

    write_blocks(&blocks, std::io::sink())
}

#[test]
fn test_write_metadata() {
    assert!(matches!(perform_test(|_| { /* do nothing */ }), Ok(())));

    // STREAMINFO must be present
    assert!(matches!(
        perform_test(|blocks| {
            blocks.remove(0);
        }),
        Err(Error::MissingStreaminfo)
    ));

    // only one STREAMINFO allowed
    assert!(matches!(
        perform_test(|blocks| {
            let streaminfo = blocks[0].clone();
            blocks.push(streaminfo);
        }),
        Err(Error::MultipleStreaminfo)
    ));

    assert!(matches!(
        perform_test(|blocks| {
            blocks.push(comment().to_block().unwrap());
        }),
        Ok(())
    ));

    // STREAMINFO must always be first
    assert!(matches!(
        perform_test(|blocks| {
            blocks.insert(0, comment().to_block().unwrap());
        }),
        Err(Error::MissingStreaminfo)
    ));

    // PADDING too large for its header
    assert!(matches!(
        perform_test(|blocks| {
            blocks.push(Padding { size: 1 << 24 }.into());
        }),
        Err(Error::ExcessiveBlockSize)
    ));
}

#[test]
fn test_read_invalid() {
    let flac = encode(EncodingOptions::default());

    // wrong tag
    let mut bad = flac.clone();
    bad[0] = b'F';
    assert!(matches!(
        read_blocks(bad.as_slice()).next(),
        Some(Err(Error::MissingFlacTag))
    ));
    assert!(matches!(
        Decoder::new(bad.as_slice()),
        Err(Error::MissingFlacTag)
    ));

    // STREAMINFO relabeled as PADDING
    let mut bad = flac.clone();
    bad[4] = (bad[4] & 0x80) | 1;
    assert!(matches!(
        read_blocks(bad.as_slice()).next(),
        Some(Err(Error::MissingStreaminfo))
    ));

    // STREAMINFO with the wrong size
    let mut bad = flac.clone();
    bad[7] = 33;
    assert!(matches!(
        Decoder::new(bad.as_slice()),
        Err(Error::InvalidMetadataBlockSize)
    ));

    // truncated within metadata
    assert!(matches!(
        Decoder::new(&flac[0..20]),
        Err(Error::EndOfStream)
    ));
}

#[test]
fn test_decoder_metadata() {
    let flac = with_metadata();
    let decoder = Decoder::new(flac.as_slice()).unwrap();

    assert_eq!(decoder.total_samples(), Some(5000));
    assert_eq!(decoder.channel_count(), 1);
    assert_eq!(decoder.metadata().len(), 4);
    assert_eq!(
        decoder.metadata()[0],
        Block::Padding(Padding { size: 100 })
    );
    assert_eq!(
        decoder.metadata()[1],
        Block::Application(Application {
            id: 0x74657374,
            data: b"application data".to_vec(),
        })
    );

    let comment = VorbisComment::from_blocks(decoder.metadata())
        .unwrap()
        .unwrap();
    assert_eq!(comment.title(), Some("Test Title"));
    assert_eq!(comment.artist(), Some("Someone"));
    assert_eq!(comment.track_number(), Some(2));
    assert_eq!(comment.track_total(), Some(9));
    assert_eq!(comment.album(), None);
}

#[test]
fn test_channel_mask_tag() {
    let mut comment = VorbisComment::default();
    comment.tags.insert(fields::CHANNEL_MASK, "0x0004");

    let block = SampleBlock::from_channels(&[vec![1, 2, 3, 4]], 16).unwrap();
    let mut flac = Cursor::new(Vec::new());
    let mut encoder = Encoder::new(
        &mut flac,
        EncodingOptions::default()
            .metadata(comment.to_block().unwrap())
            .unwrap(),
        44100,
        16,
        1,
        None,
    )
    .unwrap();
    encoder.encode(&block).unwrap();
    encoder.finalize().unwrap();

    let flac = flac.into_inner();
    let decoder = Decoder::new(flac.as_slice()).unwrap();
    assert_eq!(decoder.channel_mask(), ChannelMask::from(0x4));

    // without a tag, mask follows the channel count
    let flac = encode(EncodingOptions::default());
    let decoder = Decoder::new(flac.as_slice()).unwrap();
    assert_eq!(decoder.channel_mask(), ChannelMask::from_channels(1));
}
