// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_engine::decode::{Analyzer, DecodeEvent, Decoder, Verified};
use flac_engine::encode::{Encoder, EncodingOptions};
use flac_engine::{Error, SampleBlock};
use std::io::Cursor;

// first frame follows "fLaC" and STREAMINFO when there's no padding
const FIRST_FRAME: usize = 4 + 4 + 34;

fn sine() -> (SampleBlock, Vec<u8>) {
    sine_frames(20000)
}

fn sine_frames(len: i32) -> (SampleBlock, Vec<u8>) {
    let block = SampleBlock::from_channels(
        &[
            (0..len)
                .map(|i| (f64::from(i) * 0.05).sin() * 10000.0)
                .map(|s| s as i32)
                .collect::<Vec<_>>(),
            (0..len)
                .map(|i| (f64::from(i) * 0.02).cos() * 8000.0)
                .map(|s| s as i32)
                .collect::<Vec<_>>(),
        ],
        16,
    )
    .unwrap();

    let mut flac = Cursor::new(vec![]);
    let mut encoder = Encoder::new(
        &mut flac,
        EncodingOptions::default()
            .block_size(1024)
            .unwrap()
            .padding(0)
            .unwrap(),
        44100,
        16,
        2,
        Some(len as u64),
    )
    .unwrap();
    encoder.encode(&block).unwrap();
    encoder.finalize().unwrap();

    (block, flac.into_inner())
}

#[test]
fn test_file_corruption() {
    // ensure test file is okay
    let (block, flac) = sine();
    assert_eq!(
        Decoder::new(flac.as_slice()).unwrap().read_all().unwrap(),
        block
    );

    // try swapping some random bits outside the metadata block area
    // (flipping a bit somewhere in a PADDING block might not be
    // noticed, for instance)
    let valid_range = FIRST_FRAME..flac.len();

    for _ in 0..100 {
        let mut flac = flac.clone();
        flac[fastrand::usize(valid_range.clone())] ^= 1 << fastrand::u32(0..8);

        let mut decoder = Decoder::new(flac.as_slice()).unwrap();
        match decoder.read_all() {
            Err(_) => {}
            // a CRC collision must still be caught by the MD5
            Ok(decoded) => assert!(
                decoded == block || decoder.verify_md5() == Verified::MD5Mismatch
            ),
        }
    }
}

#[test]
fn test_truncation() {
    let (_, flac) = sine_frames(5000);

    let frames = Analyzer::new(flac.as_slice())
        .unwrap()
        .filter_map(|event| match event.unwrap() {
            DecodeEvent::Frame { offset, size, .. } => Some((offset as usize, size)),
            DecodeEvent::Metadata(_) => None,
        })
        .collect::<Vec<_>>();

    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0].0, FIRST_FRAME);

    // cut between frames, so the sample count comes up short
    for (offset, _) in &frames {
        assert!(matches!(
            Decoder::new(&flac[0..*offset]).unwrap().read_all(),
            Err(Error::EndOfStream)
        ));
    }

    // every possible cut, within frames or between them
    for cut in FIRST_FRAME..flac.len() {
        let result = Decoder::new(&flac[0..cut]).unwrap().read_all();
        assert!(
            matches!(result, Err(Error::EndOfStream | Error::CorruptFrame)),
            "cut at {cut} gave {result:?}"
        );
    }

    assert!(Decoder::new(flac.as_slice()).unwrap().read_all().is_ok());
}

#[test]
fn test_trailing_garbage() {
    let (block, mut flac) = sine();
    flac.extend_from_slice(&[0xFF, 0xF8, 0x00]);

    // trailing bytes must form whole frames
    assert!(Decoder::new(flac.as_slice()).unwrap().read_all().is_err());

    let mut decoder = Decoder::new(&flac[..flac.len() - 3]).unwrap();
    assert_eq!(decoder.read_all().unwrap(), block);
}
