// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_engine::SampleBlock;
use flac_engine::encode::{Encoder, EncodingOptions};
use flac_engine::metadata::Metadata;
use flac_engine::pcm::{ChannelMask, transfer};
use flac_engine::probe::{Format, open};
use flac_engine::tags::{VorbisComment, fields};
use flac_engine::wave::WaveWriter;
use std::io::Cursor;

fn wave(block: &SampleBlock, sample_rate: u32, channel_mask: Option<ChannelMask>) -> Vec<u8> {
    let mut wave = WaveWriter::new(
        Cursor::new(vec![]),
        sample_rate,
        block.channel_count() as u8,
        block.bits_per_sample(),
        channel_mask,
    )
    .unwrap();
    wave.encode(block).unwrap();
    wave.finalize().unwrap().into_inner()
}

fn perform_test(name: &str, block: SampleBlock, sample_rate: u32, channel_mask: Option<ChannelMask>) {
    let dir = std::env::temp_dir();
    let wave_path = dir.join(format!("flac-engine-{}-{}.wav", name, std::process::id()));
    let flac_path = dir.join(format!("flac-engine-{}-{}.flac", name, std::process::id()));

    let original = wave(&block, sample_rate, channel_mask);
    std::fs::write(&wave_path, &original).unwrap();

    // WAVE to FLAC
    let mut input = open(&wave_path).unwrap();
    assert_eq!(input.format(), Format::Wave);
    assert_eq!(input.total_samples(), Some(block.pcm_frames() as u64));

    let mut comment = VorbisComment::default();
    if channel_mask.is_some() {
        comment
            .tags
            .insert(fields::CHANNEL_MASK, input.channel_mask().to_string());
    }

    let mut flac = Cursor::new(vec![]);
    {
        let mut encoder = Encoder::new(
            &mut flac,
            EncodingOptions::default()
                .metadata(comment.to_block().unwrap())
                .unwrap(),
            input.sample_rate(),
            input.bits_per_sample(),
            input.channel_count(),
            input.total_samples(),
        )
        .unwrap();
        assert_eq!(
            transfer(&mut input, &mut encoder, 10000).unwrap(),
            block.pcm_frames() as u64
        );
    }
    std::fs::write(&flac_path, flac.into_inner()).unwrap();

    // FLAC back to WAVE
    let mut input = open(&flac_path).unwrap();
    assert_eq!(input.format(), Format::Flac);
    assert_eq!(input.sample_rate(), sample_rate);
    if let Some(mask) = channel_mask {
        assert_eq!(input.channel_mask(), mask);
    }

    let mut output = Cursor::new(vec![]);
    {
        let mut writer = WaveWriter::new(
            &mut output,
            input.sample_rate(),
            input.channel_count(),
            input.bits_per_sample(),
            channel_mask.map(|_| input.channel_mask()),
        )
        .unwrap();
        transfer(&mut input, &mut writer, 7777).unwrap();
    }

    assert_eq!(output.into_inner(), original);

    std::fs::remove_file(wave_path).unwrap();
    std::fs::remove_file(flac_path).unwrap();
}

#[test]
fn test_stereo() {
    let block = SampleBlock::from_channels(
        &[
            (0..30000)
                .map(|i| ((f64::from(i) * 0.01).sin() * 30000.0) as i32)
                .collect::<Vec<_>>(),
            (0..30000)
                .map(|i| ((f64::from(i) * 0.013).sin() * 25000.0) as i32)
                .collect::<Vec<_>>(),
        ],
        16,
    )
    .unwrap();

    perform_test("stereo", block, 44100, None);
}

#[test]
fn test_unsigned_8_bit() {
    let block = SampleBlock::from_channels(
        &[(0..5001).map(|i| (i % 256) - 128).collect::<Vec<_>>()],
        8,
    )
    .unwrap();

    // odd data size gets a pad byte
    perform_test("mono8", block, 11025, None);
}

#[test]
fn test_surround() {
    let mut rng = fastrand::Rng::with_seed(51);
    let block = SampleBlock::from_channels(
        &(0..6)
            .map(|c| {
                (0..8000)
                    .map(|i| ((f64::from(i) * 0.001 * f64::from(c + 1)).sin() * 400000.0) as i32
                        + rng.i32(-100..100))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
        20,
    )
    .unwrap();

    perform_test("surround", block, 48000, Some(ChannelMask::from(0x3F)));
}
