// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use flac_engine::SampleBlock;
use flac_engine::decode::{Analyzer, DecodeEvent, Decoder, Verified};
use flac_engine::encode::{Encoder, EncodingOptions};
use flac_engine::frame::Frame;
use flac_engine::pcm::{MemoryReader, transfer};
use flac_engine::stream::Subframe;
use std::io::Cursor;

fn noise(samples: usize) -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(samples as u64);
    (0..samples * 4).map(|_| rng.u8(..)).collect()
}

fn encode(block: &SampleBlock, options: EncodingOptions) -> Vec<u8> {
    let mut flac = Cursor::new(vec![]);
    let mut encoder = Encoder::new(
        &mut flac,
        options,
        44100,
        block.bits_per_sample(),
        block.channel_count() as u8,
        Some(block.pcm_frames() as u64),
    )
    .unwrap();
    encoder.encode(block).unwrap();
    encoder.finalize().unwrap();
    flac.into_inner()
}

fn frames(flac: &[u8]) -> Vec<Frame> {
    Analyzer::new(flac)
        .unwrap()
        .filter_map(|event| match event.unwrap() {
            DecodeEvent::Frame { frame, .. } => Some(frame),
            DecodeEvent::Metadata(_) => None,
        })
        .collect()
}

#[test]
fn test_fractional() {
    fn perform_test(blocksize: u16, samples: usize) {
        let data = noise(samples);
        let block = SampleBlock::from_bytes(&data, 2, 16, false, true).unwrap();

        let mut flac = Cursor::new(vec![]);
        {
            let mut encoder = Encoder::new(
                &mut flac,
                EncodingOptions::default()
                    .block_size(blocksize)
                    .unwrap()
                    .padding(0)
                    .unwrap(),
                44100,
                16,
                2,
                Some(samples as u64),
            )
            .unwrap();

            assert_eq!(
                transfer(
                    &mut MemoryReader::new(block.clone(), 44100),
                    &mut encoder,
                    4096
                )
                .unwrap(),
                samples as u64
            );
        }

        let flac = flac.into_inner();
        let mut decoder = Decoder::new(flac.as_slice()).unwrap();
        assert_eq!(decoder.read_all().unwrap().to_bytes(false, true), data);
        assert_eq!(decoder.verify_md5(), Verified::MD5Match);

        let frames = frames(&flac);
        assert_eq!(frames.len(), samples.div_ceil(usize::from(blocksize)));
        let (last, full) = frames.split_last().unwrap();
        assert!(full.iter().all(|f| f.block_size() == usize::from(blocksize)));
        assert_eq!(
            last.block_size(),
            samples - full.len() * usize::from(blocksize)
        );
    }

    for samples in [31, 32, 33, 34, 35, 2046, 2047, 2048, 2049, 2050] {
        perform_test(33, samples);
    }

    for samples in [
        254, 255, 256, 257, 258, 510, 511, 512, 513, 514, 1022, 1023, 1024, 1025, 1026, 2046, 2047,
        2048, 2049, 2050, 4094, 4095, 4096, 4097, 4098,
    ] {
        perform_test(256, samples);
    }

    for samples in [
        1022, 1023, 1024, 1025, 1026, 2046, 2047, 2048, 2049, 2050, 4094, 4095, 4096, 4097, 4098,
    ] {
        perform_test(2048, samples);
    }

    for samples in [
        1022, 1023, 1024, 1025, 1026, 2046, 2047, 2048, 2049, 2050, 4094, 4095, 4096, 4097, 4098,
        4606, 4607, 4608, 4609, 4610, 8190, 8191, 8192, 8193, 8194, 16382, 16383, 16384, 16385,
        16386,
    ] {
        perform_test(4608, samples);
    }
}

fn sine(len: usize) -> SampleBlock {
    SampleBlock::from_channels(
        &[(0..len)
            .map(|i| ((i as f64 * 0.03).sin() * 20000.0) as i32)
            .collect::<Vec<_>>()],
        16,
    )
    .unwrap()
}

#[test]
fn test_partition_orders() {
    let block = sine(10000);

    for order in [0, 2, 4, 8] {
        let flac = encode(
            &block,
            EncodingOptions::default()
                .block_size(4096)
                .unwrap()
                .partition_orders(order, order)
                .unwrap(),
        );
        assert_eq!(
            Decoder::new(flac.as_slice()).unwrap().read_all().unwrap(),
            block
        );

        for frame in frames(&flac).iter().filter(|f| f.block_size() == 4096) {
            for subframe in &frame.subframes {
                match subframe {
                    Subframe::Fixed { residuals, .. } | Subframe::Lpc { residuals, .. } => {
                        assert_eq!(residuals.partition_order, order)
                    }
                    _ => {}
                }
            }
        }
    }
}

#[test]
fn test_predictor_orders() {
    let block = sine(5000);

    // fixed predictors only
    let flac = encode(
        &block,
        EncodingOptions::default().max_lpc_order(0).unwrap(),
    );
    assert_eq!(
        Decoder::new(flac.as_slice()).unwrap().read_all().unwrap(),
        block
    );
    assert!(frames(&flac).iter().all(|f| {
        f.subframes
            .iter()
            .all(|s| !matches!(s, Subframe::Lpc { .. }))
    }));

    // high order LPC with fixed precision
    for precision in [None, Some(5), Some(12), Some(15)] {
        let flac = encode(
            &block,
            EncodingOptions::default()
                .max_lpc_order(32)
                .unwrap()
                .qlp_precision(precision)
                .unwrap(),
        );
        assert_eq!(
            Decoder::new(flac.as_slice()).unwrap().read_all().unwrap(),
            block
        );
    }
}

#[test]
fn test_wasted_bits() {
    let mut rng = fastrand::Rng::with_seed(8);
    let block = SampleBlock::from_channels(
        &[(0..3000)
            .map(|_| rng.i32(-30000..30000) * 256)
            .collect::<Vec<_>>()],
        24,
    )
    .unwrap();

    let flac = encode(&block, EncodingOptions::default());
    assert_eq!(
        Decoder::new(flac.as_slice()).unwrap().read_all().unwrap(),
        block
    );
    assert!(
        frames(&flac)
            .iter()
            .flat_map(|f| f.subframes.iter())
            .all(|s| s.header().wasted_bps >= 8)
    );
}

#[test]
fn test_frame_sizes() {
    let block = sine(20000);
    let flac = encode(&block, EncodingOptions::default().block_size(1152).unwrap());

    let decoder = Decoder::new(flac.as_slice()).unwrap();
    let streaminfo = decoder.streaminfo().clone();
    assert_eq!(streaminfo.minimum_block_size, 1152);
    assert_eq!(streaminfo.maximum_block_size, 1152);

    let sizes = Analyzer::new(flac.as_slice())
        .unwrap()
        .filter_map(|event| match event.unwrap() {
            DecodeEvent::Frame { size, .. } => Some(size as u32),
            DecodeEvent::Metadata(_) => None,
        })
        .collect::<Vec<_>>();

    assert_eq!(
        streaminfo.minimum_frame_size.map(|s| s.get()),
        sizes.iter().copied().min()
    );
    assert_eq!(
        streaminfo.maximum_frame_size.map(|s| s.get()),
        sizes.iter().copied().max()
    );
}
