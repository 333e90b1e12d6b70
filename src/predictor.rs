// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Sample prediction for fixed and LPC subframes
//!
//! All prediction is performed on `i64` samples,
//! since a 32-bit stereo side channel requires 33 bits
//! and predictions accumulate well beyond that.
//! Residuals, however, must fit in 32 bits to be
//! Rice coded, so any model whose residuals don't
//! is simply unavailable.

use crate::Error;
use crate::stream::{MAX_FIXED_ORDER, MAX_LPC_ORDER};
use arrayvec::ArrayVec;

/// Fixed predictor coefficients, by order
pub const FIXED_COEFFICIENTS: [&[i64]; MAX_FIXED_ORDER + 1] =
    [&[], &[1], &[2, -1], &[3, -3, 1], &[4, -6, 4, -1]];

/// The maximum quantized LPC coefficient precision, in bits
pub const MAX_QLP_PRECISION: u32 = 15;

/// The maximum quantized LPC shift
pub const MAX_QLP_SHIFT: u32 = 15;

/// Returns number of low bits which are 0 in every sample
///
/// An empty or all-zero channel has no wasted bits.
pub fn wasted_bits(samples: &[i64]) -> u32 {
    match samples.iter().fold(0, |acc, s| acc | s) {
        0 => 0,
        bits => bits.trailing_zeros(),
    }
}

/// Calculates residuals of samples predicted by the given coefficients
///
/// Coefficients are ordered with the most recent sample's first,
/// and each prediction is shifted right by `shift` bits.
/// The first `coefficients.len()` samples are the warm-up
/// and have no residuals.
///
/// Returns `None` if any residual falls outside of 32 bits.
pub fn residuals(coefficients: &[i64], shift: u32, samples: &[i64]) -> Option<Vec<i32>> {
    let order = coefficients.len();
    debug_assert!(samples.len() >= order);

    samples
        .windows(order + 1)
        .map(|window| {
            let (history, sample) = window.split_at(order);
            let prediction = coefficients
                .iter()
                .zip(history.iter().rev())
                .map(|(c, s)| c * s)
                .sum::<i64>()
                >> shift;
            i32::try_from(sample[0] - prediction).ok()
        })
        .collect()
}

/// Reconstructs samples from warm-up samples and residuals
///
/// This is the inverse of [`residuals`].
///
/// # Errors
///
/// Returns [`Error::ExcessiveResidual`] if any reconstructed
/// sample doesn't fit in a signed value of `bits` bits.
pub fn restore(
    coefficients: &[i64],
    shift: u32,
    bits: u32,
    warm_up: &[i64],
    residuals: impl IntoIterator<Item = i32>,
) -> Result<Vec<i64>, Error> {
    debug_assert_eq!(coefficients.len(), warm_up.len());
    debug_assert!((1..=64).contains(&bits));

    let range = match bits {
        64 => i64::MIN..=i64::MAX,
        bits => -(1 << (bits - 1))..=(1 << (bits - 1)) - 1,
    };

    let residuals = residuals.into_iter();
    let mut samples = Vec::with_capacity(warm_up.len() + residuals.size_hint().0);
    samples.extend_from_slice(warm_up);

    for residual in residuals {
        let history = &samples[samples.len() - coefficients.len()..];
        // samples are kept in range, so this cannot overflow
        let prediction = coefficients
            .iter()
            .zip(history.iter().rev())
            .map(|(c, s)| c * s)
            .sum::<i64>()
            >> shift;
        match prediction.checked_add(residual.into()) {
            Some(sample) if range.contains(&sample) => samples.push(sample),
            _ => return Err(Error::ExcessiveResidual),
        }
    }

    Ok(samples)
}

/// Calculates fixed predictor residuals of the given order
///
/// Returns `None` if any residual falls outside of 32 bits.
#[inline]
pub fn fixed_residuals(order: usize, samples: &[i64]) -> Option<Vec<i32>> {
    residuals(FIXED_COEFFICIENTS[order], 0, samples)
}

/// Sum of absolute fixed predictor residuals of the given order
///
/// A cheap stand-in for a residual's encoded size.
pub fn fixed_magnitude(order: usize, samples: &[i64]) -> u64 {
    let coefficients = FIXED_COEFFICIENTS[order];

    samples
        .windows(order + 1)
        .map(|window| {
            let (history, sample) = window.split_at(order);
            let prediction = coefficients
                .iter()
                .zip(history.iter().rev())
                .map(|(c, s)| c * s)
                .sum::<i64>();
            (sample[0] - prediction).unsigned_abs()
        })
        .sum()
}

/// Generates a Tukey window of the given length
///
/// `ratio` is the portion of the window which is tapered,
/// such that 0.0 is rectangular and 1.0 is a Hann window.
pub fn tukey_window(len: usize, ratio: f64) -> Vec<f64> {
    use std::f64::consts::PI;

    let taper = ((ratio * len as f64) as usize).saturating_sub(1);
    if taper < 2 {
        return vec![1.0; len];
    }

    let hann = |n: usize| 0.5 * (1.0 - ((2.0 * PI * n as f64) / (taper - 1) as f64).cos());
    let head = taper / 2;

    (0..head)
        .map(hann)
        .chain(std::iter::repeat_n(1.0, len - taper))
        .chain((head..taper).map(hann))
        .collect()
}

/// Calculates autocorrelation values for lags 0 to `max_lag`
///
/// Lags beyond the signal's length are omitted.
pub fn autocorrelation(signal: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag.min(signal.len().saturating_sub(1)))
        .map(|lag| {
            signal
                .iter()
                .zip(&signal[lag..])
                .map(|(x, y)| x * y)
                .sum()
        })
        .collect()
}

/// LP coefficients and prediction errors for each order
#[derive(Clone, Debug, Default)]
pub struct LpCoefficients {
    /// Coefficients for orders 1, 2, and so on
    pub coefficients: Vec<ArrayVec<f64, MAX_LPC_ORDER>>,
    /// Prediction error for each order
    pub errors: Vec<f64>,
}

impl LpCoefficients {
    /// Number of orders available
    #[inline]
    pub fn max_order(&self) -> usize {
        self.coefficients.len()
    }

    /// Coefficients for the given order, starting from 1
    #[inline]
    pub fn order(&self, order: usize) -> &[f64] {
        &self.coefficients[order - 1]
    }
}

/// Calculates LP coefficients using the Levinson-Durbin recursion
///
/// Yields one coefficient set per order up to the number of
/// autocorrelation lags available.
/// Recursion stops early if the prediction error reaches 0,
/// since higher orders can't improve on it.
pub fn lp_coefficients(autocorrelation: &[f64]) -> LpCoefficients {
    let mut lp = LpCoefficients::default();

    let Some((&r0, lags)) = autocorrelation.split_first() else {
        return lp;
    };
    if r0 <= 0.0 {
        return lp;
    }

    let mut error = r0;
    let mut previous: ArrayVec<f64, MAX_LPC_ORDER> = ArrayVec::new();

    for (m, &rm) in lags.iter().enumerate().take(MAX_LPC_ORDER) {
        // r(m) - sum(a(i) * r(m - i))
        let q = rm
            - previous
                .iter()
                .zip(autocorrelation[1..=m].iter().rev())
                .map(|(a, r)| a * r)
                .sum::<f64>();
        let k = q / error;

        let mut current: ArrayVec<f64, MAX_LPC_ORDER> = previous
            .iter()
            .zip(previous.iter().rev())
            .map(|(a, ar)| a - k * ar)
            .collect();
        current.push(k);

        error *= 1.0 - k * k;
        if !error.is_finite() || current.iter().any(|c| !c.is_finite()) {
            break;
        }

        lp.coefficients.push(current.clone());
        lp.errors.push(error);
        previous = current;

        if error <= 0.0 {
            break;
        }
    }

    lp
}

/// Estimates the best LPC order from prediction errors
///
/// Each order costs `overhead_bits` of warm-up and coefficient data,
/// traded against the expected size of its residuals.
pub fn estimate_order(errors: &[f64], block_size: usize, overhead_bits: u32) -> usize {
    use std::f64::consts::LN_2;

    let error_scale = (LN_2 * LN_2) / (block_size as f64 * 2.0);

    let bits_per_residual = |error: f64| {
        if error > 0.0 {
            ((error_scale * error).ln() / (LN_2 * 2.0)).max(0.0)
        } else if error < 0.0 {
            1e32
        } else {
            0.0
        }
    };

    errors
        .iter()
        .zip(1..)
        .map(|(error, order)| {
            let bits = bits_per_residual(*error) * block_size.saturating_sub(order) as f64
                + (order as f64 * f64::from(overhead_bits));
            (order, bits)
        })
        .fold((1, f64::INFINITY), |best, candidate| {
            if candidate.1 < best.1 { candidate } else { best }
        })
        .0
}

/// Default QLP coefficient precision for the given parameters
pub fn qlp_precision(bits_per_sample: u32, block_size: usize) -> u32 {
    match (bits_per_sample, block_size) {
        (17.., _) => 13,
        (_, ..=192) => 7,
        (_, ..=384) => 8,
        (_, ..=576) => 9,
        (_, ..=1152) => 10,
        (_, ..=2304) => 11,
        (_, ..=4608) => 12,
        _ => 13,
    }
}

/// Quantized LP coefficients
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QuantizedCoefficients {
    /// Coefficients with the most recent sample's first
    pub coefficients: ArrayVec<i32, MAX_LPC_ORDER>,
    /// Right shift applied to each prediction
    pub shift: u32,
}

impl QuantizedCoefficients {
    /// Coefficients widened for prediction
    pub fn widened(&self) -> ArrayVec<i64, MAX_LPC_ORDER> {
        self.coefficients.iter().copied().map(i64::from).collect()
    }
}

/// Quantizes LP coefficients to signed integers of `precision` bits
///
/// Rounding error from each coefficient is carried into the next.
pub fn quantize(coefficients: &[f64], precision: u32) -> QuantizedCoefficients {
    debug_assert!((1..=MAX_QLP_PRECISION).contains(&precision));

    let precision = precision - 1;
    let max = coefficients.iter().fold(0.0f64, |max, c| max.max(c.abs()));

    let shift = if max > 0.0 {
        // exponent such that max = m * 2 ^ exponent where 0.5 <= m < 1
        let exponent = max.log2().floor() as i32 + 1;
        (precision as i32 - exponent).clamp(0, MAX_QLP_SHIFT as i32) as u32
    } else {
        0
    };

    let qlp_max = (1i64 << precision) - 1;
    let qlp_min = -(1i64 << precision);
    let scale = f64::from(1u32 << shift);

    let mut error = 0.0;
    QuantizedCoefficients {
        coefficients: coefficients
            .iter()
            .map(|c| {
                error += c * scale;
                let qlp = (error.round() as i64).clamp(qlp_min, qlp_max);
                error -= qlp as f64;
                qlp as i32
            })
            .collect(),
        shift,
    }
}
