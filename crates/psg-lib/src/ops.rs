//! Missing-aware numeric primitives shared by the channel cleaners and the resampler.
//!
//! Missing samples are NaN throughout; infinities are skipped like missing
//! samples. Nothing here reorders samples.

use crate::signal::{to_micros, Timestamp};

/// Centered moving average that skips missing samples.
///
/// A position emits a value when at least one sample inside its window is
/// valid. For even widths the window holds `width / 2` samples before the
/// centre and `width / 2 - 1` after it.
pub fn rolling_mean_centered(values: &[f64], width: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let width = width.max(1);
    let after = (width - 1) / 2;
    let before = width - 1 - after;

    let mut sums = Vec::with_capacity(n + 1);
    let mut counts = Vec::with_capacity(n + 1);
    let mut acc = 0.0;
    let mut cnt = 0usize;
    sums.push(acc);
    counts.push(cnt);
    for &v in values {
        if v.is_finite() {
            acc += v;
            cnt += 1;
        }
        sums.push(acc);
        counts.push(cnt);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(n);
            let count = counts[hi] - counts[lo];
            if count == 0 {
                f64::NAN
            } else {
                (sums[hi] - sums[lo]) / count as f64
            }
        })
        .collect()
}

/// Interior runs of missing samples as half-open index ranges. Runs touching
/// either end of the sequence are excluded since they have no right or left
/// anchor to interpolate from.
fn interior_gaps(values: &[f64]) -> Vec<(usize, usize)> {
    let mut gaps = Vec::new();
    let mut i = 0;
    while i < values.len() {
        if values[i].is_nan() {
            let start = i;
            while i < values.len() && values[i].is_nan() {
                i += 1;
            }
            if start > 0 && i < values.len() {
                gaps.push((start, i));
            }
        } else {
            i += 1;
        }
    }
    gaps
}

/// Copy of `values` with every non-finite sample marked missing.
pub fn finite_or_missing(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v.is_finite() { v } else { f64::NAN })
        .collect()
}

/// Linear interpolation at `t` between `(t0, v0)` and `(t1, v1)`.
pub fn interp_at(t: i64, t0: i64, v0: f64, t1: i64, v1: f64) -> f64 {
    if t1 == t0 {
        return v0;
    }
    v0 + (v1 - v0) * ((t - t0) as f64 / (t1 - t0) as f64)
}

/// Fill interior missing runs no longer than `limit` samples, weighting by
/// timestamp distance. Longer runs stay missing in full.
pub fn interpolate_time_limited(times: &[Timestamp], values: &[f64], limit: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for (start, end) in interior_gaps(values) {
        if end - start > limit {
            continue;
        }
        let (t0, v0) = (to_micros(times[start - 1]), values[start - 1]);
        let (t1, v1) = (to_micros(times[end]), values[end]);
        for i in start..end {
            out[i] = interp_at(to_micros(times[i]), t0, v0, t1, v1);
        }
    }
    out
}

/// Fill interior missing runs no longer than `limit` samples, treating the
/// samples as equally spaced.
pub fn interpolate_index_limited(values: &[f64], limit: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for (start, end) in interior_gaps(values) {
        if end - start > limit {
            continue;
        }
        let (i0, v0) = (start as i64 - 1, values[start - 1]);
        let (i1, v1) = (end as i64, values[end]);
        for i in start..end {
            out[i] = interp_at(i as i64, i0, v0, i1, v1);
        }
    }
    out
}

/// Quantile `q` in `[0, 1]` of the valid samples, interpolating linearly
/// between order statistics. `None` when nothing is valid.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Mean and sample standard deviation (n - 1) of the valid samples.
/// The deviation is NaN with fewer than two valid samples.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        return None;
    }
    let n = valid.len() as f64;
    let mean = valid.iter().sum::<f64>() / n;
    let std = if valid.len() > 1 {
        (valid.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        f64::NAN
    };
    Some((mean, std))
}
