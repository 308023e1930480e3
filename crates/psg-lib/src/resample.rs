use crate::ops::{interp_at, interpolate_index_limited};
use crate::signal::{from_micros, to_micros, ChannelKind, TimeSeries};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// How source samples are carried onto the uniform grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleMode {
    /// Interpolate each grid point directly from the bracketing source samples.
    Interpolate,
    /// Average the samples inside each grid bucket, then interpolate empty buckets.
    BucketMean,
}

impl ResampleMode {
    pub fn for_kind(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::SpO2 => ResampleMode::Interpolate,
            ChannelKind::Flow | ChannelKind::Thoracic => ResampleMode::BucketMean,
        }
    }
}

/// Grid points are whole multiples of the period since the Unix epoch, so
/// every channel resampled with the same period shares one grid.
fn grid_bounds(series: &TimeSeries, period_us: i64) -> Option<(i64, usize)> {
    let first = to_micros(series.first_time()?);
    let last = to_micros(series.last_time()?);
    let g0 = first.div_euclid(period_us) * period_us;
    let g_last = last.div_euclid(period_us) * period_us;
    let count = ((g_last - g0) / period_us) as usize + 1;
    Some((g0, count))
}

/// Resample onto a uniform grid with the given period.
///
/// The grid runs from the first timestamp floored to the period up to the last
/// timestamp floored to the period. Grid points before the first or after the
/// last valid source value stay missing.
pub fn resample(series: &TimeSeries, period: Duration, mode: ResampleMode) -> TimeSeries {
    let period_us = period.num_microseconds().unwrap_or(1).max(1);
    let Some((g0, count)) = grid_bounds(series, period_us) else {
        return TimeSeries::from_sorted(series.kind, Vec::new(), Vec::new());
    };
    let grid: Vec<i64> = (0..count).map(|k| g0 + k as i64 * period_us).collect();

    let values = match mode {
        ResampleMode::Interpolate => interpolate_onto(series, &grid),
        ResampleMode::BucketMean => bucket_mean_onto(series, g0, period_us, count),
    };
    let times = grid.into_iter().map(from_micros).collect();
    TimeSeries::from_sorted(series.kind, times, values)
}

/// Resample with the mode appropriate for the channel kind.
pub fn resample_channel(series: &TimeSeries, period: Duration) -> TimeSeries {
    resample(series, period, ResampleMode::for_kind(series.kind))
}

fn valid_points(series: &TimeSeries) -> Vec<(i64, f64)> {
    series
        .iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(t, v)| (to_micros(t), v))
        .collect()
}

fn interpolate_onto(series: &TimeSeries, grid: &[i64]) -> Vec<f64> {
    let points = valid_points(series);
    let mut out = Vec::with_capacity(grid.len());
    let mut j = 0;
    for &g in grid {
        while j < points.len() && points[j].0 < g {
            j += 1;
        }
        let value = match points.get(j) {
            Some(&(t, v)) if t == g => v,
            Some(&(t1, v1)) if j > 0 => {
                let (t0, v0) = points[j - 1];
                interp_at(g, t0, v0, t1, v1)
            }
            _ => f64::NAN,
        };
        out.push(value);
    }
    out
}

fn bucket_mean_onto(series: &TimeSeries, g0: i64, period_us: i64, count: usize) -> Vec<f64> {
    let mut sums = vec![0.0; count];
    let mut counts = vec![0usize; count];
    for (t, v) in valid_points(series) {
        let k = ((t - g0) / period_us) as usize;
        sums[k] += v;
        counts[k] += 1;
    }
    let means: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, &c)| if c == 0 { f64::NAN } else { s / c as f64 })
        .collect();
    // uniform grid: index distance is time distance
    interpolate_index_limited(&means, usize::MAX)
}
