use crate::config::{FlowConfig, PipelineConfig, SpO2Config, ThoracicConfig};
use crate::ops::{
    finite_or_missing, interpolate_index_limited, interpolate_time_limited, mean_std, quantile,
    rolling_mean_centered,
};
use crate::signal::{ChannelKind, TimeSeries};
use log::{debug, warn};

/// Output of the channel cleaner.
#[derive(Debug, Clone)]
pub struct CleanedChannel {
    pub series: TimeSeries,
    /// Nothing survived cleaning. Not an error: the channel is carried through
    /// the rest of the pipeline as missing data.
    pub all_missing: bool,
}

/// Apply the cleaning strategy for the series' channel kind.
pub fn clean_channel(series: &TimeSeries, cfg: &PipelineConfig) -> CleanedChannel {
    let cleaned = match series.kind {
        ChannelKind::SpO2 => clean_spo2(series, &cfg.spo2),
        ChannelKind::Flow => clean_flow(series, &cfg.flow),
        ChannelKind::Thoracic => clean_thoracic(series, &cfg.thoracic),
    };
    let all_missing = cleaned.is_all_missing();
    if all_missing {
        warn!(
            "{} channel has no valid samples after cleaning ({} samples in)",
            series.kind,
            series.len()
        );
    } else {
        debug!(
            "{} cleaned: {} of {} samples valid",
            series.kind,
            cleaned.valid_count(),
            cleaned.len()
        );
    }
    CleanedChannel {
        series: cleaned,
        all_missing,
    }
}

/// Range gate, jump rejection, bounded time interpolation, light smoothing.
pub fn clean_spo2(series: &TimeSeries, cfg: &SpO2Config) -> TimeSeries {
    let in_range: Vec<f64> = series
        .values()
        .iter()
        .map(|&v| {
            if v < cfg.valid_min || v > cfg.valid_max {
                f64::NAN
            } else {
                v
            }
        })
        .collect();

    // Steps are measured on the range-gated signal in recording order; a
    // sample next to a missing one has no step and is kept.
    let mut dejumped = in_range.clone();
    for i in 1..in_range.len() {
        let step = (in_range[i] - in_range[i - 1]).abs();
        if step > cfg.jump_threshold {
            dejumped[i] = f64::NAN;
        }
    }

    let filled = interpolate_time_limited(series.times(), &dejumped, cfg.interp_gap_limit);
    series.with_values(rolling_mean_centered(&filled, cfg.smoothing_width))
}

/// Percentile clamp, drift baseline removal, light smoothing.
pub fn clean_flow(series: &TimeSeries, cfg: &FlowConfig) -> TimeSeries {
    let values = finite_or_missing(series.values());
    let bounds = quantile(&values, cfg.clip_low_pct / 100.0)
        .zip(quantile(&values, cfg.clip_high_pct / 100.0));
    let Some((low, high)) = bounds else {
        return series.with_values(vec![f64::NAN; values.len()]);
    };
    // Bounds come from the whole recording, so one long anomalous segment can
    // shift them for every page.
    debug!("flow clamp bounds [{:.4}, {:.4}]", low, high);

    // missing samples pass through the clamp as NaN
    let clamped: Vec<f64> = values.iter().map(|&v| v.clamp(low, high)).collect();
    let detrended = subtract_baseline(&clamped, cfg.baseline_width);
    series.with_values(rolling_mean_centered(&detrended, cfg.smoothing_width))
}

/// Z-score artifact rejection, bounded interpolation, drift baseline removal.
pub fn clean_thoracic(series: &TimeSeries, cfg: &ThoracicConfig) -> TimeSeries {
    let values = finite_or_missing(series.values());
    let rejected: Vec<f64> = match mean_std(&values) {
        Some((mean, std)) if std > 0.0 => values
            .iter()
            .map(|&v| {
                if ((v - mean) / std).abs() > cfg.zscore_threshold {
                    f64::NAN
                } else {
                    v
                }
            })
            .collect(),
        _ => values,
    };
    let filled = interpolate_index_limited(&rejected, cfg.interp_gap_limit);
    series.with_values(subtract_baseline(&filled, cfg.baseline_width))
}

fn subtract_baseline(values: &[f64], width: usize) -> Vec<f64> {
    let baseline = rolling_mean_centered(values, width);
    values
        .iter()
        .zip(baseline.iter())
        .map(|(v, b)| v - b)
        .collect()
}
