use crate::error::{PipelineError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Oximetry cleaning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpO2Config {
    /// Physiologically plausible saturation range (%); values outside become missing.
    pub valid_min: f64,
    pub valid_max: f64,
    /// Largest allowed step between consecutive samples (percentage points).
    pub jump_threshold: f64,
    /// Longest run of missing samples that interpolation may fill.
    pub interp_gap_limit: usize,
    /// Centered moving-average width (samples).
    pub smoothing_width: usize,
}

impl Default for SpO2Config {
    fn default() -> Self {
        Self {
            valid_min: 70.0,
            valid_max: 100.0,
            jump_threshold: 4.0,
            interp_gap_limit: 20,
            smoothing_width: 8,
        }
    }
}

/// Nasal airflow cleaning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Clamp bounds as percentiles (0-100) of the whole channel.
    pub clip_low_pct: f64,
    pub clip_high_pct: f64,
    /// Drift baseline width (samples).
    pub baseline_width: usize,
    pub smoothing_width: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            clip_low_pct: 1.0,
            clip_high_pct: 99.0,
            baseline_width: 320,
            smoothing_width: 5,
        }
    }
}

/// Respiratory effort cleaning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThoracicConfig {
    pub zscore_threshold: f64,
    pub interp_gap_limit: usize,
    pub baseline_width: usize,
}

impl Default for ThoracicConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: 5.0,
            interp_gap_limit: 50,
            baseline_width: 480,
        }
    }
}

/// Longest report page accepted by `validate`.
pub const MAX_WINDOW_MINUTES: f64 = 24.0 * 60.0;

/// Every tunable constant of the conditioning and alignment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Uniform grid period after resampling (milliseconds). 31.25 ms = 32 Hz.
    pub resample_period_ms: f64,
    /// Report page width (minutes).
    pub window_minutes: f64,
    pub spo2: SpO2Config,
    pub flow: FlowConfig,
    pub thoracic: ThoracicConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resample_period_ms: 31.25,
            window_minutes: 5.0,
            spo2: SpO2Config::default(),
            flow: FlowConfig::default(),
            thoracic: ThoracicConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn resample_period(&self) -> Duration {
        Duration::microseconds((self.resample_period_ms * 1_000.0).round() as i64)
    }

    pub fn window_width(&self) -> Duration {
        Duration::microseconds((self.window_minutes * 60_000_000.0).round() as i64)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(PipelineError::Config(msg.to_string()));
        let s = &self.spo2;
        if !(s.valid_min < s.valid_max) {
            return fail("spo2.valid_min must be below spo2.valid_max");
        }
        if !(s.jump_threshold > 0.0) {
            return fail("spo2.jump_threshold must be positive");
        }
        if s.smoothing_width == 0 {
            return fail("spo2.smoothing_width must be at least 1");
        }
        let f = &self.flow;
        let pct = 0.0..=100.0;
        if !pct.contains(&f.clip_low_pct)
            || !pct.contains(&f.clip_high_pct)
            || f.clip_low_pct > f.clip_high_pct
        {
            return fail("flow clip percentiles must satisfy 0 <= low <= high <= 100");
        }
        if f.baseline_width == 0 || f.smoothing_width == 0 {
            return fail("flow baseline/smoothing widths must be at least 1");
        }
        let t = &self.thoracic;
        if !(t.zscore_threshold > 0.0) {
            return fail("thoracic.zscore_threshold must be positive");
        }
        if t.baseline_width == 0 {
            return fail("thoracic.baseline_width must be at least 1");
        }
        if !self.resample_period_ms.is_finite() || self.resample_period() <= Duration::zero() {
            return fail("resample_period_ms must be at least one microsecond");
        }
        if !self.window_minutes.is_finite() || self.window_minutes > MAX_WINDOW_MINUTES {
            return fail("window_minutes must be at most one day");
        }
        if self.window_width() < self.resample_period() {
            return fail("window_minutes must cover at least one resample period");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.resample_period(), Duration::microseconds(31_250));
        assert_eq!(cfg.window_width(), Duration::minutes(5));
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let cfg: PipelineConfig = toml::from_str(
            r#"
            window_minutes = 2.0

            [flow]
            baseline_width = 100
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window_width(), Duration::minutes(2));
        assert_eq!(cfg.flow.baseline_width, 100);
        assert_eq!(cfg.flow.smoothing_width, 5);
        assert_eq!(cfg.spo2, SpO2Config::default());
    }

    #[test]
    fn default_config_serializes_to_toml() {
        let text = toml::to_string_pretty(&PipelineConfig::default()).unwrap();
        assert!(text.contains("[thoracic]"));
        let back: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, PipelineConfig::default());
    }

    #[test]
    fn rejects_inverted_percentiles() {
        let mut cfg = PipelineConfig::default();
        cfg.flow.clip_low_pct = 99.5;
        cfg.flow.clip_high_pct = 0.5;
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_oversized_window() {
        let cfg = PipelineConfig {
            window_minutes: 1e12,
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
        let cfg = PipelineConfig {
            window_minutes: f64::INFINITY,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = PipelineConfig {
            window_minutes: MAX_WINDOW_MINUTES,
            ..PipelineConfig::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_period() {
        let cfg = PipelineConfig {
            resample_period_ms: 0.0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
