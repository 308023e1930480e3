use crate::error::{ChannelSpan, PipelineError, Result};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wall-clock instant as written by the recorder (no zone information).
pub type Timestamp = NaiveDateTime;

/// Microseconds since the Unix epoch, treating the wall clock as UTC.
pub fn to_micros(t: Timestamp) -> i64 {
    t.and_utc().timestamp_micros()
}

pub fn from_micros(us: i64) -> Timestamp {
    DateTime::from_timestamp_micros(us)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// Physiological channel recorded by the polysomnograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    SpO2,
    Flow,
    Thoracic,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [ChannelKind::SpO2, ChannelKind::Flow, ChannelKind::Thoracic];

    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::SpO2 => "SpO2",
            ChannelKind::Flow => "Nasal Flow",
            ChannelKind::Thoracic => "Thoracic/Abdominal Resp.",
        }
    }

    pub fn unit_label(&self) -> &'static str {
        match self {
            ChannelKind::SpO2 => "SpO2 (%)",
            ChannelKind::Flow => "Nasal Flow (L/min)",
            ChannelKind::Thoracic => "Resp. Amplitude",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spo2" | "sp02" => Ok(ChannelKind::SpO2),
            "flow" => Ok(ChannelKind::Flow),
            "thorac" | "thoracic" => Ok(ChannelKind::Thoracic),
            other => Err(PipelineError::Config(format!("unknown channel '{}'", other))),
        }
    }
}

/// Timestamp-indexed samples of one channel. Missing samples are NaN.
#[derive(Debug, Clone, Serialize)]
pub struct TimeSeries {
    pub kind: ChannelKind,
    times: Vec<Timestamp>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Build a series, rejecting an index that is not strictly increasing.
    pub fn new(kind: ChannelKind, times: Vec<Timestamp>, values: Vec<f64>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(PipelineError::malformed(
                kind.name(),
                format!("{} timestamps but {} values", times.len(), values.len()),
            ));
        }
        if let Some(pos) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(PipelineError::malformed(
                kind.name(),
                format!(
                    "timestamps not strictly increasing at sample {} ({} after {})",
                    pos + 1,
                    times[pos + 1],
                    times[pos]
                ),
            ));
        }
        Ok(Self {
            kind,
            times,
            values,
        })
    }

    /// Same index, new values. Every cleaning stage goes through here so the
    /// sample order can never change.
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.times.len());
        Self {
            kind: self.kind,
            times: self.times.clone(),
            values,
        }
    }

    /// Construct from an index already known to be strictly increasing.
    pub(crate) fn from_sorted(kind: ChannelKind, times: Vec<Timestamp>, values: Vec<f64>) -> Self {
        debug_assert!(times.windows(2).all(|w| w[0] < w[1]));
        Self {
            kind,
            times,
            values,
        }
    }

    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn first_time(&self) -> Option<Timestamp> {
        self.times.first().copied()
    }

    pub fn last_time(&self) -> Option<Timestamp> {
        self.times.last().copied()
    }

    pub fn span(&self) -> Option<ChannelSpan> {
        Some(ChannelSpan {
            kind: self.kind,
            first: self.first_time()?,
            last: self.last_time()?,
        })
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    pub fn is_all_missing(&self) -> bool {
        self.values.iter().all(|v| !v.is_finite())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Samples with `start <= t <= end`.
    pub fn slice(&self, start: Timestamp, end: Timestamp) -> SeriesSlice<'_> {
        let lo = self.times.partition_point(|t| *t < start);
        let hi = self.times.partition_point(|t| *t <= end).max(lo);
        SeriesSlice {
            kind: self.kind,
            times: &self.times[lo..hi],
            values: &self.values[lo..hi],
        }
    }
}

/// Borrowed view of a contiguous range of a `TimeSeries`.
#[derive(Debug, Clone, Copy)]
pub struct SeriesSlice<'a> {
    pub kind: ChannelKind,
    pub times: &'a [Timestamp],
    pub values: &'a [f64],
}

impl<'a> SeriesSlice<'a> {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, f64)> + 'a {
        self.times.iter().copied().zip(self.values.iter().copied())
    }
}

/// Labelled respiratory event (apnea, hypopnea, ...) supplied with the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub start: Timestamp,
    pub end: Timestamp,
    pub label: String,
    pub stage: String,
}

impl EventAnnotation {
    pub fn new(
        start: Timestamp,
        end: Timestamp,
        label: impl Into<String>,
        stage: impl Into<String>,
    ) -> Result<Self> {
        let label = label.into();
        if end < start {
            return Err(PipelineError::malformed(
                "events",
                format!("event '{}' ends ({}) before it starts ({})", label, end, start),
            ));
        }
        Ok(Self {
            start,
            end,
            label,
            stage: stage.into(),
        })
    }
}

/// One report page worth of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }

    /// Closed-interval overlap.
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        start <= self.end && end >= self.start
    }
}

/// An event restricted to the bounds of a single window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClippedEvent {
    pub start: Timestamp,
    pub end: Timestamp,
    pub label: String,
    pub stage: String,
}
