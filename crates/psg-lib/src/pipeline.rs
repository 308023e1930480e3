use crate::{
    align::{common_span, windows, WindowIter},
    clean::clean_channel,
    config::PipelineConfig,
    error::{PipelineError, Result},
    events::associate,
    resample::resample_channel,
    signal::{ChannelKind, ClippedEvent, EventAnnotation, SeriesSlice, TimeSeries, Timestamp, Window},
};
use chrono::Duration;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A complete recording as handed over by the parsing layer.
#[derive(Debug, Clone)]
pub struct RecordingInput {
    pub spo2: TimeSeries,
    pub flow: TimeSeries,
    pub thoracic: TimeSeries,
    pub events: Vec<EventAnnotation>,
}

impl RecordingInput {
    fn check_slots(&self) -> Result<()> {
        for (expected, ts) in [
            (ChannelKind::SpO2, &self.spo2),
            (ChannelKind::Flow, &self.flow),
            (ChannelKind::Thoracic, &self.thoracic),
        ] {
            if ts.kind != expected {
                return Err(PipelineError::malformed(
                    expected.name(),
                    format!("slot holds a {} channel", ts.kind),
                ));
            }
        }
        if let Some(bad) = self.events.iter().find(|e| e.end < e.start) {
            return Err(PipelineError::malformed(
                "events",
                format!("event '{}' ends before it starts", bad.label),
            ));
        }
        Ok(())
    }
}

/// Cleaned and resampled channel plus whether cleaning left anything valid.
#[derive(Debug, Clone)]
pub struct ProcessedChannel {
    pub series: TimeSeries,
    pub all_missing: bool,
}

/// Clean then resample one channel.
pub fn process_channel(series: &TimeSeries, cfg: &PipelineConfig) -> ProcessedChannel {
    let cleaned = clean_channel(series, cfg);
    ProcessedChannel {
        series: resample_channel(&cleaned.series, cfg.resample_period()),
        all_missing: cleaned.all_missing,
    }
}

/// The three channels on one shared grid, ready to be paginated.
#[derive(Debug, Clone)]
pub struct AlignedRecording {
    spo2: TimeSeries,
    flow: TimeSeries,
    thoracic: TimeSeries,
    events: Vec<EventAnnotation>,
    span: Window,
    window_width: Duration,
    all_missing: Vec<ChannelKind>,
}

/// Run cleaning, resampling and alignment over a recording.
///
/// The three channels are processed concurrently; they share nothing until
/// the common span is computed.
pub fn prepare(input: RecordingInput, cfg: &PipelineConfig) -> Result<AlignedRecording> {
    cfg.validate()?;
    input.check_slots()?;

    // indexed collect keeps slot order
    let processed: Vec<ProcessedChannel> = [&input.spo2, &input.flow, &input.thoracic]
        .par_iter()
        .map(|series| process_channel(series, cfg))
        .collect();
    let all_missing: Vec<ChannelKind> = processed
        .iter()
        .filter(|c| c.all_missing)
        .map(|c| c.series.kind)
        .collect();
    let [spo2, flow, thoracic]: [ProcessedChannel; 3] = processed
        .try_into()
        .map_err(|_| PipelineError::Config("expected three processed channels".into()))?;

    let span = common_span(&[&spo2.series, &flow.series, &thoracic.series])?;
    let window_width = cfg.window_width();
    info!(
        "common span {} .. {} ({} windows of {} min, {} events)",
        span.start,
        span.end,
        windows(span, window_width).len(),
        cfg.window_minutes,
        input.events.len()
    );

    Ok(AlignedRecording {
        spo2: spo2.series,
        flow: flow.series,
        thoracic: thoracic.series,
        events: input.events,
        span,
        window_width,
        all_missing,
    })
}

/// Everything one report page needs, already time-aligned and clipped.
#[derive(Debug, Clone)]
pub struct Page<'a> {
    pub window: Window,
    pub flow: SeriesSlice<'a>,
    pub thoracic: SeriesSlice<'a>,
    pub spo2: SeriesSlice<'a>,
    pub events: Vec<ClippedEvent>,
}

impl<'a> Page<'a> {
    /// Slices in display order, top panel first.
    pub fn panels(&self) -> [SeriesSlice<'a>; 3] {
        [self.flow, self.thoracic, self.spo2]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub kind: ChannelKind,
    pub samples: usize,
    pub valid: usize,
    pub all_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub start: Timestamp,
    pub end: Timestamp,
    pub window_minutes: f64,
    pub window_count: usize,
    pub event_count: usize,
    pub channels: Vec<ChannelSummary>,
}

impl AlignedRecording {
    pub fn span(&self) -> Window {
        self.span
    }

    pub fn channel(&self, kind: ChannelKind) -> &TimeSeries {
        match kind {
            ChannelKind::SpO2 => &self.spo2,
            ChannelKind::Flow => &self.flow,
            ChannelKind::Thoracic => &self.thoracic,
        }
    }

    pub fn events(&self) -> &[EventAnnotation] {
        &self.events
    }

    /// Channels with no valid sample left after cleaning.
    pub fn all_missing(&self) -> &[ChannelKind] {
        &self.all_missing
    }

    /// A fresh window sequence over the common span.
    pub fn windows(&self) -> WindowIter {
        windows(self.span, self.window_width)
    }

    /// Series are cut at the common span end so all three slices carry the
    /// same grid points even when the window runs past it. Events are clipped
    /// to the full window.
    pub fn page(&self, window: Window) -> Page<'_> {
        let end = window.end.min(self.span.end);
        Page {
            window,
            flow: self.flow.slice(window.start, end),
            thoracic: self.thoracic.slice(window.start, end),
            spo2: self.spo2.slice(window.start, end),
            events: associate(&self.events, &window),
        }
    }

    /// Pages in ascending time order.
    pub fn pages(&self) -> impl ExactSizeIterator<Item = Page<'_>> + '_ {
        self.windows().map(move |w| self.page(w))
    }

    pub fn summary(&self) -> RecordingSummary {
        let window_minutes =
            self.window_width.num_microseconds().unwrap_or_default() as f64 / 60_000_000.0;
        RecordingSummary {
            start: self.span.start,
            end: self.span.end,
            window_minutes,
            window_count: self.windows().len(),
            event_count: self.events.len(),
            channels: ChannelKind::ALL
                .iter()
                .map(|&kind| {
                    let ts = self.channel(kind);
                    ChannelSummary {
                        kind,
                        samples: ts.len(),
                        valid: ts.valid_count(),
                        all_missing: self.all_missing.contains(&kind),
                    }
                })
                .collect(),
        }
    }
}
