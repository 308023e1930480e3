use crate::error::{PipelineError, Result};
use crate::signal::{TimeSeries, Timestamp, Window};
use chrono::{Duration, NaiveDateTime};

/// Largest span observed by every channel: latest first sample to earliest
/// last sample.
pub fn common_span(channels: &[&TimeSeries]) -> Result<Window> {
    let mut spans = Vec::with_capacity(channels.len());
    for ts in channels {
        let span = ts.span().ok_or_else(|| {
            PipelineError::malformed(ts.kind.name(), "channel has no samples")
        })?;
        spans.push(span);
    }
    let (Some(start), Some(end)) = (
        spans.iter().map(|s| s.first).max(),
        spans.iter().map(|s| s.last).min(),
    ) else {
        return Err(PipelineError::Config("no channels to align".into()));
    };
    if start > end {
        return Err(PipelineError::InsufficientOverlap { spans });
    }
    Ok(Window { start, end })
}

/// Fixed-width pages over a span. Each item is plain data, so cloning the
/// iterator restarts it from its current position.
#[derive(Debug, Clone)]
pub struct WindowIter {
    next_start: Timestamp,
    width: Duration,
    remaining: usize,
}

/// Windows of `width` starting at `span.start`. A window is produced for every
/// start strictly before `span.end`; a zero-length span still gets one window.
/// The last window may run past `span.end`.
pub fn windows(span: Window, width: Duration) -> WindowIter {
    let total = (span.end - span.start).num_microseconds().unwrap_or(i64::MAX);
    let step = width.num_microseconds().unwrap_or(i64::MAX).max(1);
    let remaining = if total <= 0 {
        1
    } else {
        usize::try_from((total as u64).div_ceil(step as u64)).unwrap_or(usize::MAX)
    };
    WindowIter {
        next_start: span.start,
        width,
        remaining,
    }
}

impl Iterator for WindowIter {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let start = self.next_start;
        let Some(end) = start.checked_add_signed(self.width) else {
            // the calendar ends before the span does
            self.remaining = 0;
            return Some(Window {
                start,
                end: NaiveDateTime::MAX,
            });
        };
        self.next_start = end;
        Some(Window { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for WindowIter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ChannelKind;
    use chrono::NaiveDate;

    fn t(min: i64, sec: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(22, 0, 0))
            .unwrap()
            + Duration::minutes(min)
            + Duration::seconds(sec)
    }

    fn flat(kind: ChannelKind, from: Timestamp, to: Timestamp) -> TimeSeries {
        TimeSeries::new(kind, vec![from, to], vec![0.0, 0.0]).unwrap()
    }

    #[test]
    fn common_span_is_intersection() {
        let a = flat(ChannelKind::SpO2, t(0, 0), t(30, 0));
        let b = flat(ChannelKind::Flow, t(1, 0), t(31, 0));
        let c = flat(ChannelKind::Thoracic, t(0, 30), t(29, 0));
        let span = common_span(&[&a, &b, &c]).unwrap();
        assert_eq!(span.start, t(1, 0));
        assert_eq!(span.end, t(29, 0));
    }

    #[test]
    fn disjoint_channels_report_all_spans() {
        let a = flat(ChannelKind::SpO2, t(0, 0), t(10, 0));
        let b = flat(ChannelKind::Flow, t(20, 0), t(30, 0));
        let c = flat(ChannelKind::Thoracic, t(0, 0), t(30, 0));
        match common_span(&[&a, &b, &c]) {
            Err(PipelineError::InsufficientOverlap { spans }) => {
                assert_eq!(spans.len(), 3);
                assert_eq!(spans[1].first, t(20, 0));
            }
            other => panic!("expected InsufficientOverlap, got {:?}", other),
        }
    }

    #[test]
    fn windows_cover_span_without_gaps() {
        let span = Window {
            start: t(0, 0),
            end: t(12, 30),
        };
        let ws: Vec<Window> = windows(span, Duration::minutes(5)).collect();
        assert_eq!(ws.len(), 3);
        assert_eq!(ws[0].start, span.start);
        for pair in ws.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for w in &ws {
            assert_eq!(w.end - w.start, Duration::minutes(5));
        }
        assert!(ws[2].end >= span.end);
        assert!(ws[2].start < span.end);
    }

    #[test]
    fn exact_multiple_has_no_trailing_window() {
        let span = Window {
            start: t(0, 0),
            end: t(10, 0),
        };
        let ws: Vec<Window> = windows(span, Duration::minutes(5)).collect();
        assert_eq!(ws.len(), 2);
        assert_eq!(ws[1].end, span.end);
    }

    #[test]
    fn zero_length_span_yields_one_window() {
        let span = Window {
            start: t(3, 0),
            end: t(3, 0),
        };
        let iter = windows(span, Duration::minutes(5));
        assert_eq!(iter.len(), 1);
        assert_eq!(iter.collect::<Vec<_>>()[0].start, t(3, 0));
    }

    #[test]
    fn oversized_width_yields_one_window() {
        let span = Window {
            start: t(0, 0),
            end: t(22, 0),
        };
        let ws: Vec<Window> = windows(span, Duration::microseconds(i64::MAX)).collect();
        assert_eq!(ws.len(), 1);
        assert_eq!(ws[0].start, span.start);
        assert!(ws[0].end > span.end);
    }

    #[test]
    fn window_sequence_is_restartable() {
        let span = Window {
            start: t(0, 0),
            end: t(22, 0),
        };
        let iter = windows(span, Duration::minutes(5));
        let first: Vec<Window> = iter.clone().collect();
        let second: Vec<Window> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }
}
