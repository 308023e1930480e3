use crate::pipeline::Page;
use crate::signal::{ChannelKind, SeriesSlice, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

pub const FLOW_COLOR: Color = Color(0x1F77B4);
pub const THORACIC_COLOR: Color = Color(0xFF7F0E);
pub const SPO2_COLOR: Color = Color(0x808080);
pub const EVENT_COLOR: Color = Color(0xEEE8AA);

/// Shaded interval with a centred label, in panel x coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub x0: f64,
    pub x1: f64,
    pub label: String,
    pub color: Color,
}

/// One stacked plot. Line data is split at missing samples so gaps render as
/// gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    pub name: String,
    pub y_label: String,
    pub color: Color,
    pub segments: Vec<Vec<[f64; 2]>>,
    pub spans: Vec<Span>,
}

impl Panel {
    pub fn y_range(&self) -> Option<(f64, f64)> {
        let mut ys = self.segments.iter().flatten().map(|p| p[1]);
        let first = ys.next()?;
        let (lo, hi) = ys.fold((first, first), |(lo, hi), y| (lo.min(y), hi.max(y)));
        if lo == hi {
            Some((lo - 1.0, hi + 1.0))
        } else {
            Some((lo, hi))
        }
    }
}

/// Backend-agnostic description of one report page. x is seconds since the
/// window start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: String,
    /// Instant at x = 0.
    pub origin: Timestamp,
    pub x_max: f64,
    pub panels: Vec<Panel>,
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        let sample = points[start];
        result.push(sample);
    }
    result
}

fn segments(slice: &SeriesSlice<'_>, origin: Timestamp, max_points: usize) -> Vec<Vec<[f64; 2]>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for (t, v) in slice.iter() {
        if !v.is_finite() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        let x = (t - origin).num_microseconds().unwrap_or_default() as f64 / 1e6;
        current.push([x, v]);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out.into_iter()
        .map(|seg| decimate_points(&seg, max_points))
        .collect()
}

fn panel_color(kind: ChannelKind) -> Color {
    match kind {
        ChannelKind::Flow => FLOW_COLOR,
        ChannelKind::Thoracic => THORACIC_COLOR,
        ChannelKind::SpO2 => SPO2_COLOR,
    }
}

/// Flow, thoracic effort and SpO2 stacked top to bottom; events shaded on the
/// flow panel.
pub fn figure_from_page(participant: &str, page: &Page<'_>, max_points: usize) -> Figure {
    let origin = page.window.start;
    let seconds = |t: Timestamp| (t - origin).num_microseconds().unwrap_or_default() as f64 / 1e6;
    let panels = page
        .panels()
        .iter()
        .map(|slice| {
            let spans = if slice.kind == ChannelKind::Flow {
                page.events
                    .iter()
                    .map(|e| Span {
                        x0: seconds(e.start),
                        x1: seconds(e.end),
                        label: e.label.clone(),
                        color: EVENT_COLOR,
                    })
                    .collect()
            } else {
                Vec::new()
            };
            Panel {
                name: slice.kind.name().to_string(),
                y_label: slice.kind.unit_label().to_string(),
                color: panel_color(slice.kind),
                segments: segments(slice, origin, max_points),
                spans,
            }
        })
        .collect();
    Figure {
        title: format!(
            "{} - {} to {}",
            participant,
            page.window.start.format("%Y-%m-%d %H:%M"),
            page.window.end.format("%Y-%m-%d %H:%M")
        ),
        origin,
        x_max: seconds(page.window.end),
        panels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{ClippedEvent, Window};
    use chrono::{Duration, NaiveDate};

    fn t(sec: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 2)
            .and_then(|d| d.and_hms_opt(0, 10, 0))
            .unwrap()
            + Duration::seconds(sec)
    }

    #[test]
    fn decimation_caps_point_count() {
        let pts: Vec<[f64; 2]> = (0..10_000).map(|i| [i as f64, 0.0]).collect();
        assert_eq!(decimate_points(&pts, 500).len(), 500);
        assert_eq!(decimate_points(&pts[..10], 500).len(), 10);
    }

    #[test]
    fn page_figure_splits_gaps_and_shades_events() {
        let times: Vec<Timestamp> = (0..6).map(t).collect();
        let flow = [1.0, 2.0, f64::NAN, f64::NAN, 3.0, 4.0];
        let other = [0.0; 6];
        let slice = |kind, values| SeriesSlice {
            kind,
            times: &times,
            values,
        };
        let page = Page {
            window: Window {
                start: t(0),
                end: t(300),
            },
            flow: slice(ChannelKind::Flow, &flow[..]),
            thoracic: slice(ChannelKind::Thoracic, &other[..]),
            spo2: slice(ChannelKind::SpO2, &other[..]),
            events: vec![ClippedEvent {
                start: t(1),
                end: t(4),
                label: "Hypopnea".into(),
                stage: "N2".into(),
            }],
        };
        let fig = figure_from_page("AP01", &page, 1000);
        assert_eq!(fig.title, "AP01 - 2024-03-02 00:10 to 2024-03-02 00:15");
        assert_eq!(fig.x_max, 300.0);
        assert_eq!(fig.panels.len(), 3);
        assert_eq!(fig.panels[0].name, "Nasal Flow");
        assert_eq!(fig.panels[0].segments.len(), 2);
        assert_eq!(fig.panels[0].segments[1][0], [4.0, 3.0]);
        assert_eq!(fig.panels[0].spans.len(), 1);
        assert_eq!(fig.panels[0].spans[0].x1, 4.0);
        assert!(fig.panels[2].spans.is_empty());
        assert_eq!(fig.panels[2].y_range(), Some((-1.0, 1.0)));
    }
}
