use anyhow::Result;
use chrono::Duration;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use psg_lib::plot::{Color as FigColor, Figure, PlotBackend};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Draws a report page into a PNG file, one stacked chart per panel.
pub struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    pub fn new(path: &Path, size: (u32, u32)) -> Self {
        Self {
            path: path.to_path_buf(),
            size,
        }
    }
}

fn rgb(color: FigColor) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let root = BitMapBackend::new(&self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(&fig.title, ("sans-serif", 24))?;
        let areas = root.split_evenly((fig.panels.len().max(1), 1));
        let origin = fig.origin;
        let time_label = |x: &f64| {
            (origin + Duration::microseconds((x * 1e6) as i64))
                .format("%H:%M:%S")
                .to_string()
        };

        for (area, panel) in areas.iter().zip(&fig.panels) {
            let (lo, hi) = panel.y_range().unwrap_or((0.0, 1.0));
            let pad = (hi - lo) * 0.05;
            let (y0, y1) = (lo - pad, hi + pad);
            let mut chart = ChartBuilder::on(area)
                .margin(8)
                .x_label_area_size(30)
                .y_label_area_size(60)
                .build_cartesian_2d(0.0..fig.x_max, y0..y1)?;
            chart
                .configure_mesh()
                .y_desc(panel.y_label.as_str())
                .x_labels(12)
                .x_label_formatter(&time_label)
                .light_line_style(RGBColor(211, 211, 211).mix(0.4))
                .draw()?;

            let label_y = y1 - (y1 - y0) * 0.15;
            for span in &panel.spans {
                chart.draw_series(std::iter::once(Rectangle::new(
                    [(span.x0, y0), (span.x1, y1)],
                    rgb(span.color).mix(0.6).filled(),
                )))?;
                let style = ("sans-serif", 14)
                    .into_font()
                    .color(&BLACK)
                    .pos(Pos::new(HPos::Center, VPos::Center));
                chart.draw_series(std::iter::once(Text::new(
                    span.label.clone(),
                    ((span.x0 + span.x1) / 2.0, label_y),
                    style,
                )))?;
            }

            let color = rgb(panel.color);
            for (idx, segment) in panel.segments.iter().enumerate() {
                let series = chart.draw_series(LineSeries::new(
                    segment.iter().map(|p| (p[0], p[1])),
                    &color,
                ))?;
                if idx == 0 {
                    series.label(panel.name.as_str()).legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color)
                    });
                }
            }
            if !panel.segments.is_empty() {
                chart
                    .configure_series_labels()
                    .position(SeriesLabelPosition::UpperRight)
                    .background_style(WHITE.mix(0.8))
                    .border_style(BLACK)
                    .draw()?;
            }
        }
        root.present()?;
        Ok(())
    }
}

/// Writes the figure description itself as JSON, for tooling and headless runs.
pub struct JsonBackend {
    path: PathBuf,
}

impl JsonBackend {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl PlotBackend for JsonBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(&mut writer, fig)?;
        writer.flush()?;
        Ok(())
    }
}
