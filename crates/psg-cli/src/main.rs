use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use psg_lib::{
    clean::clean_channel,
    io::export::{channel_file, load_participant, participant_name, read_channel},
    pipeline::{prepare, RecordingSummary},
    plot::{figure_from_page, Figure, PlotBackend},
    resample::resample_channel,
    signal::{ChannelKind, ClippedEvent, Timestamp},
    PipelineConfig,
};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

mod render;

use render::{JsonBackend, PngBackend};

#[derive(Parser)]
#[command(
    name = "psg",
    version,
    about = "Polysomnography review reports: clean, align and paginate respiratory channels"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one page file per window for a participant folder
    ///
    /// Pages are written as `<participant>_page_NNN.<ext>` next to a
    /// `<participant>_report.json` index that lists them in window order.
    Report {
        #[arg(long)]
        participant: PathBuf,
        #[arg(long, default_value = "Visualizations")]
        out_dir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 1800)]
        width: u32,
        #[arg(long, default_value_t = 800)]
        height: u32,
        /// Cap on plotted points per continuous line segment
        #[arg(long, default_value_t = 4000)]
        max_points: usize,
        #[arg(long, value_enum, default_value_t = PageFormat::Png)]
        format: PageFormat,
    },
    /// Print one JSON line per window with sample counts and clipped events
    Windows {
        #[arg(long)]
        participant: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print a cleaned channel as `time;value` lines
    Clean {
        #[arg(long)]
        participant: PathBuf,
        #[arg(long, value_parser = parse_channel_kind)]
        channel: ChannelKind,
        /// Also resample onto the uniform grid
        #[arg(long)]
        resampled: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default pipeline configuration as TOML
    Config,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PageFormat {
    Png,
    Json,
}

impl PageFormat {
    fn extension(self) -> &'static str {
        match self {
            PageFormat::Png => "png",
            PageFormat::Json => "json",
        }
    }
}

fn parse_channel_kind(s: &str) -> std::result::Result<ChannelKind, String> {
    s.parse::<ChannelKind>().map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Report {
            participant,
            out_dir,
            config,
            width,
            height,
            max_points,
            format,
        } => cmd_report(
            &participant,
            &out_dir,
            config.as_deref(),
            (width, height),
            max_points,
            format,
        )?,
        Commands::Windows {
            participant,
            config,
        } => cmd_windows(&participant, config.as_deref())?,
        Commands::Clean {
            participant,
            channel,
            resampled,
            config,
        } => cmd_clean(&participant, channel, resampled, config.as_deref())?,
        Commands::Config => cmd_config()?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let cfg = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

#[derive(Serialize)]
struct ReportOutput {
    participant: String,
    summary: RecordingSummary,
    pages: Vec<PathBuf>,
}

fn cmd_report(
    participant: &Path,
    out_dir: &Path,
    config: Option<&Path>,
    size: (u32, u32),
    max_points: usize,
    format: PageFormat,
) -> Result<()> {
    let cfg = load_config(config)?;
    let name = participant_name(participant);
    let input = load_participant(participant)
        .with_context(|| format!("loading participant {}", participant.display()))?;
    let recording = prepare(input, &cfg)?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    info!("generating visualization for {}", name);

    let figures: Vec<Figure> = recording
        .pages()
        .collect::<Vec<_>>()
        .par_iter()
        .map(|page| figure_from_page(&name, page, max_points))
        .collect();
    // indexed collect keeps page files in window order
    let pages = figures
        .par_iter()
        .enumerate()
        .map(|(idx, fig)| {
            let path = out_dir.join(format!(
                "{}_page_{:03}.{}",
                name,
                idx + 1,
                format.extension()
            ));
            match format {
                PageFormat::Png => PngBackend::new(&path, size).draw(fig)?,
                PageFormat::Json => JsonBackend::new(&path).draw(fig)?,
            }
            Ok(path)
        })
        .collect::<Result<Vec<PathBuf>>>()?;
    info!("saved {} pages to {}", pages.len(), out_dir.display());

    let output = ReportOutput {
        summary: recording.summary(),
        pages,
        participant: name,
    };
    let json = serde_json::to_string(&output)?;
    let index = out_dir.join(format!("{}_report.json", output.participant));
    fs::write(&index, &json).with_context(|| format!("failed to write {}", index.display()))?;
    println!("{}", json);
    Ok(())
}

#[derive(Serialize)]
struct SampleCounts {
    flow: usize,
    thoracic: usize,
    spo2: usize,
}

#[derive(Serialize)]
struct WindowLine {
    index: usize,
    start: Timestamp,
    end: Timestamp,
    samples: SampleCounts,
    valid: SampleCounts,
    events: Vec<ClippedEvent>,
}

fn cmd_windows(participant: &Path, config: Option<&Path>) -> Result<()> {
    let cfg = load_config(config)?;
    let input = load_participant(participant)
        .with_context(|| format!("loading participant {}", participant.display()))?;
    let recording = prepare(input, &cfg)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (index, page) in recording.pages().enumerate() {
        let line = WindowLine {
            index,
            start: page.window.start,
            end: page.window.end,
            samples: SampleCounts {
                flow: page.flow.len(),
                thoracic: page.thoracic.len(),
                spo2: page.spo2.len(),
            },
            valid: SampleCounts {
                flow: page.flow.valid_count(),
                thoracic: page.thoracic.valid_count(),
                spo2: page.spo2.valid_count(),
            },
            events: page.events,
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }
    out.flush()?;
    Ok(())
}

fn cmd_clean(
    participant: &Path,
    kind: ChannelKind,
    resampled: bool,
    config: Option<&Path>,
) -> Result<()> {
    let cfg = load_config(config)?;
    let raw = read_channel(&participant.join(channel_file(kind)), kind)?;
    let cleaned = clean_channel(&raw, &cfg).series;
    let series = if resampled {
        resample_channel(&cleaned, cfg.resample_period())
    } else {
        cleaned
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (t, v) in series.iter() {
        let time = t.format("%d.%m.%Y %H:%M:%S,%6f");
        if v.is_nan() {
            writeln!(out, "{};", time)?;
        } else {
            writeln!(out, "{};{}", time, v)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn cmd_config() -> Result<()> {
    print!("{}", toml::to_string_pretty(&PipelineConfig::default())?);
    Ok(())
}
