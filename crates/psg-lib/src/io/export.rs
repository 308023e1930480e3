use crate::error::{PipelineError, Result};
use crate::pipeline::RecordingInput;
use crate::signal::{ChannelKind, EventAnnotation, TimeSeries, Timestamp};
use chrono::{Duration, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use log::debug;
use std::fs;
use std::path::Path;

pub const SPO2_FILE: &str = "SPO2.txt";
pub const FLOW_FILE: &str = "Flow.txt";
pub const THORAC_FILE: &str = "Thorac.txt";
pub const EVENTS_FILE: &str = "Flow Events.txt";

/// Preamble lines before the first `Time;Value` row of a signal export.
pub const SIGNAL_HEADER_LINES: usize = 7;
/// Preamble lines before the first `Range;Duration;Event;Stage` row.
pub const EVENT_HEADER_LINES: usize = 5;

const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Parse `dd.mm.yyyy HH:MM:SS,fraction`. The fraction may carry 1-9 digits
/// and may be absent.
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    let (whole, fraction) = match text.split_once(',') {
        Some((whole, fraction)) => (whole, Some(fraction.trim())),
        None => (text, None),
    };
    let base = NaiveDateTime::parse_from_str(whole.trim(), DATE_TIME_FORMAT).ok()?;
    let Some(fraction) = fraction else {
        return Some(base);
    };
    if fraction.is_empty()
        || fraction.len() > 9
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let nanos: i64 = fraction.parse().ok()?;
    let scale = 10i64.pow(9 - fraction.len() as u32);
    Some(base + Duration::nanoseconds(nanos * scale))
}

/// Numeric sample value; anything unparseable or non-finite (`inf`, `NaN`)
/// is a missing sample.
pub fn parse_value(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return f64::NAN;
    }
    text.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(f64::NAN)
}

fn data_records(text: &str, skip: usize, source: &str) -> Result<Vec<(usize, StringRecord)>> {
    let body: String = text
        .lines()
        .skip(skip)
        .map(|line| format!("{}\n", line))
        .collect();
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let mut out = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|err| PipelineError::Csv {
            path: source.to_string(),
            source: err,
        })?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0) + skip;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        out.push((line, record));
    }
    Ok(out)
}

/// Parse a `Time;Value` signal export.
pub fn parse_channel(text: &str, kind: ChannelKind, source: &str) -> Result<TimeSeries> {
    let records = data_records(text, SIGNAL_HEADER_LINES, source)?;
    let mut times = Vec::with_capacity(records.len());
    let mut values = Vec::with_capacity(records.len());
    for (line, record) in records {
        let raw_time = record.get(0).unwrap_or_default();
        let time = parse_timestamp(raw_time).ok_or_else(|| {
            PipelineError::malformed(
                source,
                format!("line {}: unparseable timestamp '{}'", line, raw_time),
            )
        })?;
        if let Some(&prev) = times.last() {
            if time <= prev {
                return Err(PipelineError::malformed(
                    source,
                    format!("line {}: timestamp {} does not follow {}", line, time, prev),
                ));
            }
        }
        let value = record.get(1).ok_or_else(|| {
            PipelineError::malformed(source, format!("line {}: no value column", line))
        })?;
        times.push(time);
        values.push(parse_value(value));
    }
    if times.is_empty() {
        return Err(PipelineError::malformed(source, "no samples found"));
    }
    debug!("{}: {} samples of {}", source, times.len(), kind);
    TimeSeries::new(kind, times, values)
}

/// Parse a `Range;Duration;Event;Stage` event export.
///
/// The range end carries only a time of day; it takes the start's date, or the
/// following day when it falls before the start.
pub fn parse_events(text: &str, source: &str) -> Result<Vec<EventAnnotation>> {
    let mut events = Vec::new();
    for (line, record) in data_records(text, EVENT_HEADER_LINES, source)? {
        let malformed =
            |reason: String| PipelineError::malformed(source, format!("line {}: {}", line, reason));
        let range = record.get(0).unwrap_or_default();
        let (start_text, end_text) = range
            .split_once('-')
            .ok_or_else(|| malformed(format!("range '{}' has no '-'", range)))?;
        let start = parse_timestamp(start_text)
            .ok_or_else(|| malformed(format!("unparseable start '{}'", start_text)))?;
        let date = start_text.split_whitespace().next().unwrap_or_default();
        let mut end = parse_timestamp(&format!("{} {}", date, end_text.trim()))
            .ok_or_else(|| malformed(format!("unparseable end '{}'", end_text)))?;
        if end < start {
            end += Duration::days(1);
        }
        let label = record
            .get(2)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| malformed("missing event label".into()))?;
        let stage = record.get(3).unwrap_or_default();
        events.push(EventAnnotation::new(start, end, label, stage)?);
    }
    debug!("{}: {} events", source, events.len());
    Ok(events)
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    // vendor exports are not always UTF-8
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn read_channel(path: &Path, kind: ChannelKind) -> Result<TimeSeries> {
    parse_channel(&read_text(path)?, kind, &path.display().to_string())
}

pub fn read_events(path: &Path) -> Result<Vec<EventAnnotation>> {
    parse_events(&read_text(path)?, &path.display().to_string())
}

/// File holding a channel inside a participant folder.
pub fn channel_file(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::SpO2 => SPO2_FILE,
        ChannelKind::Flow => FLOW_FILE,
        ChannelKind::Thoracic => THORAC_FILE,
    }
}

/// Load the three channels and the event list from a participant folder.
pub fn load_participant(dir: &Path) -> Result<RecordingInput> {
    Ok(RecordingInput {
        spo2: read_channel(&dir.join(SPO2_FILE), ChannelKind::SpO2)?,
        flow: read_channel(&dir.join(FLOW_FILE), ChannelKind::Flow)?,
        thoracic: read_channel(&dir.join(THORAC_FILE), ChannelKind::Thoracic)?,
        events: read_events(&dir.join(EVENTS_FILE))?,
    })
}

/// Participant identifier: the folder's final path component.
pub fn participant_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "participant".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    const SIGNAL_PREAMBLE: &str = "Signal ID: SPO2\nStart Time: 01.03.2024 23:55:00\nUnit: %\nSignal Type: Oximetry\nSample Rate: 1\nLength: 4\nData:\n";
    const EVENT_PREAMBLE: &str = "Signal ID: FlowEvents\nStart Time: 01.03.2024 23:55:00\nUnit: s\nSignal Type: Impuls\nData:\n";

    fn ts(h: u32, m: u32, s: u32, ms: i64) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
            + Duration::milliseconds(ms)
    }

    #[test]
    fn parses_fractional_timestamps() {
        assert_eq!(parse_timestamp("01.03.2024 23:55:00,250"), Some(ts(23, 55, 0, 250)));
        assert_eq!(parse_timestamp("01.03.2024 23:55:00,5"), Some(ts(23, 55, 0, 500)));
        assert_eq!(parse_timestamp("01.03.2024 23:55:00"), Some(ts(23, 55, 0, 0)));
        assert_eq!(
            parse_timestamp("01.03.2024 23:55:00,031250"),
            Some(ts(23, 55, 0, 0) + Duration::microseconds(31_250))
        );
        assert!(parse_timestamp("2024-03-01 23:55:00").is_none());
        assert!(parse_timestamp("01.03.2024 23:55:00,x1").is_none());
    }

    #[test]
    fn non_numeric_values_become_missing() {
        assert_eq!(parse_value(" 97 "), 97.0);
        assert_eq!(parse_value("0,75"), 0.75);
        assert!(parse_value("---").is_nan());
        assert!(parse_value("").is_nan());
        assert!(parse_value("inf").is_nan());
        assert!(parse_value("-Infinity").is_nan());
        assert!(parse_value("NaN").is_nan());
    }

    #[test]
    fn parses_signal_export() {
        let text = format!(
            "{}01.03.2024 23:55:00,000; 97\n01.03.2024 23:55:01,000; ---\n\n01.03.2024 23:55:02,000;96\n",
            SIGNAL_PREAMBLE
        );
        let series = parse_channel(&text, ChannelKind::SpO2, "SPO2.txt").unwrap();
        assert_eq!(series.len(), 3);
        assert!(series.values()[1].is_nan());
        assert_eq!(series.last_time(), Some(ts(23, 55, 2, 0)));
    }

    #[test]
    fn bad_timestamp_is_malformed_with_line() {
        let text = format!("{}01.03.2024 23:55:00,000;97\nnot a time;96\n", SIGNAL_PREAMBLE);
        let err = parse_channel(&text, ChannelKind::SpO2, "SPO2.txt").unwrap_err();
        match err {
            PipelineError::MalformedInput { reason, .. } => assert!(reason.contains("line 9")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_value_column_is_malformed() {
        let text = format!("{}01.03.2024 23:55:00,000\n", SIGNAL_PREAMBLE);
        assert!(matches!(
            parse_channel(&text, ChannelKind::SpO2, "SPO2.txt"),
            Err(PipelineError::MalformedInput { .. })
        ));
    }

    #[test]
    fn backwards_timestamp_is_malformed() {
        let text = format!(
            "{}01.03.2024 23:55:01,000;97\n01.03.2024 23:55:00,000;96\n",
            SIGNAL_PREAMBLE
        );
        assert!(matches!(
            parse_channel(&text, ChannelKind::SpO2, "SPO2.txt"),
            Err(PipelineError::MalformedInput { .. })
        ));
    }

    #[test]
    fn parses_events_and_rolls_over_midnight() {
        let text = format!(
            "{}01.03.2024 23:58:10,000-23:58:31,500; 21;Hypopnea;N2\n01.03.2024 23:59:50,000-00:00:12,500;22;Obstructive Apnea;N1\n",
            EVENT_PREAMBLE
        );
        let events = parse_events(&text, "Flow Events.txt").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].label, "Hypopnea");
        assert_eq!(events[0].stage, "N2");
        assert_eq!(events[0].end, ts(23, 58, 31, 500));
        assert_eq!(events[1].end, ts(23, 59, 50, 0) + Duration::milliseconds(22_500));
    }

    #[test]
    fn event_without_range_separator_is_malformed() {
        let text = format!("{}01.03.2024 23:58:10,000;21;Hypopnea;N2\n", EVENT_PREAMBLE);
        assert!(parse_events(&text, "Flow Events.txt").is_err());
    }

    #[test]
    fn loads_participant_fixture() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join("test_data/AP01");
        let input = load_participant(&dir).expect("load fixture");
        assert_eq!(input.spo2.kind, ChannelKind::SpO2);
        assert!(input.flow.len() > input.spo2.len());
        assert!(!input.events.is_empty());
        assert_eq!(participant_name(&dir), "AP01");
    }
}
