use crate::signal::{ChannelKind, Timestamp};
use std::fmt;
use thiserror::Error;

/// Observed time range of one channel, reported when channels fail to overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChannelSpan {
    pub kind: ChannelKind,
    pub first: Timestamp,
    pub last: Timestamp,
}

impl fmt::Display for ChannelSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} .. {}", self.kind, self.first, self.last)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input that cannot be placed on a valid time index.
    #[error("malformed input ({source_name}): {reason}")]
    MalformedInput { source_name: String, reason: String },

    /// The channels' observed spans do not share any instant.
    #[error("channels do not overlap in time: {}", format_spans(.spans))]
    InsufficientOverlap { spans: Vec<ChannelSpan> },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

impl PipelineError {
    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

fn format_spans(spans: &[ChannelSpan]) -> String {
    spans
        .iter()
        .map(ChannelSpan::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;
