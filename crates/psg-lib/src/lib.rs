pub mod align;
pub mod clean;
pub mod config;
pub mod error;
pub mod events;
pub mod io;
pub mod ops;
pub mod pipeline;
pub mod plot;
pub mod resample;
pub mod signal;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{prepare, AlignedRecording, Page, RecordingInput};
pub use signal::*;
