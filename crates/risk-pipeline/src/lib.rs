//! LBW Risk Screening Pipeline
//!
//! Single-row, synchronous screening core: turns a raw beneficiary record
//! into a Low Birth Weight risk probability, label and optional top drivers.

mod artifacts;
mod config;
mod error;
mod pipeline;

pub use artifacts::Artifacts;
pub use config::{ExplainConfig, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::{ScreeningOutcome, ScreeningPipeline, TransformOutput};
