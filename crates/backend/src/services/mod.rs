pub mod pipeline;

pub use pipeline::{BatchReport, MessageOutcome, Pipeline, PipelineSettings};
