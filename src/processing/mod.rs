//! # Processing Module
//!
//! The CPU side of resampling: region extraction, wrap detection, padding and scaling.

pub mod pipeline;

pub use pipeline::{PipelineFingerprint, ResampleJob, ResamplePipeline, ResampledPixels, effective_scale};
