// THEORY:
// This file is the main entry point for the `motion_tracker` library crate.
//
// The public surface is small: build a `SequenceStore` from a background and the
// frames that follow it, hand it to `VisionPipeline` (sequential) or
// `ParallelPipeline` (bounded worker pool), and read back the `Report` plus the
// annotated output frames left in the store. The building blocks in
// `core_modules` stay public so each stage can be used and tested on its own.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::pixel::pixel::Pixel;
pub use core_modules::pixel_buffer::PixelBuffer;
pub use core_modules::sequence_store::SequenceStore;
pub use error::{Result, VisionError};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{PipelineConfig, Report, TrackSummary, VisionPipeline};
