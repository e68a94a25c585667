// Data containers first, then the stages that consume them in pipeline order.
pub mod pixel;
pub mod pixel_buffer;
pub mod rectangle;
pub mod sequence_store;

pub mod filters;
pub mod blob_detector;
pub mod frame_processor;
pub mod palette;
pub mod tracker;
pub mod renderer;
