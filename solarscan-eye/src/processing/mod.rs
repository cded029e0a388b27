//! Detection and overlay processing

pub mod detection;
pub mod overlay;

pub use detection::DetectionPipeline;
pub use overlay::render_overlay;
