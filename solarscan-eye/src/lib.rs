//! solarscan-eye: imagery acquisition and solar panel detection
//!
//! Fetches aerial tiles around a coordinate (ESRI World Imagery with a
//! Google raster-tile fallback), runs a YOLO detector exported to ONNX over
//! them, renders an overlay, and shapes the result into a
//! [`solarscan_core::PredictionRecord`]. The batch runner repeats this over a
//! CSV spreadsheet of coordinates.

pub mod error;
pub mod tiles;
pub mod models;
pub mod processing;
pub mod pipeline;
pub mod batch;
mod utils;

pub use error::VisionError;
pub use models::{Detection, Detector, YoloModel};
pub use pipeline::{OutputPaths, SolarPipeline};
pub use tiles::{TileFetcher, TileProvider};
