pub mod error;
pub mod config;
pub mod geo;
pub mod record;

pub use error::{Error, Result};
pub use config::SolarScanConfig;
pub use record::{
    BboxOrMask, ImageMetadata, PredictionRecord, QcStatus, SampleId, TileSource,
};
