//! Prediction record returned to the front end and written by batch runs.

use crate::geo::round_to;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a queried location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleId {
    Number(i64),
    Text(String),
}

impl SampleId {
    /// Parse a spreadsheet cell, keeping integers numeric.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Some(SampleId::Number(n));
        }
        // Spreadsheets often export integer ids as "17.0"
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                return Some(SampleId::Number(f as i64));
            }
        }
        Some(SampleId::Text(trimmed.to_string()))
    }

    /// File-name-safe form of the id.
    pub fn file_stem(&self) -> String {
        let raw = self.to_string();
        let stem: String = raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(128)
            .collect();
        if stem.is_empty() {
            "sample".to_string()
        } else {
            stem
        }
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleId::Number(n) => write!(f, "{}", n),
            SampleId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for SampleId {
    fn from(n: i64) -> Self {
        SampleId::Number(n)
    }
}

/// Quality-control verdict for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QcStatus {
    Verifiable,
    NotVerifiable,
}

impl QcStatus {
    pub fn from_confidence(confidence: f64, threshold: f64) -> Self {
        if confidence >= threshold {
            QcStatus::Verifiable
        } else {
            QcStatus::NotVerifiable
        }
    }
}

/// Imagery provider that produced the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileSource {
    #[serde(rename = "ESRI")]
    Esri,
    #[serde(rename = "GOOGLE_TILE")]
    GoogleTile,
}

impl TileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileSource::Esri => "ESRI",
            TileSource::GoogleTile => "GOOGLE_TILE",
        }
    }
}

impl fmt::Display for TileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub source: Option<TileSource>,
    pub capture_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BboxOrMask {
    /// Pixel corners `[x1, y1, x2, y2]` in tile coordinates.
    pub bbox: [f64; 4],
}

/// One detection result, serialized field-for-field as the public JSON contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub sample_id: SampleId,
    pub lat: f64,
    pub lon: f64,
    pub has_solar: bool,
    pub confidence: f64,
    pub pv_area_sqm_est: f64,
    pub buffer_radius_sqft: u32,
    pub qc_status: QcStatus,
    pub bbox_or_mask: Option<BboxOrMask>,
    pub image_metadata: ImageMetadata,
    pub tile_image: Option<String>,
    pub overlay_image: Option<String>,
}

/// Today's date in the record's `capture_date` format.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Shared fields for building a record.
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub sample_id: SampleId,
    pub lat: f64,
    pub lon: f64,
    pub buffer_radius_sqft: u32,
    pub source: Option<TileSource>,
    pub capture_date: Option<String>,
    pub tile_image: Option<String>,
    pub overlay_image: Option<String>,
}

impl PredictionRecord {
    /// Record without a usable detection.
    pub fn unverifiable(ctx: RecordContext) -> Self {
        Self {
            sample_id: ctx.sample_id,
            lat: round_to(ctx.lat, 6),
            lon: round_to(ctx.lon, 6),
            has_solar: false,
            confidence: 0.0,
            pv_area_sqm_est: 0.0,
            buffer_radius_sqft: ctx.buffer_radius_sqft,
            qc_status: QcStatus::NotVerifiable,
            bbox_or_mask: None,
            image_metadata: ImageMetadata {
                source: ctx.source,
                capture_date: ctx.capture_date,
            },
            tile_image: ctx.tile_image,
            overlay_image: ctx.overlay_image,
        }
    }

    /// Record for the top detection.
    pub fn detected(
        ctx: RecordContext,
        bbox: [f64; 4],
        confidence: f64,
        area_sqm: f64,
        qc_threshold: f64,
    ) -> Self {
        Self {
            sample_id: ctx.sample_id,
            lat: round_to(ctx.lat, 6),
            lon: round_to(ctx.lon, 6),
            has_solar: true,
            confidence: round_to(confidence, 4),
            pv_area_sqm_est: round_to(area_sqm, 3),
            buffer_radius_sqft: ctx.buffer_radius_sqft,
            qc_status: QcStatus::from_confidence(confidence, qc_threshold),
            bbox_or_mask: Some(BboxOrMask { bbox }),
            image_metadata: ImageMetadata {
                source: ctx.source,
                capture_date: ctx.capture_date,
            },
            tile_image: ctx.tile_image,
            overlay_image: ctx.overlay_image,
        }
    }

    pub fn is_verifiable(&self) -> bool {
        self.qc_status == QcStatus::Verifiable
    }
}
