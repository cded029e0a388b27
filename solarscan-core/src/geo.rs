//! Web-Mercator helpers for tile requests and footprint estimates.

use crate::error::{Error, Result};
use std::f64::consts::PI;
use std::fmt;

/// Equatorial ground resolution at zoom 0, in meters per pixel.
pub const EQUATOR_METERS_PER_PIXEL: f64 = 156543.03392;

/// Latitude limit of the Web-Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Meters per degree of latitude used for the export bbox.
const METERS_PER_DEG_LAT: f64 = 110574.0;

/// Meters per degree of longitude at the equator.
const METERS_PER_DEG_LON: f64 = 111320.0;

/// Ground resolution of a Web-Mercator pixel at `lat_deg` and `zoom`.
pub fn meters_per_pixel(lat_deg: f64, zoom: u8) -> f64 {
    EQUATOR_METERS_PER_PIXEL * lat_deg.to_radians().cos() / 2f64.powi(zoom as i32)
}

/// Estimated ground area in square meters of a pixel bbox `[x1, y1, x2, y2]`.
pub fn bbox_area_sqm(bbox: [f64; 4], lat_deg: f64, zoom: u8) -> f64 {
    let [x1, y1, x2, y2] = bbox;
    let px_area = ((x2 - x1) * (y2 - y1)).abs();
    let mpp = meters_per_pixel(lat_deg, zoom);
    px_area * mpp * mpp
}

/// Slippy-map tile holding (`lat_deg`, `lon_deg`) at `zoom`.
pub fn lat_lon_to_tile(lat_deg: f64, lon_deg: f64, zoom: u8) -> (u32, u32) {
    let lat_rad = lat_deg.to_radians();
    let n = 2f64.powi(zoom as i32);
    let max_index = n - 1.0;

    let x = ((lon_deg + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

    (x.clamp(0.0, max_index) as u32, y.clamp(0.0, max_index) as u32)
}

/// Geographic bounding box in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl fmt::Display for GeoBBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}

/// Bbox centered on (`lat_deg`, `lon_deg`) spanning `size_px` pixels at `zoom`.
pub fn esri_export_bbox(lat_deg: f64, lon_deg: f64, zoom: u8, size_px: u32) -> GeoBBox {
    let half_width_m = (size_px as f64 / 2.0) * meters_per_pixel(lat_deg, zoom);

    let deg_lat = half_width_m / METERS_PER_DEG_LAT;
    let deg_lon = half_width_m / (METERS_PER_DEG_LON * lat_deg.to_radians().cos());

    GeoBBox {
        min_lon: lon_deg - deg_lon,
        min_lat: lat_deg - deg_lat,
        max_lon: lon_deg + deg_lon,
        max_lat: lat_deg + deg_lat,
    }
}

/// Reject coordinates the tile math cannot represent.
pub fn validate_coordinates(lat_deg: f64, lon_deg: f64) -> Result<()> {
    if !lat_deg.is_finite() || lat_deg.abs() > MAX_MERCATOR_LAT {
        return Err(Error::InvalidCoordinate(format!(
            "latitude {} outside [-{max}, {max}]",
            lat_deg,
            max = MAX_MERCATOR_LAT
        )));
    }
    if !lon_deg.is_finite() || lon_deg.abs() > 180.0 {
        return Err(Error::InvalidCoordinate(format!(
            "longitude {} outside [-180, 180]",
            lon_deg
        )));
    }
    Ok(())
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
