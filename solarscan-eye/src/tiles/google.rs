//! Google satellite raster tiles, stitched and center-cropped

use super::{get_bytes, TileError, TileProvider, TileRequest};
use async_trait::async_trait;
use futures::future::try_join_all;
use image::RgbImage;
use solarscan_core::geo::lat_lon_to_tile;
use solarscan_core::TileSource;
use tracing::debug;

/// Edge length of a raster tile served by the provider
pub const TILE_PX: u32 = 256;

pub struct GoogleTileProvider {
    client: reqwest::Client,
    url_template: String,
}

impl GoogleTileProvider {
    pub fn new(client: reqwest::Client, url_template: String) -> Self {
        Self { client, url_template }
    }

    pub fn tile_url(&self, x: u32, y: u32, zoom: u8) -> String {
        self.url_template
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{z}", &zoom.to_string())
    }

    async fn fetch_tile(&self, x: u32, y: u32, zoom: u8) -> Result<RgbImage, TileError> {
        let url = self.tile_url(x, y, zoom);
        let bytes = get_bytes(self.client.get(&url)).await?;
        let tile = image::load_from_memory(&bytes)?.to_rgb8();
        if tile.dimensions() == (TILE_PX, TILE_PX) {
            Ok(tile)
        } else {
            Ok(image::imageops::resize(
                &tile,
                TILE_PX,
                TILE_PX,
                image::imageops::FilterType::Triangle,
            ))
        }
    }
}

/// Odd number of tiles per side needed to cover `size` pixels
pub fn grid_side(size: u32) -> u32 {
    let tiles = size.div_ceil(TILE_PX).max(1);
    if tiles % 2 == 0 {
        tiles + 1
    } else {
        tiles
    }
}

/// Tile coordinates of an odd `side` x `side` grid around the center tile,
/// as `(column, row, x, y)`. Columns wrap around the antimeridian.
pub fn grid_tiles(
    center: (u32, u32),
    side: u32,
    zoom: u8,
) -> Result<Vec<(u32, u32, u32, u32)>, TileError> {
    let n = 1i64 << zoom;
    let half = (side / 2) as i64;
    let mut tiles = Vec::with_capacity((side * side) as usize);

    for row in 0..side as i64 {
        let y = center.1 as i64 + row - half;
        if y < 0 || y >= n {
            return Err(TileError::InvalidRequest(format!(
                "tile row {} outside [0, {}) at zoom {}",
                y, n, zoom
            )));
        }
        for col in 0..side as i64 {
            let x = (center.0 as i64 + col - half).rem_euclid(n);
            tiles.push((col as u32, row as u32, x as u32, y as u32));
        }
    }

    Ok(tiles)
}

#[async_trait]
impl TileProvider for GoogleTileProvider {
    fn source(&self) -> TileSource {
        TileSource::GoogleTile
    }

    async fn fetch(&self, request: &TileRequest) -> Result<RgbImage, TileError> {
        if request.size == 0 {
            return Err(TileError::InvalidRequest("tile size must be > 0".to_string()));
        }

        let side = grid_side(request.size);
        let center = lat_lon_to_tile(request.lat, request.lon, request.zoom);
        let grid = grid_tiles(center, side, request.zoom)?;
        debug!("Stitching {}x{} Google tiles around {:?}", side, side, center);

        let fetched = try_join_all(grid.iter().map(|&(col, row, x, y)| async move {
            self.fetch_tile(x, y, request.zoom)
                .await
                .map(|tile| (col, row, tile))
        }))
        .await?;

        let canvas_size = TILE_PX * side;
        let mut canvas = RgbImage::new(canvas_size, canvas_size);
        for (col, row, tile) in &fetched {
            image::imageops::replace(
                &mut canvas,
                tile,
                (col * TILE_PX) as i64,
                (row * TILE_PX) as i64,
            );
        }

        Ok(center_crop(&canvas, request.size))
    }
}

/// Crop a `size` x `size` square from the middle of `canvas`
pub fn center_crop(canvas: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = canvas.dimensions();
    let size = size.min(width).min(height);
    let x = width / 2 - size / 2;
    let y = height / 2 - size / 2;
    image::imageops::crop_imm(canvas, x, y, size, size).to_image()
}
