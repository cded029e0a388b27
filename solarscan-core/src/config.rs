// Configuration for the SolarScan service, CLI and batch runner

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub bind_port: u16,
    /// Directory where tile and overlay images are written and served from
    pub outputs_dir: PathBuf,
    /// Newest images kept in `outputs_dir`; 0 keeps everything
    pub max_output_files: usize,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 5000,
            outputs_dir: PathBuf::from("static/outputs"),
            max_output_files: 500,
            enable_cors: false,
        }
    }
}

/// Imagery provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    pub zoom: u8,
    /// Tile edge in pixels for single web queries
    pub tile_size: u32,
    /// Tile edge in pixels for batch runs
    pub batch_tile_size: u32,
    pub timeout_secs: u64,
    pub attempts_per_provider: u32,
    pub retry_backoff_ms: u64,
    pub esri_url: String,
    /// Google raster tile URL with `{x}`, `{y}` and `{z}` placeholders
    pub google_url_template: String,
    pub enable_fallback: bool,
    pub user_agent: String,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            zoom: 19,
            tile_size: 640,
            batch_tile_size: 1024,
            timeout_secs: 15,
            attempts_per_provider: 1,
            retry_backoff_ms: 250,
            esri_url: "https://services.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/export".to_string(),
            google_url_template: "https://mt1.google.com/vt/lyrs=s&x={x}&y={y}&z={z}".to_string(),
            enable_fallback: true,
            user_agent: concat!("solarscan/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TileConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// YOLO detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// ONNX weights exported from the trained detector
    pub model_path: PathBuf,
    /// Optional HTTPS location to fetch the weights from when missing
    pub model_url: Option<String>,
    /// Optional SHA-256 of the weights file
    pub model_checksum: Option<String>,
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/solar_detector.onnx"),
            model_url: None,
            model_checksum: None,
            input_size: 640,
            conf_threshold: 0.30,
            iou_threshold: 0.45,
            max_detections: 100,
            intra_threads: 4,
        }
    }
}

/// Batch runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub predictions_file: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("batch_outputs"),
            concurrency: 1,
            predictions_file: "predictions.json".to_string(),
        }
    }
}

/// Output record shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Minimum confidence for `VERIFIABLE`
    pub qc_threshold: f64,
    pub buffer_radius_sqft: u32,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            qc_threshold: 0.35,
            buffer_radius_sqft: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete SolarScan configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarScanConfig {
    pub server: ServerConfig,
    pub tiles: TileConfig,
    pub detector: DetectorConfig,
    pub batch: BatchConfig,
    pub record: RecordConfig,
    pub logging: LoggingConfig,
}

impl SolarScanConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("json") => serde_json::from_str(&content).map_err(|e| Error::Parse(e.to_string())),
            Some("toml") => toml::from_str(&content).map_err(|e| Error::Parse(e.to_string())),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| Error::Parse(e.to_string()))
            }
            _ => Self::from_str(&content),
        }
    }

    /// Load configuration from a string of unknown format
    pub fn from_str(content: &str) -> Result<Self, Error> {
        // Try JSON first
        if let Ok(config) = serde_json::from_str::<SolarScanConfig>(content) {
            return Ok(config);
        }

        // Try TOML
        if let Ok(config) = toml::from_str::<SolarScanConfig>(content) {
            return Ok(config);
        }

        // Try YAML
        if let Ok(config) = serde_yaml::from_str::<SolarScanConfig>(content) {
            return Ok(config);
        }

        Err(Error::Parse("Unknown configuration format".to_string()))
    }

    /// Defaults overlaid with `SOLARSCAN_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `SOLARSCAN_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("SOLARSCAN_HOST") {
            self.server.bind_address = host;
        }

        if let Some(port) = lookup("SOLARSCAN_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.bind_port = port;
        }

        if let Some(dir) = lookup("SOLARSCAN_OUTPUTS_DIR") {
            self.server.outputs_dir = PathBuf::from(dir);
        }

        if let Some(model) = lookup("SOLARSCAN_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(model);
        }

        if let Some(url) = lookup("SOLARSCAN_MODEL_URL") {
            self.detector.model_url = Some(url);
        }

        if let Some(checksum) = lookup("SOLARSCAN_MODEL_CHECKSUM") {
            self.detector.model_checksum = Some(checksum);
        }

        if let Some(zoom) = lookup("SOLARSCAN_ZOOM").and_then(|z| z.parse::<u8>().ok()) {
            self.tiles.zoom = zoom;
        }

        if let Some(level) = lookup("SOLARSCAN_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Error> {
        if self.server.bind_port == 0 {
            return Err(Error::Configuration("server.bind_port cannot be 0".to_string()));
        }

        if self.server.max_output_files == 1 {
            return Err(Error::Configuration(
                "server.max_output_files must be 0 (unlimited) or at least 2".to_string(),
            ));
        }

        if self.tiles.zoom == 0 || self.tiles.zoom > 22 {
            return Err(Error::Configuration("tiles.zoom must be between 1 and 22".to_string()));
        }

        for (name, size) in [
            ("tiles.tile_size", self.tiles.tile_size),
            ("tiles.batch_tile_size", self.tiles.batch_tile_size),
        ] {
            if !(64..=4096).contains(&size) {
                return Err(Error::Configuration(format!(
                    "{} must be between 64 and 4096, got {}",
                    name, size
                )));
            }
        }

        if self.tiles.attempts_per_provider == 0 {
            return Err(Error::Configuration(
                "tiles.attempts_per_provider must be at least 1".to_string(),
            ));
        }

        if self.tiles.timeout_secs == 0 {
            return Err(Error::Configuration("tiles.timeout_secs must be > 0".to_string()));
        }

        if !self.tiles.google_url_template.contains("{x}")
            || !self.tiles.google_url_template.contains("{y}")
            || !self.tiles.google_url_template.contains("{z}")
        {
            return Err(Error::Configuration(
                "tiles.google_url_template needs {x}, {y} and {z} placeholders".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.conf_threshold) {
            return Err(Error::Configuration(
                "detector.conf_threshold must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(Error::Configuration(
                "detector.iou_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.detector.input_size < 32 || self.detector.input_size % 32 != 0 {
            return Err(Error::Configuration(
                "detector.input_size must be a positive multiple of 32".to_string(),
            ));
        }

        if self.detector.max_detections == 0 {
            return Err(Error::Configuration("detector.max_detections must be > 0".to_string()));
        }

        if let Some(url) = &self.detector.model_url {
            if !url.starts_with("https://") {
                return Err(Error::Configuration(
                    "detector.model_url must be an HTTPS URL".to_string(),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.record.qc_threshold) {
            return Err(Error::Configuration(
                "record.qc_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.batch.concurrency == 0 {
            return Err(Error::Configuration("batch.concurrency must be at least 1".to_string()));
        }

        if self.batch.predictions_file.is_empty()
            || self.batch.predictions_file.contains('/')
            || self.batch.predictions_file.contains('\\')
        {
            return Err(Error::Configuration(
                "batch.predictions_file must be a plain file name".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = SolarScanConfig::default();
        assert_eq!(config.server.bind_port, 5000);
        assert_eq!(config.tiles.zoom, 19);
        assert_eq!(config.tiles.tile_size, 640);
        assert_eq!(config.tiles.batch_tile_size, 1024);
        assert_eq!(config.detector.conf_threshold, 0.30);
        assert_eq!(config.record.qc_threshold, 0.35);
        assert_eq!(config.record.buffer_radius_sqft, 1200);
        assert!(config.tiles.enable_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json_partial() {
        let config = SolarScanConfig::from_str(r#"{"tiles": {"zoom": 18}}"#).unwrap();
        assert_eq!(config.tiles.zoom, 18);
        assert_eq!(config.tiles.tile_size, 640);
        assert_eq!(config.server.bind_port, 5000);
    }

    #[test]
    fn test_config_from_toml() {
        let content = r#"
            [server]
            bind_port = 8080

            [detector]
            conf_threshold = 0.25
        "#;
        let config = SolarScanConfig::from_str(content).unwrap();
        assert_eq!(config.server.bind_port, 8080);
        assert_eq!(config.detector.conf_threshold, 0.25);
    }

    #[test]
    fn test_config_from_yaml() {
        let content = "batch:\n  concurrency: 4\n  output_dir: out\n";
        let config = SolarScanConfig::from_str(content).unwrap();
        assert_eq!(config.batch.concurrency, 4);
        assert_eq!(config.batch.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_config_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solarscan.toml");
        std::fs::write(&path, "[tiles]\nzoom = 17\n").unwrap();
        let config = SolarScanConfig::from_file(&path).unwrap();
        assert_eq!(config.tiles.zoom, 17);

        let missing = SolarScanConfig::from_file(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_config_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("SOLARSCAN_PORT", "9000"),
            ("SOLARSCAN_HOST", "0.0.0.0"),
            ("SOLARSCAN_ZOOM", "not-a-number"),
            ("SOLARSCAN_MODEL_PATH", "/models/best.onnx"),
            ("SOLARSCAN_MODEL_URL", "https://models.invalid/best.onnx"),
        ]
        .into_iter()
        .collect();

        let mut config = SolarScanConfig::default();
        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.bind_port, 9000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.tiles.zoom, 19);
        assert_eq!(config.detector.model_path, PathBuf::from("/models/best.onnx"));
        assert_eq!(config.detector.model_url.as_deref(), Some("https://models.invalid/best.onnx"));
        assert_eq!(config.detector.model_checksum, None);
    }

    #[test]
    fn test_config_validation_output_retention() {
        let mut config = SolarScanConfig::default();
        config.server.max_output_files = 1;
        assert!(config.validate().is_err());
        config.server.max_output_files = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zoom() {
        let mut config = SolarScanConfig::default();
        config.tiles.zoom = 0;
        assert!(config.validate().is_err());
        config.tiles.zoom = 23;
        assert!(config.validate().is_err());
        config.tiles.zoom = 22;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_tile_size() {
        let mut config = SolarScanConfig::default();
        config.tiles.tile_size = 32;
        assert!(config.validate().is_err());
        config.tiles.tile_size = 640;
        config.tiles.batch_tile_size = 8192;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_thresholds() {
        let mut config = SolarScanConfig::default();
        config.detector.conf_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = SolarScanConfig::default();
        config.record.qc_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_google_template() {
        let mut config = SolarScanConfig::default();
        config.tiles.google_url_template = "https://example.com/tile".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_model_url_https_only() {
        let mut config = SolarScanConfig::default();
        config.detector.model_url = Some("http://example.com/best.onnx".to_string());
        assert!(config.validate().is_err());
        config.detector.model_url = Some("https://example.com/best.onnx".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_batch() {
        let mut config = SolarScanConfig::default();
        config.batch.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = SolarScanConfig::default();
        config.batch.predictions_file = "../out.json".to_string();
        assert!(config.validate().is_err());
    }
}
