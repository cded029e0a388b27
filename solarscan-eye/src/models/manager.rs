//! Model manager with auto-download functionality

use crate::error::VisionError;
use sha2::{Digest, Sha256};
use solarscan_core::config::DetectorConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const MAX_MODEL_SIZE: usize = 2_000_000_000; // 2GB max
const DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Makes sure detector weights exist on disk before the model is loaded
pub struct ModelManager {
    model_path: PathBuf,
    model_url: Option<String>,
    checksum: Option<String>,
}

impl ModelManager {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            model_path: config.model_path.clone(),
            model_url: config.model_url.clone(),
            checksum: config.model_checksum.clone(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Ensure the directory holding the weights exists
    pub fn ensure_model_dir(&self) -> Result<PathBuf, VisionError> {
        let dir = match self.model_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!("Created model directory: {:?}", dir);
        }
        Ok(dir)
    }

    /// Return the weights path, downloading from the configured URL when missing
    pub async fn ensure_model(&self) -> Result<PathBuf, VisionError> {
        if self.model_path.is_file() {
            if let Some(expected) = &self.checksum {
                let bytes = fs::read(&self.model_path)?;
                verify_checksum(&bytes, expected)?;
            }
            info!("Model already exists at {:?}", self.model_path);
            return Ok(self.model_path.clone());
        }

        let url = self.model_url.as_deref().ok_or_else(|| {
            VisionError::Model(format!(
                "YOLO weights not found at {} and no download URL configured",
                self.model_path.display()
            ))
        })?;

        self.download(url).await
    }

    /// Download weights from `url` into the configured model path
    pub async fn download(&self, url: &str) -> Result<PathBuf, VisionError> {
        validate_url(url)?;
        validate_file_name(&self.model_path)?;
        self.ensure_model_dir()?;

        info!("Downloading model from {}", url);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(VisionError::Model(format!(
                "Failed to download model: HTTP {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_MODEL_SIZE as u64 {
                return Err(VisionError::Model(format!(
                    "Model too large: {} bytes (max {} bytes)",
                    content_length, MAX_MODEL_SIZE
                )));
            }
        }

        let bytes = response.bytes().await?;
        self.store(&bytes)
    }

    /// Verify and atomically write downloaded weights
    pub fn store(&self, bytes: &[u8]) -> Result<PathBuf, VisionError> {
        if bytes.len() > MAX_MODEL_SIZE {
            return Err(VisionError::Model(format!(
                "Downloaded model too large: {} bytes (max {} bytes)",
                bytes.len(),
                MAX_MODEL_SIZE
            )));
        }

        // Minimum size check (prevent empty/corrupted files)
        if bytes.len() < 1024 {
            return Err(VisionError::Model(
                "Downloaded file too small, likely corrupted".to_string(),
            ));
        }

        match &self.checksum {
            Some(expected) => {
                verify_checksum(bytes, expected)?;
                info!("Verified checksum for {:?}", self.model_path);
            }
            None => warn!(
                "Downloaded {} bytes without checksum verification",
                bytes.len()
            ),
        }

        self.ensure_model_dir()?;
        let temp_path = self.model_path.with_extension("onnx.tmp");
        fs::write(&temp_path, bytes)?;
        if let Err(e) = fs::rename(&temp_path, &self.model_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(VisionError::Io(e));
        }

        info!("Model saved to {:?}", self.model_path);
        Ok(self.model_path.clone())
    }
}

fn validate_url(url: &str) -> Result<(), VisionError> {
    if url.is_empty() || url.len() > 2048 {
        return Err(VisionError::Model("Invalid URL".to_string()));
    }
    if !url.starts_with("https://") {
        return Err(VisionError::Model(
            "Only HTTPS URLs are allowed for model downloads".to_string(),
        ));
    }
    Ok(())
}

fn validate_file_name(path: &Path) -> Result<(), VisionError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| VisionError::Model("Invalid model file name".to_string()))?;
    if name.is_empty() || name.len() > 255 || name.contains("..") {
        return Err(VisionError::Model("Invalid model file name".to_string()));
    }
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn verify_checksum(bytes: &[u8], expected: &str) -> Result<(), VisionError> {
    let computed = sha256_hex(bytes);
    if !computed.eq_ignore_ascii_case(expected.trim()) {
        return Err(VisionError::Model(format!(
            "Checksum mismatch: expected {}, got {}",
            expected, computed
        )));
    }
    Ok(())
}
