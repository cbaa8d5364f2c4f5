//! Application Configuration
//!
//! User settings stored in TOML format. Every section falls back to its
//! defaults, so a partial file is valid.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::export::OutputFormat;
use crate::vision::PreprocessOptions;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Region editor settings
    pub editor: EditorConfig,
    /// OCR engine settings
    pub ocr: OcrConfig,
    /// Preprocessing applied before recognition
    pub preprocessing: PreprocessingConfig,
    /// Template storage settings
    pub storage: StorageConfig,
    /// Result export settings
    pub export: ExportConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory override (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: "info".to_string(),
        }
    }
}

/// Region editor limits and hit-test sizes (canvas pixels)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum regions per template
    pub max_regions: usize,
    /// Smallest width/height a region can be drawn or resized to
    pub min_region_size: f32,
    /// Pointer travel needed before a drag creates a region
    pub min_drag_distance: f32,
    /// Side of the square resize handles
    pub handle_size: f32,
    /// Side of the square around each handle that accepts a press
    pub handle_hit_area: f32,
    /// Canvas size the base image is fitted into
    pub max_canvas_width: u32,
    pub max_canvas_height: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_regions: 20,
            min_region_size: 10.0,
            min_drag_distance: 5.0,
            handle_size: 8.0,
            handle_hit_area: 12.0,
            max_canvas_width: 800,
            max_canvas_height: 600,
        }
    }
}

/// OCR engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code(s), e.g. "jpn" or "jpn+eng"
    pub language: String,
    /// Tesseract executable
    pub tesseract_path: String,
    /// Page segmentation mode passed as `--psm`
    pub psm: Option<u32>,
    /// Per-region recognition timeout
    pub timeout_ms: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "jpn".to_string(),
            tesseract_path: "tesseract".to_string(),
            psm: None,
            timeout_ms: 20_000,
        }
    }
}

/// Preprocessing applied to the whole image before regions are cropped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub enabled: bool,
    pub grayscale: bool,
    pub contrast: Option<f32>,
    pub brightness: Option<f32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        let options = PreprocessOptions::document();
        Self {
            enabled: true,
            grayscale: options.grayscale,
            contrast: options.contrast,
            brightness: options.brightness,
            width: options.width,
            height: options.height,
        }
    }
}

impl PreprocessingConfig {
    /// Pipeline options, or `None` when preprocessing is disabled
    pub fn options(&self) -> Option<PreprocessOptions> {
        if !self.enabled {
            return None;
        }
        Some(PreprocessOptions {
            width: self.width,
            height: self.height,
            grayscale: self.grayscale,
            contrast: self.contrast,
            brightness: self.brightness,
        })
    }
}

/// Key-value backend holding the template list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per key under the data directory
    #[default]
    Json,
    /// SQLite database in the data directory
    Sqlite,
}

/// Template storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Key the template list is stored under
    pub template_key: String,
    /// Maximum number of saved templates
    pub max_templates: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            template_key: "paper-ocr-templates".to_string(),
            max_templates: 20,
        }
    }
}

/// Result export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Default output format
    pub format: OutputFormat,
    /// Command that receives clipboard text on stdin
    pub clipboard_command: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            clipboard_command: default_clipboard_command(),
        }
    }
}

fn default_clipboard_command() -> Vec<String> {
    let parts: &[&str] = if cfg!(target_os = "macos") {
        &["pbcopy"]
    } else if cfg!(target_os = "windows") {
        &["clip"]
    } else {
        &["xclip", "-selection", "clipboard"]
    };
    parts.iter().map(|s| s.to_string()).collect()
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Path of `config.toml` in the platform config directory
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::storage::get_config_dir()?.join("config.toml"))
}
