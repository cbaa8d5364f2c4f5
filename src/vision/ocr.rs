//! OCR engine seam
//!
//! The recognition orchestrator only talks to [`OcrEngine`]. The shipped
//! backend drives the Tesseract CLI and parses its TSV output.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::image_data::{ImageError, ImageSource};
use crate::config::OcrConfig;

/// Text recognized in one image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrOutput {
    /// Recognized text, lines separated by `\n`
    pub text: String,
    /// Mean word confidence (0-100)
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image is empty or unreadable")]
    InvalidImage,
    #[error("Language data unavailable: {0}")]
    LanguageData(String),
    #[error("OCR engine failed: {0}")]
    Engine(String),
    #[error("OCR timed out after {0} ms")]
    Timeout(u64),
    #[error("Failed to run OCR engine: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Something that turns an image into text
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    async fn recognize(&self, image: &ImageSource) -> Result<OcrOutput, OcrError>;
}

/// Tesseract CLI backend (`tesseract stdin stdout -l <lang> tsv`)
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    language: String,
    psm: Option<u32>,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
            psm: None,
            timeout: Duration::from_millis(OcrConfig::default().timeout_ms),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
            psm: config.psm,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Languages the installed Tesseract has data for
    pub async fn available_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = Command::new(&self.binary).arg("--list-langs").output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(stderr.trim().to_string()));
        }

        // First line is a "List of available languages" header
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .skip(1)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn run(&self, bytes: &[u8]) -> Result<String, OcrError> {
        let mut command = Command::new(&self.binary);
        command.arg("stdin").arg("stdout").arg("-l").arg(&self.language);
        if let Some(psm) = self.psm {
            command.arg("--psm").arg(psm.to_string());
        }
        command
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(bytes).await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| OcrError::Timeout(self.timeout.as_millis() as u64))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("Failed loading language") {
                return Err(OcrError::LanguageData(self.language.clone()));
            }
            return Err(OcrError::Engine(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &ImageSource) -> Result<OcrOutput, OcrError> {
        if image.is_empty() {
            return Err(OcrError::InvalidImage);
        }
        let bytes = image.bytes().map_err(|_| OcrError::InvalidImage)?;

        debug!("Running tesseract ({}) on {} bytes", self.language, bytes.len());
        let tsv = self.run(&bytes).await?;
        let output = parse_tsv(&tsv);
        if output.text.is_empty() {
            warn!("Tesseract returned no text");
        }
        Ok(output)
    }
}

/// Parse Tesseract TSV: word rows (level 5) with non-negative confidence are
/// grouped into lines; confidence is the mean over those words.
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut lines: BTreeMap<(i32, i32, i32, i32), Vec<&str>> = BTreeMap::new();
    let mut conf_sum = 0.0f32;
    let mut words = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        lines.entry(key).or_default().push(text);
        conf_sum += conf;
        words += 1;
    }

    let text = lines
        .values()
        .map(|tokens| join_words(tokens))
        .collect::<Vec<_>>()
        .join("\n");

    OcrOutput {
        text,
        confidence: if words == 0 { 0.0 } else { conf_sum / words as f32 },
    }
}

/// Join word tokens, without spaces between non-ASCII scripts (CJK text
/// comes back one glyph per word)
fn join_words(tokens: &[&str]) -> String {
    let mut line = String::new();
    for token in tokens {
        let glued = match (line.chars().last(), token.chars().next()) {
            (Some(prev), Some(next)) => !prev.is_ascii() && !next.is_ascii(),
            _ => true,
        };
        if !glued {
            line.push(' ');
        }
        line.push_str(token);
    }
    line
}
