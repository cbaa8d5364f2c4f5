//! Image sources and the PNG data-URL codec
//!
//! Templates keep their base image as a data URL; captures may arrive as
//! raw encoded bytes. Both decode to an RGBA buffer.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

/// Upper bound on a single decode
pub const DECODE_TIMEOUT: Duration = Duration::from_secs(5);

/// Image loading and pixel processing failures
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Invalid image data")]
    InvalidData,
    #[error("Failed to load image: {0}")]
    Decode(String),
    #[error("Image loading timeout")]
    Timeout,
    #[error("Failed to encode image: {0}")]
    Encode(String),
    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("Crop region is empty")]
    EmptyCrop,
}

/// An encoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `data:<mime>;base64,<payload>`
    DataUrl(String),
    /// Raw encoded bytes (PNG, JPEG, ...)
    Encoded(Vec<u8>),
}

impl ImageSource {
    /// Read an encoded image file
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(ImageSource::Encoded(std::fs::read(path)?))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ImageSource::DataUrl(url) => url.trim().is_empty(),
            ImageSource::Encoded(bytes) => bytes.is_empty(),
        }
    }

    /// Encoded bytes behind this source
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, ImageError> {
        match self {
            ImageSource::DataUrl(url) => parse_data_url(url).map(Cow::Owned),
            ImageSource::Encoded(bytes) if bytes.is_empty() => Err(ImageError::InvalidData),
            ImageSource::Encoded(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }

    /// Data-URL form, suitable for storing in a template
    pub fn to_data_url(&self) -> Result<String, ImageError> {
        match self {
            ImageSource::DataUrl(url) => Ok(url.clone()),
            ImageSource::Encoded(bytes) => {
                let format = image::guess_format(bytes).map_err(|_| ImageError::InvalidData)?;
                Ok(format!(
                    "data:{};base64,{}",
                    format.to_mime_type(),
                    BASE64.encode(bytes)
                ))
            }
        }
    }
}

impl From<String> for ImageSource {
    fn from(url: String) -> Self {
        ImageSource::DataUrl(url)
    }
}

impl From<&str> for ImageSource {
    fn from(url: &str) -> Self {
        ImageSource::DataUrl(url.to_string())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Encoded(bytes)
    }
}

fn parse_data_url(url: &str) -> Result<Vec<u8>, ImageError> {
    let rest = url.trim().strip_prefix("data:").ok_or(ImageError::InvalidData)?;
    let (header, payload) = rest.split_once(',').ok_or(ImageError::InvalidData)?;
    if !header.ends_with(";base64") || payload.is_empty() {
        return Err(ImageError::InvalidData);
    }
    BASE64.decode(payload).map_err(|_| ImageError::InvalidData)
}

/// Decode synchronously into an RGBA buffer
pub fn decode(source: &ImageSource) -> Result<RgbaImage, ImageError> {
    if source.is_empty() {
        return Err(ImageError::InvalidData);
    }
    let bytes = source.bytes()?;
    let image = image::load_from_memory(&bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    debug!("Decoded {}x{} image", image.width(), image.height());
    Ok(image.to_rgba8())
}

/// Decode off the async runtime, guarded by [`DECODE_TIMEOUT`]
pub async fn load_image(source: &ImageSource) -> Result<RgbaImage, ImageError> {
    load_image_with_timeout(source, DECODE_TIMEOUT).await
}

/// Decode off the async runtime, failing with [`ImageError::Timeout`] if it
/// has not finished within `timeout`
pub async fn load_image_with_timeout(
    source: &ImageSource,
    timeout: Duration,
) -> Result<RgbaImage, ImageError> {
    if source.is_empty() {
        return Err(ImageError::InvalidData);
    }

    let owned = source.clone();
    blocking_with_timeout(timeout, move || decode(&owned)).await
}

/// Run a blocking decode step on the blocking pool under `timeout`
async fn blocking_with_timeout<F>(timeout: Duration, work: F) -> Result<RgbaImage, ImageError>
where
    F: FnOnce() -> Result<RgbaImage, ImageError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(ImageError::Timeout),
        Ok(Err(join_err)) => Err(ImageError::Decode(join_err.to_string())),
        Ok(Ok(result)) => result,
    }
}

/// Encode as PNG bytes
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Encode as a PNG data URL
pub fn to_data_url(image: &RgbaImage) -> Result<ImageSource, ImageError> {
    let png = encode_png(image)?;
    Ok(ImageSource::DataUrl(format!(
        "data:image/png;base64,{}",
        BASE64.encode(png)
    )))
}
