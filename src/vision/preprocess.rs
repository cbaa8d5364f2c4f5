//! Image preprocessing filters for OCR
//!
//! Buffer-level filters work in place on RGBA data. The async wrappers take
//! an [`ImageSource`], decode it, apply one step and re-encode to a PNG data
//! URL.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::image_data::{load_image, to_data_url, ImageError, ImageSource};
use crate::region::RegionCoordinates;

/// Preprocessing pipeline settings. The default is the identity pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Target width (resize only applies when both width and height are set)
    pub width: Option<u32>,
    /// Target height
    pub height: Option<u32>,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Contrast factor (1.0 = unchanged)
    pub contrast: Option<f32>,
    /// Brightness offset (0 = unchanged)
    pub brightness: Option<f32>,
}

impl PreprocessOptions {
    /// The usual settings for scanned paper: grayscale plus a contrast boost
    pub fn document() -> Self {
        Self {
            grayscale: true,
            contrast: Some(1.5),
            ..Default::default()
        }
    }

    fn resize_target(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }

    fn contrast_factor(&self) -> Option<f32> {
        self.contrast.filter(|c| *c != 1.0)
    }

    fn brightness_offset(&self) -> Option<f32> {
        self.brightness.filter(|b| *b != 0.0)
    }

    /// True when applying these options would not touch any pixel
    pub fn is_identity(&self) -> bool {
        self.resize_target().is_none()
            && !self.grayscale
            && self.contrast_factor().is_none()
            && self.brightness_offset().is_none()
    }
}

/// Convert RGBA to grayscale (keeping RGBA format)
pub fn apply_grayscale(data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(4) {
        let gray = (0.299 * chunk[0] as f32 + 0.587 * chunk[1] as f32 + 0.114 * chunk[2] as f32)
            .round()
            .clamp(0.0, 255.0) as u8;
        chunk[0] = gray;
        chunk[1] = gray;
        chunk[2] = gray;
        // Alpha unchanged
    }
}

/// Contrast around the midpoint (128). Factor is clamped to [0, 3].
pub fn apply_contrast(data: &mut [u8], factor: f32) {
    let factor = factor.clamp(0.0, 3.0);
    for chunk in data.chunks_exact_mut(4) {
        for value in chunk.iter_mut().take(3) {
            let adjusted = ((*value as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0);
            *value = adjusted.round() as u8;
        }
    }
}

/// Add a constant to every color channel. Offset is clamped to [-255, 255].
pub fn apply_brightness(data: &mut [u8], offset: f32) {
    let offset = offset.clamp(-255.0, 255.0);
    for chunk in data.chunks_exact_mut(4) {
        for value in chunk.iter_mut().take(3) {
            *value = (*value as f32 + offset).clamp(0.0, 255.0).round() as u8;
        }
    }
}

/// Resize to an exact size. Aspect ratio is not preserved.
pub fn resize(image: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage, ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidDimensions { width, height });
    }
    Ok(imageops::resize(image, width, height, FilterType::Triangle))
}

/// Crop a unit-square area. The origin is clamped into the image and the
/// size is cut at the right/bottom edges.
pub fn crop(image: &RgbaImage, area: &RegionCoordinates) -> Result<RgbaImage, ImageError> {
    let (img_w, img_h) = image.dimensions();

    let x = area.x.clamp(0.0, 1.0);
    let y = area.y.clamp(0.0, 1.0);
    let w = area.width.min(1.0 - x).max(0.0);
    let h = area.height.min(1.0 - y).max(0.0);

    let px = ((x * img_w as f32).floor() as u32).min(img_w);
    let py = ((y * img_h as f32).floor() as u32).min(img_h);
    let pw = ((w * img_w as f32).round() as u32).min(img_w - px);
    let ph = ((h * img_h as f32).round() as u32).min(img_h - py);

    if pw == 0 || ph == 0 {
        return Err(ImageError::EmptyCrop);
    }

    Ok(imageops::crop_imm(image, px, py, pw, ph).to_image())
}

/// Run the full pipeline: resize, grayscale, contrast, brightness
pub fn apply_options(image: RgbaImage, options: &PreprocessOptions) -> Result<RgbaImage, ImageError> {
    debug!(
        "Preprocessing {}x{}: resize={:?}, grayscale={}, contrast={:?}, brightness={:?}",
        image.width(),
        image.height(),
        options.resize_target(),
        options.grayscale,
        options.contrast,
        options.brightness
    );

    let mut result = match options.resize_target() {
        Some((w, h)) => resize(&image, w, h)?,
        None => image,
    };

    if options.grayscale {
        apply_grayscale(&mut result);
    }

    if let Some(factor) = options.contrast_factor() {
        apply_contrast(&mut result, factor);
    }

    if let Some(offset) = options.brightness_offset() {
        apply_brightness(&mut result, offset);
    }

    Ok(result)
}

pub async fn resize_image(source: &ImageSource, width: u32, height: u32) -> Result<ImageSource, ImageError> {
    let image = load_image(source).await?;
    to_data_url(&resize(&image, width, height)?)
}

pub async fn to_grayscale(source: &ImageSource) -> Result<ImageSource, ImageError> {
    let mut image = load_image(source).await?;
    apply_grayscale(&mut image);
    to_data_url(&image)
}

pub async fn adjust_contrast(source: &ImageSource, factor: f32) -> Result<ImageSource, ImageError> {
    let mut image = load_image(source).await?;
    apply_contrast(&mut image, factor);
    to_data_url(&image)
}

pub async fn adjust_brightness(source: &ImageSource, offset: f32) -> Result<ImageSource, ImageError> {
    let mut image = load_image(source).await?;
    apply_brightness(&mut image, offset);
    to_data_url(&image)
}

pub async fn crop_region(source: &ImageSource, area: &RegionCoordinates) -> Result<ImageSource, ImageError> {
    let image = load_image(source).await?;
    to_data_url(&crop(&image, area)?)
}

/// Decode once, run the pipeline, encode once
pub async fn process_image(source: &ImageSource, options: &PreprocessOptions) -> Result<ImageSource, ImageError> {
    let image = load_image(source).await?;
    to_data_url(&apply_options(image, options)?)
}

/// Crop every area out of one decode of `source`, in input order
pub async fn extract_regions(
    source: &ImageSource,
    areas: &[RegionCoordinates],
) -> Result<Vec<ImageSource>, ImageError> {
    let image = load_image(source).await?;
    areas
        .iter()
        .map(|area| crop(&image, area).and_then(|c| to_data_url(&c)))
        .collect()
}

pub async fn image_dimensions(source: &ImageSource) -> Result<(u32, u32), ImageError> {
    Ok(load_image(source).await?.dimensions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::image_data::decode;
    use image::Rgba;

    #[test]
    fn test_contrast_increase() {
        let mut data = vec![100, 128, 200, 255];
        apply_contrast(&mut data, 2.0);
        // 100: (100-128)*2+128 = 72
        // 200: (200-128)*2+128 = 272 -> clamped to 255
        assert_eq!(data, vec![72, 128, 255, 255]);
    }

    #[test]
    fn test_contrast_factor_clamped() {
        let mut a = vec![100, 150, 0, 255];
        let mut b = a.clone();
        apply_contrast(&mut a, 10.0);
        apply_contrast(&mut b, 3.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_grayscale() {
        let mut data = vec![255, 0, 0, 255]; // Red pixel
        apply_grayscale(&mut data);
        // Gray = 0.299*255 = 76.245 ≈ 76
        assert_eq!(data, vec![76, 76, 76, 255]);
    }

    #[test]
    fn test_grayscale_idempotent() {
        let mut data: Vec<u8> = (0..=255u8)
            .flat_map(|v| [v, v.wrapping_mul(7), v.wrapping_add(90), 200])
            .collect();
        apply_grayscale(&mut data);
        let once = data.clone();
        apply_grayscale(&mut data);
        assert_eq!(data, once);
    }

    #[test]
    fn test_brightness() {
        let mut data = vec![10, 128, 250, 100];
        apply_brightness(&mut data, 20.0);
        assert_eq!(data, vec![30, 148, 255, 100]);

        apply_brightness(&mut data, -1000.0);
        assert_eq!(data, vec![0, 0, 0, 100]);
    }

    #[test]
    fn test_crop_clamps_to_image() {
        let image = RgbaImage::new(100, 50);

        let cropped = crop(&image, &RegionCoordinates::new(0.9, 0.5, 0.5, 0.2)).unwrap();
        assert_eq!(cropped.dimensions(), (10, 10));

        let cropped = crop(&image, &RegionCoordinates::new(-0.5, 0.0, 0.25, 1.0)).unwrap();
        assert_eq!(cropped.dimensions(), (25, 50));
    }

    #[test]
    fn test_crop_empty() {
        let image = RgbaImage::new(100, 50);
        assert!(matches!(
            crop(&image, &RegionCoordinates::new(1.0, 0.0, 0.5, 0.5)),
            Err(ImageError::EmptyCrop)
        ));
        assert!(matches!(
            crop(&image, &RegionCoordinates::new(0.2, 0.2, 0.0, 0.5)),
            Err(ImageError::EmptyCrop)
        ));
    }

    #[test]
    fn test_resize_exact() {
        let image = RgbaImage::new(40, 10);
        assert_eq!(resize(&image, 5, 5).unwrap().dimensions(), (5, 5));
        assert!(matches!(
            resize(&image, 0, 5),
            Err(ImageError::InvalidDimensions { width: 0, height: 5 })
        ));
    }

    #[test]
    fn test_resize_needs_both_dimensions() {
        let image = RgbaImage::new(40, 10);
        let options = PreprocessOptions {
            width: Some(20),
            ..Default::default()
        };
        assert!(options.is_identity());
        assert_eq!(apply_options(image, &options).unwrap().dimensions(), (40, 10));
    }

    #[test]
    fn test_pipeline_order() {
        // Grayscale runs before contrast: red -> 76 -> (76-128)*2+128 = 24
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let options = PreprocessOptions {
            grayscale: true,
            contrast: Some(2.0),
            brightness: Some(10.0),
            ..Default::default()
        };
        let result = apply_options(image, &options).unwrap();
        assert_eq!(result.get_pixel(1, 1), &Rgba([34, 34, 34, 255]));
    }

    #[test]
    fn test_document_defaults() {
        let options = PreprocessOptions::document();
        assert!(options.grayscale);
        assert_eq!(options.contrast, Some(1.5));
        assert!(!options.is_identity());
        assert!(PreprocessOptions::default().is_identity());
    }

    #[tokio::test]
    async fn test_process_image_data_url() {
        let source = to_data_url(&RgbaImage::from_pixel(8, 4, Rgba([255, 0, 0, 255]))).unwrap();
        let options = PreprocessOptions {
            width: Some(4),
            height: Some(2),
            grayscale: true,
            ..Default::default()
        };

        let processed = process_image(&source, &options).await.unwrap();
        let image = decode(&processed).unwrap();
        assert_eq!(image.dimensions(), (4, 2));
        assert_eq!(image.get_pixel(0, 0), &Rgba([76, 76, 76, 255]));
    }

    #[tokio::test]
    async fn test_extract_regions_in_order() {
        let source = to_data_url(&RgbaImage::new(200, 100)).unwrap();
        let areas = [
            RegionCoordinates::new(0.0, 0.0, 0.5, 0.5),
            RegionCoordinates::new(0.5, 0.5, 0.1, 0.2),
        ];

        let crops = extract_regions(&source, &areas).await.unwrap();
        let dims: Vec<_> = crops.iter().map(|c| decode(c).unwrap().dimensions()).collect();
        assert_eq!(dims, vec![(100, 50), (20, 20)]);

        assert_eq!(image_dimensions(&source).await.unwrap(), (200, 100));
    }

    #[tokio::test]
    async fn test_invalid_source() {
        let result = to_grayscale(&ImageSource::from("")).await;
        assert!(matches!(result, Err(ImageError::InvalidData)));
    }
}
