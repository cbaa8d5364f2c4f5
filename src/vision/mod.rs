//! Vision layer
//!
//! Image decoding, preprocessing filters and the OCR engine seam:
//! - `image_data`: data-URL / encoded-bytes codec
//! - `preprocess`: grayscale, contrast, brightness, resize, crop
//! - `ocr`: `OcrEngine` trait and the Tesseract backend

pub mod image_data;
pub mod ocr;
pub mod preprocess;

pub use image_data::{decode, load_image, to_data_url, ImageError, ImageSource};
pub use ocr::{OcrEngine, OcrError, OcrOutput, TesseractEngine};
pub use preprocess::{process_image, PreprocessOptions};
