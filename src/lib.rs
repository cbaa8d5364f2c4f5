//! paper-ocr - questionnaire digitization
//!
//! Users mark named regions on a scanned form once (a template), then run
//! OCR over each region of every filled-in copy of that form.

pub mod config;
pub mod editor;
pub mod export;
pub mod recognition;
pub mod region;
pub mod results;
pub mod storage;
pub mod validation;
pub mod vision;

pub use config::AppConfig;
pub use editor::{EditorError, RegionEditor};
pub use recognition::{OcrRegionResult, RecognitionError, RecognitionOrchestrator, RecognitionStatus};
pub use region::{CoordinateMapper, Region, RegionCoordinates};
pub use storage::{Template, TemplateRepository};
