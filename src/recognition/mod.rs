//! Recognition orchestration
//!
//! Runs an [`OcrEngine`] over every region of a captured image, one region
//! at a time, publishing progress on a watch channel. Only one run may be in
//! flight per orchestrator; a run can be cancelled between region calls, and
//! a region already handed to the engine is always allowed to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::region::{Region, RegionCoordinates};
use crate::vision::image_data::{load_image, to_data_url, ImageError, ImageSource};
use crate::vision::ocr::{OcrEngine, OcrError};
use crate::vision::preprocess::{apply_options, crop, PreprocessOptions};

/// Id of the implicit region used when a template has no regions
pub const FULL_IMAGE_ID: &str = "full";
/// Name of the implicit whole-image region
pub const FULL_IMAGE_NAME: &str = "Full Image";

/// Recognized text for one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrRegionResult {
    pub region_id: String,
    pub region_name: String,
    pub text: String,
    /// Engine confidence (0-100)
    pub confidence: f32,
    /// Wall-clock time spent on this region
    #[serde(rename = "processingTime")]
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognitionPhase {
    #[default]
    Idle,
    Processing,
}

/// Observable orchestrator state
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionStatus {
    pub phase: RecognitionPhase,
    /// 0.0 - 1.0
    pub progress: f32,
    pub message: String,
    /// Results of the last successful run
    pub results: Vec<OcrRegionResult>,
    pub error: Option<String>,
}

impl Default for RecognitionStatus {
    fn default() -> Self {
        Self {
            phase: RecognitionPhase::Idle,
            progress: 0.0,
            message: "Ready".to_string(),
            results: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("OCR processing already in progress")]
    AlreadyRunning,
    #[error("Invalid image data")]
    InvalidImage,
    #[error("Failed to load image: {0}")]
    Image(#[source] ImageError),
    #[error("Preprocessing failed: {0}")]
    Preprocess(#[source] ImageError),
    #[error("Failed to crop region '{region}': {source}")]
    Crop {
        region: String,
        #[source]
        source: ImageError,
    },
    #[error("Recognition failed for region '{region}': {source}")]
    Region {
        region: String,
        #[source]
        source: OcrError,
    },
    #[error("Processing cancelled")]
    Cancelled,
}

/// Clears the single-flight flag however the run ends. A run whose future
/// is dropped mid-flight leaves the status Idle, not Processing.
struct RunGuard<'a>(&'a RecognitionOrchestrator);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.0.cancel.lock() = None;
        self.0.status.send_if_modified(|s| {
            if s.phase != RecognitionPhase::Processing {
                return false;
            }
            s.phase = RecognitionPhase::Idle;
            s.progress = 0.0;
            s.message = "Processing cancelled".to_string();
            true
        });
        self.0.running.store(false, Ordering::Release);
    }
}

/// Sequential per-region OCR with progress and cancellation
pub struct RecognitionOrchestrator {
    engine: Arc<dyn OcrEngine>,
    preprocessing: Option<PreprocessOptions>,
    status: watch::Sender<RecognitionStatus>,
    cancel: Mutex<Option<CancellationToken>>,
    running: AtomicBool,
}

impl RecognitionOrchestrator {
    /// `preprocessing` is applied to the whole image before cropping;
    /// `None` skips the step.
    pub fn new(engine: Arc<dyn OcrEngine>, preprocessing: Option<PreprocessOptions>) -> Self {
        let (status, _) = watch::channel(RecognitionStatus::default());
        Self {
            engine,
            preprocessing,
            status,
            cancel: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> RecognitionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecognitionStatus> {
        self.status.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request cancellation of the active run, if any
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.lock().as_ref() {
            info!("Cancelling OCR run");
            token.cancel();
        }
    }

    /// Cancel any active run and return to the Ready status
    pub fn reset(&self) {
        self.cancel();
        self.status.send_replace(RecognitionStatus::default());
    }

    /// Recognize every region of `image`, in list order. With no regions the
    /// whole image is recognized as a single "Full Image" region.
    pub async fn process(
        &self,
        image: &ImageSource,
        regions: Option<&[Region]>,
    ) -> Result<Vec<OcrRegionResult>, RecognitionError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(RecognitionError::AlreadyRunning);
        }
        let _guard = RunGuard(self);

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        self.status.send_modify(|s| {
            s.phase = RecognitionPhase::Processing;
            s.progress = 0.0;
            s.message = "Starting OCR processing...".to_string();
            s.error = None;
        });

        let outcome = self.run(image, regions, &token).await;
        *self.cancel.lock() = None;

        match &outcome {
            Ok(results) => {
                info!("OCR complete: {} regions", results.len());
                let results = results.clone();
                self.status.send_modify(|s| {
                    s.phase = RecognitionPhase::Idle;
                    s.progress = 1.0;
                    s.message = "Processing complete".to_string();
                    s.results = results;
                });
            }
            Err(RecognitionError::Cancelled) => {
                info!("OCR run cancelled");
                self.status.send_modify(|s| {
                    s.phase = RecognitionPhase::Idle;
                    s.progress = 0.0;
                    s.message = "Processing cancelled".to_string();
                });
            }
            Err(e) => {
                warn!("OCR run failed: {}", e);
                let message = e.to_string();
                self.status.send_modify(|s| {
                    s.phase = RecognitionPhase::Idle;
                    s.message = format!("Error: {message}");
                    s.error = Some(message);
                });
            }
        }

        outcome
    }

    async fn run(
        &self,
        image: &ImageSource,
        regions: Option<&[Region]>,
        token: &CancellationToken,
    ) -> Result<Vec<OcrRegionResult>, RecognitionError> {
        if image.is_empty() {
            return Err(RecognitionError::InvalidImage);
        }

        let decoded = match &self.preprocessing {
            Some(options) => {
                self.set_message("Preprocessing image...");
                let decoded = load_image(image).await.map_err(RecognitionError::Preprocess)?;
                apply_options(decoded, options).map_err(RecognitionError::Preprocess)?
            }
            None => load_image(image).await.map_err(|e| match e {
                ImageError::InvalidData => RecognitionError::InvalidImage,
                other => RecognitionError::Image(other),
            })?,
        };

        let targets: Vec<(String, String, RegionCoordinates)> = match regions {
            Some(list) if !list.is_empty() => list
                .iter()
                .map(|r| (r.id.clone(), r.name.clone(), r.coordinates))
                .collect(),
            _ => vec![(
                FULL_IMAGE_ID.to_string(),
                FULL_IMAGE_NAME.to_string(),
                RegionCoordinates::full(),
            )],
        };

        let total = targets.len();
        let mut results = Vec::with_capacity(total);

        for (idx, (id, name, coords)) in targets.into_iter().enumerate() {
            if token.is_cancelled() {
                return Err(RecognitionError::Cancelled);
            }

            self.status.send_modify(|s| {
                s.message = format!("Processing region: {name}...");
                s.progress = idx as f32 / total as f32;
            });

            let cropped = crop(&decoded, &coords)
                .and_then(|c| to_data_url(&c))
                .map_err(|source| RecognitionError::Crop {
                    region: name.clone(),
                    source,
                })?;

            let start = Instant::now();
            // An in-flight call always runs to completion; cancellation is
            // only observed between regions
            let output = self
                .engine
                .recognize(&cropped)
                .await
                .map_err(|source| RecognitionError::Region {
                    region: name.clone(),
                    source,
                })?;
            let elapsed = start.elapsed();

            debug!(
                "{} recognized region '{}' in {:?} (confidence {:.1})",
                self.engine.name(),
                name,
                elapsed,
                output.confidence
            );

            results.push(OcrRegionResult {
                region_id: id,
                region_name: name,
                text: output.text.trim().to_string(),
                confidence: output.confidence,
                processing_time_ms: elapsed.as_millis() as u64,
            });

            self.status.send_modify(|s| {
                s.progress = (idx + 1) as f32 / total as f32;
            });
        }

        // A cancel that lands after the last region still discards the run
        if token.is_cancelled() {
            return Err(RecognitionError::Cancelled);
        }

        Ok(results)
    }

    fn set_message(&self, message: &str) {
        self.status.send_modify(|s| s.message = message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region;
    use crate::vision::image_data::decode;
    use crate::vision::ocr::OcrOutput;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn sample_image() -> ImageSource {
        to_data_url(&RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255]))).unwrap()
    }

    fn regions(widths: &[f32]) -> Vec<Region> {
        let mut list = Vec::new();
        for w in widths {
            list = region::append(&list, RegionCoordinates::new(0.0, 0.0, *w, 0.5)).0;
        }
        list
    }

    /// Reports the crop width; narrower crops take longer
    struct WidthEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for WidthEngine {
        fn name(&self) -> &str {
            "width"
        }

        async fn recognize(&self, image: &ImageSource) -> Result<OcrOutput, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let width = decode(image)?.width();
            tokio::time::sleep(Duration::from_millis(200 / width as u64)).await;
            Ok(OcrOutput {
                text: format!("  w{width}\n"),
                confidence: 90.0,
            })
        }
    }

    /// Blocks every call until released
    struct BlockingEngine {
        started: Notify,
        release: Notify,
        calls: AtomicUsize,
        finished: AtomicUsize,
    }

    impl BlockingEngine {
        fn new() -> Self {
            Self {
                started: Notify::new(),
                release: Notify::new(),
                calls: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OcrEngine for BlockingEngine {
        fn name(&self) -> &str {
            "blocking"
        }

        async fn recognize(&self, _image: &ImageSource) -> Result<OcrOutput, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(OcrOutput {
                text: "done".to_string(),
                confidence: 50.0,
            })
        }
    }

    /// Fails on the given call number (1-based)
    struct FailingEngine {
        fail_on: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        async fn recognize(&self, _image: &ImageSource) -> Result<OcrOutput, OcrError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(OcrError::Engine("boom".to_string()));
            }
            Ok(OcrOutput {
                text: format!("call {call}"),
                confidence: 80.0,
            })
        }
    }

    #[tokio::test]
    async fn test_results_follow_region_order() {
        let engine = Arc::new(WidthEngine {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = RecognitionOrchestrator::new(engine.clone(), None);
        let list = regions(&[0.05, 0.5, 0.25]);

        let results = orchestrator.process(&sample_image(), Some(&list)).await.unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.region_id.clone()).collect();
        let expected: Vec<_> = list.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, expected);

        let texts: Vec<_> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["w10", "w100", "w50"]);
        assert_eq!(results[1].region_name, "Region 2");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);

        let status = orchestrator.status();
        assert_eq!(status.phase, RecognitionPhase::Idle);
        assert_eq!(status.progress, 1.0);
        assert_eq!(status.message, "Processing complete");
        assert_eq!(status.results, results);
    }

    #[tokio::test]
    async fn test_no_regions_uses_full_image() {
        let engine = Arc::new(WidthEngine {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = RecognitionOrchestrator::new(engine, Some(PreprocessOptions::document()));

        let results = orchestrator.process(&sample_image(), Some(&[])).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].region_id, FULL_IMAGE_ID);
        assert_eq!(results[0].region_name, FULL_IMAGE_NAME);
        assert_eq!(results[0].text, "w200");

        let results = orchestrator.process(&sample_image(), None).await.unwrap();
        assert_eq!(results[0].region_id, FULL_IMAGE_ID);
    }

    #[tokio::test]
    async fn test_second_run_rejected_while_running() {
        let engine = Arc::new(BlockingEngine::new());
        let orchestrator = Arc::new(RecognitionOrchestrator::new(engine.clone(), None));
        let list = regions(&[0.5]);

        let task = {
            let orchestrator = orchestrator.clone();
            let list = list.clone();
            tokio::spawn(async move { orchestrator.process(&sample_image(), Some(&list)).await })
        };

        engine.started.notified().await;
        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.status().phase, RecognitionPhase::Processing);

        let second = orchestrator.process(&sample_image(), Some(&list)).await;
        assert!(matches!(second, Err(RecognitionError::AlreadyRunning)));
        assert_eq!(
            second.unwrap_err().to_string(),
            "OCR processing already in progress"
        );

        engine.release.notify_one();
        let results = task.await.unwrap().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_cancel_waits_for_in_flight_region() {
        let engine = Arc::new(BlockingEngine::new());
        let orchestrator = Arc::new(RecognitionOrchestrator::new(engine.clone(), None));
        let list = regions(&[0.5, 0.5, 0.5]);

        let task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.process(&sample_image(), Some(&list)).await })
        };

        engine.started.notified().await;
        orchestrator.cancel();

        // The current call is not interrupted by the cancel
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        engine.release.notify_one();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(RecognitionError::Cancelled)));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.finished.load(Ordering::SeqCst), 1);

        let status = orchestrator.status();
        assert_eq!(status.phase, RecognitionPhase::Idle);
        assert_eq!(status.message, "Processing cancelled");
        assert!(status.results.is_empty());
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_dropped_run_returns_to_idle() {
        let engine = Arc::new(BlockingEngine::new());
        let orchestrator = RecognitionOrchestrator::new(engine.clone(), None);
        let list = regions(&[0.5]);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(500),
            orchestrator.process(&sample_image(), Some(&list)),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        let status = orchestrator.status();
        assert_eq!(status.phase, RecognitionPhase::Idle);
        assert_eq!(status.message, "Processing cancelled");
        assert!(!orchestrator.is_running());

        // The orchestrator is usable again
        engine.release.notify_one();
        let results = orchestrator.process(&sample_image(), Some(&list)).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_region_failure_fails_run() {
        let engine = Arc::new(FailingEngine {
            fail_on: 2,
            calls: AtomicUsize::new(0),
        });
        let orchestrator = RecognitionOrchestrator::new(engine.clone(), None);
        let list = regions(&[0.1, 0.2, 0.3]);

        let err = orchestrator.process(&sample_image(), Some(&list)).await.unwrap_err();
        match &err {
            RecognitionError::Region { region, .. } => assert_eq!(region, "Region 2"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);

        let status = orchestrator.status();
        assert_eq!(status.phase, RecognitionPhase::Idle);
        assert!(status.message.starts_with("Error: "));
        assert_eq!(status.error, Some(err.to_string()));
    }

    #[tokio::test]
    async fn test_preprocess_failure_before_any_region() {
        let engine = Arc::new(FailingEngine {
            fail_on: 0,
            calls: AtomicUsize::new(0),
        });
        let options = PreprocessOptions {
            width: Some(0),
            height: Some(10),
            ..Default::default()
        };
        let orchestrator = RecognitionOrchestrator::new(engine.clone(), Some(options));

        let err = orchestrator
            .process(&sample_image(), Some(&regions(&[0.5])))
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Preprocess(_)));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_image_rejected() {
        let engine = Arc::new(FailingEngine {
            fail_on: 0,
            calls: AtomicUsize::new(0),
        });
        let orchestrator = RecognitionOrchestrator::new(engine.clone(), None);

        let err = orchestrator.process(&ImageSource::from(""), None).await.unwrap_err();
        assert!(matches!(err, RecognitionError::InvalidImage));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_progress_is_published() {
        let engine = Arc::new(FailingEngine {
            fail_on: 0,
            calls: AtomicUsize::new(0),
        });
        let orchestrator = RecognitionOrchestrator::new(engine, None);
        let mut rx = orchestrator.subscribe();

        orchestrator
            .process(&sample_image(), Some(&regions(&[0.2, 0.2])))
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().progress, 1.0);

        orchestrator.reset();
        assert_eq!(orchestrator.status(), RecognitionStatus::default());
    }

    #[test]
    fn test_result_json_field_names() {
        let result = OcrRegionResult {
            region_id: "r1".to_string(),
            region_name: "Name".to_string(),
            text: "山田".to_string(),
            confidence: 91.0,
            processing_time_ms: 12,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"regionId\":\"r1\""));
        assert!(json.contains("\"processingTime\":12"));
    }
}
