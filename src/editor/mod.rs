//! Region editor
//!
//! Pointer-driven editing of template regions over a base image: drag on
//! empty canvas to draw a region, click a region to select it, drag one of
//! the selected region's handles to resize it. Every change to the region
//! list is reported through a single callback with the full, renumbered
//! list.

pub mod handles;
pub mod render;

pub use handles::{handle_at, resize_rect, ResizeHandle};
pub use render::{label_text, render, OverlayScene, RegionStyle};

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EditorConfig;
use crate::region::{self, fit_to_viewport, CoordinateMapper, PixelRect, Point, Region};
use crate::validation::{validate_region_name, ValidationError};
use crate::vision::image_data::{decode, ImageSource};

/// Called with the full region list after every change
pub type ChangeCallback = Box<dyn FnMut(&[Region]) + Send>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),
    #[error("A template can have at most {max} regions")]
    MaxRegions { max: usize },
    #[error("Editor is read-only")]
    ReadOnly,
    #[error("Unknown region: {0}")]
    UnknownRegion(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Base image load state
#[derive(Debug, Clone)]
pub enum ImageState {
    Loaded(RgbaImage),
    Failed(String),
}

/// Pointer interaction state
#[derive(Debug, Clone, PartialEq)]
pub enum EditorState {
    Idle,
    Dragging {
        start: Point,
        current: Point,
    },
    Resizing {
        handle: ResizeHandle,
        target_id: String,
        start: Point,
        original: PixelRect,
    },
}

pub struct RegionEditor {
    config: EditorConfig,
    read_only: bool,
    image: ImageState,
    mapper: CoordinateMapper,
    regions: Vec<Region>,
    selected: Option<String>,
    hovered_region: Option<String>,
    hovered_handle: Option<ResizeHandle>,
    state: EditorState,
    on_change: Option<ChangeCallback>,
}

impl RegionEditor {
    /// Decode `source` as the base image. A decode failure leaves the editor
    /// in [`ImageState::Failed`] until [`Self::retry`] succeeds.
    pub fn new(config: EditorConfig, source: &ImageSource, regions: Vec<Region>) -> Self {
        let image = match decode(source) {
            Ok(image) => ImageState::Loaded(image),
            Err(e) => {
                warn!("Failed to load base image: {}", e);
                ImageState::Failed(e.to_string())
            }
        };
        Self::from_state(config, image, regions)
    }

    pub fn with_image(config: EditorConfig, image: RgbaImage, regions: Vec<Region>) -> Self {
        Self::from_state(config, ImageState::Loaded(image), regions)
    }

    fn from_state(config: EditorConfig, image: ImageState, mut regions: Vec<Region>) -> Self {
        regions.sort_by_key(|r| r.order);
        region::renumber(&mut regions);

        let mut editor = Self {
            config,
            read_only: false,
            image: ImageState::Failed(String::new()),
            mapper: CoordinateMapper::new(0, 0),
            regions,
            selected: None,
            hovered_region: None,
            hovered_handle: None,
            state: EditorState::Idle,
            on_change: None,
        };
        editor.set_image(image);
        editor
    }

    fn set_image(&mut self, image: ImageState) {
        self.mapper = match &image {
            ImageState::Loaded(img) => {
                let (w, h) = fit_to_viewport(
                    img.width(),
                    img.height(),
                    self.config.max_canvas_width,
                    self.config.max_canvas_height,
                );
                debug!("Canvas {}x{} for {}x{} image", w, h, img.width(), img.height());
                CoordinateMapper::new(w, h)
            }
            ImageState::Failed(_) => CoordinateMapper::new(0, 0),
        };
        self.image = image;
    }

    /// Builder: only allow selection
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Builder: register the change callback
    pub fn on_regions_change(mut self, callback: impl FnMut(&[Region]) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    /// Re-attempt loading the base image
    pub fn retry(&mut self, source: &ImageSource) -> Result<(), EditorError> {
        match decode(source) {
            Ok(image) => {
                self.set_image(ImageState::Loaded(image));
                Ok(())
            }
            Err(e) => {
                self.set_image(ImageState::Failed(e.to_string()));
                Err(EditorError::ImageUnavailable(e.to_string()))
            }
        }
    }

    /// Replace the region list without firing the callback
    pub fn set_regions(&mut self, mut regions: Vec<Region>) {
        region::renumber(&mut regions);
        if let Some(id) = &self.selected {
            if !regions.iter().any(|r| &r.id == id) {
                self.selected = None;
            }
        }
        self.regions = regions;
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn hovered_region(&self) -> Option<&str> {
        self.hovered_region.as_deref()
    }

    pub fn hovered_handle(&self) -> Option<ResizeHandle> {
        self.hovered_handle
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn image_state(&self) -> &ImageState {
        &self.image
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Canvas size in pixels
    pub fn canvas_size(&self) -> (u32, u32) {
        (self.mapper.width() as u32, self.mapper.height() as u32)
    }

    /// Short summary line, e.g. "3 / 20 regions"
    pub fn status_text(&self) -> String {
        let mut text = format!("{} / {} regions", self.regions.len(), self.config.max_regions);
        if self.read_only {
            text.push_str(" (read-only)");
        }
        if let ImageState::Failed(message) = &self.image {
            text = format!("Image failed to load: {message}");
        }
        text
    }

    /// In-progress drag rectangle, if any
    pub fn drag_rect(&self) -> Option<PixelRect> {
        match &self.state {
            EditorState::Dragging { start, current } => Some(PixelRect::from_corners(*start, *current)),
            _ => None,
        }
    }

    pub fn pointer_down(&mut self, point: Point) -> Result<(), EditorError> {
        self.ensure_image()?;
        let point = self.mapper.clamp_point(point);

        if self.read_only {
            self.selected = self.region_at(point);
            return Ok(());
        }

        if let Some(id) = self.selected.clone() {
            if let Some(target) = self.regions.iter().find(|r| r.id == id) {
                let rect = self.mapper.coords_to_absolute(&target.coordinates);
                if let Some(handle) = handle_at(&rect, point, self.config.handle_hit_area) {
                    self.state = EditorState::Resizing {
                        handle,
                        target_id: id,
                        start: point,
                        original: rect,
                    };
                    return Ok(());
                }
            }
        }

        if let Some(id) = self.region_at(point) {
            self.selected = Some(id);
            self.state = EditorState::Idle;
            return Ok(());
        }

        if self.regions.len() >= self.config.max_regions {
            return Err(EditorError::MaxRegions {
                max: self.config.max_regions,
            });
        }

        self.selected = None;
        self.state = EditorState::Dragging {
            start: point,
            current: point,
        };
        Ok(())
    }

    pub fn pointer_move(&mut self, point: Point) -> Result<(), EditorError> {
        self.ensure_image()?;
        let point = self.mapper.clamp_point(point);

        match self.state.clone() {
            EditorState::Idle => {
                self.hovered_region = self.region_at(point);
                self.hovered_handle = match (&self.selected, self.read_only) {
                    (Some(id), false) => self
                        .regions
                        .iter()
                        .find(|r| &r.id == id)
                        .and_then(|r| {
                            let rect = self.mapper.coords_to_absolute(&r.coordinates);
                            handle_at(&rect, point, self.config.handle_hit_area)
                        }),
                    _ => None,
                };
            }
            EditorState::Dragging { start, .. } => {
                self.state = EditorState::Dragging {
                    start,
                    current: point,
                };
            }
            EditorState::Resizing {
                handle,
                target_id,
                start,
                original,
            } => {
                let rect = resize_rect(
                    handle,
                    &original,
                    point.x - start.x,
                    point.y - start.y,
                    self.config.min_region_size,
                    self.mapper.width(),
                    self.mapper.height(),
                );
                let coordinates = self.mapper.rect_to_relative(&rect);
                self.regions = region::with_coordinates(&self.regions, &target_id, coordinates);
                self.emit_change();
            }
        }
        Ok(())
    }

    /// Finish the current interaction. Returns the id of a newly drawn
    /// region.
    pub fn pointer_up(&mut self) -> Result<Option<String>, EditorError> {
        self.ensure_image()?;

        match std::mem::replace(&mut self.state, EditorState::Idle) {
            EditorState::Dragging { start, current } => Ok(self.finish_drag(start, current)),
            EditorState::Resizing { target_id, .. } => {
                debug!("Resized region {}", target_id);
                Ok(None)
            }
            EditorState::Idle => Ok(None),
        }
    }

    /// Leaving the canvas ends the interaction like a release
    pub fn pointer_leave(&mut self) -> Result<Option<String>, EditorError> {
        self.pointer_up()
    }

    fn finish_drag(&mut self, start: Point, current: Point) -> Option<String> {
        let dx = (current.x - start.x).abs();
        let dy = (current.y - start.y).abs();
        if dx < self.config.min_drag_distance || dy < self.config.min_drag_distance {
            return None;
        }

        let mut rect = PixelRect::from_corners(start, current);
        rect.width = rect.width.min(self.mapper.width() - rect.x);
        rect.height = rect.height.min(self.mapper.height() - rect.y);
        if rect.width < self.config.min_region_size || rect.height < self.config.min_region_size {
            return None;
        }

        let (regions, id) = region::append(&self.regions, self.mapper.rect_to_relative(&rect));
        self.regions = regions;
        self.selected = Some(id.clone());
        debug!("Created region {} at {:?}", id, rect);
        self.emit_change();
        Some(id)
    }

    /// Select a region, or clear the selection with `None`. Allowed in
    /// read-only mode.
    pub fn select(&mut self, id: Option<&str>) -> Result<(), EditorError> {
        self.ensure_image()?;
        match id {
            Some(id) => {
                self.ensure_known(id)?;
                self.selected = Some(id.to_string());
            }
            None => self.selected = None,
        }
        Ok(())
    }

    /// Rename a region. Blank names keep the current name.
    pub fn rename(&mut self, id: &str, name: &str) -> Result<(), EditorError> {
        self.ensure_editable()?;
        self.ensure_known(id)?;
        if !name.trim().is_empty() {
            validate_region_name(name.trim())?;
        }
        self.regions = region::rename(&self.regions, id, name);
        self.emit_change();
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<(), EditorError> {
        self.ensure_editable()?;
        self.ensure_known(id)?;
        self.regions = region::remove(&self.regions, id);
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        if self.hovered_region.as_deref() == Some(id) {
            self.hovered_region = None;
        }
        self.emit_change();
        Ok(())
    }

    /// Move a region one place earlier. No-op when already first.
    pub fn move_up(&mut self, id: &str) -> Result<(), EditorError> {
        self.ensure_editable()?;
        self.ensure_known(id)?;
        if let Some(regions) = region::move_up(&self.regions, id) {
            self.regions = regions;
            self.emit_change();
        }
        Ok(())
    }

    /// Move a region one place later. No-op when already last.
    pub fn move_down(&mut self, id: &str) -> Result<(), EditorError> {
        self.ensure_editable()?;
        self.ensure_known(id)?;
        if let Some(regions) = region::move_down(&self.regions, id) {
            self.regions = regions;
            self.emit_change();
        }
        Ok(())
    }

    /// Draw the base image with the region overlay at canvas size
    pub fn render(&self) -> Result<RgbaImage, EditorError> {
        let ImageState::Loaded(base) = &self.image else {
            return Err(self.unavailable());
        };
        let scene = OverlayScene {
            regions: &self.regions,
            selected: self.selected.as_deref(),
            hovered: self.hovered_region.as_deref(),
            hovered_handle: self.hovered_handle,
            show_handles: !self.read_only,
            drag: self.drag_rect(),
            handle_size: self.config.handle_size,
        };
        Ok(render(base, &self.mapper, &scene))
    }

    fn region_at(&self, point: Point) -> Option<String> {
        region::find_at(&self.regions, &self.mapper, point).map(|r| r.id.clone())
    }

    fn emit_change(&mut self) {
        if let Some(callback) = self.on_change.as_mut() {
            callback(&self.regions);
        }
    }

    fn unavailable(&self) -> EditorError {
        match &self.image {
            ImageState::Failed(message) => EditorError::ImageUnavailable(message.clone()),
            ImageState::Loaded(_) => EditorError::ImageUnavailable(String::new()),
        }
    }

    fn ensure_image(&self) -> Result<(), EditorError> {
        match self.image {
            ImageState::Loaded(_) => Ok(()),
            ImageState::Failed(_) => Err(self.unavailable()),
        }
    }

    fn ensure_editable(&self) -> Result<(), EditorError> {
        self.ensure_image()?;
        if self.read_only {
            return Err(EditorError::ReadOnly);
        }
        Ok(())
    }

    fn ensure_known(&self, id: &str) -> Result<(), EditorError> {
        if self.regions.iter().any(|r| r.id == id) {
            Ok(())
        } else {
            Err(EditorError::UnknownRegion(id.to_string()))
        }
    }
}
