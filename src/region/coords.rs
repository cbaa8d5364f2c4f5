//! Canvas coordinate mapping
//!
//! Regions are persisted in unit-square coordinates (0.0-1.0 relative to the
//! base image) so they survive the image being re-fitted to a different
//! canvas size. Pixel coordinates only exist while the editor is live.

use serde::{Deserialize, Serialize};

/// Normalized region bounds (0.0-1.0 relative to image size)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionCoordinates {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RegionCoordinates {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// The whole image
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }
}

/// A point on the canvas (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A rectangle on the canvas (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanned by two corners, in any drag direction
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Edge-inclusive containment test
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }
}

/// Converts between canvas pixels and unit-square coordinates for the
/// current canvas size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    width: f32,
    height: f32,
}

impl CoordinateMapper {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Pixel values to unit-square values, each clamped to [0, 1].
    ///
    /// Missing width/height map to 0. A degenerate canvas maps everything to 0.
    pub fn to_relative(
        &self,
        x: f32,
        y: f32,
        width: Option<f32>,
        height: Option<f32>,
    ) -> RegionCoordinates {
        if self.width <= 0.0 || self.height <= 0.0 {
            return RegionCoordinates::default();
        }

        RegionCoordinates {
            x: unit(x / self.width),
            y: unit(y / self.height),
            width: width.map(|w| unit(w / self.width)).unwrap_or(0.0),
            height: height.map(|h| unit(h / self.height)).unwrap_or(0.0),
        }
    }

    /// Unit-square values to pixel values. Not clamped: callers bounds-check
    /// in pixel space, and mid-drag values outside the canvas are valid.
    pub fn to_absolute(
        &self,
        x: f32,
        y: f32,
        width: Option<f32>,
        height: Option<f32>,
    ) -> PixelRect {
        PixelRect {
            x: x * self.width,
            y: y * self.height,
            width: width.map(|w| w * self.width).unwrap_or(0.0),
            height: height.map(|h| h * self.height).unwrap_or(0.0),
        }
    }

    pub fn rect_to_relative(&self, rect: &PixelRect) -> RegionCoordinates {
        self.to_relative(rect.x, rect.y, Some(rect.width), Some(rect.height))
    }

    pub fn coords_to_absolute(&self, coords: &RegionCoordinates) -> PixelRect {
        self.to_absolute(coords.x, coords.y, Some(coords.width), Some(coords.height))
    }

    /// Clamp a pointer position onto the canvas
    pub fn clamp_point(&self, p: Point) -> Point {
        Point {
            x: p.x.max(0.0).min(self.width),
            y: p.y.max(0.0).min(self.height),
        }
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Canvas size for an image shown inside a `max_width` x `max_height`
/// viewport, keeping the aspect ratio. Width is fitted first, then height.
pub fn fit_to_viewport(
    image_width: u32,
    image_height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    let mut width = image_width as f32;
    let mut height = image_height as f32;

    if width > max_width as f32 {
        height = (max_width as f32 / width) * height;
        width = max_width as f32;
    }

    if height > max_height as f32 {
        width = (max_height as f32 / height) * width;
        height = max_height as f32;
    }

    (width.floor() as u32, height.floor() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.001
    }

    #[test]
    fn test_to_absolute_scenario() {
        let mapper = CoordinateMapper::new(1000, 800);
        let rect = mapper.coords_to_absolute(&RegionCoordinates::new(0.1, 0.1, 0.2, 0.2));

        assert!(approx(rect.x, 100.0));
        assert!(approx(rect.y, 80.0));
        assert!(approx(rect.right(), 300.0));
        assert!(approx(rect.bottom(), 240.0));
    }

    #[test]
    fn test_round_trip_within_canvas() {
        let mapper = CoordinateMapper::new(640, 480);
        let samples = [
            PixelRect::new(0.0, 0.0, 640.0, 480.0),
            PixelRect::new(13.0, 27.5, 100.25, 44.0),
            PixelRect::new(600.0, 400.0, 40.0, 80.0),
            PixelRect::new(320.0, 0.0, 1.0, 1.0),
        ];

        for rect in samples {
            let back = mapper.coords_to_absolute(&mapper.rect_to_relative(&rect));
            assert!(approx(back.x, rect.x), "{rect:?} -> {back:?}");
            assert!(approx(back.y, rect.y), "{rect:?} -> {back:?}");
            assert!(approx(back.width, rect.width), "{rect:?} -> {back:?}");
            assert!(approx(back.height, rect.height), "{rect:?} -> {back:?}");
        }
    }

    #[test]
    fn test_to_relative_clamps() {
        let mapper = CoordinateMapper::new(100, 100);
        let rel = mapper.to_relative(-20.0, 150.0, Some(250.0), Some(-5.0));

        assert_eq!(rel, RegionCoordinates::new(0.0, 1.0, 1.0, 0.0));
    }

    #[test]
    fn test_to_absolute_does_not_clamp() {
        let mapper = CoordinateMapper::new(100, 50);
        let abs = mapper.to_absolute(-0.5, 1.5, Some(2.0), None);

        assert!(approx(abs.x, -50.0));
        assert!(approx(abs.y, 75.0));
        assert!(approx(abs.width, 200.0));
        assert_eq!(abs.height, 0.0);
    }

    #[test]
    fn test_zero_canvas() {
        let mapper = CoordinateMapper::new(0, 0);
        assert_eq!(
            mapper.to_relative(10.0, 10.0, Some(5.0), Some(5.0)),
            RegionCoordinates::default()
        );
    }

    #[test]
    fn test_from_corners_reversed() {
        let rect = PixelRect::from_corners(Point::new(300.0, 400.0), Point::new(100.0, 200.0));
        assert_eq!(rect, PixelRect::new(100.0, 200.0, 200.0, 200.0));
    }

    #[test]
    fn test_fit_to_viewport() {
        assert_eq!(fit_to_viewport(1920, 1080, 800, 600), (800, 450));
        assert_eq!(fit_to_viewport(1000, 2000, 800, 600), (300, 600));
        assert_eq!(fit_to_viewport(400, 300, 800, 600), (400, 300));
    }
}
