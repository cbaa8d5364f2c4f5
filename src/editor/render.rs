//! Overlay rendering
//!
//! Draws the base image at canvas size with region fills, outlines, resize
//! handles and the in-progress drag rectangle. Text labels are left to the
//! host UI; see [`label_text`].

use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use super::handles::ResizeHandle;
use crate::region::{CoordinateMapper, PixelRect, Region};

const BLUE: [u8; 3] = [59, 130, 246];
const LIGHT_BLUE: [u8; 3] = [96, 165, 250];
const GREEN: [u8; 3] = [16, 185, 129];
const HANDLE_ACTIVE: [u8; 3] = [37, 99, 235];
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

const DASH: f32 = 5.0;

/// Visual state of one region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionStyle {
    Normal,
    Hovered,
    Selected,
}

impl RegionStyle {
    /// Selection wins over hover
    pub fn resolve(id: &str, selected: Option<&str>, hovered: Option<&str>) -> Self {
        if selected == Some(id) {
            Self::Selected
        } else if hovered == Some(id) {
            Self::Hovered
        } else {
            Self::Normal
        }
    }

    pub fn stroke(self) -> Rgba<u8> {
        let [r, g, b] = match self {
            Self::Selected => BLUE,
            Self::Hovered => LIGHT_BLUE,
            Self::Normal => GREEN,
        };
        Rgba([r, g, b, 255])
    }

    pub fn fill(self) -> Rgba<u8> {
        let alpha = match self {
            Self::Selected | Self::Hovered => 26,
            Self::Normal => 13,
        };
        let Rgba([r, g, b, _]) = self.stroke();
        Rgba([r, g, b, alpha])
    }

    pub fn stroke_width(self) -> u32 {
        match self {
            Self::Selected => 3,
            _ => 2,
        }
    }
}

/// Caption shown next to a region, e.g. "2. Address"
pub fn label_text(region: &Region) -> String {
    format!("{}. {}", region.order, region.name)
}

/// Everything drawn on top of the base image
#[derive(Debug, Clone, Copy)]
pub struct OverlayScene<'a> {
    pub regions: &'a [Region],
    pub selected: Option<&'a str>,
    pub hovered: Option<&'a str>,
    pub hovered_handle: Option<ResizeHandle>,
    pub show_handles: bool,
    pub drag: Option<PixelRect>,
    pub handle_size: f32,
}

/// Render `base` scaled to the mapper's canvas with `scene` on top
pub fn render(base: &RgbaImage, mapper: &CoordinateMapper, scene: &OverlayScene) -> RgbaImage {
    let width = mapper.width() as u32;
    let height = mapper.height() as u32;
    if width == 0 || height == 0 {
        return RgbaImage::new(width, height);
    }

    let mut canvas = if base.dimensions() == (width, height) {
        base.clone()
    } else {
        imageops::resize(base, width, height, FilterType::Triangle)
    };

    for region in scene.regions {
        let style = RegionStyle::resolve(&region.id, scene.selected, scene.hovered);
        let rect = mapper.coords_to_absolute(&region.coordinates);

        blend_rect(&mut canvas, &rect, style.fill());
        stroke_rect(&mut canvas, &rect, style.stroke(), style.stroke_width());

        if scene.show_handles && style == RegionStyle::Selected {
            for handle in ResizeHandle::ALL {
                let active = scene.hovered_handle == Some(handle);
                draw_handle(&mut canvas, &rect, handle, scene.handle_size, active);
            }
        }
    }

    if let Some(drag) = scene.drag {
        let [r, g, b] = BLUE;
        blend_rect(&mut canvas, &drag, Rgba([r, g, b, 26]));
        dashed_rect(&mut canvas, &drag, Rgba([r, g, b, 255]));
    }

    canvas
}

fn to_rect(rect: &PixelRect) -> Option<Rect> {
    let width = rect.width.round() as i64;
    let height = rect.height.round() as i64;
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(Rect::at(rect.x.round() as i32, rect.y.round() as i32).of_size(width as u32, height as u32))
}

/// Alpha-blend `color` over the pixels inside `rect`
fn blend_rect(canvas: &mut RgbaImage, rect: &PixelRect, color: Rgba<u8>) {
    let x0 = rect.x.max(0.0).round() as u32;
    let y0 = rect.y.max(0.0).round() as u32;
    let x1 = (rect.right().round().max(0.0) as u32).min(canvas.width());
    let y1 = (rect.bottom().round().max(0.0) as u32).min(canvas.height());

    for y in y0..y1 {
        for x in x0..x1 {
            canvas.get_pixel_mut(x, y).blend(&color);
        }
    }
}

/// Outline growing outward from `rect`, `width` pixels thick
fn stroke_rect(canvas: &mut RgbaImage, rect: &PixelRect, color: Rgba<u8>, width: u32) {
    for i in 0..width {
        let grown = PixelRect::new(
            rect.x - i as f32,
            rect.y - i as f32,
            rect.width + 2.0 * i as f32,
            rect.height + 2.0 * i as f32,
        );
        if let Some(r) = to_rect(&grown) {
            draw_hollow_rect_mut(canvas, r, color);
        }
    }
}

fn draw_handle(canvas: &mut RgbaImage, rect: &PixelRect, handle: ResizeHandle, size: f32, active: bool) {
    let center = handle.position(rect);
    let square = PixelRect::new(center.x - size / 2.0, center.y - size / 2.0, size, size);
    let Some(r) = to_rect(&square) else {
        return;
    };

    let [red, green, blue] = if active { HANDLE_ACTIVE } else { BLUE };
    draw_filled_rect_mut(canvas, r, Rgba([red, green, blue, 255]));
    draw_hollow_rect_mut(canvas, r, WHITE);
}

/// 5-on 5-off dashed outline, 2 pixels thick
fn dashed_rect(canvas: &mut RgbaImage, rect: &PixelRect, color: Rgba<u8>) {
    for inset in [0.0, 1.0] {
        let left = rect.x + inset;
        let top = rect.y + inset;
        let right = rect.right() - inset;
        let bottom = rect.bottom() - inset;

        dashed_line(canvas, (left, top), (right, top), color);
        dashed_line(canvas, (right, top), (right, bottom), color);
        dashed_line(canvas, (right, bottom), (left, bottom), color);
        dashed_line(canvas, (left, bottom), (left, top), color);
    }
}

fn dashed_line(canvas: &mut RgbaImage, from: (f32, f32), to: (f32, f32), color: Rgba<u8>) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let length = (dx * dx + dy * dy).sqrt();
    if length <= 0.0 {
        return;
    }

    let mut t = 0.0;
    while t < length {
        let end = (t + DASH).min(length);
        let a = (from.0 + dx * t / length, from.1 + dy * t / length);
        let b = (from.0 + dx * end / length, from.1 + dy * end / length);
        draw_line_segment_mut(canvas, a, b, color);
        t += DASH * 2.0;
    }
}
