//! Resize handles and the resize math

use crate::region::{PixelRect, Point};

/// One of the eight handles drawn around the selected region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResizeHandle {
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
}

impl ResizeHandle {
    /// Hit-test order
    pub const ALL: [ResizeHandle; 8] = [
        ResizeHandle::NorthWest,
        ResizeHandle::North,
        ResizeHandle::NorthEast,
        ResizeHandle::East,
        ResizeHandle::SouthEast,
        ResizeHandle::South,
        ResizeHandle::SouthWest,
        ResizeHandle::West,
    ];

    fn moves_west(self) -> bool {
        matches!(self, Self::NorthWest | Self::SouthWest | Self::West)
    }

    fn moves_east(self) -> bool {
        matches!(self, Self::NorthEast | Self::SouthEast | Self::East)
    }

    fn moves_north(self) -> bool {
        matches!(self, Self::NorthWest | Self::NorthEast | Self::North)
    }

    fn moves_south(self) -> bool {
        matches!(self, Self::SouthWest | Self::SouthEast | Self::South)
    }

    /// Handle center on `rect`
    pub fn position(self, rect: &PixelRect) -> Point {
        let cx = rect.x + rect.width / 2.0;
        let cy = rect.y + rect.height / 2.0;
        match self {
            Self::NorthWest => Point::new(rect.x, rect.y),
            Self::North => Point::new(cx, rect.y),
            Self::NorthEast => Point::new(rect.right(), rect.y),
            Self::East => Point::new(rect.right(), cy),
            Self::SouthEast => Point::new(rect.right(), rect.bottom()),
            Self::South => Point::new(cx, rect.bottom()),
            Self::SouthWest => Point::new(rect.x, rect.bottom()),
            Self::West => Point::new(rect.x, cy),
        }
    }
}

/// First handle whose `hit_area`-sized square contains `point`
pub fn handle_at(rect: &PixelRect, point: Point, hit_area: f32) -> Option<ResizeHandle> {
    let half = hit_area / 2.0;
    ResizeHandle::ALL.into_iter().find(|handle| {
        let center = handle.position(rect);
        (point.x - center.x).abs() <= half && (point.y - center.y).abs() <= half
    })
}

/// Apply a pointer delta to `original` through `handle`.
///
/// Sizes below `min_size` snap to `min_size` with the opposite edge held in
/// place; the result is then clamped onto the `canvas_width` x
/// `canvas_height` canvas.
pub fn resize_rect(
    handle: ResizeHandle,
    original: &PixelRect,
    dx: f32,
    dy: f32,
    min_size: f32,
    canvas_width: f32,
    canvas_height: f32,
) -> PixelRect {
    let mut x = original.x;
    let mut y = original.y;
    let mut width = original.width;
    let mut height = original.height;

    if handle.moves_west() {
        x = original.x + dx;
        width = original.width - dx;
    }
    if handle.moves_east() {
        width = original.width + dx;
    }
    if handle.moves_north() {
        y = original.y + dy;
        height = original.height - dy;
    }
    if handle.moves_south() {
        height = original.height + dy;
    }

    if width < min_size {
        width = min_size;
        if handle.moves_west() {
            x = original.right() - min_size;
        }
    }
    if height < min_size {
        height = min_size;
        if handle.moves_north() {
            y = original.bottom() - min_size;
        }
    }

    // Past the left/top edge: trim the size so the opposite edge stays put
    if x < 0.0 {
        width += x;
        x = 0.0;
    }
    if y < 0.0 {
        height += y;
        y = 0.0;
    }
    width = width.min(canvas_width - x);
    height = height.min(canvas_height - y);

    PixelRect::new(x, y, width, height)
}
