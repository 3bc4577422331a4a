//! Overlay geometry. Anchors are viewport-relative, results are page
//! coordinates (scroll offset added).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 && self.height <= 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub left: f64,
    pub top: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// Right of the anchor, else diagonally above it, else below; then clamped
/// horizontally into the viewport.
pub fn place_beside(anchor: Rect, size: Size, viewport: Viewport, pad: f64) -> Position {
    let right_space = viewport.width - anchor.right();
    let top_space = anchor.top;

    let (top, mut left) = if right_space >= size.width + pad {
        (
            viewport.scroll_y + anchor.top + anchor.height / 2.0 - size.height / 2.0,
            viewport.scroll_x + anchor.right() + pad,
        )
    } else if top_space >= size.height + pad {
        (
            viewport.scroll_y + anchor.top - size.height - pad,
            viewport.scroll_x + anchor.right() - size.width,
        )
    } else {
        (
            viewport.scroll_y + anchor.bottom() + pad,
            viewport.scroll_x + anchor.left,
        )
    };

    if left < pad {
        left = pad;
    }
    if left + size.width > viewport.width - pad {
        left = viewport.width - size.width - pad;
    }

    Position { left, top }
}

/// Above the anchor when it fits, otherwise below; left-aligned and pulled
/// back from the right edge.
pub fn place_above_or_below(anchor: Rect, size: Size, viewport: Viewport, pad: f64) -> Position {
    let top = if anchor.top - size.height - pad > 0.0 {
        viewport.scroll_y + anchor.top - size.height - pad
    } else {
        viewport.scroll_y + anchor.bottom() + pad
    };

    let mut left = viewport.scroll_x + anchor.left;
    let max_left = viewport.width - size.width - pad;
    if left > max_left {
        left = pad.max(max_left);
    }

    Position { left, top }
}

pub fn place_below(anchor: Rect, viewport: Viewport, pad: f64) -> Position {
    Position {
        left: viewport.scroll_x + anchor.left,
        top: viewport.scroll_y + anchor.bottom() + pad,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ICON: Size = Size::new(90.0, 28.0);

    #[test]
    fn beside_prefers_right_of_anchor() {
        let anchor = Rect::new(100.0, 200.0, 300.0, 40.0);
        let position = place_beside(anchor, ICON, Viewport::new(1000.0, 800.0), 6.0);
        assert_eq!(position.left, 406.0);
        assert_eq!(position.top, 206.0);
    }

    #[test]
    fn beside_falls_back_to_diagonal_top() {
        let anchor = Rect::new(700.0, 200.0, 280.0, 40.0);
        let position = place_beside(anchor, ICON, Viewport::new(1000.0, 800.0), 6.0);
        assert_eq!(position.top, 200.0 - 28.0 - 6.0);
        assert_eq!(position.left, 980.0 - 90.0);
    }

    #[test]
    fn beside_falls_back_to_below_and_clamps() {
        let anchor = Rect::new(2.0, 10.0, 990.0, 20.0);
        let position = place_beside(anchor, ICON, Viewport::new(1000.0, 800.0), 6.0);
        assert_eq!(position.top, 36.0);
        assert_eq!(position.left, 6.0);
    }

    #[test]
    fn beside_includes_scroll_offset() {
        let viewport = Viewport {
            scroll_x: 10.0,
            scroll_y: 500.0,
            ..Viewport::new(1000.0, 800.0)
        };
        let position = place_beside(Rect::new(100.0, 200.0, 100.0, 40.0), ICON, viewport, 6.0);
        assert_eq!(position.top, 706.0);
        assert_eq!(position.left, 216.0);
    }

    #[test]
    fn above_or_below_picks_above_when_room() {
        let size = Size::new(320.0, 120.0);
        let above = place_above_or_below(
            Rect::new(50.0, 400.0, 500.0, 60.0),
            size,
            Viewport::new(1000.0, 800.0),
            8.0,
        );
        assert_eq!(above.top, 272.0);
        assert_eq!(above.left, 50.0);

        let below = place_above_or_below(
            Rect::new(50.0, 100.0, 500.0, 60.0),
            size,
            Viewport::new(1000.0, 800.0),
            8.0,
        );
        assert_eq!(below.top, 168.0);
    }

    #[test]
    fn above_or_below_pulls_back_from_right_edge() {
        let position = place_above_or_below(
            Rect::new(900.0, 400.0, 80.0, 60.0),
            Size::new(320.0, 120.0),
            Viewport::new(1000.0, 800.0),
            8.0,
        );
        assert_eq!(position.left, 672.0);
    }

    #[test]
    fn below_sits_under_the_anchor() {
        let position = place_below(Rect::new(30.0, 40.0, 10.0, 20.0), Viewport::new(800.0, 600.0), 8.0);
        assert_eq!(position, Position { left: 30.0, top: 68.0 });
    }
}
