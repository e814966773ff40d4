use rstar::AABB;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in page coordinates, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
        .normalized()
    }

    /// Swap edges given in the wrong order.
    pub fn normalized(self) -> Self {
        Self {
            left: self.left.min(self.right),
            top: self.top.min(self.bottom),
            right: self.left.max(self.right),
            bottom: self.top.max(self.bottom),
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left <= other.right
            && other.left <= self.right
            && self.top <= other.bottom
            && other.top <= self.bottom
    }

    /// Clip to a `width` x `height` page. Returns `None` if nothing is left.
    pub fn clamp_to_page(&self, width: f32, height: f32) -> Option<Rect> {
        let clipped = Rect {
            left: self.left.clamp(0.0, width),
            top: self.top.clamp(0.0, height),
            right: self.right.clamp(0.0, width),
            bottom: self.bottom.clamp(0.0, height),
        };
        if clipped.is_empty() {
            None
        } else {
            Some(clipped)
        }
    }

    pub fn contained_in(&self, width: f32, height: f32) -> bool {
        self.left >= 0.0 && self.top >= 0.0 && self.right <= width && self.bottom <= height
    }

    /// Horizontal sub-range given as fractions of the width.
    pub fn horizontal_slice(&self, from: f32, to: f32) -> Rect {
        let from = from.clamp(0.0, 1.0);
        let to = to.clamp(from, 1.0);
        Rect {
            left: self.left + self.width() * from,
            top: self.top,
            right: self.left + self.width() * to,
            bottom: self.bottom,
        }
    }

    pub fn envelope(&self) -> AABB<[f32; 2]> {
        AABB::from_corners([self.left, self.top], [self.right, self.bottom])
    }
}
