use serde::{Deserialize, Serialize};

/// Opaque video identifier (32 lowercase hex characters).
pub type VideoId = String;

/// 1-based frame index within a video.
pub type FrameIndex = u32;

/// Generate a fresh opaque identifier for videos, labels and frame tokens.
pub fn new_identifier() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(r: Resolution) -> Self {
        (r.width, r.height)
    }
}

/// Axis-aligned box as (left, top, right, bottom).
///
/// Used both for absolute pixel coordinates and for coordinates normalized
/// against a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Finite coordinates with `left <= right` and `top <= bottom`.
    pub fn is_well_formed(&self) -> bool {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .all(|v| v.is_finite())
            && self.left <= self.right
            && self.top <= self.bottom
    }

    /// Scale an absolute box into the 0..1 space of `resolution`.
    pub fn normalized(&self, resolution: Resolution) -> Self {
        let w = f64::from(resolution.width.max(1));
        let h = f64::from(resolution.height.max(1));
        Self {
            left: self.left / w,
            top: self.top / h,
            right: self.right / w,
            bottom: self.bottom / h,
        }
    }
}
