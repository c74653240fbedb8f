//! Viewport intersection tracking for a single widget region.
//!
//! The sensor is fed viewport rectangles whenever the page scrolls, resizes or
//! re-lays out, and reports a new `is_intersecting` value only when it changes.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::SensorOptions;

/// Axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Grow every side by `margin`; negative margins shrink.
    pub fn inflate(&self, margin: f32) -> Self {
        Self {
            x: self.x - margin,
            y: self.y - margin,
            width: (self.width + 2.0 * margin).max(0.0),
            height: (self.height + 2.0 * margin).max(0.0),
        }
    }

    /// Overlap of both rectangles. Edge-adjacent rectangles yield a zero-area
    /// intersection rather than `None`.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right < left || bottom < top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// Whether `region` counts as intersecting `viewport` under `options`.
pub fn intersects(region: &Rect, viewport: &Rect, options: &SensorOptions) -> bool {
    let root = viewport.inflate(options.root_margin_px);
    let Some(overlap) = region.intersection(&root) else {
        return false;
    };
    if options.threshold <= 0.0 {
        return true;
    }
    let area = region.area();
    if area <= 0.0 {
        return true;
    }
    overlap.area() / area >= options.threshold
}

/// Reports whether one region currently intersects the viewport.
#[derive(Debug, Clone)]
pub struct VisibilitySensor {
    options: SensorOptions,
    region: Option<Rect>,
    is_intersecting: bool,
    frozen: bool,
}

impl VisibilitySensor {
    pub fn new(options: SensorOptions) -> Self {
        Self {
            options,
            region: None,
            is_intersecting: false,
            frozen: false,
        }
    }

    pub fn options(&self) -> &SensorOptions {
        &self.options
    }

    pub fn region(&self) -> Option<Rect> {
        self.region
    }

    pub fn is_intersecting(&self) -> bool {
        self.is_intersecting
    }

    /// True once a `freeze_once_visible` sensor has latched.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Attach or move the observed region. The next `observe` call evaluates it.
    pub fn attach(&mut self, region: Rect) {
        self.region = Some(region);
    }

    /// Detach the region. A live sensor falls back to "not intersecting".
    pub fn detach(&mut self) -> Option<bool> {
        self.region = None;
        self.set(false)
    }

    /// Evaluate the region against `viewport`. Returns the new value when it
    /// changed, `None` otherwise.
    pub fn observe(&mut self, viewport: &Rect) -> Option<bool> {
        let now = match self.region {
            Some(region) => intersects(&region, viewport, &self.options),
            None => false,
        };
        self.set(now)
    }

    fn set(&mut self, value: bool) -> Option<bool> {
        if self.frozen || value == self.is_intersecting {
            return None;
        }
        self.is_intersecting = value;
        if value && self.options.freeze_once_visible {
            trace!("visibility sensor latched");
            self.frozen = true;
        }
        Some(value)
    }
}
