//! Pointer tracking for interactive heat sources.
//!
//! Consumes device-independent pointer events and the renderer's surface hit,
//! and hands the driver an immutable [`PointerSample`] once per tick.

use glam::Vec2;

/// Grid-space uv used before the pointer has ever hit the surface.
pub const OFF_SURFACE: Vec2 = Vec2::splat(999.0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSample {
    /// Cursor in normalized device coordinates, y up.
    pub ndc: Vec2,
    pub uv: Vec2,
    pub prev_uv: Vec2,
    /// Pressed with the modifier held.
    pub active: bool,
}

impl Default for PointerSample {
    fn default() -> Self {
        Self {
            ndc: OFF_SURFACE,
            uv: OFF_SURFACE,
            prev_uv: OFF_SURFACE,
            active: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PointerTracker {
    sample: PointerSample,
    pressed: bool,
    modifier: bool,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a window-space position (pixels, y down) into NDC.
    pub fn pointer_moved(&mut self, x: f32, y: f32, viewport: Vec2) {
        if viewport.x <= 0.0 || viewport.y <= 0.0 {
            return;
        }
        self.sample.ndc = Vec2::new(x / viewport.x * 2.0 - 1.0, -(y / viewport.y) * 2.0 + 1.0);
    }

    pub fn pointer_down(&mut self) {
        self.pressed = true;
        self.refresh_active();
    }

    pub fn pointer_up(&mut self) {
        self.pressed = false;
        self.refresh_active();
    }

    pub fn modifier_down(&mut self) {
        self.modifier = true;
        self.refresh_active();
    }

    pub fn modifier_up(&mut self) {
        self.modifier = false;
        self.refresh_active();
    }

    /// Records where the cursor ray meets the simulation surface, if anywhere.
    /// A hit shifts the current uv into `prev_uv`; a miss leaves both alone.
    pub fn surface_hit(&mut self, uv: Option<Vec2>) {
        if let Some(uv) = uv {
            self.sample.prev_uv = self.sample.uv;
            self.sample.uv = uv;
        }
    }

    pub fn ndc(&self) -> Vec2 {
        self.sample.ndc
    }

    pub fn snapshot(&self) -> PointerSample {
        self.sample
    }

    fn refresh_active(&mut self) {
        self.sample.active = self.pressed && self.modifier;
    }
}
