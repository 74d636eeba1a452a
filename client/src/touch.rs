//! Virtual joystick: maps a drag inside a circular surface to a move vector
//!
//! The controller tracks a single touch from start to end. While dragging,
//! the displacement from the surface center is clamped to the surface radius
//! along its own angle, then each axis is normalized against the radius after
//! a per-axis deadzone in surface pixels.

use crate::input::{with_aggregator, SharedAggregator};
use log::debug;
use macroquad::prelude::{vec2, Rect, Vec2};
use shared::JOYSTICK_DEADZONE;

/// Caps `d` at `radius` while keeping its angle.
pub fn clamp_to_radius(d: Vec2, radius: f32) -> Vec2 {
    if d.length() <= radius {
        return d;
    }
    let angle = d.y.atan2(d.x);
    vec2(angle.cos() * radius, angle.sin() * radius)
}

/// Maps one displacement component to [-1, 1], zero inside the deadzone.
pub fn normalize_axis(d: f32, radius: f32, deadzone: f32) -> f32 {
    if d.abs() < deadzone || radius <= 0.0 {
        0.0
    } else {
        d / radius
    }
}

/// Screen-space bounds of the joystick surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoystickSurface {
    pub rect: Rect,
}

impl JoystickSurface {
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }

    /// Square surface of side `size` with its top-left corner at `(x, y)`.
    pub fn square(x: f32, y: f32, size: f32) -> Self {
        Self::new(Rect::new(x, y, size, size))
    }

    pub fn center(&self) -> Vec2 {
        self.rect.center()
    }

    pub fn radius(&self) -> f32 {
        self.rect.w / 2.0
    }

    pub fn contains(&self, point: Vec2) -> bool {
        self.rect.contains(point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GesturePhase {
    Idle,
    Dragging { touch_id: u64, origin: Vec2 },
}

pub struct TouchSurfaceController {
    surface: Option<JoystickSurface>,
    aggregator: Option<SharedAggregator>,
    deadzone: f32,
    phase: GesturePhase,
    displacement: Vec2,
}

impl TouchSurfaceController {
    pub fn new(surface: Option<JoystickSurface>, aggregator: Option<SharedAggregator>) -> Self {
        Self {
            surface,
            aggregator,
            deadzone: JOYSTICK_DEADZONE,
            phase: GesturePhase::Idle,
            displacement: Vec2::ZERO,
        }
    }

    pub fn with_deadzone(mut self, deadzone: f32) -> Self {
        self.deadzone = deadzone;
        self
    }

    /// Replaces the surface bounds, e.g. after a resize.
    pub fn set_surface(&mut self, surface: Option<JoystickSurface>) {
        self.surface = surface;
    }

    pub fn surface(&self) -> Option<&JoystickSurface> {
        self.surface.as_ref()
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, GesturePhase::Dragging { .. })
    }

    pub fn tracking_touch(&self) -> Option<u64> {
        match self.phase {
            GesturePhase::Dragging { touch_id, .. } => Some(touch_id),
            GesturePhase::Idle => None,
        }
    }

    /// Clamped displacement from the surface center, in pixels
    pub fn displacement(&self) -> Vec2 {
        self.displacement
    }

    /// Screen position of the knob while dragging
    pub fn knob_position(&self) -> Option<Vec2> {
        match self.phase {
            GesturePhase::Dragging { origin, .. } => Some(origin + self.displacement),
            GesturePhase::Idle => None,
        }
    }

    /// Begins a drag if `point` lies on the surface and no drag is active.
    ///
    /// Returns true when the touch was claimed.
    pub fn touch_start(&mut self, touch_id: u64, point: Vec2) -> bool {
        if self.is_dragging() || self.aggregator.is_none() {
            return false;
        }
        let Some(surface) = self.surface else {
            return false;
        };
        if !surface.contains(point) {
            return false;
        }

        self.phase = GesturePhase::Dragging {
            touch_id,
            origin: surface.center(),
        };
        self.displacement = Vec2::ZERO;
        debug!("Joystick drag started by touch {}", touch_id);

        self.update(point);
        true
    }

    /// Follows the tracking touch. Other touches are ignored.
    pub fn touch_move(&mut self, touch_id: u64, point: Vec2) -> bool {
        if self.tracking_touch() != Some(touch_id) {
            return false;
        }
        self.update(point);
        true
    }

    /// Ends the drag and forwards a zero vector.
    pub fn touch_end(&mut self, touch_id: u64) -> bool {
        if self.tracking_touch() != Some(touch_id) {
            return false;
        }
        self.reset();
        true
    }

    /// The platform cancelled the touch. Handled exactly like an end.
    pub fn touch_cancel(&mut self, touch_id: u64) -> bool {
        self.touch_end(touch_id)
    }

    /// Drops any active drag regardless of which touch owns it.
    pub fn release_all(&mut self) {
        if self.is_dragging() {
            self.reset();
        }
    }

    fn update(&mut self, point: Vec2) {
        let Some(surface) = self.surface else {
            return;
        };
        if self.aggregator.is_none() {
            return;
        }

        let radius = surface.radius();
        let d = clamp_to_radius(point - surface.center(), radius);
        self.displacement = d;

        let x = normalize_axis(d.x, radius, self.deadzone);
        let y = normalize_axis(d.y, radius, self.deadzone);
        with_aggregator(self.aggregator.as_ref(), |a| a.set_joystick_input(x, y));
    }

    fn reset(&mut self) {
        self.phase = GesturePhase::Idle;
        self.displacement = Vec2::ZERO;
        with_aggregator(self.aggregator.as_ref(), |a| a.set_joystick_input(0.0, 0.0));
        debug!("Joystick released");
    }
}
