//! Routes platform touches to the joystick and the action buttons

use crate::buttons::ActionPad;
use crate::input::SharedAggregator;
use crate::touch::{JoystickSurface, TouchSurfaceController};
use macroquad::prelude::{
    is_mouse_button_down, is_mouse_button_pressed, is_mouse_button_released, mouse_position,
    touches, vec2, MouseButton, Touch, TouchPhase, Vec2,
};

/// Touch id used when the left mouse button stands in for a finger
pub const MOUSE_TOUCH_ID: u64 = u64::MAX;

const SCREEN_PADDING: f32 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    Start { id: u64, position: Vec2 },
    Move { id: u64, position: Vec2 },
    End { id: u64 },
    Cancel { id: u64 },
}

impl From<&Touch> for GestureEvent {
    fn from(touch: &Touch) -> Self {
        let id = touch.id;
        let position = touch.position;
        match touch.phase {
            TouchPhase::Started => GestureEvent::Start { id, position },
            TouchPhase::Moved | TouchPhase::Stationary => GestureEvent::Move { id, position },
            TouchPhase::Ended => GestureEvent::End { id },
            TouchPhase::Cancelled => GestureEvent::Cancel { id },
        }
    }
}

/// Gestures for this frame, plus the ids of touches still down afterwards.
pub fn sample_gestures() -> (Vec<GestureEvent>, Vec<u64>) {
    let frame_touches = touches();
    let mut events: Vec<GestureEvent> = frame_touches.iter().map(GestureEvent::from).collect();
    let mut active: Vec<u64> = frame_touches
        .iter()
        .filter(|t| !matches!(t.phase, TouchPhase::Ended | TouchPhase::Cancelled))
        .map(|t| t.id)
        .collect();

    let (x, y) = mouse_position();
    let position = vec2(x, y);
    if is_mouse_button_pressed(MouseButton::Left) {
        events.push(GestureEvent::Start {
            id: MOUSE_TOUCH_ID,
            position,
        });
    } else if is_mouse_button_down(MouseButton::Left) {
        events.push(GestureEvent::Move {
            id: MOUSE_TOUCH_ID,
            position,
        });
    }
    if is_mouse_button_released(MouseButton::Left) {
        events.push(GestureEvent::End { id: MOUSE_TOUCH_ID });
    }
    if is_mouse_button_down(MouseButton::Left) {
        active.push(MOUSE_TOUCH_ID);
    }

    (events, active)
}

/// Joystick surface anchored to the bottom-left corner
pub fn joystick_surface(screen_height: f32, surface_size: f32) -> JoystickSurface {
    JoystickSurface::square(
        SCREEN_PADDING,
        screen_height - SCREEN_PADDING - surface_size,
        surface_size,
    )
}

pub struct MobileControls {
    joystick: TouchSurfaceController,
    pad: ActionPad,
}

impl MobileControls {
    pub fn new(joystick: TouchSurfaceController, pad: ActionPad) -> Self {
        Self { joystick, pad }
    }

    /// Default layout for a screen of the given size.
    pub fn for_screen(
        screen_width: f32,
        screen_height: f32,
        surface_size: f32,
        deadzone: f32,
        aggregator: Option<SharedAggregator>,
    ) -> Self {
        let joystick = TouchSurfaceController::new(
            Some(joystick_surface(screen_height, surface_size)),
            aggregator.clone(),
        )
        .with_deadzone(deadzone);
        let pad = ActionPad::new(ActionPad::layout(screen_width, screen_height), aggregator);
        Self::new(joystick, pad)
    }

    /// Re-anchors every control after the window size changed.
    pub fn resize(&mut self, screen_width: f32, screen_height: f32, surface_size: f32) {
        self.joystick
            .set_surface(Some(joystick_surface(screen_height, surface_size)));
        self.pad
            .set_regions(ActionPad::layout(screen_width, screen_height));
    }

    pub fn joystick(&self) -> &TouchSurfaceController {
        &self.joystick
    }

    pub fn pad(&self) -> &ActionPad {
        &self.pad
    }

    /// The joystick gets the first claim on a new touch.
    pub fn handle(&mut self, event: GestureEvent) {
        match event {
            GestureEvent::Start { id, position } => {
                if !self.joystick.touch_start(id, position) {
                    self.pad.touch_start(id, position);
                }
            }
            GestureEvent::Move { id, position } => {
                self.joystick.touch_move(id, position);
            }
            GestureEvent::End { id } => {
                self.joystick.touch_end(id);
                self.pad.touch_end(id);
            }
            GestureEvent::Cancel { id } => {
                self.joystick.touch_cancel(id);
                self.pad.touch_cancel(id);
            }
        }
    }

    /// Cancels every drag or press whose touch is no longer reported.
    ///
    /// Catches touches that vanished without an end event, e.g. when the
    /// app lost focus mid-gesture.
    pub fn sweep(&mut self, active: &[u64]) {
        if let Some(id) = self.joystick.tracking_touch() {
            if !active.contains(&id) {
                self.joystick.touch_cancel(id);
            }
        }

        let stale: Vec<u64> = self
            .pad
            .held_touches()
            .filter(|id| !active.contains(id))
            .collect();
        for id in stale {
            self.pad.touch_cancel(id);
        }
    }

    pub fn release_all(&mut self) {
        self.joystick.release_all();
        self.pad.release_all();
    }
}
