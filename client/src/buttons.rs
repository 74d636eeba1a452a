//! On-screen action buttons for touch devices

use crate::input::{with_aggregator, SharedAggregator};
use log::debug;
use macroquad::prelude::{vec2, Vec2};
use shared::{Action, InventoryDirection};
use std::collections::HashMap;

const SCREEN_PADDING: f32 = 32.0;
const BUTTON_RADIUS: f32 = 32.0;
const PRIMARY_RADIUS: f32 = 40.0;
const GRID_GAP: f32 = 16.0;

/// What a button does when touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Pressed while a touch rests on the button
    Hold(Action),
    /// One inventory step per tap
    Cycle(InventoryDirection),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonRegion {
    pub control: Control,
    pub center: Vec2,
    pub radius: f32,
}

impl ButtonRegion {
    pub fn contains(&self, point: Vec2) -> bool {
        self.center.distance(point) <= self.radius
    }
}

/// Hit-testing and press tracking for the action buttons
///
/// Each touch that lands on a hold button is remembered until it ends, so a
/// release is reported for the same action even if the finger slid off the
/// button. An action stays pressed while any touch still holds it.
pub struct ActionPad {
    regions: Vec<ButtonRegion>,
    aggregator: Option<SharedAggregator>,
    held: HashMap<u64, Action>,
}

impl ActionPad {
    pub fn new(regions: Vec<ButtonRegion>, aggregator: Option<SharedAggregator>) -> Self {
        Self {
            regions,
            aggregator,
            held: HashMap::new(),
        }
    }

    /// Default bottom-right layout: a 3x2 grid with the fire button in the
    /// middle of the lower row.
    pub fn layout(screen_width: f32, screen_height: f32) -> Vec<ButtonRegion> {
        let pitch = PRIMARY_RADIUS * 2.0 + GRID_GAP;
        let right = screen_width - SCREEN_PADDING - PRIMARY_RADIUS;
        let bottom = screen_height - SCREEN_PADDING - PRIMARY_RADIUS;
        let cell = |column: f32, row: f32| {
            vec2(right - (2.0 - column) * pitch, bottom - (1.0 - row) * pitch)
        };

        let button = |control, center| ButtonRegion {
            control,
            center,
            radius: BUTTON_RADIUS,
        };

        vec![
            button(Control::Hold(Action::Drop), cell(0.0, 0.0)),
            button(Control::Hold(Action::Interact), cell(1.0, 0.0)),
            button(Control::Hold(Action::Sprint), cell(2.0, 0.0)),
            button(Control::Cycle(InventoryDirection::Previous), cell(0.0, 1.0)),
            ButtonRegion {
                control: Control::Hold(Action::Fire),
                center: cell(1.0, 1.0),
                radius: PRIMARY_RADIUS,
            },
            button(Control::Cycle(InventoryDirection::Next), cell(2.0, 1.0)),
        ]
    }

    pub fn set_regions(&mut self, regions: Vec<ButtonRegion>) {
        self.regions = regions;
    }

    pub fn regions(&self) -> &[ButtonRegion] {
        &self.regions
    }

    pub fn control_at(&self, point: Vec2) -> Option<Control> {
        self.regions
            .iter()
            .find(|r| r.contains(point))
            .map(|r| r.control)
    }

    pub fn is_held(&self, action: Action) -> bool {
        self.held.values().any(|held| *held == action)
    }

    pub fn held_touches(&self) -> impl Iterator<Item = u64> + '_ {
        self.held.keys().copied()
    }

    /// Handles a new touch. Returns true if it landed on a button.
    pub fn touch_start(&mut self, touch_id: u64, point: Vec2) -> bool {
        if self.aggregator.is_none() {
            return false;
        }
        let Some(control) = self.control_at(point) else {
            return false;
        };

        match control {
            Control::Hold(action) => {
                self.held.insert(touch_id, action);
                with_aggregator(self.aggregator.as_ref(), |a| {
                    a.set_button_input(action, true)
                });
                debug!("Touch {} pressed {}", touch_id, action);
            }
            Control::Cycle(direction) => {
                with_aggregator(self.aggregator.as_ref(), |a| a.cycle_inventory(direction));
            }
        }
        true
    }

    /// Releases whatever `touch_id` was holding.
    pub fn touch_end(&mut self, touch_id: u64) -> bool {
        let Some(action) = self.held.remove(&touch_id) else {
            return false;
        };
        if !self.is_held(action) {
            with_aggregator(self.aggregator.as_ref(), |a| {
                a.set_button_input(action, false)
            });
        }
        true
    }

    pub fn touch_cancel(&mut self, touch_id: u64) -> bool {
        self.touch_end(touch_id)
    }

    pub fn release_all(&mut self) {
        let touches: Vec<u64> = self.held_touches().collect();
        for touch_id in touches {
            self.touch_end(touch_id);
        }
    }
}
