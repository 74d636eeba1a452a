//! Desktop keyboard fallback with edge detection

use crate::input::InputAggregator;
use macroquad::prelude::{is_key_down, KeyCode};
use shared::{Action, InventoryDirection};

/// Key state sampled once per frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardFrame {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
    pub interact: bool,
    pub sprint: bool,
    pub drop: bool,
    pub previous_item: bool,
    pub next_item: bool,
}

impl KeyboardFrame {
    /// Reads the current key state from macroquad (WASD and arrow keys both move).
    pub fn sample() -> Self {
        Self {
            up: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
            fire: is_key_down(KeyCode::Space),
            interact: is_key_down(KeyCode::E),
            sprint: is_key_down(KeyCode::LeftShift),
            drop: is_key_down(KeyCode::Q),
            previous_item: is_key_down(KeyCode::LeftBracket),
            next_item: is_key_down(KeyCode::RightBracket),
        }
    }

    fn axis(negative: bool, positive: bool) -> f32 {
        match (negative, positive) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }

    pub fn movement(&self) -> (f32, f32) {
        (
            Self::axis(self.left, self.right),
            Self::axis(self.up, self.down),
        )
    }

    fn is_moving(&self) -> bool {
        self.up || self.down || self.left || self.right
    }

    fn action(&self, action: Action) -> bool {
        match action {
            Action::Fire => self.fire,
            Action::Interact => self.interact,
            Action::Sprint => self.sprint,
            Action::Drop => self.drop,
        }
    }
}

/// Feeds keyboard frames into an aggregator
///
/// Buttons and inventory keys only act on transitions against the previous
/// frame. The joystick is only written while a movement key is held and once
/// more when the last one is released, so the keyboard does not fight an
/// active touch drag.
#[derive(Debug, Default)]
pub struct KeyboardMapper {
    previous: KeyboardFrame,
}

impl KeyboardMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, frame: KeyboardFrame, aggregator: &mut InputAggregator) {
        self.apply_alongside(frame, aggregator, |_| false);
    }

    /// Like [`apply`](Self::apply), but a key release is not forwarded while
    /// `held_by_touch` reports the same action still held on screen.
    pub fn apply_alongside(
        &mut self,
        frame: KeyboardFrame,
        aggregator: &mut InputAggregator,
        held_by_touch: impl Fn(Action) -> bool,
    ) {
        if frame.is_moving() || self.previous.is_moving() {
            let (x, y) = frame.movement();
            aggregator.set_joystick_input(x, y);
        }

        for action in Action::ALL {
            let now = frame.action(action);
            if now == self.previous.action(action) || (!now && held_by_touch(action)) {
                continue;
            }
            aggregator.set_button_input(action, now);
        }

        // Detect key press events (current && !previous)
        if frame.previous_item && !self.previous.previous_item {
            aggregator.cycle_inventory(InventoryDirection::Previous);
        }
        if frame.next_item && !self.previous.next_item {
            aggregator.cycle_inventory(InventoryDirection::Next);
        }

        self.previous = frame;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::{ActionPad, ButtonRegion, Control};
    use macroquad::prelude::vec2;
    use shared::Packet;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn aggregator() -> (InputAggregator, Rc<RefCell<Vec<Packet>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (InputAggregator::new(Rc::clone(&log)), log)
    }

    #[test]
    fn test_movement_axes() {
        let frame = KeyboardFrame {
            left: true,
            down: true,
            ..KeyboardFrame::default()
        };
        assert_eq!(frame.movement(), (-1.0, 1.0));

        let opposing = KeyboardFrame {
            left: true,
            right: true,
            ..KeyboardFrame::default()
        };
        assert_eq!(opposing.movement(), (0.0, 0.0));
    }

    #[test]
    fn test_held_key_is_one_press() {
        let (mut aggregator, log) = aggregator();
        let mut mapper = KeyboardMapper::new();
        let fire = KeyboardFrame {
            fire: true,
            ..KeyboardFrame::default()
        };

        mapper.apply(fire, &mut aggregator);
        mapper.apply(fire, &mut aggregator);
        mapper.apply(fire, &mut aggregator);
        mapper.apply(KeyboardFrame::default(), &mut aggregator);

        let edges: Vec<bool> = log
            .borrow()
            .iter()
            .filter_map(|p| match p {
                Packet::ButtonEdge { pressed, .. } => Some(*pressed),
                _ => None,
            })
            .collect();
        assert_eq!(edges, vec![true, false]);
    }

    #[test]
    fn test_key_release_waits_for_touch_hold() {
        let log = Rc::new(RefCell::new(Vec::<Packet>::new()));
        let shared = InputAggregator::shared(Rc::clone(&log));
        let mut mapper = KeyboardMapper::new();
        let mut pad = ActionPad::new(
            vec![ButtonRegion {
                control: Control::Hold(Action::Fire),
                center: vec2(50.0, 50.0),
                radius: 20.0,
            }],
            Some(Rc::clone(&shared)),
        );
        let fire = KeyboardFrame {
            fire: true,
            ..KeyboardFrame::default()
        };
        let releases = || {
            log.borrow()
                .iter()
                .filter(|p| matches!(p, Packet::ButtonEdge { pressed: false, .. }))
                .count()
        };

        pad.touch_start(7, vec2(50.0, 50.0));
        mapper.apply_alongside(fire, &mut shared.borrow_mut(), |a| pad.is_held(a));
        mapper.apply_alongside(KeyboardFrame::default(), &mut shared.borrow_mut(), |a| {
            pad.is_held(a)
        });

        assert!(shared.borrow().current().buttons.is_pressed(Action::Fire));
        assert_eq!(releases(), 0);

        pad.touch_end(7);
        assert!(!shared.borrow().current().buttons.is_pressed(Action::Fire));
        assert_eq!(releases(), 1);
    }

    #[test]
    fn test_inventory_keys_step_on_press_only() {
        let (mut aggregator, log) = aggregator();
        let mut mapper = KeyboardMapper::new();
        let next = KeyboardFrame {
            next_item: true,
            ..KeyboardFrame::default()
        };

        mapper.apply(next, &mut aggregator);
        mapper.apply(next, &mut aggregator);
        mapper.apply(KeyboardFrame::default(), &mut aggregator);
        mapper.apply(next, &mut aggregator);

        let cycles = log
            .borrow()
            .iter()
            .filter(|p| matches!(p, Packet::CycleInventory { delta: 1, .. }))
            .count();
        assert_eq!(cycles, 2);
    }

    #[test]
    fn test_releasing_movement_centers_once() {
        let (mut aggregator, log) = aggregator();
        let mut mapper = KeyboardMapper::new();

        mapper.apply(
            KeyboardFrame {
                right: true,
                ..KeyboardFrame::default()
            },
            &mut aggregator,
        );
        assert_eq!(aggregator.current().move_x, 1.0);

        mapper.apply(KeyboardFrame::default(), &mut aggregator);
        assert_eq!(aggregator.current().move_x, 0.0);

        let sent = log.borrow().len();
        mapper.apply(KeyboardFrame::default(), &mut aggregator);
        assert_eq!(log.borrow().len(), sent);
    }

    #[test]
    fn test_idle_keyboard_leaves_joystick_alone() {
        let (mut aggregator, _log) = aggregator();
        let mut mapper = KeyboardMapper::new();

        aggregator.set_joystick_input(0.4, -0.2);
        mapper.apply(KeyboardFrame::default(), &mut aggregator);

        assert_eq!(aggregator.current().move_x, 0.4);
        assert_eq!(aggregator.current().move_y, -0.2);
    }
}
