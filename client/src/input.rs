//! Client input aggregation with sequencing and edge detection
//!
//! The [`InputAggregator`] owns the canonical joystick and button state for one
//! session. Touch surfaces, on-screen buttons and the keyboard all write to it
//! through its setters; every change is forwarded immediately as a [`Packet`]
//! to an [`InputSink`], normally the uplink channel.

use log::debug;
use shared::{timestamp_ms, Action, InputState, InventoryDirection, Packet, INPUT_KEEP_ALIVE_MS};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Destination for packets produced by the aggregator
pub trait InputSink {
    fn forward(&mut self, packet: Packet);
}

impl InputSink for mpsc::UnboundedSender<Packet> {
    fn forward(&mut self, packet: Packet) {
        if self.send(packet).is_err() {
            debug!("Uplink closed, dropping input packet");
        }
    }
}

/// Collects packets in memory. Handy when no uplink exists yet.
impl InputSink for Rc<RefCell<Vec<Packet>>> {
    fn forward(&mut self, packet: Packet) {
        self.borrow_mut().push(packet);
    }
}

/// Handle shared between the controls that feed one aggregator
pub type SharedAggregator = Rc<RefCell<InputAggregator>>;

/// Runs `f` against the aggregator if there is one and it is not already
/// borrowed. Controls may exist before a session does, so a missing
/// aggregator is not an error.
pub fn with_aggregator<R>(
    aggregator: Option<&SharedAggregator>,
    f: impl FnOnce(&mut InputAggregator) -> R,
) -> Option<R> {
    let aggregator = aggregator?;
    match aggregator.try_borrow_mut() {
        Ok(mut aggregator) => Some(f(&mut aggregator)),
        Err(_) => {
            debug!("Aggregator busy, input dropped");
            None
        }
    }
}

/// Turns control updates into sequenced packets
pub struct InputAggregator {
    next_sequence: u32,
    current_input: InputState,
    last_input_sent: Instant,
    sink: Box<dyn InputSink>,
}

impl InputAggregator {
    pub fn new(sink: impl InputSink + 'static) -> Self {
        Self {
            next_sequence: 1,
            current_input: InputState::default(),
            last_input_sent: Instant::now(),
            sink: Box::new(sink),
        }
    }

    pub fn shared(sink: impl InputSink + 'static) -> SharedAggregator {
        Rc::new(RefCell::new(Self::new(sink)))
    }

    /// Overwrites the joystick vector
    ///
    /// Values are expected in [-1, 1] but are not clamped here; the touch
    /// surface is responsible for that. A snapshot is forwarded only when the
    /// vector actually changed.
    pub fn set_joystick_input(&mut self, x: f32, y: f32) {
        if self.current_input.move_x == x && self.current_input.move_y == y {
            return;
        }
        self.current_input.move_x = x;
        self.current_input.move_y = y;
        self.forward_snapshot();
    }

    /// Records a press or release of `action`
    ///
    /// Repeating the current value is ignored so that each physical press and
    /// release produces exactly one edge. A real edge is forwarded as its own
    /// [`Packet::ButtonEdge`], followed by a snapshot carrying the new button
    /// state. Returns true when an edge happened.
    pub fn set_button_input(&mut self, action: Action, pressed: bool) -> bool {
        if !self.current_input.buttons.set(action, pressed) {
            return false;
        }

        let sequence = self.take_sequence();
        self.sink.forward(Packet::ButtonEdge {
            sequence,
            action,
            pressed,
        });
        self.forward_snapshot();
        true
    }

    /// Emits one relative inventory step. Calls are never coalesced.
    pub fn cycle_inventory(&mut self, direction: InventoryDirection) {
        let sequence = self.take_sequence();
        self.sink.forward(Packet::CycleInventory {
            sequence,
            delta: direction.delta(),
        });
    }

    /// Re-sends the current snapshot if nothing was forwarded recently.
    pub fn keep_alive(&mut self) -> bool {
        if self.last_input_sent.elapsed() < Duration::from_millis(INPUT_KEEP_ALIVE_MS) {
            return false;
        }
        self.forward_snapshot();
        true
    }

    /// Centers the joystick and releases every held button.
    pub fn release_all(&mut self) {
        self.set_joystick_input(0.0, 0.0);
        let held: Vec<Action> = self.current_input.buttons.pressed().collect();
        for action in held {
            self.set_button_input(action, false);
        }
    }

    /// Returns the current input state
    pub fn current(&self) -> &InputState {
        &self.current_input
    }

    fn take_sequence(&mut self) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    fn forward_snapshot(&mut self) {
        self.current_input.sequence = self.take_sequence();
        self.current_input.timestamp = timestamp_ms();
        self.sink.forward(Packet::Input {
            state: self.current_input,
        });
        self.last_input_sent = Instant::now();
    }
}
