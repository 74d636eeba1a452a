//! Per-connection control state relayed back to every client
//!
//! The relay is the server-side consumer of the client input stream. It keeps
//! the latest joystick vector, button state and inventory cursor of every
//! connection and turns them into one [`Packet::ControlSnapshot`] per tick.
//! It does not simulate anything; an authoritative simulation would read the
//! same entries.

use crate::error::ServerError;
use crate::events::ServerEvent;
use log::{debug, info};
use shared::{timestamp_ms, Action, ButtonState, ControlEntry, InputState, Packet, MAX_PACKET_SIZE};
use std::collections::HashMap;

/// Wrapping index into a fixed-size inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryCursor {
    index: u32,
    slots: u32,
}

impl InventoryCursor {
    /// A cursor over `slots` entries. Zero slots behaves like one.
    pub fn new(slots: u32) -> Self {
        Self {
            index: 0,
            slots: slots.max(1),
        }
    }

    /// Moves the cursor by `delta`, wrapping at both ends.
    pub fn apply(&mut self, delta: i8) {
        let slots = i64::from(self.slots);
        let next = (i64::from(self.index) + i64::from(delta)).rem_euclid(slots);
        self.index = next as u32;
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Latest known controls of one connection
#[derive(Debug, Clone)]
struct ConnectionControls {
    move_x: f32,
    move_y: f32,
    buttons: ButtonState,
    inventory: InventoryCursor,
    /// Highest input sequence applied so far
    last_processed_input: u32,
}

impl ConnectionControls {
    fn new(inventory_slots: u32) -> Self {
        Self {
            move_x: 0.0,
            move_y: 0.0,
            buttons: ButtonState::default(),
            inventory: InventoryCursor::new(inventory_slots),
            last_processed_input: 0,
        }
    }

    fn is_newer(&self, sequence: u32) -> bool {
        sequence > self.last_processed_input
    }

    fn apply_state(&mut self, state: &InputState) {
        self.move_x = state.move_x;
        self.move_y = state.move_y;
        self.buttons = state.buttons;
        self.last_processed_input = state.sequence;
    }

    fn apply_edge(&mut self, sequence: u32, action: Action, pressed: bool) {
        self.buttons.set(action, pressed);
        self.last_processed_input = sequence;
    }

    fn apply_cycle(&mut self, sequence: u32, delta: i8) {
        self.inventory.apply(delta);
        self.last_processed_input = self.last_processed_input.max(sequence);
    }
}

/// Control state of every connection, keyed by connection id
pub struct ControlRelay {
    controls: HashMap<String, ConnectionControls>,
    inventory_slots: u32,
    tick: u32,
}

impl ControlRelay {
    pub fn new(inventory_slots: u32) -> Self {
        Self {
            controls: HashMap::new(),
            inventory_slots,
            tick: 0,
        }
    }

    pub fn add_connection(&mut self, id: &str) {
        self.controls
            .entry(id.to_string())
            .or_insert_with(|| ConnectionControls::new(self.inventory_slots));
        info!("Tracking controls for connection {}", id);
    }

    /// Drops the entry for `id`. Returns false if it was already gone.
    pub fn remove_connection(&mut self, id: &str) -> bool {
        self.controls.remove(id).is_some()
    }

    /// Applies a server event. Wired to every [`crate::EventKind`] by the binary.
    pub fn handle_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Connection { id, .. } => self.add_connection(id),
            ServerEvent::Message { id, packet } => {
                self.apply_packet(id, packet);
            }
            ServerEvent::Disconnect { id, .. } => {
                self.remove_connection(id);
            }
        }
    }

    /// Applies one client packet to the sender's controls
    ///
    /// Snapshots and button edges carry absolute state, so anything not newer
    /// than the last processed sequence is stale and skipped. Inventory
    /// cycles are relative and always applied; skipping one would lose a
    /// step. Returns true when the packet changed the relay.
    pub fn apply_packet(&mut self, id: &str, packet: &Packet) -> bool {
        let Some(controls) = self.controls.get_mut(id) else {
            debug!("Ignoring packet for untracked connection {}", id);
            return false;
        };

        match packet {
            Packet::Input { state } if controls.is_newer(state.sequence) => {
                controls.apply_state(state);
                true
            }
            Packet::ButtonEdge {
                sequence,
                action,
                pressed,
            } if controls.is_newer(*sequence) => {
                controls.apply_edge(*sequence, *action, *pressed);
                debug!(
                    "Connection {} {} {}",
                    id,
                    if *pressed { "pressed" } else { "released" },
                    action
                );
                true
            }
            Packet::CycleInventory { sequence, delta } => {
                controls.apply_cycle(*sequence, *delta);
                true
            }
            _ => false,
        }
    }

    /// Builds the next snapshot and advances the tick counter.
    pub fn snapshot(&mut self) -> Packet {
        self.tick = self.tick.wrapping_add(1);

        let mut last_processed_input = HashMap::with_capacity(self.controls.len());
        let mut controls: Vec<ControlEntry> = Vec::with_capacity(self.controls.len());

        for (id, entry) in &self.controls {
            last_processed_input.insert(id.clone(), entry.last_processed_input);
            controls.push(ControlEntry {
                connection_id: id.clone(),
                move_x: entry.move_x,
                move_y: entry.move_y,
                buttons: entry.buttons,
                inventory_slot: entry.inventory.index(),
            });
        }
        controls.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));

        Packet::ControlSnapshot {
            tick: self.tick,
            timestamp: timestamp_ms(),
            last_processed_input,
            controls,
        }
    }

    /// Builds the next snapshot and encodes it, refusing anything that would
    /// not fit in a single datagram.
    pub fn encode_snapshot(&mut self) -> Result<Vec<u8>, ServerError> {
        let data = bincode::serialize(&self.snapshot())?;
        if data.len() > MAX_PACKET_SIZE {
            return Err(ServerError::PacketTooLarge {
                len: data.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(data)
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DisconnectReason;

    fn input(sequence: u32, move_x: f32, move_y: f32) -> Packet {
        Packet::Input {
            state: InputState {
                sequence,
                timestamp: 0,
                move_x,
                move_y,
                buttons: ButtonState::default(),
            },
        }
    }

    fn entries(packet: Packet) -> (HashMap<String, u32>, Vec<ControlEntry>) {
        match packet {
            Packet::ControlSnapshot {
                last_processed_input,
                controls,
                ..
            } => (last_processed_input, controls),
            other => panic!("Expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_inventory_cursor_wraps_both_ways() {
        let mut cursor = InventoryCursor::new(3);
        cursor.apply(-1);
        assert_eq!(cursor.index(), 2);
        cursor.apply(1);
        assert_eq!(cursor.index(), 0);
        cursor.apply(1);
        cursor.apply(1);
        cursor.apply(1);
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn test_inventory_cursor_zero_slots() {
        let mut cursor = InventoryCursor::new(0);
        cursor.apply(1);
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn test_events_track_connection_lifecycle() {
        let mut relay = ControlRelay::new(8);
        relay.handle_event(&ServerEvent::Connection {
            id: "1".to_string(),
            addr: "127.0.0.1:5000".parse().unwrap(),
        });
        assert_eq!(relay.len(), 1);

        relay.handle_event(&ServerEvent::Disconnect {
            id: "1".to_string(),
            reason: DisconnectReason::TimedOut,
        });
        assert!(relay.is_empty());
        assert!(!relay.remove_connection("1"));
    }

    #[test]
    fn test_stale_inputs_are_ignored() {
        let mut relay = ControlRelay::new(8);
        relay.add_connection("1");

        assert!(relay.apply_packet("1", &input(5, 0.5, 0.0)));
        assert!(!relay.apply_packet("1", &input(4, -1.0, 0.0)));
        assert!(!relay.apply_packet("1", &input(5, -1.0, 0.0)));

        let (acks, controls) = entries(relay.snapshot());
        assert_eq!(acks.get("1"), Some(&5));
        assert_eq!(controls[0].move_x, 0.5);
    }

    #[test]
    fn test_button_edges_update_buttons() {
        let mut relay = ControlRelay::new(8);
        relay.add_connection("1");

        relay.apply_packet(
            "1",
            &Packet::ButtonEdge {
                sequence: 1,
                action: Action::Fire,
                pressed: true,
            },
        );
        let (_, controls) = entries(relay.snapshot());
        assert!(controls[0].buttons.fire);

        relay.apply_packet(
            "1",
            &Packet::ButtonEdge {
                sequence: 2,
                action: Action::Fire,
                pressed: false,
            },
        );
        let (_, controls) = entries(relay.snapshot());
        assert!(!controls[0].buttons.fire);
    }

    #[test]
    fn test_inventory_cycles_are_never_coalesced() {
        let mut relay = ControlRelay::new(8);
        relay.add_connection("1");

        for sequence in 1..=3 {
            relay.apply_packet("1", &Packet::CycleInventory { sequence, delta: 1 });
        }
        // A late cycle still counts.
        relay.apply_packet("1", &Packet::CycleInventory { sequence: 2, delta: 1 });

        let (acks, controls) = entries(relay.snapshot());
        assert_eq!(controls[0].inventory_slot, 4);
        assert_eq!(acks.get("1"), Some(&3));
    }

    #[test]
    fn test_untracked_connection_is_ignored() {
        let mut relay = ControlRelay::new(8);
        assert!(!relay.apply_packet("ghost", &input(1, 1.0, 1.0)));
        assert!(relay.is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted_and_advances_tick() {
        let mut relay = ControlRelay::new(8);
        relay.add_connection("b");
        relay.add_connection("a");

        let first = relay.snapshot();
        let second = relay.snapshot();

        match (first, second) {
            (
                Packet::ControlSnapshot { tick: t1, controls, .. },
                Packet::ControlSnapshot { tick: t2, .. },
            ) => {
                assert_eq!(t2, t1 + 1);
                let ids: Vec<&str> = controls.iter().map(|c| c.connection_id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b"]);
            }
            _ => panic!("Expected snapshots"),
        }
        assert_eq!(relay.tick(), 2);
    }

    #[test]
    fn test_snapshot_at_client_limit_fits_one_datagram() {
        let mut relay = ControlRelay::new(8);
        // Widest possible ids: connection counters never exceed u32::MAX.
        for i in 0..shared::MAX_CLIENTS {
            let id = (u32::MAX - i).to_string();
            relay.add_connection(&id);
            relay.apply_packet(&id, &input(u32::MAX, -1.0, 1.0));
        }

        let data = relay.encode_snapshot().unwrap();
        assert!(data.len() <= MAX_PACKET_SIZE);
        let (acks, controls) = entries(bincode::deserialize(&data).unwrap());
        assert_eq!(controls.len(), shared::MAX_CLIENTS as usize);
        assert_eq!(acks.len(), controls.len());
    }

    #[test]
    fn test_oversized_snapshot_is_refused() {
        let mut relay = ControlRelay::new(8);
        for i in 0..40 {
            relay.add_connection(&format!("{:0>1000}", i));
        }

        assert!(matches!(
            relay.encode_snapshot(),
            Err(ServerError::PacketTooLarge { max: MAX_PACKET_SIZE, .. })
        ));
        assert_eq!(relay.tick(), 1);
    }
}
