use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const CLIENT_VERSION: u32 = 1;
/// Side length of the square joystick surface in pixels. The clamp radius is half of it.
pub const SURFACE_SIZE: f32 = 128.0;
/// Deadzone in surface-local pixels, applied per axis before normalization.
pub const JOYSTICK_DEADZONE: f32 = 10.0;
pub const BROADCAST_TOPIC: &str = "all";
pub const INPUT_KEEP_ALIVE_MS: u64 = 16;
pub const DEFAULT_INVENTORY_SLOTS: u32 = 8;
/// Largest UDP payload over IPv4. Every encoded packet must fit in one datagram.
pub const MAX_PACKET_SIZE: usize = 65_507;
/// Upper bound for concurrent connections; a full control snapshot stays inside one datagram.
pub const MAX_CLIENTS: u32 = 512;

/// Discrete actions a client can hold down
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Fire,
    Interact,
    Sprint,
    Drop,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Fire, Action::Interact, Action::Sprint, Action::Drop];

    pub fn name(self) -> &'static str {
        match self {
            Action::Fire => "fire",
            Action::Interact => "interact",
            Action::Sprint => "sprint",
            Action::Drop => "drop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or_else(|| format!("unknown action '{}'", s))
    }
}

/// Pressed/released flag for every [`Action`]
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub fire: bool,
    pub interact: bool,
    pub sprint: bool,
    pub drop: bool,
}

impl ButtonState {
    pub fn is_pressed(&self, action: Action) -> bool {
        match action {
            Action::Fire => self.fire,
            Action::Interact => self.interact,
            Action::Sprint => self.sprint,
            Action::Drop => self.drop,
        }
    }

    /// Sets the flag for `action`, returning true only when the value changed.
    pub fn set(&mut self, action: Action, pressed: bool) -> bool {
        let slot = match action {
            Action::Fire => &mut self.fire,
            Action::Interact => &mut self.interact,
            Action::Sprint => &mut self.sprint,
            Action::Drop => &mut self.drop,
        };
        let changed = *slot != pressed;
        *slot = pressed;
        changed
    }

    pub fn pressed(&self) -> impl Iterator<Item = Action> + '_ {
        Action::ALL.into_iter().filter(|a| self.is_pressed(*a))
    }
}

/// Relative inventory step. Only -1 and +1 are representable.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum InventoryDirection {
    Previous,
    Next,
}

impl InventoryDirection {
    pub fn delta(self) -> i8 {
        match self {
            InventoryDirection::Previous => -1,
            InventoryDirection::Next => 1,
        }
    }
}

impl TryFrom<i32> for InventoryDirection {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(InventoryDirection::Previous),
            1 => Ok(InventoryDirection::Next),
            other => Err(format!("inventory direction must be -1 or 1, got {}", other)),
        }
    }
}

/// Control-state snapshot sent from client to server
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub move_x: f32,
    pub move_y: f32,
    pub buttons: ButtonState,
}

/// Latest known controls of one connection, as relayed by the server
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ControlEntry {
    pub connection_id: String,
    pub move_x: f32,
    pub move_y: f32,
    pub buttons: ButtonState,
    pub inventory_slot: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        state: InputState,
    },
    ButtonEdge {
        sequence: u32,
        action: Action,
        pressed: bool,
    },
    CycleInventory {
        sequence: u32,
        delta: i8,
    },
    Disconnect,

    Connected {
        connection_id: String,
    },
    ControlSnapshot {
        tick: u32,
        timestamp: u64,
        last_processed_input: HashMap<String, u32>,
        controls: Vec<ControlEntry>,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// Sequence number carried by client-originated input packets.
    pub fn sequence(&self) -> Option<u32> {
        match self {
            Packet::Input { state } => Some(state.sequence),
            Packet::ButtonEdge { sequence, .. } | Packet::CycleInventory { sequence, .. } => {
                Some(*sequence)
            }
            _ => None,
        }
    }
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
