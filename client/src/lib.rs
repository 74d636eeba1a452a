//! # Touch Controls Client Library
//!
//! This library provides the client side of the input-synchronization path.
//! It turns touch gestures, on-screen button presses and keyboard state into a
//! normalized control state and streams it to the server.
//!
//! ## Architecture Overview
//!
//! Input flows in one direction:
//!
//! ```text
//! touches / mouse ──► MobileControls ──► TouchSurfaceController ─┐
//!                                   └──► ActionPad ──────────────┤
//! keyboard ───────► KeyboardMapper ──────────────────────────────┤
//!                                                                ▼
//!                                                       InputAggregator
//!                                                                │ Packet
//!                                                                ▼
//!                                                    Uplink (UDP, own thread)
//! ```
//!
//! ### Single Source of Truth
//! The [`input::InputAggregator`] owns the joystick vector and button state for
//! the session. Every control writes through its setters; nothing else mutates
//! that state. Each change is forwarded at once, so no input is queued or
//! polled.
//!
//! ### Edge-Triggered Buttons
//! A press and a release each produce exactly one `ButtonEdge` packet. Holding
//! a button, or two fingers on the same button, never produces duplicates.
//!
//! ### Graceful Degradation
//! Controls hold an optional aggregator handle. Until a session exists, or if
//! the surface has no bounds yet, every update is silently ignored.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Sequencing, change detection, keep-alive and the [`input::InputSink`]
//! abstraction over the uplink channel.
//!
//! ### Touch Module (`touch`)
//! The joystick state machine: clamp to radius along the drag angle, per-axis
//! deadzone, reset on end or cancel.
//!
//! ### Buttons Module (`buttons`)
//! Hit regions for the hold buttons and inventory steppers, with per-touch
//! press tracking.
//!
//! ### Keyboard Module (`keyboard`)
//! Desktop fallback using previous-frame edge detection.
//!
//! ### Mobile Module (`mobile`)
//! Maps macroquad touches and the mouse to gestures, routes them to the
//! joystick or the pad, and sweeps touches that vanished without an end event.
//!
//! ### Network Module (`network`)
//! The UDP uplink and the session status it publishes to the frame loop.
//!
//! ### Rendering Module (`rendering`)
//! A debug overlay showing the controls and the current input.
//!
//! ## Usage Example
//!
//! ```rust
//! use client::input::InputAggregator;
//! use client::touch::{JoystickSurface, TouchSurfaceController};
//! use macroquad::prelude::vec2;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let sent = Rc::new(RefCell::new(Vec::<shared::Packet>::new()));
//! let aggregator = InputAggregator::shared(Rc::clone(&sent));
//! let surface = JoystickSurface::square(0.0, 0.0, 128.0);
//! let mut joystick = TouchSurfaceController::new(Some(surface), Some(Rc::clone(&aggregator)));
//!
//! joystick.touch_start(1, vec2(104.0, 64.0));
//! assert_eq!(aggregator.borrow().current().move_x, 0.625);
//!
//! joystick.touch_end(1);
//! assert_eq!(aggregator.borrow().current().move_x, 0.0);
//! ```

pub mod buttons;
pub mod input;
pub mod keyboard;
pub mod mobile;
pub mod network;
pub mod rendering;
pub mod touch;
