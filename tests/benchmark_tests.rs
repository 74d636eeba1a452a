//! Performance benchmarks for the input and broadcast hot paths

use bytes::Bytes;
use client::input::InputAggregator;
use client::touch::{clamp_to_radius, normalize_axis, JoystickSurface, TouchSurfaceController};
use macroquad::prelude::vec2;
use server::{ControlRelay, Publisher, TopicHub};
use shared::{
    Action, ButtonState, InputState, InventoryDirection, Packet, MAX_CLIENTS, MAX_PACKET_SIZE,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

fn recording_aggregator() -> (Rc<RefCell<InputAggregator>>, Rc<RefCell<Vec<Packet>>>) {
    let log: Rc<RefCell<Vec<Packet>>> = Rc::new(RefCell::new(Vec::new()));
    (InputAggregator::shared(Rc::clone(&log)), log)
}

/// Benchmarks the joystick geometry
#[test]
fn benchmark_clamp_and_normalize() {
    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let angle = i as f32 * 0.001;
        let d = clamp_to_radius(vec2(angle.cos() * 200.0, angle.sin() * 200.0), 64.0);
        let x = normalize_axis(d.x, 64.0, 10.0);
        let y = normalize_axis(d.y, 64.0, 10.0);
        assert!(x.abs() <= 1.0 + 1e-5 && y.abs() <= 1.0 + 1e-5);
    }

    let duration = start.elapsed();
    println!(
        "Clamp + normalize: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 500ms for 100k iterations
    assert!(duration.as_millis() < 500);
}

/// Benchmarks a long drag through the controller and aggregator
#[test]
fn benchmark_touch_drag() {
    let (aggregator, log) = recording_aggregator();
    let surface = JoystickSurface::square(0.0, 0.0, 128.0);
    let mut joystick = TouchSurfaceController::new(Some(surface), Some(Rc::clone(&aggregator)));

    let moves = 20_000;
    let start = Instant::now();

    joystick.touch_start(1, vec2(64.0, 64.0));
    for i in 0..moves {
        let angle = i as f32 * 0.01;
        joystick.touch_move(1, vec2(64.0 + angle.cos() * 90.0, 64.0 + angle.sin() * 90.0));
    }
    joystick.touch_end(1);

    let duration = start.elapsed();
    println!(
        "Touch drag: {} moves in {:?}, {} packets",
        moves,
        duration,
        log.borrow().len()
    );

    let current = *aggregator.borrow().current();
    assert_eq!((current.move_x, current.move_y), (0.0, 0.0));
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Stress tests button edges and inventory steps under high load
#[test]
fn stress_test_many_edges() {
    let (aggregator, log) = recording_aggregator();
    let iterations = 10_000;
    let start = Instant::now();

    {
        let mut aggregator = aggregator.borrow_mut();
        for i in 0..iterations {
            let action = Action::ALL[i % Action::ALL.len()];
            aggregator.set_button_input(action, true);
            aggregator.set_button_input(action, true);
            aggregator.set_button_input(action, false);
            aggregator.cycle_inventory(InventoryDirection::Next);
        }
    }

    let duration = start.elapsed();
    let edges = log
        .borrow()
        .iter()
        .filter(|p| matches!(p, Packet::ButtonEdge { .. }))
        .count();
    println!("Input edges: {} edges in {:?}", edges, duration);

    assert_eq!(edges, iterations * 2);
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks relay snapshot construction and encoding
#[test]
fn benchmark_snapshot_encoding() {
    let mut relay = ControlRelay::new(8);
    for i in 0..MAX_CLIENTS {
        let id = (u32::MAX - i).to_string();
        relay.add_connection(&id);
        relay.apply_packet(
            &id,
            &Packet::Input {
                state: InputState {
                    sequence: 1,
                    timestamp: 0,
                    move_x: 0.5,
                    move_y: -0.5,
                    buttons: ButtonState {
                        fire: i % 2 == 0,
                        ..ButtonState::default()
                    },
                },
            },
        );
    }

    let iterations = 1_000;
    let start = Instant::now();
    let mut largest = 0;

    for _ in 0..iterations {
        let data = relay.encode_snapshot().unwrap();
        largest = largest.max(data.len());
    }

    let duration = start.elapsed();
    println!(
        "Snapshot encoding: {} iterations in {:?} ({:.2} μs/iter), {} bytes",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64,
        largest
    );

    assert!(largest <= MAX_PACKET_SIZE);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks native publish fan-out to many subscribers
#[test]
fn benchmark_topic_publish() {
    let hub = TopicHub::new();
    let mut receivers: Vec<_> = (0..64).map(|_| hub.subscribe("all")).collect();
    let payload = Bytes::from(vec![0u8; 512]);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        assert!(hub.publish("all", payload.clone(), true));
        for receiver in &mut receivers {
            receiver.try_recv().unwrap();
        }
    }

    let duration = start.elapsed();
    println!(
        "Topic publish: {} x {} subscribers in {:?}",
        iterations,
        receivers.len(),
        duration
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}
