use clap::Parser;
use client::input::{with_aggregator, InputAggregator};
use client::keyboard::{KeyboardFrame, KeyboardMapper};
use client::mobile::{sample_gestures, MobileControls};
use client::network::Uplink;
use client::rendering::Renderer;
use log::{error, info};
use macroquad::prelude::*;
use shared::{JOYSTICK_DEADZONE, SURFACE_SIZE};
use std::rc::Rc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Joystick surface size in pixels
    #[arg(long, default_value_t = SURFACE_SIZE)]
    surface_size: f32,

    /// Joystick deadzone in surface pixels
    #[arg(short = 'd', long, default_value_t = JOYSTICK_DEADZONE)]
    deadzone: f32,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Touch Controls".to_owned(),
        window_width: 800,
        window_height: 600,
        high_dpi: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Controls: touch joystick and buttons, or WASD/arrows, Space, E, Shift, Q, [ and ]");

    // The uplink gets its own runtime thread; the frame loop never blocks on it.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start network runtime: {}", e);
            return;
        }
    };
    let (mut uplink, status_rx) = match runtime.block_on(Uplink::connect(&args.server)) {
        Ok(connected) => connected,
        Err(e) => {
            error!("Failed to create uplink: {}", e);
            return;
        }
    };

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let uplink_handle = std::thread::spawn(move || {
        runtime.block_on(async move {
            if let Err(e) = uplink.run(input_rx).await {
                error!("Uplink failed: {}", e);
            }
        })
    });

    let aggregator = InputAggregator::shared(input_tx);

    // Mouse input is turned into a gesture separately.
    simulate_mouse_with_touch(false);

    let mut screen = (screen_width(), screen_height());
    let mut controls = MobileControls::for_screen(
        screen.0,
        screen.1,
        args.surface_size,
        args.deadzone,
        Some(Rc::clone(&aggregator)),
    );
    let mut keyboard = KeyboardMapper::new();
    let mut renderer = Renderer::new();

    loop {
        let current = (screen_width(), screen_height());
        if current != screen {
            controls.resize(current.0, current.1, args.surface_size);
            screen = current;
        }

        let (events, active) = sample_gestures();
        for event in events {
            controls.handle(event);
        }
        controls.sweep(&active);

        with_aggregator(Some(&aggregator), |a| {
            let pad = controls.pad();
            keyboard.apply_alongside(KeyboardFrame::sample(), a, |action| pad.is_held(action));
            a.keep_alive();
        });

        let status = status_rx.borrow().clone();
        renderer.render(&controls, aggregator.borrow().current(), &status);

        if is_key_pressed(KeyCode::Escape) {
            break;
        }

        next_frame().await;
    }

    controls.release_all();
    // Dropping the last aggregator handle closes the uplink channel.
    drop(controls);
    drop(aggregator);
    if uplink_handle.join().is_err() {
        error!("Uplink thread panicked");
    }
}
