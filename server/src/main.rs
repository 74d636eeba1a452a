use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn};
use server::{
    broadcast, ControlRelay, Delivery, EventKind, ServerAdapter, UdpServer, WsServer,
};
use shared::{BROADCAST_TOPIC, DEFAULT_INVENTORY_SLOTS, MAX_CLIENTS};
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Datagram transport, broadcasts by iterating connections
    Udp,
    /// WebSocket transport with native topic broadcast
    Ws,
}

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Transport implementation
    #[clap(long, value_enum, default_value = "udp")]
    transport: Transport,
    /// Control snapshots per second
    #[clap(short, long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..))]
    tick_rate: u32,
    /// Maximum number of concurrent connections
    #[clap(
        short,
        long,
        default_value = "32",
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_CLIENTS))
    )]
    max_clients: u32,
    /// Inventory size used to wrap cycle commands
    #[clap(long, default_value_t = DEFAULT_INVENTORY_SLOTS)]
    inventory_slots: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let tick_duration = Duration::from_secs_f64(1.0 / f64::from(args.tick_rate));

    info!(
        "Starting {:?} server with tick rate {}Hz ({:?} per tick)",
        args.transport, args.tick_rate, tick_duration
    );

    match args.transport {
        Transport::Udp => {
            let adapter = UdpServer::new(args.host.clone(), args.max_clients as usize);
            run(adapter, &args, tick_duration).await
        }
        Transport::Ws => {
            let adapter = WsServer::new(args.host.clone(), args.max_clients as usize);
            run(adapter, &args, tick_duration).await
        }
    }
}

/// Runs the relay loop on any transport until it shuts down or Ctrl+C.
async fn run<A: ServerAdapter>(
    mut adapter: A,
    args: &Args,
    tick_duration: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let relay = Rc::new(RefCell::new(ControlRelay::new(args.inventory_slots)));

    for kind in [EventKind::Connection, EventKind::Message, EventKind::Disconnect] {
        let relay = Rc::clone(&relay);
        adapter.on(kind, move |event| relay.borrow_mut().handle_event(event));
    }
    adapter
        .on(EventKind::Connection, |event| {
            info!("Connection {} established", event.id())
        })
        .on(EventKind::Disconnect, |event| {
            info!("Connection {} closed", event.id())
        });

    // A bind failure ends the process here.
    adapter.listen(
        args.port,
        Some(Box::new(|addr: SocketAddr| info!("Server bound to {}", addr))),
    )?;

    let mut tick_interval = interval(tick_duration);
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Server started successfully");

    loop {
        tokio::select! {
            event = adapter.next_event() => match event {
                Some(event) => {
                    adapter.emit(&event);
                }
                None => {
                    info!("Transport closed, shutting down");
                    break;
                }
            },

            _ = tick_interval.tick() => {
                broadcast_snapshot(&adapter, &mut relay.borrow_mut());
            },

            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    Ok(())
}

fn broadcast_snapshot<A: ServerAdapter>(adapter: &A, relay: &mut ControlRelay) {
    if adapter.sockets().is_empty() {
        return;
    }

    let data = match relay.encode_snapshot() {
        Ok(data) => data,
        Err(e) => {
            error!("Tick {}: dropping snapshot: {}", relay.tick(), e);
            return;
        }
    };

    match broadcast(adapter, BROADCAST_TOPIC, bytes::Bytes::from(data), true) {
        Delivery::Published { accepted: false } => {
            warn!("Tick {}: publish reached no subscribers", relay.tick())
        }
        Delivery::FannedOut { failed, .. } if failed > 0 => {
            warn!("Tick {}: {} sends failed", relay.tick(), failed)
        }
        delivery => debug!("Tick {}: {:?}", relay.tick(), delivery),
    }
}
