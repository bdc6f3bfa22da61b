//! main.rs — sensor traffic simulator entry point
//!
//! Generates plausible WiFi beacon, BT advertisement, sub-GHz capture, and
//! explicit Remote-ID events and unicasts them to the backend feed port as
//! `sensor-events` JSON datagrams. Useful for driving the detection pipeline
//! and the SSE stream without radios attached.

mod generators;
mod udp_tx;

use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tracing::{info, warn};

use generators::EventGenerator;
use udp_tx::UdpTransmitter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sensor-sim", about = "Drone Ops synthetic sensor traffic generator")]
struct Args {
    /// Backend feed address
    #[arg(long, default_value = "127.0.0.1:5575")]
    target: String,
    /// Events per second
    #[arg(long, default_value = "2.0")]
    rate_hz: f64,
    /// Stop after this many events (0 = run forever)
    #[arg(long, default_value = "0")]
    count: u64,
    /// Fraction of events that look drone-related (0.0–1.0)
    #[arg(long, default_value = "0.5")]
    drone_ratio: f64,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensor_simulator=info".into()),
        )
        .init();

    let args = Args::parse();
    info!(
        "sensor-sim → {} at {:.1} Hz (drone ratio {:.2})",
        args.target, args.rate_hz, args.drone_ratio
    );

    let tx = match UdpTransmitter::new(&args.target) {
        Ok(tx) => tx,
        Err(e) => {
            warn!("Could not create UDP socket: {e}");
            return;
        }
    };

    let mut generator = EventGenerator::new(args.drone_ratio.clamp(0.0, 1.0));
    let period = Duration::from_secs_f64(1.0 / args.rate_hz.max(0.1));
    let mut interval = tokio::time::interval(period);
    let mut sent: u64 = 0;

    loop {
        interval.tick().await;

        let envelope = generator.next_event();
        tx.send(&envelope);
        sent += 1;

        if args.count > 0 && sent >= args.count {
            info!("Done: {sent} events sent");
            return;
        }

        // Occasional burst to exercise queue-overflow handling downstream
        if rand::thread_rng().gen_bool(0.02) {
            for _ in 0..10 {
                tx.send(&generator.next_event());
                sent += 1;
            }
        }
    }
}
