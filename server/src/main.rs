//! Server binary: binds the authoritative server and drives its tick loop.

use clap::Parser;
use log::{error, info};
use server::game::{GameServer, ServerConfig, DEFAULT_PORT};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::interval;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Authoritative arena-tank server")]
struct Args {
    /// UDP port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1024..))]
    port: u16,

    /// Simulation tick rate in Hz
    #[clap(short, long, default_value_t = 60)]
    tick_rate: u32,

    /// RNG seed for spawns and AI (random worlds differ per seed)
    #[clap(short, long, default_value_t = 0)]
    seed: u64,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Note: set RUST_LOG=info to see server logs");
    }

    let args = Args::parse();
    let config = ServerConfig {
        port: args.port,
        seed: args.seed,
        ..ServerConfig::default()
    };

    let mut server = match GameServer::bind(config) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to start server on port {}: {}", args.port, e);
            std::process::exit(-1);
        }
    };

    let tick = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);
    info!("tick rate {} Hz ({:?} per tick); type 'quit' to stop", args.tick_rate, tick);

    let mut ticker = interval(tick);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_tick = Instant::now();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f32();
                last_tick = now;
                server.update(dt);
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(cmd)) if cmd.trim() == "quit" => break,
                    Ok(Some(_)) => info!("unknown command; type 'quit' to stop"),
                    // stdin closed: keep serving headless.
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        error!("stdin error: {}", e);
                        stdin_open = false;
                    }
                }
            }
        }
    }

    server.stop();
}
