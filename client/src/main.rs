//! Headless bot client: joins a server, drives sinusoidal input at 60 Hz
//! and logs what it observes. Useful for soak-testing a server without a
//! rendering host.

use clap::Parser;
use client::game::InputSample;
use client::network::{Client, ClientConfig};
use glam::Vec2;
use log::{error, info};
use shared::entities::{MoveFlags, TankColor};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Headless arena-tank test client")]
struct Args {
    /// Server address (IPv4 literal or "localhost")
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    server: String,

    /// Server port
    #[clap(short, long, default_value_t = 53000)]
    port: u16,

    /// Display name
    #[clap(short, long, default_value = "bot")]
    name: String,

    /// Preferred tank color (red, blue, green, black)
    #[clap(short, long, default_value = "green")]
    color: String,

    /// Seconds to run before disconnecting
    #[clap(short, long, default_value_t = 30)]
    duration: u64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let color = TankColor::parse(&args.color).unwrap_or(TankColor::Green);
    let config = ClientConfig {
        server_ip: args.server.clone(),
        server_port: args.port,
        player_name: args.name.clone(),
        preferred_color: color,
    };

    let mut client = match Client::connect(config) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to connect to {}:{}: {}", args.server, args.port, e);
            std::process::exit(-1);
        }
    };

    let frame = Duration::from_millis(16);
    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut last = Instant::now();
    let mut elapsed = 0.0f32;
    let mut next_report = 1.0f32;

    while Instant::now() < deadline {
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;
        elapsed += dt;

        // Wander in a slow curve and sweep the barrel around.
        let sample = InputSample {
            moving: MoveFlags {
                forward: elapsed.sin() > -0.5,
                backward: false,
                left: elapsed.cos() > 0.3,
                right: elapsed.cos() < -0.3,
            },
            mouse_position: Some(
                client.game.local_tank.position
                    + Vec2::new((elapsed * 2.0).cos(), (elapsed * 2.0).sin()) * 200.0,
            ),
            fire: client.is_connected() && (elapsed % 2.0) < 0.05,
        };

        client.update(dt, Some(&sample));

        if elapsed >= next_report {
            next_report += 1.0;
            let tank = &client.game.local_tank;
            info!(
                "t={:.0}s connected={} pos=({:.0}, {:.0}) hp={:.0} score={} peers={} enemies={} rtt={:.0}ms",
                elapsed,
                client.is_connected(),
                tank.position.x,
                tank.position.y,
                tank.health(),
                tank.score,
                client.game.remote_player_ids().len(),
                client.game.enemy_ids().len(),
                client.stats().average_rtt,
            );
        }

        thread::sleep(frame);
    }

    if !client.is_connected() {
        error!("never established a session with {}:{}", args.server, args.port);
        client.disconnect();
        std::process::exit(-1);
    }
    client.disconnect();
    info!("bot run complete");
}
