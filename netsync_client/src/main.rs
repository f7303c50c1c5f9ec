//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p netsync_client -- [--config client.json] [--host 127.0.0.1]
//!       [--tcp-port 9000] [--udp-port 7777] [--name Player] [--password password]
//!
//! The client authenticates, then walks its player in a circle, syncing with
//! the server every tick and logging what it would draw. Ctrl-C quits.

use std::env;

use anyhow::Context;
use netsync_client::{input::Presentation, GameClient};
use netsync_shared::{
    config::ClientConfig,
    math::{Quat, Vec3},
    state::SessionId,
};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Radians per second of the scripted walk.
const CIRCLE_RATE: f32 = 0.5;

/// Logs one line per entity every `every` frames.
struct LogPresentation {
    frame: u64,
    every: u64,
}

impl Presentation for LogPresentation {
    fn apply_visual_state(&mut self, id: SessionId, position: Vec3, orientation: Quat) {
        if self.frame % self.every == 0 {
            debug!(
                session = %id,
                x = position.x,
                y = position.y,
                z = position.z,
                heading = Quat::IDENTITY.angle_deg(orientation),
                "Draw"
            );
        }
    }
}

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ClientConfig::from_json_file(&args[i + 1])?,
        _ => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" if i + 1 < args.len() => {
                cfg.server_host = args[i + 1].clone();
                i += 2;
            }
            "--tcp-port" if i + 1 < args.len() => {
                cfg.tcp_port = args[i + 1].parse().context("parse --tcp-port")?;
                i += 2;
            }
            "--udp-port" if i + 1 < args.len() => {
                cfg.udp_port = args[i + 1].parse().context("parse --udp-port")?;
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--password" if i + 1 < args.len() => {
                cfg.password = args[i + 1].clone();
                i += 2;
            }
            "--config" => i += 2,
            other => {
                warn!(arg = %other, "Ignoring unknown argument");
                i += 1;
            }
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        server = %cfg.handshake_addr(),
        name = %cfg.player_name,
        tick_hz = cfg.tick_hz,
        "Starting client"
    );

    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    println!("Connected as {}. Press Ctrl-C to quit.", client.session_id());

    let tick = cfg.tick_interval();
    let dt = tick.as_secs_f32();
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut angle = 0.0_f32;
    let mut walk_in_circle = move || {
        angle += CIRCLE_RATE * dt;
        Vec3::new(angle.cos(), 0.0, angle.sin())
    };
    let mut presentation = LogPresentation {
        frame: 0,
        every: u64::from(cfg.tick_hz.max(1)),
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            result = &mut ctrl_c => {
                result.context("wait for ctrl-c")?;
                break;
            }
        }

        client.simulate(dt, &mut walk_in_circle);
        if let Err(e) = client.network_tick().await {
            warn!(error = %e, "Network tick failed");
            break;
        }
        if !client.is_connected() {
            println!("Disconnected from server.");
            break;
        }

        client.present(&mut presentation);
        presentation.frame += 1;
    }

    info!("Shutting down");
    client.shutdown().await
}
