//! Configuration system.
//!
//! Loads server/client configuration from JSON strings or files. Binaries
//! start from `Default`, optionally load a file, then apply CLI overrides.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::net::{DEFAULT_DATAGRAM_PORT, DEFAULT_HANDSHAKE_PORT};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Handshake listen address, e.g. `0.0.0.0:9000`.
    #[serde(default = "default_tcp_addr")]
    pub tcp_addr: String,
    /// Datagram listen address, e.g. `0.0.0.0:7777`.
    #[serde(default = "default_udp_addr")]
    pub udp_addr: String,
    /// Snapshot broadcast rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Silence after which an active session is evicted.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

fn default_tcp_addr() -> String {
    format!("0.0.0.0:{DEFAULT_HANDSHAKE_PORT}")
}

fn default_udp_addr() -> String {
    format!("0.0.0.0:{DEFAULT_DATAGRAM_PORT}")
}

fn default_tick_hz() -> u32 {
    30
}

fn default_session_timeout_ms() -> u64 {
    5_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_addr: default_tcp_addr(),
            udp_addr: default_udp_addr(),
            tick_hz: default_tick_hz(),
            session_timeout_ms: default_session_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

/// Client configuration: endpoints, identity, movement and smoothing tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    /// Rate of state uploads, snapshot processing and reconciliation.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    #[serde(default = "default_player_name")]
    pub player_name: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Movement speed in units per second.
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    /// Maximum turn rate in degrees per second.
    #[serde(default = "default_rotation_speed")]
    pub rotation_speed: f32,
    /// Prediction error below which no correction is applied.
    #[serde(default = "default_correction_threshold")]
    pub correction_threshold: f32,
    /// Fraction of the prediction error removed per correction.
    #[serde(default = "default_correction_blend")]
    pub correction_blend: f32,
    /// Remote smoothing responsiveness, per second.
    #[serde(default = "default_remote_smoothing_rate")]
    pub remote_smoothing_rate: f32,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_tcp_port() -> u16 {
    DEFAULT_HANDSHAKE_PORT
}

fn default_udp_port() -> u16 {
    DEFAULT_DATAGRAM_PORT
}

fn default_player_name() -> String {
    "Player".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

fn default_move_speed() -> f32 {
    5.0
}

fn default_rotation_speed() -> f32 {
    720.0
}

fn default_correction_threshold() -> f32 {
    0.05
}

fn default_correction_blend() -> f32 {
    0.2
}

fn default_remote_smoothing_rate() -> f32 {
    10.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            tcp_port: default_tcp_port(),
            udp_port: default_udp_port(),
            tick_hz: default_tick_hz(),
            player_name: default_player_name(),
            password: default_password(),
            move_speed: default_move_speed(),
            rotation_speed: default_rotation_speed(),
            correction_threshold: default_correction_threshold(),
            correction_blend: default_correction_blend(),
            remote_smoothing_rate: default_remote_smoothing_rate(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn handshake_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.tcp_port)
    }

    pub fn datagram_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.udp_port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }
}
