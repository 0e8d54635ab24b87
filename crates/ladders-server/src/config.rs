//! Server configuration from the environment.

use anyhow::Context;
use ladders_core::{Board, BoardDefinition, Pacing, TURN_SECONDS};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Timing knobs for one game session
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Seconds the active player has to roll
    pub turn_seconds: u32,
    pub pacing: Pacing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            turn_seconds: TURN_SECONDS,
            pacing: Pacing::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Board used by rooms that don't bring their own
    pub default_board: Arc<Board>,
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Read `SERVER_ADDR` and `LADDERS_BOARD`, falling back to defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let addr = std::env::var("SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.into());
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid SERVER_ADDR {:?}", addr))?;

        let default_board = match std::env::var("LADDERS_BOARD") {
            Ok(path) => load_board(&path)?,
            Err(_) => Board::standard(),
        };

        Ok(Self {
            addr,
            default_board: Arc::new(default_board),
            session: SessionConfig::default(),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            default_board: Arc::new(Board::standard()),
            session: SessionConfig::default(),
        }
    }
}

/// Load and validate a board definition file
pub fn load_board(path: impl AsRef<Path>) -> anyhow::Result<Board> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read board file {}", path.display()))?;
    parse_board(&json).with_context(|| format!("Invalid board file {}", path.display()))
}

pub fn parse_board(json: &str) -> anyhow::Result<Board> {
    let definition = BoardDefinition::from_json(json).context("Malformed board definition")?;
    Ok(Board::from_definition(&definition)?)
}
