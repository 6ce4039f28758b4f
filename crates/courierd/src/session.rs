//! Session table — one entry per live transfer conversation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Metadata about one live session. Created on accept/dial, removed when
/// the handler task finishes.
#[derive(Debug)]
pub struct SessionMeta {
    pub peer_addr: SocketAddr,
    pub direction: Direction,
    pub started_at: Instant,
}

/// The session table — shared across all tasks, keyed by a process-local
/// session number.
pub type SessionTable = Arc<DashMap<u64, SessionMeta>>;

/// Create a new empty session table.
pub fn new_session_table() -> SessionTable {
    Arc::new(DashMap::new())
}
