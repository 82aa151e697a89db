//! # Application State Management
//!
//! Shared state handed to every HTTP request handler: the loaded
//! configuration, the server start time, and the connection registry.
//!
//! The registry is owned here, at the connection-acceptor level. Each relay
//! actor registers itself when it starts and releases its entry when it
//! stops, so an entry's lifetime is exactly the lifetime of its relay and
//! nothing else in the process holds per-connection state.

use crate::config::AppConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

/// The main application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (loaded once at startup)
    pub config: AppConfig,

    /// Registry of live relay connections
    pub registry: Arc<ConnectionRegistry>,

    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::default()),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Bookkeeping for one live relay connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub connected_at: DateTime<Utc>,
}

/// Tracks the set of live relay connections.
///
/// Entries are keyed by the relay's connection id. Register/release are the
/// only mutations; nothing outside the owning relay ever reaches into an
/// entry.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<Uuid, ConnectionEntry>>,
}

impl ConnectionRegistry {
    /// Add a connection when its relay starts.
    pub fn register(&self, conn_id: Uuid) {
        let mut connections = self.connections.lock().unwrap();
        connections.insert(
            conn_id,
            ConnectionEntry {
                connected_at: Utc::now(),
            },
        );
    }

    /// Remove a connection when its relay stops. Returns whether the entry
    /// existed, so a double release is a visible no-op.
    pub fn release(&self, conn_id: &Uuid) -> bool {
        let mut connections = self.connections.lock().unwrap();
        connections.remove(conn_id).is_some()
    }

    /// Number of currently live connections.
    pub fn active_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}
