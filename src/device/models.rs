use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Link state as seen by the hub's callers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Counters accumulated over the hub's lifetime
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubStatistics {
    pub commands_sent: u64,
    pub commands_successful: u64,
    pub commands_failed: u64,
    pub connection_errors: u64,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
}

impl HubStatistics {
    pub fn record_success(&mut self) {
        self.commands_sent += 1;
        self.commands_successful += 1;
        self.last_success = Some(Utc::now());
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.commands_sent += 1;
        self.commands_failed += 1;
        self.last_error = Some(error.into());
    }

    pub fn record_connection_error(&mut self, error: impl Into<String>) {
        self.connection_errors += 1;
        self.last_error = Some(error.into());
    }
}
