//! Tracked entities and per-attempt processing results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship status of a tracked entity.
///
/// `Connected`, `NotConnected` and `Unknown` are observations made by probing
/// the target. `Pending`, `Success` and `Failed` are outcomes of attempting
/// the removal action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Connected,
    NotConnected,
    Unknown,
    Success,
    Failed,
}

impl ConnectionStatus {
    pub const ALL: [ConnectionStatus; 6] = [
        Self::Pending,
        Self::Connected,
        Self::NotConnected,
        Self::Unknown,
        Self::Success,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connected => "connected",
            Self::NotConnected => "not_connected",
            Self::Unknown => "unknown",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "connected" => Some(Self::Connected),
            "not_connected" => Some(Self::NotConnected),
            "unknown" => Some(Self::Unknown),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether an entity in this status is picked up by the next run.
    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical identifier (normalized profile URL).
    pub id: String,
    pub status: ConnectionStatus,
    /// Free-text diagnostic from the last attempt.
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Operator-facing outcome of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Result of running the relationship state machine once against one entity.
///
/// Transient: folded into a store write immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingResult {
    /// What the probe observed (`Connected`, `NotConnected` or `Unknown`).
    pub observed: ConnectionStatus,
    pub succeeded: bool,
    pub message: String,
    /// The site answered with a throttling status; the run should stop.
    pub rate_limited: bool,
}

impl ProcessingResult {
    pub fn connected(succeeded: bool, message: impl Into<String>) -> Self {
        Self {
            observed: ConnectionStatus::Connected,
            succeeded,
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self {
            observed: ConnectionStatus::NotConnected,
            succeeded: false,
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            observed: ConnectionStatus::Unknown,
            succeeded: false,
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn with_rate_limit(mut self, rate_limited: bool) -> Self {
        self.rate_limited = rate_limited;
        self
    }

    pub fn outcome(&self) -> Outcome {
        match self.observed {
            ConnectionStatus::NotConnected => Outcome::Skipped,
            ConnectionStatus::Connected if self.succeeded => Outcome::Success,
            _ => Outcome::Failed,
        }
    }

    /// Status to write back to the store, if any.
    ///
    /// Dry runs never persist the outcome of a removal attempt so the entity
    /// stays eligible for the live run.
    pub fn status_to_persist(&self, dry_run: bool) -> Option<ConnectionStatus> {
        match self.observed {
            ConnectionStatus::NotConnected => Some(ConnectionStatus::NotConnected),
            ConnectionStatus::Connected if dry_run => None,
            ConnectionStatus::Connected if self.succeeded => Some(ConnectionStatus::Success),
            _ => Some(ConnectionStatus::Failed),
        }
    }
}
