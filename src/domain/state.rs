use super::glitch::{GlitchEvent, GlitchKind};
use super::market::MarketSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Durable agent state, owned by the agent loop and rewritten every cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub last_snapshot: Option<MarketSnapshot>,
    #[serde(default)]
    pub active_kind: GlitchKind,
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Set once the post for the active occurrence has been published
    #[serde(default)]
    pub last_post_id: Option<String>,
    /// Recent snapshots, oldest first
    #[serde(default)]
    pub recent_snapshots: VecDeque<MarketSnapshot>,
}

impl AgentState {
    /// Record a freshly fetched snapshot, keeping at most `history_len` entries
    pub fn record_snapshot(&mut self, snapshot: MarketSnapshot, history_len: usize) {
        self.recent_snapshots.push_back(snapshot.clone());
        while self.recent_snapshots.len() > history_len.max(1) {
            self.recent_snapshots.pop_front();
        }
        self.last_snapshot = Some(snapshot);
    }

    /// Apply a detector verdict. A new event starts a new occurrence that
    /// has not been announced yet.
    pub fn apply_detection(&mut self, active_kind: GlitchKind, event: Option<&GlitchEvent>) {
        self.active_kind = active_kind;
        if let Some(event) = event {
            self.last_triggered_at = Some(event.triggered_at);
            self.last_post_id = None;
        }
    }

    /// Mark the active occurrence as published
    pub fn acknowledge_post(&mut self, post_id: impl Into<String>) {
        self.last_post_id = Some(post_id.into());
    }

    /// Time of the last successful fetch
    pub fn last_fetch_at(&self) -> Option<DateTime<Utc>> {
        self.last_snapshot.as_ref().map(|s| s.observed_at)
    }

    pub fn recent_context(&self) -> Vec<MarketSnapshot> {
        self.recent_snapshots.iter().cloned().collect()
    }
}

/// Append-only record of one successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub event: GlitchEvent,
    pub platform_post_id: String,
    pub posted_at: DateTime<Utc>,
    pub idempotency_key: String,
}

/// Agent loop phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyclePhase {
    /// Waiting for the next cycle
    Idle,
    Fetching,
    Detecting,
    Composing,
    Publishing,
    /// Writing agent state
    Persisting,
    /// Terminal: the agent cannot continue
    Halted,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "IDLE",
            CyclePhase::Fetching => "FETCHING",
            CyclePhase::Detecting => "DETECTING",
            CyclePhase::Composing => "COMPOSING",
            CyclePhase::Publishing => "PUBLISHING",
            CyclePhase::Persisting => "PERSISTING",
            CyclePhase::Halted => "HALTED",
        }
    }

    /// Check if this phase can transition to another phase
    pub fn can_transition_to(&self, target: CyclePhase) -> bool {
        use CyclePhase::*;

        match (self, target) {
            (Idle, Fetching) => true,

            (Fetching, Detecting) => true,  // Fresh snapshot
            (Fetching, Persisting) => true, // Throttled or degraded fetch
            (Fetching, Halted) => true,     // Unauthorized

            (Detecting, Composing) => true,  // Event triggered
            (Detecting, Persisting) => true, // Nothing new

            (Composing, Publishing) => true,

            (Publishing, Persisting) => true,

            (Persisting, Idle) => true,
            (Persisting, Halted) => true, // State could not be written

            _ => false,
        }
    }

    /// Check if this is a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, CyclePhase::Halted)
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
