use super::market::MarketSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named market conditions the agent watches for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlitchKind {
    BullishSqueeze,
    PanicIntervention,
    #[default]
    None,
}

impl GlitchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlitchKind::BullishSqueeze => "BULLISH_SQUEEZE",
            GlitchKind::PanicIntervention => "PANIC_INTERVENTION",
            GlitchKind::None => "NEUTRAL",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, GlitchKind::None)
    }
}

impl std::fmt::Display for GlitchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GlitchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "bullish-squeeze" => Ok(GlitchKind::BullishSqueeze),
            "panic-intervention" => Ok(GlitchKind::PanicIntervention),
            "none" | "neutral" => Ok(GlitchKind::None),
            other => Err(format!("unknown glitch kind: {}", other)),
        }
    }
}

/// A newly triggered glitch awaiting announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlitchEvent {
    /// Never `GlitchKind::None`
    pub kind: GlitchKind,
    pub triggered_at: DateTime<Utc>,
    pub snapshot: MarketSnapshot,
    /// Headline that satisfied a text rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_source_excerpt: Option<String>,
}

impl GlitchEvent {
    pub fn new(
        kind: GlitchKind,
        triggered_at: DateTime<Utc>,
        snapshot: MarketSnapshot,
        text_source_excerpt: Option<String>,
    ) -> Self {
        debug_assert!(!kind.is_none(), "GlitchEvent cannot carry GlitchKind::None");
        Self {
            kind,
            triggered_at,
            snapshot,
            text_source_excerpt,
        }
    }
}
