use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One point-in-time reading of both tracked signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Local time the reading was taken
    pub observed_at: DateTime<Utc>,
    /// US 10-year treasury yield in percent
    pub yield_10y: Decimal,
    /// USD/JPY spot rate
    pub usd_jpy: Decimal,
}

impl MarketSnapshot {
    pub fn new(observed_at: DateTime<Utc>, yield_10y: Decimal, usd_jpy: Decimal) -> Self {
        Self {
            observed_at,
            yield_10y,
            usd_jpy,
        }
    }

    /// Compact one-line rendering used in prompts and logs
    pub fn summary(&self) -> String {
        format!(
            "{} US10Y={}% USD/JPY={}",
            self.observed_at.format("%Y-%m-%d %H:%M UTC"),
            self.yield_10y.normalize(),
            self.usd_jpy.normalize()
        )
    }
}

/// A news item from the external text source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl Headline {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: String::new(),
            source: String::new(),
            published_at: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Title and summary as one searchable string
    pub fn full_text(&self) -> String {
        if self.summary.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.summary)
        }
    }
}

/// Everything a successful fetch produced for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketObservation {
    pub snapshot: MarketSnapshot,
    pub headlines: Vec<Headline>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_snapshot_summary() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();
        let snapshot = MarketSnapshot::new(at, dec!(4.500), dec!(146.10));

        assert_eq!(
            snapshot.summary(),
            "2026-03-02 09:30 UTC US10Y=4.5% USD/JPY=146.1"
        );
    }

    #[test]
    fn test_headline_full_text() {
        let bare = Headline::new("Yen slides");
        assert_eq!(bare.full_text(), "Yen slides");

        let full = Headline::new("Yen slides").with_summary("BoJ watches closely");
        assert_eq!(full.full_text(), "Yen slides BoJ watches closely");
    }
}
