//! Glitch Detector
//!
//! Pure evaluation of one observation against the rule table. Rules are
//! independent; when several hold at once the highest-priority one wins and
//! the rest wait for a later cycle.
//!
//! Hysteresis: a rule fires only on the transition into its condition. While
//! the active kind keeps holding nothing new is reported; once it stops,
//! `active_kind` drops back to `None` and the rule is re-armed.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::domain::{AgentState, GlitchEvent, GlitchKind, Headline, MarketSnapshot};

/// Rule evaluation order; lower runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RulePriority {
    Numeric = 0,
    Text = 1,
}

/// A single glitch condition
pub trait GlitchRule: Send + Sync {
    fn kind(&self) -> GlitchKind;

    fn priority(&self) -> RulePriority;

    /// `Some(excerpt)` when the condition holds; the excerpt is the text
    /// evidence, if the rule has any
    fn check(&self, snapshot: &MarketSnapshot, headlines: &[Headline]) -> Option<Option<String>>;
}

/// Yields above 4.2% while USD/JPY sits below 148
#[derive(Debug, Clone)]
pub struct BullishSqueezeRule {
    pub yield_floor: Decimal,
    pub usd_jpy_ceiling: Decimal,
}

impl Default for BullishSqueezeRule {
    fn default() -> Self {
        Self {
            yield_floor: dec!(4.2),
            usd_jpy_ceiling: dec!(148),
        }
    }
}

impl GlitchRule for BullishSqueezeRule {
    fn kind(&self) -> GlitchKind {
        GlitchKind::BullishSqueeze
    }

    fn priority(&self) -> RulePriority {
        RulePriority::Numeric
    }

    fn check(&self, snapshot: &MarketSnapshot, _headlines: &[Headline]) -> Option<Option<String>> {
        (snapshot.yield_10y > self.yield_floor && snapshot.usd_jpy < self.usd_jpy_ceiling)
            .then_some(None)
    }
}

/// A headline attributing "intervention" talk to the central bank
#[derive(Debug, Clone)]
pub struct InterventionRule {
    pub token: String,
    /// Lowercase names that attribute the headline to the central bank
    pub aliases: Vec<String>,
}

impl Default for InterventionRule {
    fn default() -> Self {
        Self {
            token: "intervention".to_string(),
            aliases: vec![
                "bank of japan".to_string(),
                "boj".to_string(),
                "central bank".to_string(),
                "japanese authorities".to_string(),
            ],
        }
    }
}

impl InterventionRule {
    fn matches(&self, headline: &Headline) -> bool {
        let text = headline.full_text().to_lowercase();
        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let has_token = words.iter().any(|w| *w == self.token);
        let attributed = self.aliases.iter().any(|alias| {
            if alias.contains(' ') {
                text.contains(alias.as_str())
            } else {
                words.iter().any(|w| w == alias)
            }
        });

        has_token && attributed
    }
}

impl GlitchRule for InterventionRule {
    fn kind(&self) -> GlitchKind {
        GlitchKind::PanicIntervention
    }

    fn priority(&self) -> RulePriority {
        RulePriority::Text
    }

    fn check(&self, _snapshot: &MarketSnapshot, headlines: &[Headline]) -> Option<Option<String>> {
        headlines
            .iter()
            .find(|h| self.matches(h))
            .map(|h| Some(h.title.clone()))
    }
}

/// Detector verdict for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Newly triggered event, if any
    pub event: Option<GlitchEvent>,
    /// `active_kind` to carry into the next cycle
    pub active_kind: GlitchKind,
}

pub struct GlitchDetector {
    rules: Vec<Box<dyn GlitchRule>>,
}

impl Default for GlitchDetector {
    fn default() -> Self {
        let rules: Vec<Box<dyn GlitchRule>> = vec![
            Box::new(BullishSqueezeRule::default()),
            Box::new(InterventionRule::default()),
        ];
        Self::new(rules)
    }
}

impl GlitchDetector {
    pub fn new(mut rules: Vec<Box<dyn GlitchRule>>) -> Self {
        // Stable: equal priorities keep table order
        rules.sort_by_key(|r| r.priority());
        Self { rules }
    }

    pub fn evaluate(
        &self,
        current: &MarketSnapshot,
        headlines: &[Headline],
        prior: &AgentState,
    ) -> Detection {
        let holding: Vec<(GlitchKind, Option<String>)> = self
            .rules
            .iter()
            .filter_map(|rule| rule.check(current, headlines).map(|excerpt| (rule.kind(), excerpt)))
            .collect();

        if !prior.active_kind.is_none() && holding.iter().any(|(kind, _)| *kind == prior.active_kind) {
            debug!("{} still active, not re-firing", prior.active_kind);
            return Detection {
                event: None,
                active_kind: prior.active_kind,
            };
        }

        if !prior.active_kind.is_none() {
            info!("{} cleared, rule re-armed", prior.active_kind);
        }

        match holding.into_iter().next() {
            Some((kind, excerpt)) => {
                info!("Glitch Logic: {} detected!", kind);
                Detection {
                    event: Some(GlitchEvent::new(
                        kind,
                        current.observed_at,
                        current.clone(),
                        excerpt,
                    )),
                    active_kind: kind,
                }
            }
            None => Detection {
                event: None,
                active_kind: GlitchKind::None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snapshot(minute: u32, yield_10y: Decimal, usd_jpy: Decimal) -> MarketSnapshot {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).unwrap();
        MarketSnapshot::new(at, yield_10y, usd_jpy)
    }

    fn squeeze(minute: u32) -> MarketSnapshot {
        snapshot(minute, dec!(4.5), dec!(146))
    }

    fn calm(minute: u32) -> MarketSnapshot {
        snapshot(minute, dec!(4.0), dec!(150))
    }

    fn boj_headline() -> Headline {
        Headline::new("Yen jumps as BoJ hints at intervention")
    }

    /// Thread state through the detector like the agent loop does
    fn run(detector: &GlitchDetector, cycles: &[(MarketSnapshot, Vec<Headline>)]) -> Vec<GlitchEvent> {
        let mut state = AgentState::default();
        let mut events = Vec::new();
        for (snap, headlines) in cycles {
            let detection = detector.evaluate(snap, headlines, &state);
            state.apply_detection(detection.active_kind, detection.event.as_ref());
            events.extend(detection.event);
        }
        events
    }

    #[test]
    fn test_squeeze_scenario_fires() {
        let detection = GlitchDetector::default().evaluate(&squeeze(0), &[], &AgentState::default());

        let event = detection.event.unwrap();
        assert_eq!(event.kind, GlitchKind::BullishSqueeze);
        assert_eq!(event.snapshot, squeeze(0));
        assert_eq!(event.triggered_at, squeeze(0).observed_at);
        assert_eq!(detection.active_kind, GlitchKind::BullishSqueeze);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let detector = GlitchDetector::default();
        let none = AgentState::default();

        let at_floor = snapshot(0, dec!(4.2), dec!(146));
        assert!(detector.evaluate(&at_floor, &[], &none).event.is_none());

        let at_ceiling = snapshot(0, dec!(4.5), dec!(148));
        assert!(detector.evaluate(&at_ceiling, &[], &none).event.is_none());
    }

    #[test]
    fn test_sustained_condition_fires_once() {
        let detector = GlitchDetector::default();
        for n in [1u32, 2, 7, 30] {
            let cycles: Vec<(MarketSnapshot, Vec<Headline>)> = (0..n).map(|m| (squeeze(m), vec![])).collect();
            let events = run(&detector, &cycles);
            assert_eq!(events.len(), 1, "n = {}", n);
            assert_eq!(events[0].triggered_at, squeeze(0).observed_at);
        }
    }

    #[test]
    fn test_second_consecutive_cycle_is_quiet() {
        let detector = GlitchDetector::default();
        let prior = AgentState {
            active_kind: GlitchKind::BullishSqueeze,
            last_post_id: Some("X".to_string()),
            ..Default::default()
        };

        let detection = detector.evaluate(&squeeze(1), &[], &prior);
        assert!(detection.event.is_none());
        assert_eq!(detection.active_kind, GlitchKind::BullishSqueeze);
    }

    #[test]
    fn test_reentry_fires_again() {
        let cycles: Vec<(MarketSnapshot, Vec<Headline>)> = vec![
            (squeeze(0), vec![]),
            (squeeze(1), vec![]),
            (calm(2), vec![]),
            (squeeze(3), vec![]),
            (squeeze(4), vec![]),
        ];

        let events = run(&GlitchDetector::default(), &cycles);
        let times: Vec<_> = events.iter().map(|e| e.triggered_at).collect();
        assert_eq!(times, vec![squeeze(0).observed_at, squeeze(3).observed_at]);
    }

    #[test]
    fn test_clearing_resets_active_kind() {
        let prior = AgentState {
            active_kind: GlitchKind::BullishSqueeze,
            ..Default::default()
        };
        let detection = GlitchDetector::default().evaluate(&calm(0), &[], &prior);
        assert_eq!(detection, Detection { event: None, active_kind: GlitchKind::None });
    }

    #[test]
    fn test_intervention_headline_fires_with_excerpt() {
        let detection = GlitchDetector::default().evaluate(
            &calm(0),
            &[Headline::new("Stocks drift"), boj_headline()],
            &AgentState::default(),
        );

        let event = detection.event.unwrap();
        assert_eq!(event.kind, GlitchKind::PanicIntervention);
        assert_eq!(
            event.text_source_excerpt.as_deref(),
            Some("Yen jumps as BoJ hints at intervention")
        );
    }

    #[test]
    fn test_intervention_needs_central_bank_attribution() {
        let rule = InterventionRule::default();
        assert!(rule.matches(&Headline::new("INTERVENTION fears: Bank of Japan on alert")));
        assert!(rule.matches(
            &Headline::new("Yen slides").with_summary("The central bank weighs intervention.")
        ));
        assert!(!rule.matches(&Headline::new("Analysts debate intervention odds")));
        assert!(!rule.matches(&Headline::new("BoJ holds rates steady")));
        // Whole words only
        assert!(!rule.matches(&Headline::new("BoJ non-interventionist stance")));
    }

    #[test]
    fn test_numeric_rule_wins_tie_and_text_rule_is_deferred() {
        let cycles: Vec<(MarketSnapshot, Vec<Headline>)> = vec![
            (squeeze(0), vec![boj_headline()]),
            (squeeze(1), vec![boj_headline()]),
            (calm(2), vec![boj_headline()]),
            (calm(3), vec![boj_headline()]),
        ];

        let events = run(&GlitchDetector::default(), &cycles);
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![GlitchKind::BullishSqueeze, GlitchKind::PanicIntervention]
        );
        assert_eq!(events[1].triggered_at, calm(2).observed_at);
    }

    #[test]
    fn test_rule_table_is_sorted_by_priority() {
        let rules: Vec<Box<dyn GlitchRule>> = vec![
            Box::new(InterventionRule::default()),
            Box::new(BullishSqueezeRule::default()),
        ];
        let detector = GlitchDetector::new(rules);

        let detection = detector.evaluate(&squeeze(0), &[boj_headline()], &AgentState::default());
        assert_eq!(detection.active_kind, GlitchKind::BullishSqueeze);
    }
}
