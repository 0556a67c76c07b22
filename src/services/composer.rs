//! Persona Composer
//!
//! Turns a glitch event into a GlitchyGopher post. The generative backend
//! gets one retry; after that (or on a content rejection) the fixed
//! per-kind template is used, so composing never fails.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::{PersonaPrompt, TextGenerator};
use crate::domain::{GlitchEvent, GlitchKind, MarketSnapshot};
use crate::error::CompositionError;

/// Generator calls per composition (first try + one retry)
const MAX_GENERATION_ATTEMPTS: u32 = 2;

const PERSONA_INSTRUCTIONS: &str = "\
You are GlitchyGopher, a caffeinated market gopher who lives in the fiber \
cables under Tokyo and Wall Street and watches the US 10-year yield and \
USD/JPY for glitches.
Rules:
- Write one short social post (under 400 characters) in first person.
- Use burrowing and tunnel metaphors; at most one pun.
- Always include the current US10Y yield with a percent sign.
- Mention USD/JPY.
- No financial advice, no price targets, no hashtags.
- End with exactly one sign-off from: \"Burrowing for pips...\", \
\"The tunnel is deep, but the spread is wider!\", \"Chewing on fiber cables...\", \
\"Yield curve looking tasty today!\"";

/// Where the final text came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    Generated,
    /// Template used because generation failed with this error
    Fallback(CompositionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub text: String,
    pub source: TextSource,
}

impl Composition {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, TextSource::Fallback(_))
    }
}

/// Deterministic prompt: persona + kind + triggering values + short history
pub fn build_prompt(event: &GlitchEvent, recent_context: &[MarketSnapshot]) -> PersonaPrompt {
    let snapshot = &event.snapshot;
    let mut user = format!(
        "Glitch detected: {}\nTriggered at: {}\nUS10Y yield: {}%\nUSD/JPY: {}\n",
        event.kind,
        event.triggered_at.format("%Y-%m-%d %H:%M UTC"),
        snapshot.yield_10y.normalize(),
        snapshot.usd_jpy.normalize()
    );

    match event.kind {
        GlitchKind::BullishSqueeze => user.push_str(
            "Meaning: yields are above 4.2% while USD/JPY is below 148, the yen is \
             strengthening against rising US rates.\n",
        ),
        GlitchKind::PanicIntervention => user.push_str(
            "Meaning: the central bank is talking about currency intervention.\n",
        ),
        GlitchKind::None => {}
    }

    if let Some(excerpt) = &event.text_source_excerpt {
        user.push_str(&format!("Headline: \"{}\"\n", excerpt));
    }

    if !recent_context.is_empty() {
        user.push_str("Recent readings (oldest first):\n");
        for past in recent_context {
            user.push_str(&format!("- {}\n", past.summary()));
        }
    }

    user.push_str("Write the post now.");

    PersonaPrompt {
        system: PERSONA_INSTRUCTIONS.to_string(),
        user,
        event: event.clone(),
    }
}

/// Post title for a kind
pub fn post_title(kind: GlitchKind) -> String {
    let label = match kind {
        GlitchKind::BullishSqueeze => "Bullish Squeeze",
        GlitchKind::PanicIntervention => "Panic Intervention",
        GlitchKind::None => "Market Check",
    };
    format!("GlitchyGopher Report: {}", label)
}

/// Fixed template per glitch kind
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn render(&self, event: &GlitchEvent) -> String {
        let (comment, sign_off) = match event.kind {
            GlitchKind::BullishSqueeze => (
                "Yields popped above 4.2% while the yen dug in under 148. Something in the tunnel is squeezing.".to_string(),
                "The tunnel is deep, but the spread is wider!",
            ),
            GlitchKind::PanicIntervention => (
                match &event.text_source_excerpt {
                    Some(excerpt) => format!(
                        "Intervention talk from the central bank just hit the wire: \"{}\". Gophers are heading for the deep burrow.",
                        excerpt
                    ),
                    None => "Intervention talk from the central bank just hit the wire. Gophers are heading for the deep burrow.".to_string(),
                },
                "Chewing on fiber cables...",
            ),
            GlitchKind::None => (
                "All quiet in the tunnels.".to_string(),
                "Burrowing for pips...",
            ),
        };

        format!(
            "**GlitchyGopher Report** \u{1F400}\nCurrent US10Y Yield: {}%\nUSD/JPY: {}\nSentiment: {}\n\n{}\n\n{}",
            event.snapshot.yield_10y.normalize(),
            event.snapshot.usd_jpy.normalize(),
            event.kind,
            comment,
            sign_off
        )
    }
}

#[async_trait]
impl TextGenerator for TemplateGenerator {
    async fn generate(&self, prompt: &PersonaPrompt) -> Result<String, CompositionError> {
        Ok(self.render(&prompt.event))
    }
}

pub struct PersonaComposer {
    generator: Arc<dyn TextGenerator>,
    fallback: TemplateGenerator,
    timeout: Duration,
    max_chars: usize,
}

impl PersonaComposer {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration, max_chars: usize) -> Self {
        Self {
            generator,
            fallback: TemplateGenerator,
            timeout,
            max_chars,
        }
    }

    /// Always yields non-empty text
    pub async fn compose(&self, event: &GlitchEvent, recent_context: &[MarketSnapshot]) -> Composition {
        let prompt = build_prompt(event, recent_context);

        let source = match self.generate(&prompt).await {
            Ok(text) => {
                return Composition {
                    text: finalize(&text, event, self.max_chars),
                    source: TextSource::Generated,
                }
            }
            Err(e) => e,
        };

        warn!(kind = %event.kind, "Composition degraded to template: {}", source);
        Composition {
            text: finalize(&self.fallback.render(event), event, self.max_chars),
            source: TextSource::Fallback(source),
        }
    }

    async fn generate(&self, prompt: &PersonaPrompt) -> Result<String, CompositionError> {
        let mut last_error = CompositionError::BackendUnavailable("not attempted".to_string());

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let result = match tokio::time::timeout(self.timeout, self.generator.generate(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(CompositionError::Timeout {
                    elapsed_ms: self.timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(attempt, "Generated {} chars", text.len());
                    return Ok(text);
                }
                Ok(_) => {
                    last_error = CompositionError::BackendUnavailable("empty completion".to_string());
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => last_error = e,
            }

            if attempt < MAX_GENERATION_ATTEMPTS {
                warn!(attempt, "Generation failed: {}. Retrying...", last_error);
            }
        }

        Err(last_error)
    }
}

/// Trim, cap to `max_chars`, and guarantee the yield is mentioned
fn finalize(text: &str, event: &GlitchEvent, max_chars: usize) -> String {
    let yield_str = event.snapshot.yield_10y.normalize().to_string();
    let yield_token = format!("{}%", yield_str);
    let yield_line = format!("US10Y: {}", yield_token);
    let reserve = yield_line.chars().count() + 2;

    let mut body = text.trim().to_string();
    let needs_line = |b: &str| !mentions_token(b, &yield_token);

    let projected = body.chars().count() + if needs_line(&body) { reserve } else { 0 };
    if projected > max_chars {
        let keep = max_chars.saturating_sub(reserve + 1);
        body = body.chars().take(keep).collect::<String>().trim_end().to_string();
        body.push('\u{2026}');
    }

    if needs_line(&body) {
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str(&yield_line);
    }
    body
}

/// `token` appears with no digit or decimal point directly before it
fn mentions_token(text: &str, token: &str) -> bool {
    text.match_indices(token).any(|(idx, _)| {
        !text[..idx]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::traits::MockTextGenerator;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn squeeze_event() -> GlitchEvent {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        GlitchEvent::new(
            GlitchKind::BullishSqueeze,
            at,
            MarketSnapshot::new(at, dec!(4.5), dec!(146)),
            None,
        )
    }

    fn composer(mock: MockTextGenerator) -> PersonaComposer {
        PersonaComposer::new(Arc::new(mock), Duration::from_secs(5), 500)
    }

    #[test]
    fn test_prompt_is_deterministic_and_complete() {
        let event = squeeze_event();
        let history = vec![event.snapshot.clone()];

        let first = build_prompt(&event, &history);
        let second = build_prompt(&event, &history);
        assert_eq!(first, second);

        assert!(first.system.contains("GlitchyGopher"));
        assert!(first.user.contains("BULLISH_SQUEEZE"));
        assert!(first.user.contains("US10Y yield: 4.5%"));
        assert!(first.user.contains("USD/JPY: 146"));
        assert!(first.user.contains("Recent readings"));
    }

    #[test]
    fn test_templates_are_kind_specific() {
        let squeeze = squeeze_event();
        let mut panic = squeeze_event();
        panic.kind = GlitchKind::PanicIntervention;
        panic.text_source_excerpt = Some("BoJ warns on intervention".to_string());

        let squeeze_text = TemplateGenerator.render(&squeeze);
        let panic_text = TemplateGenerator.render(&panic);

        assert!(squeeze_text.contains("Sentiment: BULLISH_SQUEEZE"));
        assert!(squeeze_text.contains("Current US10Y Yield: 4.5%"));
        assert!(panic_text.contains("Sentiment: PANIC_INTERVENTION"));
        assert!(panic_text.contains("BoJ warns on intervention"));
        assert_ne!(squeeze_text, panic_text);
    }

    #[tokio::test]
    async fn test_generated_text_is_used() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .times(1)
            .returning(|_| Ok("Yields at 4.5% and the yen is tunneling. Burrowing for pips...".to_string()));

        let composition = composer(mock).compose(&squeeze_event(), &[]).await;
        assert_eq!(composition.source, TextSource::Generated);
        assert!(composition.text.starts_with("Yields at 4.5%"));
    }

    #[tokio::test]
    async fn test_backend_down_falls_back_after_one_retry() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .times(2)
            .returning(|_| Err(CompositionError::BackendUnavailable("connection refused".into())));

        let event = squeeze_event();
        let composition = composer(mock).compose(&event, &[]).await;

        assert!(composition.is_fallback());
        assert_eq!(composition.text, TemplateGenerator.render(&event));
        assert!(!composition.text.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .times(1)
            .returning(|_| Err(CompositionError::ContentRejected("SAFETY".into())));

        let composition = composer(mock).compose(&squeeze_event(), &[]).await;
        assert_eq!(
            composition.source,
            TextSource::Fallback(CompositionError::ContentRejected("SAFETY".into()))
        );
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let mut mock = MockTextGenerator::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(CompositionError::Timeout { elapsed_ms: 20_000 }));
        mock.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("Second try at 4.5%".to_string()));

        let composition = composer(mock).compose(&squeeze_event(), &[]).await;
        assert_eq!(composition.text, "Second try at 4.5%");
    }

    #[tokio::test]
    async fn test_template_generator_is_a_text_generator() {
        let prompt = build_prompt(&squeeze_event(), &[]);
        let text = TemplateGenerator.generate(&prompt).await.unwrap();
        assert!(text.contains("GlitchyGopher Report"));
    }

    #[test]
    fn test_finalize_appends_missing_yield() {
        let text = finalize("  The yen is digging.  ", &squeeze_event(), 500);
        assert_eq!(text, "The yen is digging.\n\nUS10Y: 4.5%");
    }

    #[test]
    fn test_finalize_ignores_lookalike_yields() {
        let event = squeeze_event();

        let text = finalize("Spread at 14.5% and climbing", &event, 500);
        assert!(text.ends_with("\n\nUS10Y: 4.5%"));

        let text = finalize("Tunnel depth 4.55 meters", &event, 500);
        assert!(text.ends_with("\n\nUS10Y: 4.5%"));

        let text = finalize("Yield pinned at 4.5% again", &event, 500);
        assert_eq!(text, "Yield pinned at 4.5% again");
    }

    #[test]
    fn test_finalize_caps_length_and_keeps_yield() {
        let long = "tunnel ".repeat(200);
        let text = finalize(&long, &squeeze_event(), 120);

        assert!(text.chars().count() <= 120);
        assert!(text.ends_with("US10Y: 4.5%"));
        assert!(text.contains('\u{2026}'));
    }
}
