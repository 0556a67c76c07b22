use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::adapters::GeminiClient;
use crate::config::{AppConfig, GEMINI_API_KEY_VAR};
use crate::domain::{GlitchEvent, GlitchKind, MarketSnapshot};
use crate::error::{GopherError, Result};
use crate::persistence::{PostLog, StateStore};
use crate::services::{idempotency_key, post_title, PersonaComposer, TemplateGenerator};

#[derive(Parser)]
#[command(name = "glitchygopher")]
#[command(version)]
#[command(about = "Watches US10Y and USD/JPY for glitches and posts about them as GlitchyGopher", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml + $GOPHER_ENV.toml)
    #[arg(short, long, default_value = "config", env = "GOPHER_CONFIG_DIR")]
    pub config: String,

    /// Force live publishing even if the config enables dry run
    #[arg(long)]
    pub live: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent loop until SIGINT/SIGTERM (default)
    Run,
    /// Run a single cycle and exit
    Once,
    /// Print the persisted agent state
    State,
    /// Print the most recent published posts
    Posts {
        /// Number of posts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Compose a post for a hypothetical reading without publishing it
    Preview {
        /// bullish-squeeze or panic-intervention
        #[arg(short, long, default_value = "bullish-squeeze")]
        kind: GlitchKind,
        /// 10-year yield in percent
        #[arg(long, default_value = "4.5")]
        yield_10y: Decimal,
        /// USD/JPY rate
        #[arg(long, default_value = "146")]
        usd_jpy: Decimal,
        /// Headline to quote for panic-intervention
        #[arg(long)]
        headline: Option<String>,
    },
}

pub async fn show_state(config: &AppConfig) -> Result<()> {
    let store = StateStore::new(&config.agent.state_path);
    let state = store.load().await?;

    println!("\n\x1b[36mGlitchyGopher state\x1b[0m ({})\n", store.path().display());
    println!("  Active glitch:    {}", state.active_kind);
    println!(
        "  Last triggered:   {}",
        state
            .last_triggered_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "  Last post id:     {}",
        state.last_post_id.as_deref().unwrap_or("-")
    );
    match &state.last_snapshot {
        Some(snapshot) => println!("  Last snapshot:    {}", snapshot.summary()),
        None => println!("  Last snapshot:    -"),
    }

    if !state.recent_snapshots.is_empty() {
        println!("\n  History:");
        for snapshot in &state.recent_snapshots {
            println!("    {}", snapshot.summary());
        }
    }
    println!();
    Ok(())
}

pub async fn show_posts(config: &AppConfig, limit: usize) -> Result<()> {
    let log = PostLog::new(&config.agent.post_log_path);
    let posts = log.latest(limit).await?;

    if posts.is_empty() {
        println!("No posts recorded in {}", log.path().display());
        return Ok(());
    }

    println!("\n\x1b[36mLatest {} post(s)\x1b[0m\n", posts.len());
    println!(
        "  {:<20} {:<20} {:<36} {}",
        "POSTED", "KIND", "POST ID", "SNAPSHOT"
    );
    for post in &posts {
        println!(
            "  {:<20} {:<20} {:<36} {}",
            post.posted_at.format("%Y-%m-%d %H:%M"),
            post.event.kind,
            post.platform_post_id,
            post.event.snapshot.summary()
        );
    }
    println!();
    Ok(())
}

/// Live backend when the Gemini key is present, template otherwise
pub async fn preview_post(
    config: &AppConfig,
    kind: GlitchKind,
    yield_10y: Decimal,
    usd_jpy: Decimal,
    headline: Option<String>,
) -> Result<()> {
    if kind.is_none() {
        return Err(GopherError::Internal(
            "preview needs a glitch kind, not NEUTRAL".to_string(),
        ));
    }

    let now = Utc::now();
    let excerpt = match kind {
        GlitchKind::PanicIntervention => headline.or_else(|| {
            Some("Bank of Japan signals readiness for currency intervention".to_string())
        }),
        _ => None,
    };
    let event = GlitchEvent::new(kind, now, MarketSnapshot::new(now, yield_10y, usd_jpy), excerpt);

    let composer = match std::env::var(GEMINI_API_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => {
            let gemini = GeminiClient::new(&config.persona, Zeroizing::new(key))?;
            PersonaComposer::new(
                Arc::new(gemini),
                config.persona.timeout(),
                config.persona.max_post_chars,
            )
        }
        _ => {
            println!("({} not set, using the fallback template)", GEMINI_API_KEY_VAR);
            PersonaComposer::new(
                Arc::new(TemplateGenerator),
                Duration::from_secs(1),
                config.persona.max_post_chars,
            )
        }
    };

    let composition = composer.compose(&event, &[]).await;
    let key = idempotency_key(kind, now, config.agent.cycle_period());

    println!("\n\x1b[36m{}\x1b[0m", post_title(kind));
    println!("\x1b[90m(idempotency key {}, {:?})\x1b[0m\n", key, composition.source);
    println!("{}\n", composition.text);
    Ok(())
}
