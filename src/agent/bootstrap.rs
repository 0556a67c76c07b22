//! Wires the live adapters into a `GlitchAgent` from config

use std::sync::Arc;
use tracing::{info, warn};

use super::runner::{AgentSettings, GlitchAgent};
use crate::adapters::{
    AlphaVantageClient, DryRunPlatform, GeminiClient, MoltbookClient, SocialPlatform,
};
use crate::clock::Clock;
use crate::config::{AppConfig, Credentials, MOLTBOOK_API_KEY_VAR};
use crate::error::{GopherError, Result};
use crate::persistence::{PostLog, StateStore};
use crate::services::{GlitchDetector, PersonaComposer, Publisher, SignalFetcher};

/// Composer backed by Gemini
pub fn build_composer(config: &AppConfig, credentials: &Credentials) -> Result<PersonaComposer> {
    let gemini = GeminiClient::new(&config.persona, credentials.gemini_api_key.clone())?;
    Ok(PersonaComposer::new(
        Arc::new(gemini),
        config.persona.timeout(),
        config.persona.max_post_chars,
    ))
}

/// Moltbook client, or the log-only platform in dry-run mode
pub fn build_platform(config: &AppConfig, credentials: &Credentials) -> Result<Arc<dyn SocialPlatform>> {
    if config.dry_run.enabled {
        warn!("Dry run enabled: posts are logged, not published");
        return Ok(Arc::new(DryRunPlatform));
    }

    let key = credentials
        .moltbook_api_key
        .clone()
        .ok_or(GopherError::MissingCredential(MOLTBOOK_API_KEY_VAR))?;
    Ok(Arc::new(MoltbookClient::new(&config.publisher, key)?))
}

pub async fn build_agent(
    config: &AppConfig,
    credentials: &Credentials,
    clock: Arc<dyn Clock>,
) -> Result<GlitchAgent> {
    let alpha_vantage = Arc::new(AlphaVantageClient::new(
        &config.market_data,
        credentials.alpha_vantage_key.clone(),
    )?);

    let spacing = config.market_data.min_fetch_spacing();
    info!(
        "Market data spacing: {}s ({} requests/day quota)",
        spacing.as_secs(),
        config.market_data.daily_request_quota
    );
    if spacing > config.agent.cycle_period() {
        warn!(
            "Cycle period {}s is shorter than the provider allows; some cycles will reuse the previous snapshot",
            config.agent.cycle_period_secs
        );
    }

    let mut fetcher = SignalFetcher::new(
        alpha_vantage.clone(),
        clock.clone(),
        config.fetch_retry,
        config.market_data.request_timeout(),
        spacing,
    );
    if config.market_data.headlines_enabled {
        fetcher = fetcher.with_headlines(alpha_vantage);
    }

    let publisher = Publisher::new(
        build_platform(config, credentials)?,
        PostLog::new(&config.agent.post_log_path),
        clock.clone(),
        config.publish_retry,
        config.agent.cycle_period(),
    );

    GlitchAgent::new(
        fetcher,
        GlitchDetector::default(),
        build_composer(config, credentials)?,
        publisher,
        StateStore::new(&config.agent.state_path),
        clock,
        AgentSettings::from(&config.agent),
    )
    .await
}
