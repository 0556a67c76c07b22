//! Agent Loop
//!
//! One cycle: Fetching -> Detecting -> (Composing -> Publishing)? ->
//! Persisting -> Idle. Cycles never overlap. Shutdown is honoured only while
//! waiting for the next cycle.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::AgentConfig;
use crate::coordination::ShutdownListener;
use crate::domain::{AgentState, CyclePhase, GlitchKind, MarketObservation};
use crate::error::{FetchError, GopherError, PublishError, Result};
use crate::persistence::StateStore;
use crate::services::{FetchOutcome, GlitchDetector, PersonaComposer, Publisher, SignalFetcher};

/// Loop timing and history knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub cycle_period: Duration,
    /// Upper bound of the random delay added to each wait
    pub jitter: Duration,
    pub history_len: usize,
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            cycle_period: config.cycle_period(),
            jitter: Duration::from_secs(config.jitter_secs),
            history_len: config.history_len,
        }
    }
}

/// What a single cycle ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Inside the provider spacing window; previous snapshot reused
    Throttled { next_allowed_at: DateTime<Utc> },
    /// Fetch failed after retries; state left unchanged
    FetchFailed(FetchError),
    /// Fresh snapshot, nothing new to announce
    Quiet { active_kind: GlitchKind },
    Published {
        kind: GlitchKind,
        post_id: String,
        fallback_text: bool,
    },
    /// Detection stood but the announcement did not go out
    PublishFailed { kind: GlitchKind, error: PublishError },
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Throttled { next_allowed_at } => {
                write!(f, "throttled until {}", next_allowed_at.format("%H:%M:%S UTC"))
            }
            CycleOutcome::FetchFailed(e) => write!(f, "fetch failed: {}", e),
            CycleOutcome::Quiet { active_kind } => write!(f, "quiet (active: {})", active_kind),
            CycleOutcome::Published { kind, post_id, .. } => {
                write!(f, "published {} as {}", kind, post_id)
            }
            CycleOutcome::PublishFailed { kind, error } => {
                write!(f, "{} not published: {}", kind, error)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based cycle number since process start
    pub cycle: u64,
    pub outcome: CycleOutcome,
}

/// Why `run` returned normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    Shutdown,
    CycleLimit,
}

pub struct GlitchAgent {
    fetcher: SignalFetcher,
    detector: GlitchDetector,
    composer: PersonaComposer,
    publisher: Publisher,
    store: StateStore,
    clock: Arc<dyn Clock>,
    settings: AgentSettings,
    state: AgentState,
    phase: CyclePhase,
    cycles: u64,
}

impl GlitchAgent {
    /// Build the agent and resume from the persisted state
    pub async fn new(
        mut fetcher: SignalFetcher,
        detector: GlitchDetector,
        composer: PersonaComposer,
        publisher: Publisher,
        store: StateStore,
        clock: Arc<dyn Clock>,
        settings: AgentSettings,
    ) -> Result<Self> {
        let state = store.load().await?;
        fetcher.resume_from(state.last_fetch_at());

        info!(
            active_kind = %state.active_kind,
            last_post_id = ?state.last_post_id,
            "Agent state loaded from {}",
            store.path().display()
        );

        Ok(Self {
            fetcher,
            detector,
            composer,
            publisher,
            store,
            clock,
            settings,
            state,
            phase: CyclePhase::Idle,
            cycles: 0,
        })
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run cycles until shutdown, the cycle limit, or a fatal error
    pub async fn run(
        &mut self,
        mut shutdown: ShutdownListener,
        max_cycles: Option<u64>,
    ) -> Result<AgentExit> {
        info!(
            period_secs = self.settings.cycle_period.as_secs(),
            jitter_secs = self.settings.jitter.as_secs(),
            "GlitchyGopher agent started"
        );

        loop {
            if shutdown.is_shutdown_requested() {
                info!("Shutdown requested, agent stopping");
                return Ok(AgentExit::Shutdown);
            }

            let report = self.run_cycle().await?;
            info!(cycle = report.cycle, "Cycle complete: {}", report.outcome);

            if max_cycles.is_some_and(|limit| self.cycles >= limit) {
                return Ok(AgentExit::CycleLimit);
            }

            let wait = self.next_wait();
            debug!("Sleeping {}s until next cycle", wait.as_secs());
            tokio::select! {
                _ = self.clock.sleep(wait) => {}
                signal = shutdown.wait_for_shutdown() => {
                    info!("Shutdown ({}) during wait, agent stopping", signal);
                    return Ok(AgentExit::Shutdown);
                }
            }
        }
    }

    /// Execute exactly one cycle. Errors are fatal: the agent is `Halted`.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        if self.phase.is_terminal() {
            return Err(GopherError::Halted("agent already halted".to_string()));
        }

        self.cycles += 1;
        let cycle = self.cycles;
        self.transition(CyclePhase::Fetching)?;

        let outcome = match self.fetcher.fetch().await {
            Err(e) if e.is_fatal() => {
                self.transition(CyclePhase::Halted)?;
                error!(cycle, "Market data credentials rejected, halting: {}", e);
                return Err(GopherError::Halted(e.to_string()));
            }
            Err(e) => {
                warn!(cycle, "Fetch failed, keeping previous state: {}", e);
                self.transition(CyclePhase::Persisting)?;
                CycleOutcome::FetchFailed(e)
            }
            Ok(FetchOutcome::Throttled { next_allowed_at }) => {
                self.transition(CyclePhase::Persisting)?;
                CycleOutcome::Throttled { next_allowed_at }
            }
            Ok(FetchOutcome::Fresh(observation)) => {
                self.transition(CyclePhase::Detecting)?;
                self.detect_and_announce(observation).await?
            }
        };

        self.persist().await?;
        Ok(CycleReport { cycle, outcome })
    }

    async fn detect_and_announce(&mut self, observation: MarketObservation) -> Result<CycleOutcome> {
        let detection = self
            .detector
            .evaluate(&observation.snapshot, &observation.headlines, &self.state);

        let recent = self.state.recent_context();
        self.state
            .record_snapshot(observation.snapshot, self.settings.history_len);
        self.state
            .apply_detection(detection.active_kind, detection.event.as_ref());

        let Some(event) = detection.event else {
            self.transition(CyclePhase::Persisting)?;
            return Ok(CycleOutcome::Quiet {
                active_kind: detection.active_kind,
            });
        };

        self.transition(CyclePhase::Composing)?;
        let composition = self.composer.compose(&event, &recent).await;

        self.transition(CyclePhase::Publishing)?;
        let outcome = match self.publisher.publish(&event, &composition.text).await {
            Ok(record) => {
                self.state.acknowledge_post(record.platform_post_id.clone());
                CycleOutcome::Published {
                    kind: event.kind,
                    post_id: record.platform_post_id,
                    fallback_text: composition.is_fallback(),
                }
            }
            Err(e) => {
                // The detection stands, so the same occurrence will not re-fire
                warn!(kind = %event.kind, "Announcement failed, event marked handled: {}", e);
                CycleOutcome::PublishFailed {
                    kind: event.kind,
                    error: e,
                }
            }
        };

        self.transition(CyclePhase::Persisting)?;
        Ok(outcome)
    }

    async fn persist(&mut self) -> Result<()> {
        match self.store.save_with_retry(&self.state).await {
            Ok(()) => self.transition(CyclePhase::Idle),
            Err(e) => {
                self.transition(CyclePhase::Halted)?;
                error!("Agent state could not be written, halting: {}", e);
                Err(GopherError::State(e))
            }
        }
    }

    fn transition(&mut self, to: CyclePhase) -> Result<()> {
        if !self.phase.can_transition_to(to) {
            return Err(GopherError::InvalidTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        debug!(cycle = self.cycles, "{} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    fn next_wait(&self) -> Duration {
        let jitter_ms = self.settings.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.settings.cycle_period;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.settings.cycle_period + Duration::from_millis(extra)
    }
}
