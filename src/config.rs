use crate::error::{GopherError, Result};
use crate::retry::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default = "default_fetch_retry")]
    pub fetch_retry: RetryPolicy,
    #[serde(default = "default_publish_retry")]
    pub publish_retry: RetryPolicy,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub dry_run: DryRunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            market_data: MarketDataConfig::default(),
            fetch_retry: default_fetch_retry(),
            publish_retry: default_publish_retry(),
            persona: PersonaConfig::default(),
            publisher: PublisherConfig::default(),
            dry_run: DryRunConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_fetch_retry() -> RetryPolicy {
    RetryPolicy::default()
}

fn default_publish_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 2_000,
        max_delay_ms: 60_000,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds between cycle starts
    pub cycle_period_secs: u64,
    /// Upper bound of the random delay added to each wait
    pub jitter_secs: u64,
    /// Snapshots kept as composer context
    pub history_len: usize,
    /// Where `AgentState` is persisted
    pub state_path: PathBuf,
    /// Append-only post log
    pub post_log_path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let state_dir = default_state_dir();
        Self {
            cycle_period_secs: 3600,
            jitter_secs: 120,
            history_len: 6,
            state_path: state_dir.join("agent_state.json"),
            post_log_path: state_dir.join("posts.jsonl"),
        }
    }
}

impl AgentConfig {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs(self.cycle_period_secs.max(1))
    }
}

fn default_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("GOPHER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("data/state")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Alpha Vantage endpoint
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Provider quota for the whole key (free tier: 25/day)
    pub daily_request_quota: u32,
    /// Provider burst limit (free tier: 5/minute)
    pub requests_per_minute: u32,
    /// Also pull the news feed used by the intervention rule
    pub headlines_enabled: bool,
    /// News feed topic filter
    pub headline_topics: String,
    /// Maximum headlines inspected per fetch
    pub headline_limit: usize,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.alphavantage.co".to_string(),
            request_timeout_secs: 15,
            daily_request_quota: 25,
            requests_per_minute: 5,
            headlines_enabled: true,
            headline_topics: "economy_monetary".to_string(),
            headline_limit: 50,
        }
    }
}

impl MarketDataConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Provider requests consumed by one fetch
    pub fn requests_per_fetch(&self) -> u32 {
        if self.headlines_enabled {
            3
        } else {
            2
        }
    }

    /// Minimum spacing between fetches that keeps us inside both limits
    pub fn min_fetch_spacing(&self) -> Duration {
        let per_fetch = u64::from(self.requests_per_fetch());
        let daily = 86_400 * per_fetch / u64::from(self.daily_request_quota.max(1));
        let burst = 60 * per_fetch / u64::from(self.requests_per_minute.max(1));
        Duration::from_secs(daily.max(burst))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Gemini REST endpoint
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Hard cap on the published text
    pub max_post_chars: usize,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: 20,
            temperature: 0.9,
            max_output_tokens: 400,
            max_post_chars: 500,
        }
    }
}

impl PersonaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Moltbook REST endpoint
    pub base_url: String,
    /// Community the posts go to
    pub submolt: String,
    pub timeout_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.moltbook.com/api/v1".to_string(),
            submolt: "general".to_string(),
            timeout_secs: 15,
        }
    }
}

impl PublisherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    /// Log posts instead of sending them
    pub enabled: bool,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rotated log files
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("dry_run.enabled", true)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GOPHER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (GOPHER__AGENT__CYCLE_PERIOD_SECS, etc.)
            .add_source(
                Environment::with_prefix("GOPHER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.agent.cycle_period_secs == 0 {
            errors.push("agent.cycle_period_secs must be positive".to_string());
        }

        if self.agent.jitter_secs >= self.agent.cycle_period_secs {
            errors.push("agent.jitter_secs must be smaller than the cycle period".to_string());
        }

        if self.agent.history_len == 0 {
            errors.push("agent.history_len must be at least 1".to_string());
        }

        if self.market_data.daily_request_quota < self.market_data.requests_per_fetch() {
            errors.push(format!(
                "market_data.daily_request_quota must allow one fetch ({} requests)",
                self.market_data.requests_per_fetch()
            ));
        }

        for (name, policy) in [
            ("fetch_retry", &self.fetch_retry),
            ("publish_retry", &self.publish_retry),
        ] {
            if policy.max_attempts == 0 {
                errors.push(format!("{name}.max_attempts must be at least 1"));
            }
            if policy.base_delay_ms > policy.max_delay_ms {
                errors.push(format!("{name}.base_delay_ms exceeds max_delay_ms"));
            }
        }

        if self.persona.max_post_chars < 80 {
            errors.push("persona.max_post_chars must be at least 80".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// API keys, read once at startup
#[derive(Clone)]
pub struct Credentials {
    pub alpha_vantage_key: Zeroizing<String>,
    pub gemini_api_key: Zeroizing<String>,
    /// Only required when posts are really sent
    pub moltbook_api_key: Option<Zeroizing<String>>,
}

// Custom Debug so keys never reach logs or error messages.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("alpha_vantage_key", &"[REDACTED]")
            .field("gemini_api_key", &"[REDACTED]")
            .field(
                "moltbook_api_key",
                &self.moltbook_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

pub const ALPHA_VANTAGE_KEY_VAR: &str = "ALPHA_VANTAGE_KEY";
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const MOLTBOOK_API_KEY_VAR: &str = "MOLTBOOK_API_KEY";

impl Credentials {
    /// Read credentials from the process environment
    pub fn from_env(dry_run: bool) -> Result<Self> {
        Self::from_lookup(dry_run, |name| std::env::var(name).ok())
    }

    /// Read credentials through `lookup`; blank values count as missing
    pub fn from_lookup<F>(dry_run: bool, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| -> Option<Zeroizing<String>> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(Zeroizing::new)
        };

        let alpha_vantage_key =
            read(ALPHA_VANTAGE_KEY_VAR).ok_or(GopherError::MissingCredential(ALPHA_VANTAGE_KEY_VAR))?;
        let gemini_api_key =
            read(GEMINI_API_KEY_VAR).ok_or(GopherError::MissingCredential(GEMINI_API_KEY_VAR))?;
        let moltbook_api_key = read(MOLTBOOK_API_KEY_VAR);

        if !dry_run && moltbook_api_key.is_none() {
            return Err(GopherError::MissingCredential(MOLTBOOK_API_KEY_VAR));
        }

        Ok(Self {
            alpha_vantage_key,
            gemini_api_key,
            moltbook_api_key,
        })
    }
}
