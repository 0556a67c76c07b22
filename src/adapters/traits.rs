//! Capability seams between the agent and the outside world
//!
//! Each external collaborator sits behind one of these traits so the agent
//! can run against scripted fakes in tests.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{GlitchEvent, Headline};
use crate::error::{CompositionError, FetchError, PublishError};

/// Numeric market data provider
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Latest 10-year treasury yield in percent
    async fn fetch_yield_10y(&self) -> Result<Decimal, FetchError>;

    /// Latest USD/JPY exchange rate
    async fn fetch_usd_jpy(&self) -> Result<Decimal, FetchError>;
}

/// Text signal provider (news headlines)
#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn fetch_headlines(&self) -> Result<Vec<Headline>, FetchError>;
}

/// Prompt handed to a text generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaPrompt {
    /// Fixed persona instructions
    pub system: String,
    /// Event-specific request
    pub user: String,
    /// The event being announced
    pub event: GlitchEvent,
}

/// Generative-text backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &PersonaPrompt) -> Result<String, CompositionError>;
}

/// Outgoing post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub title: String,
    pub content: String,
    pub idempotency_key: String,
}

/// Social platform the agent posts to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialPlatform: Send + Sync {
    /// Create a post, returning the platform-assigned post id
    async fn create_post(&self, request: &PostRequest) -> Result<String, PublishError>;
}
