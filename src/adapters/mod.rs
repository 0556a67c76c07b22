pub mod alpha_vantage;
pub mod gemini;
pub mod moltbook;
pub mod traits;

pub use alpha_vantage::AlphaVantageClient;
pub use gemini::GeminiClient;
pub use moltbook::{DryRunPlatform, MoltbookClient};
pub use traits::{
    HeadlineSource, MarketDataSource, PersonaPrompt, PostRequest, SocialPlatform, TextGenerator,
};
