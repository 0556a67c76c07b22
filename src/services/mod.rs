//! The four per-cycle services, leaf first:
//! fetch -> detect -> compose -> publish

pub mod composer;
pub mod detector;
pub mod fetcher;
pub mod publisher;

pub use composer::{build_prompt, post_title, Composition, PersonaComposer, TemplateGenerator, TextSource};
pub use detector::{
    BullishSqueezeRule, Detection, GlitchDetector, GlitchRule, InterventionRule, RulePriority,
};
pub use fetcher::{is_plausible, FetchOutcome, SignalFetcher};
pub use publisher::{cycle_boundary, idempotency_key, Publisher};
