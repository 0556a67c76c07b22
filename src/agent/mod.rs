//! The GlitchyGopher agent loop and its wiring

pub mod bootstrap;
pub mod runner;

pub use bootstrap::{build_agent, build_composer, build_platform};
pub use runner::{AgentExit, AgentSettings, CycleOutcome, CycleReport, GlitchAgent};
