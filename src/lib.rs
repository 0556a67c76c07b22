pub mod adapters;
pub mod agent;
pub mod cli;
pub mod clock;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod retry;
pub mod services;

pub use agent::{AgentExit, CycleOutcome, CycleReport, GlitchAgent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, Credentials};
pub use coordination::{ShutdownController, ShutdownListener, ShutdownSignal};
pub use domain::{AgentState, GlitchEvent, GlitchKind, MarketSnapshot, PostRecord};
pub use error::{GopherError, Result};
