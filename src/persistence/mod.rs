//! Durable files owned by the agent:
//! - `StateStore`: the single `AgentState`, replaced atomically each cycle
//! - `PostLog`: append-only record of every successful publish

pub mod post_log;
pub mod state_store;

pub use post_log::PostLog;
pub use state_store::StateStore;
