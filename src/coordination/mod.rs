//! Process-level coordination: graceful shutdown signalling

pub mod shutdown;

pub use shutdown::{install_signal_handlers, ShutdownController, ShutdownListener, ShutdownSignal};
