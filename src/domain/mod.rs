pub mod glitch;
pub mod market;
pub mod state;

pub use glitch::*;
pub use market::*;
pub use state::*;
