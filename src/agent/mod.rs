//! Agent lifecycle management

pub mod lifecycle;

pub use lifecycle::{AgentState, ControllerSettings, PresenceController, ShutdownOutcome};
