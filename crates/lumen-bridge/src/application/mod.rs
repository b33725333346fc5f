//! Application layer: the orchestration and correlation logic that composes
//! the infrastructure components into the bridge's behavior.

pub mod correlation;
pub mod orchestrator;

pub use correlation::CorrelationEngine;
pub use orchestrator::Bridge;
