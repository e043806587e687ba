//! Refresh orchestration for the Pulse agent.

pub mod domain;
pub mod scheduler;

pub use domain::RefreshDomain;
pub use scheduler::RefreshScheduler;
