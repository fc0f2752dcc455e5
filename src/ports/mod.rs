//! Trait boundaries ("ports" in the Clean Architecture sense) the
//! application layer depends on; concrete implementations live under
//! `infrastructure`.

pub mod agent_provider;
pub mod state_store;

pub use agent_provider::{AgentProvider, DispatchOutcome, DispatchRequest, DispatchStatus};
pub use state_store::StateStore;
