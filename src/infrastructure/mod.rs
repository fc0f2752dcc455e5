//! Concrete adapters implementing the `ports` traits.

pub mod audit;
pub mod logging;
pub mod providers;
pub mod rule_catalog;
pub mod state_store;
