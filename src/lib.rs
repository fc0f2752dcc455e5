//! A deterministic control loop that supervises external code-generation
//! agents through a task queue: retrieve one task, dispatch it to a
//! provider, validate the response through a bounded pipeline, and
//! finalize, retry, block, or halt — one task in flight at a time,
//! crash-recoverable at every step.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ports;

pub use error::{Result, SupervisorError};
