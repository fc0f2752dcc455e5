pub mod audit_log;
pub mod prompt_log;

pub use audit_log::{AuditEntry, AuditEvent, AuditLog};
pub use prompt_log::{PromptKind, PromptLog};
