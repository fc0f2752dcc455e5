//! Loads the deterministic-validation rule catalog an operator
//! configures via `Config.rule_catalog_path`, falling back to the
//! built-in generic catalog when no path is set.

use std::path::Path;

use crate::domain::validation::{default_catalog, RuleCatalog};
use crate::error::SupervisorError;

/// Loads `path` as YAML if given, else returns `default_catalog()`.
pub fn load(path: Option<&Path>) -> Result<RuleCatalog, SupervisorError> {
    let Some(path) = path else {
        return Ok(default_catalog());
    };
    let raw = std::fs::read_to_string(path).map_err(SupervisorError::IoFailure)?;
    serde_yaml::from_str(&raw).map_err(|e| SupervisorError::TaskSchemaInvalid(format!("rule catalog {}: {e}", path.display())))
}
