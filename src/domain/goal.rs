use serde::{Deserialize, Serialize};

/// An operator-injected objective. The supervisor never modifies or
/// refines this on its own; it only reads it when building prompts and
/// when asking an agent to judge completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub project_id: String,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

impl Goal {
    #[must_use]
    pub fn new(project_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            description: description.into(),
            completed: false,
        }
    }
}
