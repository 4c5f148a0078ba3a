use serde::{Deserialize, Serialize};

/// A candidate prompt template under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCandidate {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Template text with `{name}`-style placeholders
    pub prompt: String,
}

impl PromptCandidate {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
