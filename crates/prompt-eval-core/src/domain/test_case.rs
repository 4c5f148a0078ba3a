use std::collections::HashSet;
use std::path::Path;

use prompt_eval_state::TestCaseId;
use serde::{Deserialize, Serialize};

use super::error::FixtureError;
use crate::template;

/// Persona the model is speaking to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bio {
    pub name: String,
    pub age: u32,
    pub about_me: String,
}

/// Conversation framing for a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub tone: String,
    pub setting: String,
    pub conversation_type: String,
}

/// A fixture: persona, context, the user's utterance, and completions
/// considered good answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<TestCaseId>,
    pub bio: Bio,
    pub context: Context,
    pub utterance: String,
    pub good_completions: Vec<String>,
}

impl TestCase {
    /// Placeholder values in substitution order.
    pub fn template_fields(&self) -> [(&'static str, String); 7] {
        [
            (template::NAME, self.bio.name.clone()),
            (template::AGE, self.bio.age.to_string()),
            (template::ABOUT_ME, self.bio.about_me.clone()),
            (
                template::CONVERSATION_TYPE,
                self.context.conversation_type.clone(),
            ),
            (template::SETTING, self.context.setting.clone()),
            (template::TONE, self.context.tone.clone()),
            (template::UTTERANCE, self.utterance.clone()),
        ]
    }

    /// Expand `prompt` with this test case's fields.
    pub fn render(&self, prompt: &str) -> String {
        template::expand(prompt, &self.template_fields())
    }
}

/// Load a JSON array of test cases.
///
/// Entries without an id get `case-<n>` (1-based position in the file),
/// skipping any value another entry already uses. An empty array, an
/// entry without good completions, or two entries with the same explicit
/// id are rejected.
pub fn load_test_cases(path: impl AsRef<Path>) -> Result<Vec<TestCase>, FixtureError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_test_cases(&raw).map_err(|err| err.at(path))
}

/// Parse fixture JSON. Errors carry no path; [`load_test_cases`] adds it.
pub fn parse_test_cases(raw: &str) -> Result<Vec<TestCase>, FixtureError> {
    let mut cases: Vec<TestCase> =
        serde_json::from_str(raw).map_err(|source| FixtureError::Parse {
            path: None,
            source,
        })?;

    if cases.is_empty() {
        return Err(FixtureError::Empty { path: None });
    }

    let mut taken = HashSet::new();
    for (index, case) in cases.iter().enumerate() {
        if case.good_completions.is_empty() {
            return Err(FixtureError::NoGoodCompletions { index });
        }
        if let Some(id) = &case.id {
            if !taken.insert(id.clone()) {
                return Err(FixtureError::DuplicateId {
                    id: id.clone(),
                    index,
                });
            }
        }
    }

    for (index, case) in cases.iter_mut().enumerate() {
        if case.id.is_some() {
            continue;
        }
        let mut n = index + 1;
        let id = loop {
            let candidate = TestCaseId::new(format!("case-{n}"));
            if taken.insert(candidate.clone()) {
                break candidate;
            }
            n += 1;
        };
        case.id = Some(id);
    }

    Ok(cases)
}
