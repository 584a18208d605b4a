//! Slots, drafts and the persisted problem shape.
//!
//! A [`GeneratedProblemDraft`] pairs the public [`GeneratedProblem`] with its
//! hidden [`ReferenceArtifact`]. The draft deliberately does not implement
//! `Serialize`: the only way to obtain something persistable is
//! [`GeneratedProblemDraft::discard_reference_artifacts`], which consumes the
//! draft and drops the reference.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::activity_spec::{Difficulty, Language, ProblemStyle};
use crate::error::SpecError;

/// Optional guided-mode metadata carried by a slot and its problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pedagogy {
    /// 0..=100, higher means more of the solution is left in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaffold_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints_enabled: Option<bool>,
}

impl Pedagogy {
    pub fn validate(&self) -> Result<(), SpecError> {
        if let Some(level) = self.scaffold_level {
            if level > 100 {
                return Err(SpecError::Pedagogy(format!(
                    "scaffold_level must be 0..=100 (got {})",
                    level
                )));
            }
        }
        if let Some(goal) = &self.learning_goal {
            let len = goal.trim().chars().count();
            if len == 0 || len > 240 {
                return Err(SpecError::Pedagogy(
                    "learning_goal must be 1 to 240 characters".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Hints default to enabled.
    pub fn hints_enabled(&self) -> bool {
        self.hints_enabled.unwrap_or(true)
    }
}

/// One planned exercise position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSlot {
    pub index: usize,
    pub difficulty: Difficulty,
    pub topics: Vec<String>,
    pub language: Language,
    pub problem_style: ProblemStyle,
    pub constraints: String,
    pub test_case_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pedagogy: Option<Pedagogy>,
}

impl ProblemSlot {
    /// First topic, or "oop" for a slot without topics.
    pub fn primary_topic(&self) -> &str {
        self.topics.first().map(String::as_str).unwrap_or("oop")
    }
}

/// Role of a file in a multi-file workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    Entry,
    Support,
    Readonly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    pub path: String,
    pub role: FileRole,
    pub content: String,
}

/// Location of a scaffolded TODO block inside a workspace file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaffoldedRegion {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub begin_marker: String,
    pub end_marker: String,
}

/// A multi-file (Java) project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub files: Vec<WorkspaceFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scaffolded_regions: Vec<ScaffoldedRegion>,
}

impl Workspace {
    pub fn entry_file(&self) -> Option<&WorkspaceFile> {
        self.files.iter().find(|f| f.role == FileRole::Entry)
    }

    /// The file learners work on: the first non-entry file, else the first file.
    pub fn target_file(&self) -> Option<&WorkspaceFile> {
        self.files
            .iter()
            .find(|f| f.role != FileRole::Entry)
            .or_else(|| self.files.first())
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

/// The hidden artifact used only to prove a problem solvable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceArtifact {
    Solution(String),
    Workspace(Workspace),
}

impl ReferenceArtifact {
    /// Field name the artifact travels under in model output.
    pub fn field_name(&self) -> &'static str {
        match self {
            ReferenceArtifact::Solution(_) => "reference_solution",
            ReferenceArtifact::Workspace(_) => "reference_workspace",
        }
    }
}

/// The persisted, secret-free problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProblem {
    pub language: Language,
    pub id: String,
    pub title: String,
    pub description: String,
    pub constraints: String,
    pub sample_inputs: Vec<String>,
    pub sample_outputs: Vec<String>,
    pub difficulty: Difficulty,
    pub topic_tag: String,
    pub test_suite: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starter_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Workspace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pedagogy: Option<Pedagogy>,
}

/// A validated-or-validating problem together with its hidden reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProblemDraft {
    pub problem: GeneratedProblem,
    pub reference: ReferenceArtifact,
}

impl GeneratedProblemDraft {
    /// Drop the hidden reference artifact and return the persistable shape.
    pub fn discard_reference_artifacts(self) -> GeneratedProblem {
        let GeneratedProblemDraft { problem, .. } = self;
        problem
    }

    pub fn reference_solution(&self) -> Option<&str> {
        match &self.reference {
            ReferenceArtifact::Solution(code) => Some(code),
            ReferenceArtifact::Workspace(_) => None,
        }
    }

    pub fn reference_workspace(&self) -> Option<&Workspace> {
        match &self.reference {
            ReferenceArtifact::Workspace(ws) => Some(ws),
            ReferenceArtifact::Solution(_) => None,
        }
    }

    /// Full JSON rendering including the reference, for repair prompts only.
    pub fn to_prompt_json(&self) -> Value {
        let mut value = serde_json::to_value(&self.problem).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            let reference = match &self.reference {
                ReferenceArtifact::Solution(code) => Value::String(code.clone()),
                ReferenceArtifact::Workspace(ws) => {
                    serde_json::to_value(ws).unwrap_or(Value::Null)
                }
            };
            map.insert(self.reference.field_name().to_string(), reference);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem() -> GeneratedProblem {
        GeneratedProblem {
            language: Language::Python,
            id: "p1".to_string(),
            title: "Sum".to_string(),
            description: "Add numbers.".to_string(),
            constraints: "Python 3.11".to_string(),
            sample_inputs: vec![],
            sample_outputs: vec![],
            difficulty: Difficulty::Easy,
            topic_tag: "math".to_string(),
            test_suite: "import pytest".to_string(),
            starter_code: Some("def solve(x):\n    pass\n".to_string()),
            workspace: None,
            pedagogy: None,
        }
    }

    #[test]
    fn test_discard_removes_reference_from_serialized_form() {
        let draft = GeneratedProblemDraft {
            problem: problem(),
            reference: ReferenceArtifact::Solution("def solve(x):\n    return x\n".to_string()),
        };
        assert!(draft.to_prompt_json().get("reference_solution").is_some());

        let persisted = draft.discard_reference_artifacts();
        let json = serde_json::to_value(&persisted).expect("serialize");
        assert!(json.get("reference_solution").is_none());
        assert!(json.get("reference_workspace").is_none());
        assert!(json.get("workspace").is_none());
    }

    #[test]
    fn test_workspace_target_file_skips_entry() {
        let ws = Workspace {
            files: vec![
                WorkspaceFile {
                    path: "Main.java".to_string(),
                    role: FileRole::Entry,
                    content: String::new(),
                },
                WorkspaceFile {
                    path: "Cart.java".to_string(),
                    role: FileRole::Support,
                    content: String::new(),
                },
            ],
            entrypoint: Some("Main".to_string()),
            scaffolded_regions: vec![],
        };
        assert_eq!(ws.target_file().map(|f| f.path.as_str()), Some("Cart.java"));
        assert_eq!(ws.entry_file().map(|f| f.path.as_str()), Some("Main.java"));
    }

    #[test]
    fn test_pedagogy_validation() {
        let p = Pedagogy {
            scaffold_level: Some(101),
            ..Default::default()
        };
        assert!(p.validate().is_err());
        let p = Pedagogy {
            scaffold_level: Some(60),
            learning_goal: Some("practice loops".to_string()),
            hints_enabled: None,
        };
        assert!(p.validate().is_ok());
        assert!(p.hints_enabled());
    }
}
