//! One-shot, deterministic spec fallback between generation batches.
//!
//! Rules are tried in table order and the first that applies wins. The
//! caller must persist the returned reason next to the decision.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contracts::{ActivitySpec, Difficulty, DifficultyBucket, ProblemStyle};

/// JSON-patch operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Replace,
}

/// A single `{op, path, value}` patch entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: String,
    pub value: Value,
}

/// A proposed corrective patch and its audit justification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackDecision {
    pub patch: Vec<PatchOp>,
    pub reason: String,
    /// The spec with `patch` applied.
    pub spec: ActivitySpec,
}

struct FallbackRule {
    field: &'static str,
    reason: &'static str,
    propose: fn(&ActivitySpec) -> Option<Value>,
}

static FALLBACK_RULES: [FallbackRule; 3] = [
    FallbackRule {
        field: "problem_style",
        reason: "Switched to return-based checking for more deterministic testing and higher solution/test alignment.",
        propose: prefer_return_style,
    },
    FallbackRule {
        field: "difficulty_plan",
        reason: "Reduced hard problems to medium to improve generator reliability.",
        propose: fold_hard_into_medium,
    },
    FallbackRule {
        field: "topic_tags",
        reason: "Narrowed topic scope to reduce prompt breadth and improve consistency.",
        propose: narrow_topics,
    },
];

fn prefer_return_style(spec: &ActivitySpec) -> Option<Value> {
    (spec.problem_style != ProblemStyle::Return).then(|| json!(ProblemStyle::Return))
}

fn fold_hard_into_medium(spec: &ActivitySpec) -> Option<Value> {
    let hard = spec.count_for(Difficulty::Hard);
    if hard == 0 {
        return None;
    }
    let mut easy = spec.count_for(Difficulty::Easy);
    let mut medium = spec.count_for(Difficulty::Medium) + hard;
    if easy == 0 || medium == 0 {
        easy = 1;
        medium = spec.problem_count.saturating_sub(1);
    }
    let plan: Vec<DifficultyBucket> = [(Difficulty::Easy, easy), (Difficulty::Medium, medium)]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(difficulty, count)| DifficultyBucket::new(difficulty, count))
        .collect();
    serde_json::to_value(plan).ok()
}

fn narrow_topics(spec: &ActivitySpec) -> Option<Value> {
    (spec.topic_tags.len() > 4).then(|| json!(spec.topic_tags[..3]))
}

/// Propose the first applicable fallback, or `None` once nothing applies.
pub fn propose_generation_fallback(spec: &ActivitySpec) -> Option<FallbackDecision> {
    let (rule, value) = FALLBACK_RULES
        .iter()
        .find_map(|rule| (rule.propose)(spec).map(|value| (rule, value)))?;

    let mut patched = serde_json::to_value(spec).ok()?;
    let op = match patched.get(rule.field) {
        None | Some(Value::Null) => PatchOpKind::Add,
        Some(_) => PatchOpKind::Replace,
    };
    patched
        .as_object_mut()?
        .insert(rule.field.to_string(), value.clone());

    Some(FallbackDecision {
        patch: vec![PatchOp {
            op,
            path: format!("/{}", rule.field),
            value,
        }],
        reason: rule.reason.to_string(),
        spec: serde_json::from_value(patched).ok()?,
    })
}
