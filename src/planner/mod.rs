//! Deterministic slot planning.
//!
//! [`derive_plan`] expands an [`ActivitySpec`] into an ordered list of
//! [`ProblemSlot`]s. The same spec always yields the same plan:
//!
//! 1. `difficulty_plan` is sorted easy < medium < hard and each bucket is
//!    expanded into `count` slots.
//! 2. Topics are assigned round-robin from `topic_tags`, one per slot.
//! 3. Every slot is stamped with the spec's language, style, constraints and
//!    test count.
//!
//! The resulting plan is checked before it is returned; a violation means the
//! spec was invalid upstream and is reported as a [`PlanError`].

use tracing::debug;

use crate::contracts::{ActivitySpec, Difficulty, Pedagogy, ProblemSlot};
use crate::error::PlanError;

/// Expand an activity spec into its problem slots.
pub fn derive_plan(spec: &ActivitySpec) -> Result<Vec<ProblemSlot>, PlanError> {
    if spec.topic_tags.is_empty() {
        return Err(PlanError::NoTopics);
    }

    let mut buckets = spec.difficulty_plan.clone();
    // Stable sort keeps the input order for (invalid) duplicate difficulties.
    buckets.sort_by_key(|b| b.difficulty);

    let difficulties: Vec<Difficulty> = buckets
        .iter()
        .flat_map(|b| std::iter::repeat(b.difficulty).take(b.count))
        .collect();

    let slots: Vec<ProblemSlot> = difficulties
        .into_iter()
        .enumerate()
        .map(|(index, difficulty)| ProblemSlot {
            index,
            difficulty,
            topics: vec![spec.topic_tags[index % spec.topic_tags.len()].clone()],
            language: spec.language,
            problem_style: spec.problem_style,
            constraints: spec.constraints.clone(),
            test_case_count: spec.test_case_count,
            pedagogy: None,
        })
        .collect();

    check_plan(spec, &slots)?;
    debug!(
        language = %spec.language,
        slots = slots.len(),
        "Derived problem plan"
    );
    Ok(slots)
}

/// Verify the plan post-conditions against the spec it came from.
pub fn check_plan(spec: &ActivitySpec, slots: &[ProblemSlot]) -> Result<(), PlanError> {
    if slots.len() != spec.problem_count {
        return Err(PlanError::SlotCount {
            expected: spec.problem_count,
            actual: slots.len(),
        });
    }

    for (position, slot) in slots.iter().enumerate() {
        if slot.index != position {
            return Err(PlanError::NonSequentialIndex {
                position,
                index: slot.index,
            });
        }
        let mismatch = if slot.language != spec.language {
            Some("language")
        } else if slot.problem_style != spec.problem_style {
            Some("problem_style")
        } else if slot.constraints != spec.constraints {
            Some("constraints")
        } else if slot.test_case_count != spec.test_case_count {
            Some("test_case_count")
        } else if slot.topics.is_empty() || slot.topics.len() > 2 {
            Some("topics")
        } else {
            None
        };
        if let Some(field) = mismatch {
            return Err(PlanError::InconsistentSlot {
                index: slot.index,
                field,
            });
        }
    }
    Ok(())
}

/// Stamp guided-mode pedagogy onto a plan.
///
/// `curve` yields the scaffold level (0..=100) for each slot index; heavier
/// guidance on earlier slots is the usual shape but the transformer itself
/// does not impose one.
pub fn apply_pedagogy_curve<F>(
    slots: &mut [ProblemSlot],
    learning_goal: Option<&str>,
    hints_enabled: bool,
    curve: F,
) where
    F: Fn(usize, usize) -> u8,
{
    let total = slots.len();
    for slot in slots.iter_mut() {
        slot.pedagogy = Some(Pedagogy {
            scaffold_level: Some(curve(slot.index, total).min(100)),
            learning_goal: learning_goal
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string),
            hints_enabled: Some(hints_enabled),
        });
    }
}

/// Linear decay from `start` on the first slot to `end` on the last.
pub fn linear_decay(start: u8, end: u8) -> impl Fn(usize, usize) -> u8 {
    move |index, total| {
        if total <= 1 {
            return start;
        }
        let t = index as f64 / (total - 1) as f64;
        let level = start as f64 + (end as f64 - start as f64) * t;
        level.round().clamp(0.0, 100.0) as u8
    }
}
