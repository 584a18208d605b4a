//! Model-generated hints for guided scaffolds.
//!
//! Hints are optional. Any failure (disabled, model error, bad JSON) yields
//! no hints and the scaffold falls back to its static guidance.

use std::env;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::scaffolding::max_hints_for_level;
use crate::contracts::{GeneratedProblemDraft, ProblemSlot};
use crate::error::LlmError;
use crate::llm::{complete_text, LlmProvider};
use crate::utils::json_extraction::parse_model_json;
use crate::utils::text::truncate_chars;

const HINT_TEMPERATURE: f64 = 0.2;
const HINT_MAX_TOKENS: u32 = 500;
const MAX_HINT_CHARS: usize = 160;
const DESCRIPTION_CHARS: usize = 1600;

const HINTS_SYSTEM_PROMPT: &str = "You are a concise programming instructor. Return ONLY valid JSON (no markdown, no code fences). Never output code. Never output the full solution. Hints should be plain English, short (<= 160 chars), and actionable.";

const HINTS_USER_PROMPT: &str = r#"Generate up to {max_hints} hints for a learner in guided mode.
Language: {language}
Title: {title}
Topics: {topics}
Learning goal: {learning_goal}
Scaffold level (0..1): {level}

Problem description:
{description}

Return JSON exactly:
{"hints":["..."]}

Rules:
- No code, no pseudo-code, no API signatures.
- Do not reveal full algorithm steps end-to-end.
- Avoid repeating obvious hints like "read the problem".
- Each hint should be a single sentence.
"#;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HintsPayload {
    #[serde(default)]
    hints: Vec<String>,
}

/// Clean one model hint. `None` when it is empty or looks like code.
pub fn sanitize_hint(raw: &str) -> Option<String> {
    let text = raw.trim();
    let text = regex!(r"```[\s\S]*?```").replace_all(text, " ");
    let text = text.trim().replace('`', "");
    let text = regex!(r"^[-*•]\s+").replace(&text, "");
    let text = regex!(r"(?i)^hint:\s*").replace(&text, "");
    let text = regex!(r"(?i)^step\s*\d+\s*:\s*").replace(&text, "");
    let text = regex!(r"\s+").replace_all(&text, " ").trim().to_string();

    if text.is_empty() || regex!(r"(?i)BEGIN STUDENT TODO|END STUDENT TODO").is_match(&text) {
        return None;
    }
    let looks_like_code = regex!(
        r"#include\b|std::|public\s+static\b|class\s+\w+\b|def\s+\w+\s*\(|function\s+\w+\s*\(|=>|\{|\}|;"
    )
    .is_match(&text)
        || regex!(r"\bint\s+solve\s*\(").is_match(&text);
    if looks_like_code {
        return None;
    }

    if text.chars().count() > MAX_HINT_CHARS {
        return Some(format!("{}…", truncate_chars(&text, MAX_HINT_CHARS - 1)));
    }
    Some(text)
}

fn hint_comment_line(line_comment: &str, hint: &str) -> String {
    let trimmed = hint.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    format!("{} Hint: {}.", line_comment, trimmed)
}

/// Generates hint comment lines with a separate, low-temperature model call.
pub struct HintGenerator {
    llm: Arc<dyn LlmProvider>,
    model: String,
    enabled: bool,
}

impl HintGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            enabled: true,
        }
    }

    /// Honors `CODEMM_DYNAMIC_GUIDED_HINTS=0`.
    pub fn from_env(llm: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self::new(llm, model)
            .with_enabled(env::var("CODEMM_DYNAMIC_GUIDED_HINTS").as_deref() != Ok("0"))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Hint comment lines for the slot, empty when hints do not apply.
    ///
    /// Never fails: model errors are logged and produce no hints.
    pub async fn hint_lines(
        &self,
        draft: &GeneratedProblemDraft,
        slot: &ProblemSlot,
        level: f64,
        line_comment: &str,
    ) -> Vec<String> {
        let hints_enabled = slot.pedagogy.as_ref().is_some_and(|p| p.hints_enabled());
        let max_hints = max_hints_for_level(level);
        if !self.enabled || !hints_enabled || max_hints == 0 {
            return Vec::new();
        }

        match self.request(draft, slot, level, max_hints).await {
            Ok(hints) => {
                let lines: Vec<String> = hints
                    .iter()
                    .filter_map(|h| sanitize_hint(h))
                    .take(max_hints)
                    .map(|h| hint_comment_line(line_comment, &h))
                    .collect();
                debug!(
                    "Slot {}: {} of {} requested hints kept",
                    slot.index,
                    lines.len(),
                    max_hints
                );
                lines
            }
            Err(e) => {
                warn!("Guided hint generation failed for slot {}: {}", slot.index, e);
                Vec::new()
            }
        }
    }

    async fn request(
        &self,
        draft: &GeneratedProblemDraft,
        slot: &ProblemSlot,
        level: f64,
        max_hints: usize,
    ) -> Result<Vec<String>, LlmError> {
        let problem = &draft.problem;
        let description = if problem.description.chars().count() > DESCRIPTION_CHARS {
            format!("{}…", truncate_chars(&problem.description, DESCRIPTION_CHARS))
        } else {
            problem.description.clone()
        };
        let topics = if slot.topics.is_empty() {
            "(none)".to_string()
        } else {
            slot.topics.join(", ")
        };
        let goal = slot
            .pedagogy
            .as_ref()
            .and_then(|p| p.learning_goal.as_deref())
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or("(none)");

        let user = super::prompts::render(
            HINTS_USER_PROMPT,
            &[
                ("max_hints", &max_hints.to_string()),
                ("language", problem.language.as_str()),
                ("title", &problem.title),
                ("topics", &topics),
                ("learning_goal", goal),
                ("level", &level.to_string()),
                ("description", &description),
            ],
        );
        let text = complete_text(
            self.llm.as_ref(),
            HINTS_SYSTEM_PROMPT,
            &user,
            &self.model,
            HINT_TEMPERATURE,
            HINT_MAX_TOKENS,
        )
        .await?;

        let parsed = parse_model_json(&text).map_err(|e| LlmError::ParseError(e.to_string()))?;
        let payload: HintsPayload = serde_json::from_value(parsed.value)
            .map_err(|e| LlmError::ParseError(format!("hints payload: {}", e)))?;
        Ok(payload.hints)
    }
}
