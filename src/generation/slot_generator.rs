//! One generation attempt for one slot.
//!
//! [`SlotGenerator::generate`] makes a single model call, parses the raw
//! output, fills defaults from the slot, and enforces the language contract.
//! It never retries; the orchestrator owns the retry loop. The only extra
//! model call it may make is a one-shot test suite repair for Python and C++
//! when the suite is the sole contract violation.

use std::env;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::{GenerationContractError, SlotError};
use super::prompts::{self, PromptContext, RepairContext, SuiteRepairInput};
use crate::contracts::{
    GeneratedProblem, GeneratedProblemDraft, Language, ProblemSlot, ReferenceArtifact, Workspace,
};
use crate::languages::{self, cpp, java, java_source, python, sql};
use crate::llm::{complete_text, LlmProvider};
use crate::utils::json_extraction::parse_model_json;
use crate::utils::text::sha256_hex;

/// Sampling temperature for slot generation.
pub const GENERATION_TEMPERATURE: f64 = 0.3;
/// Completion budget for slot generation.
pub const GENERATION_MAX_TOKENS: u32 = 5000;

const MAX_ID_CHARS: usize = 80;
const MAX_TITLE_CHARS: usize = 120;
const MAX_DESCRIPTION_CHARS: usize = 8000;
const MAX_CONSTRAINTS_CHARS: usize = 2000;
const MAX_SAMPLES: usize = 20;
const MAX_TOPIC_TAG_CHARS: usize = 40;

const CPP_DEFAULT_STARTER: &str = "#include <bits/stdc++.h>\n\n// Implement solve(...) below.\n// Avoid I/O in solve().\nauto solve(auto x) { (void)x; return 0; }\n";
const SQL_DEFAULT_STARTER: &str = "SELECT 1;";

/// Model and shape settings for the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Empty means the provider's default model.
    pub model: String,
    /// Allow multi-file Java workspaces for easy slots.
    pub workspace_generation: bool,
}

impl GeneratorConfig {
    /// Reads `CODEX_MODEL` and `CODEMM_WORKSPACE_GEN`.
    pub fn from_env() -> Self {
        Self {
            model: env::var("CODEX_MODEL").unwrap_or_default(),
            workspace_generation: env::var("CODEMM_WORKSPACE_GEN").as_deref() == Ok("1"),
        }
    }
}

/// A contract-valid draft plus the hash of the raw output it came from.
#[derive(Debug, Clone)]
pub struct GeneratedDraft {
    pub draft: GeneratedProblemDraft,
    pub llm_output_hash: String,
}

/// One structural rule a draft broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub field: &'static str,
    pub message: String,
}

/// Generates drafts for single slots.
pub struct SlotGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl SlotGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn llm(&self) -> Arc<dyn LlmProvider> {
        Arc::clone(&self.llm)
    }

    /// Run one attempt. `repair` switches to the repair prompt.
    pub async fn generate(
        &self,
        slot: &ProblemSlot,
        repair: Option<&RepairContext>,
        ctx: &PromptContext,
    ) -> Result<GeneratedDraft, SlotError> {
        let workspace = prompts::workspace_mode(slot, self.config.workspace_generation);
        let user = match repair {
            Some(repair) => prompts::repair_prompt(slot, repair, ctx),
            None => prompts::slot_prompt(slot, ctx, workspace),
        };
        debug!(
            "Generating slot {} (repair: {})",
            slot.index,
            repair.is_some()
        );

        let text = complete_text(
            self.llm.as_ref(),
            &prompts::system_prompt(slot.language),
            &user,
            &self.config.model,
            GENERATION_TEMPERATURE,
            GENERATION_MAX_TOKENS,
        )
        .await?;
        let hash = sha256_hex(&text);
        let contract = |message: String| GenerationContractError::new(message, slot.index, &hash, &text);

        let parsed = parse_model_json(&text).map_err(|e| SlotError::Unparseable(contract(e.to_string())))?;
        let Value::Object(raw) = parsed.value else {
            return Err(SlotError::Unparseable(contract(
                "LLM response is not a valid JSON object.".to_string(),
            )));
        };

        let draft = self
            .build_draft(slot, &raw)
            .await
            .map_err(|message| SlotError::Contract(contract(message)))?;
        info!(
            "Slot {} draft \"{}\" passed contract checks",
            slot.index, draft.problem.title
        );
        Ok(GeneratedDraft {
            draft,
            llm_output_hash: hash,
        })
    }

    async fn build_draft(
        &self,
        slot: &ProblemSlot,
        raw: &Map<String, Value>,
    ) -> Result<GeneratedProblemDraft, String> {
        match slot.language {
            Language::Java if has_key(raw, "workspace") && has_key(raw, "reference_workspace") => {
                java_workspace_draft(slot, raw)
            }
            Language::Java => java_draft(slot, raw),
            Language::Python => self.python_draft(slot, raw).await,
            Language::Cpp => self.cpp_draft(slot, raw).await,
            Language::Sql => sql_draft(slot, raw),
        }
    }

    async fn python_draft(
        &self,
        slot: &ProblemSlot,
        raw: &Map<String, Value>,
    ) -> Result<GeneratedProblemDraft, String> {
        if has_key(raw, "workspace") || has_key(raw, "reference_workspace") {
            return Err("Python generation does not support workspace problems yet.".to_string());
        }
        let starter = text(raw, "starter_code").unwrap_or_else(|| python::DEFAULT_STARTER.to_string());
        let test_suite = text(raw, "test_suite").unwrap_or_default();
        let reference = text(raw, "reference_solution")
            .ok_or_else(|| missing_reference(slot))?;

        let mut draft = assemble(slot, raw, test_suite, Some(starter), None, ReferenceArtifact::Solution(reference));
        let issues = schema_issues(&draft, slot);
        if !issues.is_empty() {
            if !issues.iter().all(|i| i.field == "test_suite") {
                return Err(schema_failure(slot, &issues, ""));
            }
            let repaired = self.repair_test_suite(slot, &draft, &summarize(&issues)).await?;
            draft.problem.test_suite = repaired;
            let issues = schema_issues(&draft, slot);
            if !issues.is_empty() {
                return Err(schema_failure(slot, &issues, " after Python test_suite repair"));
            }
            info!("Repaired Python test_suite for slot {}", slot.index);
        }

        let reference = draft.reference_solution().unwrap_or_default();
        python::check_reference_style(reference, slot.problem_style)
            .map_err(|e| format!("Invalid reference_solution for slot {}: {}", slot.index, e))?;
        Ok(draft)
    }

    async fn cpp_draft(
        &self,
        slot: &ProblemSlot,
        raw: &Map<String, Value>,
    ) -> Result<GeneratedProblemDraft, String> {
        if has_key(raw, "workspace") || has_key(raw, "reference_workspace") {
            return Err("C++ generation does not support workspace problems yet.".to_string());
        }
        let test_suite = text(raw, "test_suite")
            .ok_or_else(|| format!("Invalid test_suite for slot {}: missing.", slot.index))?;
        let reference = text(raw, "reference_solution")
            .ok_or_else(|| missing_reference(slot))?;

        let mut starter = text(raw, "starter_code").unwrap_or_default();
        let has_solve = regex!(r"\bsolve\s*\(").is_match(&languages::strip_c_style_comments(&starter));
        if !has_solve {
            let topic = slot.topics.first().map(String::as_str).unwrap_or("cpp");
            match cpp::synthesize_starter(&reference, topic) {
                Some(synthesized) => starter = synthesized.trim().to_string(),
                None if starter.is_empty() => starter = CPP_DEFAULT_STARTER.to_string(),
                None => {}
            }
        }

        let mut draft = assemble(slot, raw, test_suite, Some(starter), None, ReferenceArtifact::Solution(reference));
        let issues = schema_issues(&draft, slot);
        if !issues.is_empty() {
            let diagnostics = cpp::diagnose_test_suite(&draft.problem.test_suite);
            let mut message = summarize(&issues);
            if issues.iter().any(|i| i.field == "test_suite") {
                message.push_str(&format!(" | cpp_test_suite_checks={}", to_json(&diagnostics)));
                warn!(
                    "Slot {} C++ test_suite invalid: {:?}",
                    slot.index,
                    diagnostics.problems(slot.test_case_count)
                );
                let repaired = self.repair_test_suite(slot, &draft, &message).await?;
                draft.problem.test_suite = repaired;
                if !schema_issues(&draft, slot).is_empty() {
                    let after = cpp::diagnose_test_suite(&draft.problem.test_suite);
                    return Err(format!(
                        "Generated problem for slot {} failed schema validation after C++ test_suite repair: {} | repaired_cpp_test_suite_checks={}",
                        slot.index,
                        message,
                        to_json(&after)
                    ));
                }
                info!("Repaired C++ test_suite for slot {}", slot.index);
            } else {
                return Err(format!(
                    "Generated problem for slot {} failed schema validation: {}",
                    slot.index, message
                ));
            }
        }

        let reference = draft.reference_solution().unwrap_or_default();
        cpp::check_reference_style(reference, slot.problem_style)
            .map_err(|e| format!("Invalid reference_solution for slot {}: {}", slot.index, e))?;
        Ok(draft)
    }

    async fn repair_test_suite(
        &self,
        slot: &ProblemSlot,
        draft: &GeneratedProblemDraft,
        error_message: &str,
    ) -> Result<String, String> {
        let (temperature, max_tokens, label) = match slot.language {
            Language::Cpp => (0.2, 2400, "C++"),
            _ => (0.0, 2000, "Python"),
        };
        let problem = &draft.problem;
        let input = SuiteRepairInput {
            title: &problem.title,
            description: &problem.description,
            constraints: &problem.constraints,
            starter_code: problem.starter_code.as_deref().unwrap_or_default(),
            reference_solution: draft.reference_solution().unwrap_or_default(),
            previous_test_suite: &problem.test_suite,
            error_message,
        };
        let (system, user) = prompts::suite_repair_prompts(slot, &input);
        let text = complete_text(
            self.llm.as_ref(),
            &system,
            &user,
            &self.config.model,
            temperature,
            max_tokens,
        )
        .await
        .map_err(|e| format!("{} test_suite repair failed: {}", label, e))?;

        parse_model_json(&text)
            .ok()
            .and_then(|parsed| {
                parsed
                    .value
                    .get("test_suite")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{} test_suite repair failed: missing test_suite.", label))
    }
}

fn java_draft(slot: &ProblemSlot, raw: &Map<String, Value>) -> Result<GeneratedProblemDraft, String> {
    let mut starter = text(raw, "starter_code").unwrap_or_default();
    if java_source::top_level_public_type_names(&starter).len() > 1 {
        return Err("starter_code must not declare more than one top-level public type.".to_string());
    }
    let fallback = format!("Problem{}", slot.index + 1);
    let class_name = java::infer_primary_class_name(&starter, &fallback);
    if starter.is_empty() || java::has_package_declaration(&starter) {
        starter = java::default_class_skeleton(&class_name);
    }

    let test_suite = text(raw, "test_suite").unwrap_or_default();
    check_junit_suite(slot, &test_suite)?;
    check_test_class(slot, &test_suite, &class_name)?;

    let reference = text(raw, "reference_solution").ok_or_else(|| missing_reference(slot))?;
    if java_source::top_level_public_type_names(&reference).len() > 1 {
        return Err("reference_solution must not declare more than one top-level public type.".to_string());
    }
    if java::has_package_declaration(&reference) {
        return Err(format!(
            "reference_solution for slot {} contains package declaration.",
            slot.index
        ));
    }
    let reference_class = java::infer_primary_class_name(&reference, "");
    if reference_class != class_name {
        return Err(format!(
            "reference_solution class name \"{}\" does not match starter_code class name \"{}\".",
            reference_class, class_name
        ));
    }

    let draft = assemble(slot, raw, test_suite, Some(starter), None, ReferenceArtifact::Solution(reference));
    ensure_schema(&draft, slot)?;
    Ok(draft)
}

fn java_workspace_draft(
    slot: &ProblemSlot,
    raw: &Map<String, Value>,
) -> Result<GeneratedProblemDraft, String> {
    let test_suite = text(raw, "test_suite").unwrap_or_default();
    check_junit_suite(slot, &test_suite)?;

    let workspace = parse_workspace(raw, "workspace")?;
    let reference = parse_workspace(raw, "reference_workspace")?;
    java::validate_workspace_problem(&workspace, &reference, &test_suite, slot.index)?;

    let draft = assemble(
        slot,
        raw,
        test_suite,
        None,
        Some(workspace),
        ReferenceArtifact::Workspace(reference),
    );
    ensure_schema(&draft, slot)?;
    Ok(draft)
}

fn sql_draft(slot: &ProblemSlot, raw: &Map<String, Value>) -> Result<GeneratedProblemDraft, String> {
    if has_key(raw, "workspace") || has_key(raw, "reference_workspace") {
        return Err("SQL generation does not support workspace problems.".to_string());
    }
    let starter = text(raw, "starter_code").unwrap_or_else(|| SQL_DEFAULT_STARTER.to_string());
    let test_suite = raw
        .get("test_suite")
        .and_then(sql::coerce_test_suite)
        .ok_or_else(|| format!("Invalid test_suite for slot {}: missing.", slot.index))?;
    let reference = text(raw, "reference_solution").ok_or_else(|| missing_reference(slot))?;

    let draft = assemble(slot, raw, test_suite, Some(starter), None, ReferenceArtifact::Solution(reference));
    ensure_schema(&draft, slot)?;
    Ok(draft)
}

fn check_junit_suite(slot: &ProblemSlot, test_suite: &str) -> Result<(), String> {
    if !java::is_valid_junit5_test_suite(test_suite, slot.test_case_count) {
        return Err(format!(
            "Invalid test_suite for slot {}: must have exactly {} @Test methods, JUnit 5 imports, no package, and non-trivial assertions.",
            slot.index, slot.test_case_count
        ));
    }
    if java::has_brittle_whitespace_expectations(test_suite) {
        return Err(format!(
            "Invalid test_suite for slot {}: avoid assertEquals() against string literals with leading/trailing whitespace (brittle).",
            slot.index
        ));
    }
    Ok(())
}

fn check_test_class(slot: &ProblemSlot, test_suite: &str, class_name: &str) -> Result<(), String> {
    let expected = format!("{}Test", class_name);
    let actual = java::infer_class_name(test_suite, &expected);
    if actual != expected {
        return Err(format!(
            "Test suite class name \"{}\" must match \"{}\".",
            actual, expected
        ));
    }
    if !java::test_suite_references_class(test_suite, class_name) {
        return Err(format!(
            "Test suite for slot {} does not reference class \"{}\".",
            slot.index, class_name
        ));
    }
    Ok(())
}

fn parse_workspace(raw: &Map<String, Value>, key: &str) -> Result<Workspace, String> {
    let value = raw.get(key).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| format!("{} is malformed: {}", key, e))
}

fn has_key(raw: &Map<String, Value>, key: &str) -> bool {
    raw.get(key).is_some_and(|v| !v.is_null())
}

/// Trimmed non-empty string field.
fn text(raw: &Map<String, Value>, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(raw: &Map<String, Value>, key: &str) -> Vec<String> {
    match raw.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn missing_reference(slot: &ProblemSlot) -> String {
    format!("Missing reference_solution for slot {}.", slot.index)
}

fn default_title_subject(slot: &ProblemSlot) -> &str {
    slot.topics
        .first()
        .map(String::as_str)
        .unwrap_or_else(|| languages::profile(slot.language).display_name)
}

/// Fill the shared fields from raw output and slot defaults.
fn assemble(
    slot: &ProblemSlot,
    raw: &Map<String, Value>,
    test_suite: String,
    starter_code: Option<String>,
    workspace: Option<Workspace>,
    reference: ReferenceArtifact,
) -> GeneratedProblemDraft {
    let title = text(raw, "title")
        .unwrap_or_else(|| format!("Problem for {}", default_title_subject(slot)));
    let description =
        text(raw, "description").unwrap_or_else(|| format!("Problem description for {}.", title));
    GeneratedProblemDraft {
        problem: GeneratedProblem {
            language: slot.language,
            id: text(raw, "id").unwrap_or_else(|| Uuid::new_v4().to_string()),
            title,
            description,
            constraints: text(raw, "constraints").unwrap_or_else(|| slot.constraints.clone()),
            sample_inputs: string_list(raw, "sample_inputs"),
            sample_outputs: string_list(raw, "sample_outputs"),
            difficulty: slot.difficulty,
            topic_tag: slot.primary_topic().to_string(),
            test_suite,
            starter_code,
            workspace,
            pedagogy: slot.pedagogy.clone(),
        },
        reference,
    }
}

fn limit(issues: &mut Vec<SchemaIssue>, field: &'static str, value: &str, max: usize) {
    if value.chars().count() > max {
        issues.push(SchemaIssue {
            field,
            message: format!("{} must be at most {} characters.", field, max),
        });
    }
}

/// Every structural rule the draft breaks, in field order.
pub fn schema_issues(draft: &GeneratedProblemDraft, slot: &ProblemSlot) -> Vec<SchemaIssue> {
    let p = &draft.problem;
    let mut issues = Vec::new();

    if p.id.is_empty() {
        issues.push(SchemaIssue {
            field: "id",
            message: "id must not be empty.".to_string(),
        });
    }
    limit(&mut issues, "id", &p.id, MAX_ID_CHARS);
    limit(&mut issues, "title", &p.title, MAX_TITLE_CHARS);
    limit(&mut issues, "description", &p.description, MAX_DESCRIPTION_CHARS);
    limit(&mut issues, "constraints", &p.constraints, MAX_CONSTRAINTS_CHARS);
    limit(&mut issues, "topic_tag", &p.topic_tag, MAX_TOPIC_TAG_CHARS);
    for (field, samples) in [("sample_inputs", &p.sample_inputs), ("sample_outputs", &p.sample_outputs)] {
        if samples.len() > MAX_SAMPLES {
            issues.push(SchemaIssue {
                field,
                message: format!("{} must have at most {} entries.", field, MAX_SAMPLES),
            });
        }
    }

    if let Some(starter) = &p.starter_code {
        if let Err(message) = languages::validate_source(p.language, starter, slot.problem_style) {
            issues.push(SchemaIssue {
                field: "starter_code",
                message,
            });
        }
    }
    if let Some(reference) = draft.reference_solution() {
        if let Err(message) = languages::validate_source(p.language, reference, slot.problem_style) {
            issues.push(SchemaIssue {
                field: "reference_solution",
                message,
            });
        }
    }
    if let Err(message) = languages::validate_test_suite(
        p.language,
        &p.test_suite,
        slot.test_case_count,
        slot.problem_style,
    ) {
        issues.push(SchemaIssue {
            field: "test_suite",
            message,
        });
    }
    issues
}

/// Up to six `field: message` pairs joined with ` | `.
fn summarize(issues: &[SchemaIssue]) -> String {
    let joined = issues
        .iter()
        .take(6)
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join(" | ");
    if joined.is_empty() {
        "unknown error".to_string()
    } else {
        joined
    }
}

fn schema_failure(slot: &ProblemSlot, issues: &[SchemaIssue], phase: &str) -> String {
    let first = issues
        .first()
        .map(|i| i.message.as_str())
        .unwrap_or("unknown error");
    format!(
        "Generated problem for slot {} failed schema validation{}: {}",
        slot.index, phase, first
    )
}

fn ensure_schema(draft: &GeneratedProblemDraft, slot: &ProblemSlot) -> Result<(), String> {
    let issues = schema_issues(draft, slot);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(schema_failure(slot, &issues, ""))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
