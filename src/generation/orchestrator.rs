//! Plan-order generation with per-slot retries.
//!
//! For each slot, in order:
//!
//! 1. generate a draft (one model call, contract checked)
//! 2. judge the hidden reference in the sandbox
//! 3. scaffold the student artifact when the slot is guided
//! 4. discard the reference and keep the persisted problem
//!
//! Any failure regenerates from scratch with a repair context until the
//! language's attempt budget runs out, which aborts the whole run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::errors::{FailureKind, GenerationSlotFailureError, SlotError};
use super::hints::HintGenerator;
use super::progress::{AttemptPhase, ProgressCallback, ProgressEvent};
use super::prompts::{PromptContext, RepairContext};
use super::reference::validate_reference;
use super::retry::max_attempts;
use super::scaffolding::{apply_guided_scaffolding, normalize_level};
use super::slot_generator::SlotGenerator;
use crate::contracts::{GeneratedProblem, GeneratedProblemDraft, ProblemSlot};
use crate::judge::JudgeAdapter;
use crate::languages;

/// Scenario domains rotated across slots.
pub const DOMAIN_POOL: [&str; 20] = [
    "smart home",
    "music streaming",
    "food delivery",
    "event ticketing",
    "fitness tracking",
    "space mission control",
    "hotel booking",
    "ride sharing",
    "online marketplace",
    "photo organizer",
    "recipe planner",
    "study planner",
    "inventory management",
    "movie recommendations",
    "package shipping",
    "language learning",
    "restaurant reservations",
    "weather alerts",
    "customer support",
    "game matchmaking",
];

/// How many recent domains and titles the prompt is told to avoid.
const AVOID_WINDOW: usize = 4;

/// Audit record for one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub slot_index: usize,
    pub success: bool,
    pub retries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_output_hash: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Result of a fully successful run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRun {
    pub problems: Vec<GeneratedProblem>,
    pub outcomes: Vec<GenerationOutcome>,
}

/// 32-bit FNV-1a over UTF-16 code units, folded into `0..modulo`.
fn fnv1a_index(seed: &str, modulo: usize) -> usize {
    let mut hash: u32 = 2_166_136_261;
    for unit in seed.encode_utf16() {
        hash ^= u32::from(unit);
        hash = hash.wrapping_mul(16_777_619);
    }
    (hash as i32).unsigned_abs() as usize % modulo
}

/// Domains and titles already used in this run.
#[derive(Debug, Default)]
struct DiversityTracker {
    domains: Vec<String>,
    titles: Vec<String>,
}

impl DiversityTracker {
    /// First unused pool domain at or after the seed's hash position.
    fn pick_domain(&self, seed: &str) -> &'static str {
        let start = fnv1a_index(seed, DOMAIN_POOL.len());
        (0..DOMAIN_POOL.len())
            .map(|offset| DOMAIN_POOL[(start + offset) % DOMAIN_POOL.len()])
            .find(|candidate| !self.domains.iter().any(|d| d == candidate))
            .unwrap_or(DOMAIN_POOL[start])
    }

    fn context(&self, domain: &str) -> PromptContext {
        let recent = |items: &[String]| items[items.len().saturating_sub(AVOID_WINDOW)..].to_vec();
        PromptContext {
            domain: Some(domain.to_string()),
            avoid_domains: recent(&self.domains),
            avoid_titles: recent(&self.titles),
        }
    }

    fn record(&mut self, domain: &str, title: &str) {
        self.domains.push(domain.to_string());
        self.titles.push(title.to_string());
    }
}

fn domain_seed(slot: &ProblemSlot) -> String {
    format!(
        "{}:{}:{}:{}",
        slot.language.as_str(),
        slot.difficulty,
        slot.topics.join(","),
        slot.index
    )
}

fn sandbox_short_error(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Compile => "Compilation failed.",
        FailureKind::Tests => "Tests failed.",
        _ => "Timed out.",
    }
}

/// Drives slot generation, judging and secret discard.
pub struct Orchestrator {
    generator: SlotGenerator,
    judge: Arc<dyn JudgeAdapter>,
    hints: Option<HintGenerator>,
    on_progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(generator: SlotGenerator, judge: Arc<dyn JudgeAdapter>) -> Self {
        Self {
            generator,
            judge,
            hints: None,
            on_progress: None,
        }
    }

    /// Ask the model for extra hints when scaffolding guided slots.
    pub fn with_hints(mut self, hints: HintGenerator) -> Self {
        self.hints = Some(hints);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(&event);
        }
    }

    /// Generate every slot of `plan` in order.
    ///
    /// Returns only secret-free problems. The first slot that exhausts its
    /// budget aborts the run with a [`GenerationSlotFailureError`].
    pub async fn generate_from_plan(
        &self,
        plan: &[ProblemSlot],
    ) -> Result<GenerationRun, GenerationSlotFailureError> {
        self.emit(ProgressEvent::GenerationStarted {
            total_slots: plan.len(),
        });
        let mut problems = Vec::with_capacity(plan.len());
        let mut outcomes: Vec<GenerationOutcome> = Vec::with_capacity(plan.len());
        let mut diversity = DiversityTracker::default();

        for slot in plan {
            let domain = diversity.pick_domain(&domain_seed(slot));
            let ctx = diversity.context(domain);
            info!(
                slot_index = slot.index,
                language = slot.language.as_str(),
                difficulty = slot.difficulty.as_str(),
                domain,
                "Generating slot"
            );

            match self.generate_slot(slot, &ctx, &outcomes).await {
                Ok((problem, outcome)) => {
                    diversity.record(domain, &problem.title);
                    problems.push(problem);
                    outcomes.push(outcome);
                }
                Err(failure) => {
                    self.emit(ProgressEvent::GenerationFailed {
                        slot_index: Some(failure.slot_index),
                        kind: failure.kind,
                        error: failure.message.clone(),
                    });
                    return Err(failure);
                }
            }
        }

        self.emit(ProgressEvent::GenerationCompleted {
            problem_count: problems.len(),
        });
        info!("Generated {} problems", problems.len());
        Ok(GenerationRun { problems, outcomes })
    }

    async fn generate_slot(
        &self,
        slot: &ProblemSlot,
        ctx: &PromptContext,
        outcomes_so_far: &[GenerationOutcome],
    ) -> Result<(GeneratedProblem, GenerationOutcome), GenerationSlotFailureError> {
        let budget = max_attempts(slot.language);
        self.emit(ProgressEvent::SlotStarted {
            slot_index: slot.index,
            difficulty: slot.difficulty,
            topic: slot.topics.first().cloned().unwrap_or_else(|| "topic".to_string()),
            language: slot.language,
        });

        let mut repair: Option<RepairContext> = None;
        let mut last_title: Option<String> = None;
        let mut last_hash: Option<String> = None;

        for attempt in 1..=budget {
            self.emit(ProgressEvent::SlotLlmAttemptStarted {
                slot_index: slot.index,
                attempt,
            });

            let error = match self.generator.generate(slot, repair.as_ref(), ctx).await {
                Ok(generated) => {
                    last_title = Some(generated.draft.problem.title.clone());
                    last_hash = Some(generated.llm_output_hash.clone());
                    self.emit(ProgressEvent::SlotContractValidated {
                        slot_index: slot.index,
                        attempt,
                    });
                    self.emit(ProgressEvent::SlotDockerValidationStarted {
                        slot_index: slot.index,
                        attempt,
                    });

                    match validate_reference(self.judge.as_ref(), &generated.draft).await {
                        Ok(()) => {
                            let problem = self.finalize(generated.draft, slot).await;
                            self.emit(ProgressEvent::SlotCompleted {
                                slot_index: slot.index,
                            });
                            info!(
                                slot_index = slot.index,
                                attempt,
                                "Slot {} accepted: \"{}\"",
                                slot.index,
                                problem.title
                            );
                            let outcome = GenerationOutcome {
                                slot_index: slot.index,
                                success: true,
                                retries: attempt - 1,
                                kind: None,
                                llm_output_hash: last_hash,
                                recorded_at: Utc::now(),
                            };
                            return Ok((problem, outcome));
                        }
                        Err(e) => {
                            self.emit(ProgressEvent::SlotDockerValidationFailed {
                                slot_index: slot.index,
                                attempt,
                                short_error: sandbox_short_error(e.kind).to_string(),
                            });
                            self.emit(ProgressEvent::AttemptFailed {
                                slot_index: slot.index,
                                attempt,
                                phase: AttemptPhase::Validate,
                            });
                            repair = Some(RepairContext {
                                previous_draft: Some(generated.draft.to_prompt_json()),
                                error_message: Some(e.message.clone()),
                                judge_stdout: Some(e.stdout.clone()),
                                judge_stderr: Some(e.stderr.clone()),
                                ..Default::default()
                            });
                            SlotError::Reference(e)
                        }
                    }
                }
                Err(error) => {
                    match &error {
                        SlotError::Contract(e) | SlotError::Unparseable(e) => {
                            self.emit(ProgressEvent::SlotContractFailed {
                                slot_index: slot.index,
                                attempt,
                                short_error: "Contract validation failed.".to_string(),
                            });
                            last_hash = Some(e.llm_output_hash.clone());
                            repair = Some(RepairContext {
                                previous_raw: Some(e.raw_snippet.clone()),
                                error_message: Some(e.message.clone()),
                                ..Default::default()
                            });
                        }
                        _ => repair = None,
                    }
                    self.emit(ProgressEvent::AttemptFailed {
                        slot_index: slot.index,
                        attempt,
                        phase: AttemptPhase::Generate,
                    });
                    error
                }
            };

            warn!(
                slot_index = slot.index,
                attempt,
                kind = error.kind().as_str(),
                "Slot {} generation attempt {}/{} failed: {}",
                slot.index,
                attempt,
                budget,
                error
            );

            if attempt == budget {
                self.emit(ProgressEvent::ProblemFailed {
                    slot_index: slot.index,
                });
                let kind = error.kind();
                let mut outcomes_so_far = outcomes_so_far.to_vec();
                outcomes_so_far.push(GenerationOutcome {
                    slot_index: slot.index,
                    success: false,
                    retries: budget - 1,
                    kind: Some(kind),
                    llm_output_hash: last_hash.clone(),
                    recorded_at: Utc::now(),
                });
                return Err(GenerationSlotFailureError {
                    message: format!(
                        "Failed to generate slot {} after {} attempts. Last error: {}",
                        slot.index, budget, error
                    ),
                    slot_index: slot.index,
                    kind,
                    attempts: budget,
                    title: last_title,
                    llm_output_hash: last_hash,
                    outcomes_so_far,
                });
            }
        }

        unreachable!("retry budget is at least one attempt")
    }

    /// Scaffold when guided, then drop the reference.
    async fn finalize(&self, draft: GeneratedProblemDraft, slot: &ProblemSlot) -> GeneratedProblem {
        let level = slot
            .pedagogy
            .as_ref()
            .and_then(|p| normalize_level(p.scaffold_level));
        let draft = match level {
            Some(level) => {
                let line_comment = languages::profile(slot.language).line_comment;
                let hints = match &self.hints {
                    Some(generator) => generator.hint_lines(&draft, slot, level, line_comment).await,
                    None => Vec::new(),
                };
                apply_guided_scaffolding(draft, slot, &hints)
            }
            None => draft,
        };
        draft.discard_reference_artifacts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{Difficulty, Language, Pedagogy, ProblemStyle};
    use crate::error::LlmError;
    use crate::generation::slot_generator::GeneratorConfig;
    use crate::judge::{JudgeResult, Submission};
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MockLlmProvider {
        responses: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockLlmProvider {
        fn new(responses: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            let user = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(user);
            let content = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::RequestFailed("script exhausted".to_string()))?;
            Ok(GenerationResponse {
                id: "t".to_string(),
                model: "test-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    struct ScriptedJudge {
        results: Mutex<VecDeque<JudgeResult>>,
    }

    #[async_trait]
    impl JudgeAdapter for ScriptedJudge {
        async fn judge(&self, _: Language, _: &Submission, _: &str) -> JudgeResult {
            self.results.lock().unwrap().pop_front().unwrap_or_default()
        }
    }

    fn judge(results: Vec<JudgeResult>) -> Arc<ScriptedJudge> {
        Arc::new(ScriptedJudge {
            results: Mutex::new(results.into()),
        })
    }

    fn pass() -> JudgeResult {
        JudgeResult {
            success: true,
            passed_tests: (1..=8).map(|i| format!("test_case_{}", i)).collect(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    fn timeout() -> JudgeResult {
        JudgeResult {
            timed_out: true,
            exit_code: Some(137),
            ..Default::default()
        }
    }

    fn sql_draft(title: &str) -> String {
        let cases: Vec<_> = (1..=8)
            .map(|i| {
                json!({
                    "name": format!("test_case_{}", i),
                    "seed_sql": "INSERT INTO t VALUES (1);",
                    "expected": {"columns": ["id"], "rows": [[1]]},
                })
            })
            .collect();
        json!({
            "title": title,
            "description": "Select ids.",
            "starter_code": "SELECT 1;",
            "test_suite": {"schema_sql": "CREATE TABLE t (id INTEGER);", "cases": cases},
            "reference_solution": "SELECT id FROM t;",
        })
        .to_string()
    }

    fn sql_slot(index: usize) -> ProblemSlot {
        ProblemSlot {
            index,
            difficulty: Difficulty::Easy,
            topics: vec!["joins".to_string()],
            language: Language::Sql,
            problem_style: ProblemStyle::Return,
            constraints: Language::Sql.default_constraints().to_string(),
            test_case_count: 8,
            pedagogy: None,
        }
    }

    fn orchestrator(
        llm: Arc<MockLlmProvider>,
        judge: Arc<ScriptedJudge>,
        events: Arc<Mutex<Vec<ProgressEvent>>>,
    ) -> Orchestrator {
        let sink = events.clone();
        Orchestrator::new(SlotGenerator::new(llm, GeneratorConfig::default()), judge)
            .with_progress(Arc::new(move |e: &ProgressEvent| sink.lock().unwrap().push(e.clone())))
    }

    fn event_types(events: &Mutex<Vec<ProgressEvent>>) -> Vec<String> {
        events
            .lock()
            .unwrap()
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_single_slot_event_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let o = orchestrator(
            MockLlmProvider::new(vec![sql_draft("Ids")]),
            judge(vec![pass()]),
            events.clone(),
        );
        let run = o.generate_from_plan(&[sql_slot(0)]).await.unwrap();

        assert_eq!(run.problems.len(), 1);
        assert_eq!(run.outcomes[0].retries, 0);
        assert!(run.outcomes[0].success);
        assert_eq!(
            event_types(&events),
            vec![
                "generation_started",
                "slot_started",
                "slot_llm_attempt_started",
                "slot_contract_validated",
                "slot_docker_validation_started",
                "slot_completed",
                "generation_completed",
            ]
        );
        let json = serde_json::to_value(&run.problems[0]).unwrap();
        assert!(json.get("reference_solution").is_none());
    }

    #[tokio::test]
    async fn test_contract_failure_repairs_with_raw_output() {
        let llm = MockLlmProvider::new(vec!["{\"title\": 1".to_string(), sql_draft("Ids")]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let o = orchestrator(llm.clone(), judge(vec![pass()]), events.clone());
        let run = o.generate_from_plan(&[sql_slot(0)]).await.unwrap();

        assert_eq!(run.outcomes[0].retries, 1);
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[1].starts_with("You previously generated a problem JSON"));
        assert!(event_types(&events).contains(&"slot_contract_failed".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_exhausts_budget() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let o = orchestrator(
            MockLlmProvider::new((0..3).map(|_| sql_draft("Slow")).collect()),
            judge(vec![timeout(), timeout(), timeout()]),
            events.clone(),
        );
        let err = o.generate_from_plan(&[sql_slot(0)]).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::Timeout);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.title.as_deref(), Some("Slow"));
        assert!(err
            .message
            .starts_with("Failed to generate slot 0 after 3 attempts. Last error: Reference solution timed out"));
        assert_eq!(err.outcomes_so_far.len(), 1);
        assert_eq!(err.outcomes_so_far[0].retries, 2);
        assert!(!err.outcomes_so_far[0].success);

        let types = event_types(&events);
        assert_eq!(types.iter().filter(|t| *t == "slot_docker_validation_failed").count(), 3);
        assert_eq!(types[types.len() - 2], "problem_failed");
        assert_eq!(types[types.len() - 1], "generation_failed");
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_outcomes() {
        let llm = MockLlmProvider::new(vec![sql_draft("First")]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let o = orchestrator(llm, judge(vec![pass()]), events);
        let err = o
            .generate_from_plan(&[sql_slot(0), sql_slot(1)])
            .await
            .unwrap_err();
        assert_eq!(err.slot_index, 1);
        assert_eq!(err.kind, FailureKind::Llm);
        assert_eq!(err.outcomes_so_far.len(), 2);
        assert!(err.outcomes_so_far[0].success);
    }

    #[tokio::test]
    async fn test_guided_slot_is_scaffolded() {
        let mut slot = sql_slot(0);
        slot.pedagogy = Some(Pedagogy {
            scaffold_level: Some(10),
            ..Default::default()
        });
        let events = Arc::new(Mutex::new(Vec::new()));
        let o = orchestrator(
            MockLlmProvider::new(vec![sql_draft("Ids")]),
            judge(vec![pass()]),
            events,
        );
        let run = o.generate_from_plan(&[slot]).await.unwrap();
        let starter = run.problems[0].starter_code.as_deref().unwrap();
        assert!(starter.starts_with("-- BEGIN STUDENT TODO\n"));
        assert!(starter.ends_with("SELECT 1;\n"));
        assert!(run.problems[0].pedagogy.is_some());
    }

    #[test]
    fn test_domains_distinct_and_deterministic() {
        let mut tracker = DiversityTracker::default();
        let seed = domain_seed(&sql_slot(0));
        let first = tracker.pick_domain(&seed);
        assert_eq!(first, DiversityTracker::default().pick_domain(&seed));
        tracker.record(first, "A");
        assert_ne!(tracker.pick_domain(&seed), first);

        for i in 0..6 {
            tracker.record(DOMAIN_POOL[i], &format!("T{}", i));
        }
        let ctx = tracker.context("ride sharing");
        assert_eq!(ctx.avoid_domains.len(), AVOID_WINDOW);
        assert_eq!(ctx.avoid_titles.last().map(String::as_str), Some("T5"));
    }

    #[test]
    fn test_fnv1a_matches_reference_values() {
        // FNV-1a 32-bit of "a" is 0xe40c292c.
        assert_eq!(fnv1a_index("a", usize::MAX), (0xe40c292cu32 as i32).unsigned_abs() as usize);
        assert!(fnv1a_index("sql:easy:joins:0", 20) < 20);
    }
}
