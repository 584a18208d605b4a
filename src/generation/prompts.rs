//! Prompt templates for slot generation and repair.
//!
//! Templates are raw string constants with `{name}` placeholders filled by
//! [`render`]. Rendering is single pass, so model output pasted into a repair
//! prompt is never re-expanded.

use regex::Captures;
use serde_json::Value;

use crate::contracts::{Difficulty, Language, ProblemSlot, ProblemStyle};
use crate::utils::text::snip;

/// Fill `{name}` placeholders in one pass. Unknown placeholders are kept.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    regex!(r"\{([a-z_]+)\}")
        .replace_all(template, |caps: &Captures| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Diversity steering for one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub domain: Option<String>,
    pub avoid_domains: Vec<String>,
    pub avoid_titles: Vec<String>,
}

/// Evidence from a failed attempt, fed into the next attempt's prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairContext {
    pub previous_raw: Option<String>,
    /// Full prior draft, reference included. Never persisted.
    pub previous_draft: Option<Value>,
    pub error_message: Option<String>,
    pub judge_stdout: Option<String>,
    pub judge_stderr: Option<String>,
}

const JAVA_SYSTEM_PROMPT: &str = r#"You are an exercise generator for Java. Generate exactly 1 Java problem that matches the provided requirements.

Hard requirements:
- Java 17, no package declarations anywhere.
- Return JSON for a SINGLE problem (not an array).
- You MUST follow the exact output shape requested in the user prompt:
  - EITHER the legacy single-file shape (starter_code + reference_solution)
  - OR the workspace shape (workspace + reference_workspace).

Test suite requirements:
- Exactly 8 @Test methods
- Import org.junit.jupiter.api.Test and static org.junit.jupiter.api.Assertions.*
- No package declarations
- Test class name must match the tested class name + "Test"
- Tests must assert real behavior (no assertTrue(true) placeholders)
- Use assertEquals/assertTrue/assertFalse/assertThrows with meaningful expectations
- Avoid brittle whitespace expectations (do not assertEquals against string literals with leading/trailing spaces).

Reference solution requirements (legacy):
- reference_solution must compile and pass all tests
- starter_code and reference_solution must each declare at most ONE top-level public type (helper types should be non-public).
- JSON formatting: represent newlines as "\n" (single backslash). Do NOT use "\\n" (double backslash).

Reference workspace requirements (workspace):
- reference_workspace must compile and pass all tests
- reference_workspace must contain the same file paths as workspace
- each file must declare at most ONE top-level public type, and if present it must match the filename.

Return ONLY valid JSON. No markdown, no code fences, no prose."#;

const PYTHON_SYSTEM_PROMPT: &str = r#"You are an exercise generator for Python. Generate exactly 1 Python problem that matches the provided requirements.

Python invariants (non-negotiable):
- Python 3.11 only
- Standard library only (no external libraries)
- No filesystem access (do not read/write files)
- No networking
- Deterministic behavior (no randomness unless explicitly required)
- No stdin reads (do not use input() or sys.stdin.*); prefer pure functions

Test suite requirements (pytest):
- Tests MUST use pytest style: plain functions with assert statements
- Exactly 8 test functions named: test_case_1 ... test_case_8
- Tests MUST NOT print, read input(), or use randomness
- No floating-point tolerance unless the problem explicitly defines it (do not use pytest.approx)

Solution interface:
- Provide a single entry function named solve(...)
- solve(...) MUST be deterministic and must NOT read from stdin
- The required output behavior depends on Problem style:
  - return: solve(...) returns the answer (no printing)
  - stdout: solve(...) prints the answer to stdout (tests capture stdout)
  - mixed: solve(...) returns the answer AND prints it to stdout

Output format:
- Return ONLY valid JSON (no markdown, no code fences, no prose)
- Return a JSON object for a SINGLE problem (not an array)"#;

/// The variadic harness every C++ test suite must use.
const CPP_HARNESS: &str = r#"  static int __codem_failures = 0;
  #define RUN_TEST(name, ...) do { \
    try { __VA_ARGS__; std::cout << "[PASS] " << (name) << "\\n"; } \
    catch (const std::exception&) { std::cout << "[FAIL] " << (name) << "\\n"; __codem_failures++; } \
    catch (...) { std::cout << "[FAIL] " << (name) << "\\n"; __codem_failures++; } \
  } while (0)

  int main() {
    RUN_TEST("test_case_1", { /* TODO */ });
    RUN_TEST("test_case_2", { /* TODO */ });
    RUN_TEST("test_case_3", { /* TODO */ });
    RUN_TEST("test_case_4", { /* TODO */ });
    RUN_TEST("test_case_5", { /* TODO */ });
    RUN_TEST("test_case_6", { /* TODO */ });
    RUN_TEST("test_case_7", { /* TODO */ });
    RUN_TEST("test_case_8", { /* TODO */ });
    return __codem_failures ? 1 : 0;
  }"#;

const CPP_SYSTEM_PROMPT: &str = r#"You are an exercise generator for C++. Generate exactly 1 C++ problem that matches the provided requirements.

C++ invariants (non-negotiable):
- C++20 (g++)
- Standard library only (no external libraries)
- No filesystem access
- No networking
- Deterministic behavior (no randomness unless explicitly required)
- No stdin reads (do not use cin/scanf/getline/etc); prefer pure functions

Problem quality rules (non-negotiable):
- The description, tests, and reference_solution must describe and validate the SAME behavior.
- Do NOT prescribe a specific algorithm unless it is guaranteed correct for all valid inputs.
  (Example pitfall: "coin change with greedy" is not correct for arbitrary denominations.)
- Prefer describing required behavior and constraints, then implement a correct reference_solution.
- You MUST #include <functional> if you use std::function.
- You MUST #include <algorithm> if you use std::sort, std::max, etc.
- You MUST #include <numeric> if you use std::accumulate.
- You MUST #include <sstream> if you use std::stringstream.

Solution interface:
- Provide a single entry function named solve(...)
- solve(...) MUST be deterministic and must NOT read from stdin
- The required output behavior depends on Problem style:
  - return: solve(...) returns the answer (no printing)
  - stdout: solve(...) prints the answer to std::cout (tests capture stdout)
  - mixed: solve(...) returns the answer AND prints it to std::cout
- Do not define main() in solution.cpp

Test suite requirements (custom runner in test.cpp):
- Must #include "solution.cpp"
- Must define a main() test runner
- Exactly 8 tests, named: test_case_1 ... test_case_8
- Use this exact harness template (copy/paste; only edit inside the TODO blocks):
{harness}
- Print a single line per test in this exact format:
  [PASS] test_case_1
  [FAIL] test_case_1

Output format:
- Return ONLY valid JSON (no markdown, no code fences, no prose)
- Return a JSON object for a SINGLE problem (not an array)"#;

const SQL_SYSTEM_PROMPT: &str = r#"You are an exercise generator for SQL. Generate exactly 1 SQL problem that matches the provided requirements.

SQL runtime invariants (non-negotiable):
- SQLite 3 dialect
- The learner writes a single read-only query (WITH/SELECT only)
- No schema changes or mutations in the solution query
- Deterministic results: include ORDER BY if row order matters

Test suite format (JSON string):
- test_suite MUST be valid JSON (not code)
- It MUST include:
  - schema_sql: SQL statements that create tables (CREATE TABLE ...)
  - cases: exactly 8 cases named test_case_1..test_case_8
    each case includes:
      - seed_sql: SQL inserts for that case
      - expected: { columns: string[], rows: any[][] }
      - order_matters?: boolean

Output format:
- Return ONLY valid JSON (no markdown, no code fences, no prose)
- Return a JSON object for a SINGLE problem (not an array)"#;

/// System prompt for a language's generator.
pub fn system_prompt(language: Language) -> String {
    match language {
        Language::Java => JAVA_SYSTEM_PROMPT.to_string(),
        Language::Python => PYTHON_SYSTEM_PROMPT.to_string(),
        Language::Cpp => render(CPP_SYSTEM_PROMPT, &[("harness", CPP_HARNESS)]),
        Language::Sql => SQL_SYSTEM_PROMPT.to_string(),
    }
}

const SLOT_HEADER: &str = r#"Generate exactly 1 {language} problem with the following requirements:

Difficulty: {difficulty}
Topics: {topics}
Problem style: {problem_style}
Constraints: {constraints}
{extra}
"#;

const JAVA_LEGACY_SHAPE: &str = r#"Return a JSON object (not array) with these exact fields:
{
  "id": "unique-problem-id",
  "title": "Problem Title",
  "description": "Detailed problem description...",
  "reasoning": "Plan: 1. Handle edge case X by returning Y. 2. Tests will expect Y...",
  "starter_code": "public class ClassName { ... }",
  "test_suite": "import org.junit.jupiter.api.Test; ...",
  "reference_solution": "public class ClassName { /* complete implementation */ }",
  "constraints": "{constraints}",
  "sample_inputs": ["input1", "input2"],
  "sample_outputs": ["output1", "output2"],
  "difficulty": "{difficulty}",
  "topic_tag": "{topic_tag}"
}

Critical rules:
- test_suite must have exactly 8 @Test methods
- reference_solution must be a complete, working solution that passes all tests
- starter_code should be the same class with method signatures but TODOs instead of implementation
- Avoid whitespace-padding edge cases unless you explicitly define normalization; do not assertEquals against string literals with leading/trailing spaces.
- starter_code and reference_solution must declare at most ONE top-level public type.
- All Java code must have NO package declarations
- Test class must import org.junit.jupiter.api.Test and static org.junit.jupiter.api.Assertions.*
- Use the "reasoning" field to explain your implementation plan and edge case strategy BEFORE writing code."#;

const JAVA_WORKSPACE_SHAPE: &str = r#"Return a JSON object (not array) with these exact fields:
{
  "id": "unique-problem-id",
  "title": "Problem Title",
  "description": "Detailed problem description...",
  "test_suite": "import org.junit.jupiter.api.Test; ...",
  "workspace": {
    "files": [
      { "path": "Main.java", "role": "entry", "content": "public class Main { public static void main(String[] args) { ... } }" },
      { "path": "ClassName.java", "role": "support", "content": "public class ClassName { /* TODO */ }" }
    ],
    "entrypoint": "Main"
  },
  "reference_workspace": {
    "files": [
      { "path": "Main.java", "role": "entry", "content": "public class Main { public static void main(String[] args) { ... } }" },
      { "path": "ClassName.java", "role": "support", "content": "public class ClassName { /* complete implementation */ }" }
    ],
    "entrypoint": "Main"
  },
  "constraints": "{constraints}",
  "sample_inputs": ["input1", "input2"],
  "sample_outputs": ["output1", "output2"],
  "difficulty": "{difficulty}",
  "topic_tag": "{topic_tag}"
}

Critical rules:
- test_suite must have exactly 8 @Test methods
- workspace.files must include exactly 2 files: Main.java + one target class file
- test_suite MUST test the target class (NOT Main)
- reference_workspace must be a complete, working solution workspace that passes all tests
- Avoid whitespace-padding edge cases unless you explicitly define normalization; do not assertEquals against string literals with leading/trailing spaces.
- Each .java file must declare at most ONE top-level public type; if present, it must match the filename.
- All Java code must have NO package declarations
- Test class must import org.junit.jupiter.api.Test and static org.junit.jupiter.api.Assertions.*"#;

const PYTHON_SHAPE: &str = r#"Return a JSON object (not array) with these exact fields:
{
  "id": "unique-problem-id",
  "title": "Problem Title",
  "description": "Detailed problem description...",
  "reasoning": "Plan: 1. Handle edge case X... 2. Verify Y...",
  "starter_code": "def solve(...):\n    # TODO\n    pass\n",
  "test_suite": "import pytest\nfrom solution import solve\n\n...\n",
  "reference_solution": "def solve(...):\n    ...\n",
  "constraints": "{constraints}",
  "sample_inputs": ["input1", "input2"],
  "sample_outputs": ["output1", "output2"],
  "difficulty": "{difficulty}",
  "topic_tag": "{topic_tag}"
}

Critical rules:
- starter_code and reference_solution must define solve(...)
- solve(...) must NOT read from stdin (no input(), no sys.stdin.*)
{style_rules}
- test_suite must import solve via: from solution import solve
- test_suite must define exactly 8 tests named test_case_1..test_case_8
- No print-based tests; use assertions only (stdout style captures via capsys)
- No randomness, no pytest.approx, no flaky behavior
- Keep test inputs small enough to run comfortably under strict time limits (avoid huge loops/recursion depth).
- Ensure generated JSON strings are properly escaped (especially backslashes and quotes)."#;

const CPP_SHAPE: &str = r##"Return a JSON object (not array) with these exact fields:
{
  "id": "unique-problem-id",
  "title": "Problem Title",
  "description": "Detailed problem description...",
  "reasoning": "Plan: I will handle integer overflow by... I will include <functional>...",
  "starter_code": "#include <bits/stdc++.h>\n\n// Implement solve(...) below.\n",
  "test_suite": "#include <bits/stdc++.h>\n#include \"solution.cpp\"\n\n...\n",
  "reference_solution": "#include <bits/stdc++.h>\n\n// solve(...)\n",
  "constraints": "{constraints}",
  "sample_inputs": ["input1", "input2"],
  "sample_outputs": ["output1", "output2"],
  "difficulty": "{difficulty}",
  "topic_tag": "{topic_tag}"
}

Critical rules:
- starter_code and reference_solution must define solve(...) (no main())
- test_suite must #include "solution.cpp"
- test_suite MUST include the exact variadic RUN_TEST harness from the system prompt (do not change its signature)
- test_suite must call RUN_TEST exactly 8 times: test_case_1..test_case_8
- solve(...) must NOT read from stdin (no cin/scanf/getline/etc)
{style_rules}
- Tests must print exactly one status line per test: [PASS] test_case_N or [FAIL] test_case_N
- No randomness, no flaky behavior
- Keep test inputs small enough to run comfortably under strict time limits (avoid massive graphs/arrays)."##;

const SQL_SHAPE: &str = r#"Return a JSON object (not array) with these exact fields:
{
  "id": "unique-problem-id",
  "title": "Problem Title",
  "description": "Detailed problem description (include table schema description in prose)...",
  "starter_code": "SELECT ...",
  "test_suite": "{\n  \"schema_sql\": \"...\",\n  \"cases\": [ ... ]\n}",
  "reference_solution": "SELECT ...",
  "constraints": "{constraints}",
  "sample_inputs": [],
  "sample_outputs": [],
  "difficulty": "{difficulty}",
  "topic_tag": "{topic_tag}"
}

Critical rules:
- starter_code and reference_solution must be a single read-only query (WITH/SELECT only)
- test_suite must be valid JSON with schema_sql + exactly 8 cases: test_case_1..test_case_8
- Each case must be deterministic and match expected columns/rows exactly
- If order matters, set order_matters=true and include ORDER BY in the solution query"#;

const JSON_ONLY_FOOTER: &str = "Respond ONLY with JSON. NO markdown. NO code fences. NO extra text.";

/// Tutorial domains every Java prompt steers away from.
const OVERUSED_JAVA_DOMAINS: [&str; 8] = [
    "BankAccount",
    "Student",
    "Shape",
    "Animal",
    "Vehicle",
    "Employee",
    "Car",
    "Library",
];

/// Whether a Java slot should be generated in multi-file workspace shape.
///
/// Opt-in via `CODEMM_WORKSPACE_GEN=1`, and only for easy slots.
pub fn workspace_mode(slot: &ProblemSlot, enabled: bool) -> bool {
    enabled && slot.language == Language::Java && slot.difficulty == Difficulty::Easy
}

fn python_style_rules(style: ProblemStyle) -> &'static str {
    match style {
        ProblemStyle::Stdout => "- solve(...) should print the final answer to stdout and return None\n- test_suite must use capsys.readouterr() and assert on captured.out",
        ProblemStyle::Mixed => "- solve(...) should return the answer AND print it to stdout\n- test_suite must assert solve(...) == expected AND assert captured.out",
        ProblemStyle::Return => "- solve(...) must return the answer (no printing)\n- test_suite must assert solve(...) == expected",
    }
}

fn cpp_style_rules(style: ProblemStyle) -> &'static str {
    match style {
        ProblemStyle::Stdout => "- reference_solution should write the final answer to std::cout (not stdin)\n- test_suite must capture std::cout (redirect rdbuf to std::ostringstream) and compare printed output",
        ProblemStyle::Mixed => "- reference_solution should return the answer AND print it to std::cout\n- test_suite must compare BOTH the returned value and captured std::cout output",
        ProblemStyle::Return => "- reference_solution must return the answer (no printing)\n- test_suite must compare returned values only (no stdout capture)",
    }
}

fn normalize_topic(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '_' || *c == '-')
        .collect()
}

/// Structural requirements implied by OOP topic names.
pub fn topic_structural_requirements(topics: &[String]) -> Vec<&'static str> {
    let normalized: Vec<String> = topics.iter().map(|t| normalize_topic(t)).collect();
    let has = |needle: &str| normalized.iter().any(|t| t.contains(needle));

    let mut reqs: Vec<&'static str> = Vec::new();
    if has("encapsulation") {
        reqs.extend([
            "Encapsulation: use private fields + public methods; do not expose mutable internals directly.",
            "Encapsulation: include at least one validation rule (reject invalid state).",
            "Encapsulation: tests should verify state is protected via method behavior (not direct field access).",
        ]);
    }
    if has("polymorphism") {
        reqs.extend([
            "Polymorphism: include a base type (interface or abstract class) + at least 2 concrete implementations.",
            "Polymorphism: tests must exercise dynamic dispatch through the base type reference.",
            "Polymorphism: implementations must behave meaningfully differently (not just constants).",
        ]);
    }
    if has("inheritance") {
        reqs.extend([
            "Inheritance: include a base class + subclass that overrides at least one method.",
            "Inheritance: tests must cover overridden behavior and at least one use of super/base behavior.",
        ]);
    }
    if has("abstract") {
        reqs.extend([
            "Abstraction: include an abstract class or interface with an abstract method contract.",
            "Abstraction: tests should target behavior via the abstract contract, not concrete-only APIs.",
        ]);
    }
    if has("composition") {
        reqs.extend([
            "Composition: include a class that owns another object and delegates part of its behavior to it.",
            "Composition: tests should validate the collaboration between the composed objects.",
        ]);
    }
    if has("interface") {
        reqs.push(
            "Interfaces: include at least one interface and design code to depend on the interface, not the implementation.",
        );
    }
    reqs
}

fn java_diversity_hint(ctx: &PromptContext) -> String {
    let mut lines = Vec::new();
    if let Some(domain) = &ctx.domain {
        lines.push(format!("Scenario domain seed: {}", domain));
    }
    lines.push(format!(
        "Avoid overused tutorial domains/classes: {}",
        OVERUSED_JAVA_DOMAINS.join(", ")
    ));
    if !ctx.avoid_domains.is_empty() {
        lines.push(format!(
            "Avoid repeating domains: {}",
            ctx.avoid_domains.join(", ")
        ));
    }
    if !ctx.avoid_titles.is_empty() {
        lines.push(format!(
            "Avoid titles too similar to: {}",
            ctx.avoid_titles.join(" | ")
        ));
    }
    format!("\nDiversity constraints:\n- {}\n", lines.join("\n- "))
}

fn slot_vars(slot: &ProblemSlot) -> [(&'static str, String); 6] {
    [
        ("language", language_label(slot.language).to_string()),
        ("difficulty", slot.difficulty.to_string()),
        ("topics", slot.topics.join(", ")),
        ("problem_style", slot.problem_style.to_string()),
        ("constraints", slot.constraints.clone()),
        ("topic_tag", slot.primary_topic().to_string()),
    ]
}

fn language_label(language: Language) -> &'static str {
    match language {
        Language::Java => "Java",
        Language::Python => "Python",
        Language::Cpp => "C++",
        Language::Sql => "SQL (SQLite)",
    }
}

fn render_with_slot(template: &str, slot: &ProblemSlot, extra: &[(&str, &str)]) -> String {
    let base = slot_vars(slot);
    let mut vars: Vec<(&str, &str)> = base.iter().map(|(k, v)| (*k, v.as_str())).collect();
    vars.extend_from_slice(extra);
    render(template, &vars)
}

/// First-attempt user prompt for a slot.
pub fn slot_prompt(slot: &ProblemSlot, ctx: &PromptContext, workspace: bool) -> String {
    let (extra, shape) = match slot.language {
        Language::Java => {
            let reqs = topic_structural_requirements(&slot.topics);
            let mut extra = java_diversity_hint(ctx);
            if !reqs.is_empty() {
                extra.push_str(&format!(
                    "\nTopic structural requirements:\n- {}\n",
                    reqs.join("\n- ")
                ));
            }
            let shape = if workspace {
                JAVA_WORKSPACE_SHAPE
            } else {
                JAVA_LEGACY_SHAPE
            };
            (extra, shape)
        }
        Language::Python => (String::new(), PYTHON_SHAPE),
        Language::Cpp => (String::new(), CPP_SHAPE),
        Language::Sql => (String::new(), SQL_SHAPE),
    };
    let style_rules = match slot.language {
        Language::Python => python_style_rules(slot.problem_style),
        Language::Cpp => cpp_style_rules(slot.problem_style),
        _ => "",
    };

    let header = render_with_slot(SLOT_HEADER, slot, &[("extra", &extra)]);
    let body = render_with_slot(shape, slot, &[("style_rules", style_rules)]);
    format!("{}\n{}\n\n{}", header, body, JSON_ONLY_FOOTER)
}

const REPAIR_TEMPLATE: &str = r#"You previously generated a problem JSON for this slot, but the {failed_artifact} FAILED when executed against the test_suite in {harness}.

Slot requirements:
- Difficulty: {difficulty}
- Topics: {topics}
- Problem style: {problem_style}
- Constraints: {constraints}
{runtime_requirements}
{diversity}
Failure output (may include the real assertion failure):
STDOUT:
{stdout}

STDERR:
{stderr}

Error reason:
{error}

Hard structure rules (do not violate):
{hard_rules}

Here is your previous output (may be truncated):
{previous_raw}

Here is your previous JSON (preferred to edit if present):
{previous_json}

Goal:
- Return corrected JSON with the exact same fields.
- REQUIRED: Update the "reasoning" field to explain why the previous solution failed and how you are fixing it.
- Prefer keeping id/title/description/starter_code stable.
{goal}

Return ONLY valid JSON. No markdown. No code fences. No prose."#;

const JAVA_REPAIR_RULES: &str = r#"- If using legacy fields: starter_code + reference_solution must be valid Java 17 with no package declarations.
- If using workspace fields: workspace + reference_workspace must be valid Java 17 with no package declarations, and reference_workspace must include the same file paths as workspace.
- Each Java file must not declare more than one public class.
- Keep exactly 8 @Test methods.
- Avoid brittle whitespace expectations like assertEquals(" Bob  White ", ...) unless the problem explicitly specifies whitespace behavior."#;

const JAVA_REPAIR_GOAL: &str = r#"- Prefer fixing the reference solution artifact to satisfy the existing tests.
- Only change test_suite if it is clearly inconsistent with the description or contains an obvious mistake; otherwise keep tests stable.
- The final test_suite + reference artifact MUST compile and MUST pass in Docker/JUnit.
- Keep tests meaningful (no trivial assertions)."#;

const PYTHON_REPAIR_RULES: &str = r#"- starter_code and reference_solution must define solve(...)
- solve(...) must NOT read from stdin (no input(), no sys.stdin.*) and must not use networking or randomness
- For problem_style=return: solve(...) must NOT print; tests must assert solve(...) == expected
- For problem_style=stdout: solve(...) should print the answer; tests must capture stdout via capsys and assert on captured.out
- For problem_style=mixed: solve(...) should return the answer AND print it; tests must assert both return and captured.out
- test_suite must import solve via: from solution import solve
- No print-based tests, no randomness, no pytest.approx
- Keep exactly 8 tests: test_case_1..test_case_8"#;

const CPP_REPAIR_RULES: &str = r#"- starter_code and reference_solution must define solve(...) (no main())
- test_suite must #include "solution.cpp" and define main()
- Keep exactly 8 tests: test_case_1..test_case_8 using RUN_TEST("test_case_N", { ... })
- IMPORTANT: RUN_TEST must be a VARIADIC macro: #define RUN_TEST(name, ...) ... __VA_ARGS__ ...
  (otherwise commas inside test blocks break compilation)
- Tests must be deterministic.
- solve(...) must NOT read from stdin (no cin/scanf/getline/etc).
- For problem_style=return: tests should compare returned values (no output capture).
- For problem_style=stdout: tests should capture std::cout output (redirect rdbuf) and compare printed output.
- For problem_style=mixed: tests should compare BOTH the returned value and captured std::cout output.
- Tests must print one line per test: [PASS] test_case_N or [FAIL] test_case_N"#;

const SQL_REPAIR_RULES: &str = r#"- starter_code and reference_solution must be a single read-only query (WITH/SELECT only)
- test_suite must be valid JSON (not code); include schema_sql + 8 cases
- Each case expected.columns must match actual output column names
- KEY FIX: If "Expected rows" mismatches "Actual rows" by order, you MUST add "ORDER BY" to the query and set "order_matters": true.
- KEY FIX: If "Actual rows" are empty or wrong, check your JOIN/WHERE logic."#;

struct RepairFlavor {
    harness: &'static str,
    runtime_requirements: &'static str,
    hard_rules: &'static str,
    goal: &'static str,
}

fn repair_flavor(language: Language) -> RepairFlavor {
    match language {
        Language::Java => RepairFlavor {
            harness: "Docker/JUnit",
            runtime_requirements: "- Java 17, no package declarations\n- test_suite must have exactly 8 @Test methods (JUnit 5)",
            hard_rules: JAVA_REPAIR_RULES,
            goal: JAVA_REPAIR_GOAL,
        },
        Language::Python => RepairFlavor {
            harness: "Docker/pytest",
            runtime_requirements: "- Python 3.11\n- test_suite must use pytest and define exactly 8 tests named test_case_1..test_case_8",
            hard_rules: PYTHON_REPAIR_RULES,
            goal: "- You MAY update test_suite and/or reference_solution, but the final pair MUST pass in Docker/pytest.",
        },
        Language::Cpp => RepairFlavor {
            harness: "Docker/g++",
            runtime_requirements: "- C++20 (g++)\n- test_suite must include exactly 8 RUN_TEST(\"test_case_1\".. \"test_case_8\", ...) tests",
            hard_rules: CPP_REPAIR_RULES,
            goal: "- You MAY update test_suite and/or reference_solution, but the final pair MUST pass in Docker/g++.",
        },
        Language::Sql => RepairFlavor {
            harness: "Docker/SQLite",
            runtime_requirements: "- SQLite 3\n- test_suite must be valid JSON with schema_sql + exactly 8 cases: test_case_1..test_case_8",
            hard_rules: SQL_REPAIR_RULES,
            goal: "- You MAY update test_suite and/or reference_solution, but the final pair MUST pass in Docker/SQLite.",
        },
    }
}

fn repair_diversity(ctx: &PromptContext) -> String {
    let mut out = String::new();
    if let Some(domain) = &ctx.domain {
        out.push_str(&format!("\nScenario seed: {}\n", domain));
    }
    if !ctx.avoid_domains.is_empty() {
        out.push_str(&format!(
            "Avoid repeating domains: {}\n",
            ctx.avoid_domains.join(", ")
        ));
    }
    if !ctx.avoid_titles.is_empty() {
        out.push_str(&format!(
            "Avoid reusing titles too similar to: {}\n",
            ctx.avoid_titles.join(" | ")
        ));
    }
    out
}

/// User prompt for a retry that carries the previous attempt's evidence.
pub fn repair_prompt(slot: &ProblemSlot, repair: &RepairContext, ctx: &PromptContext) -> String {
    let flavor = repair_flavor(slot.language);
    let failed_artifact = match &repair.previous_draft {
        Some(draft) if draft.get("reference_workspace").is_some() => "reference_workspace",
        _ => "reference_solution",
    };
    let previous_json = repair
        .previous_draft
        .as_ref()
        .and_then(|draft| serde_json::to_string_pretty(draft).ok());

    let stdout = snip(repair.judge_stdout.as_deref(), 1600, "(empty)");
    let stderr = snip(repair.judge_stderr.as_deref(), 1600, "(empty)");
    let error = snip(repair.error_message.as_deref(), 600, "(not provided)");
    let previous_raw = snip(repair.previous_raw.as_deref(), 2400, "(not provided)");
    let previous_json = snip(previous_json.as_deref(), usize::MAX, "(not provided)");
    let diversity = repair_diversity(ctx);

    render_with_slot(
        REPAIR_TEMPLATE,
        slot,
        &[
            ("failed_artifact", failed_artifact),
            ("harness", flavor.harness),
            ("runtime_requirements", flavor.runtime_requirements),
            ("diversity", &diversity),
            ("stdout", &stdout),
            ("stderr", &stderr),
            ("error", &error),
            ("hard_rules", flavor.hard_rules),
            ("previous_raw", &previous_raw),
            ("previous_json", &previous_json),
            ("goal", flavor.goal),
        ],
    )
}

const PYTHON_SUITE_REPAIR_SYSTEM: &str = r#"You are a Python pytest test suite repairer.

Your job:
- Produce a VALID pytest test suite for the given problem.
- The suite MUST be deterministic and MUST pass against the provided reference_solution.

Hard rules:
- Return ONLY valid JSON (no markdown, no code fences, no prose)
- Output schema: { "test_suite": "..." }
- Python 3.11, pytest
- test_suite MUST start with:
  import pytest
  from solution import solve
- Exactly 8 tests named: test_case_1 ... test_case_8
- Tests MUST NOT use input(), print(), open(), randomness, or pytest.approx

Problem style for this activity is "{problem_style}":
- return: each test must assert solve(...) == expected
- stdout: each test must call solve(...), then use capsys.readouterr() and assert on captured.out
- mixed: each test must assert solve(...) == expected AND assert captured.out (after calling solve)"#;

const CPP_SUITE_REPAIR_SYSTEM: &str = r#"You are a C++ test suite repairer.

Your job:
- Produce a VALID C++20 test.cpp for a problem, using the required harness.
- The test suite MUST compile against solution.cpp and MUST be deterministic.

Hard rules:
- Return ONLY valid JSON (no markdown, no code fences, no prose)
- Output schema: { "test_suite": "..." }
- test_suite must be based on this exact template (copy/paste; only edit inside the TODO blocks):
  #include <bits/stdc++.h>
  #include "solution.cpp"

{harness}

Additional rules:
- Each TODO block must contain deterministic assertions (use std::runtime_error on failure).
- Problem style for this activity is "{problem_style}":
  - return: tests should call solve(...) and compare returned values.
  - stdout: tests should call solve(...), capture std::cout output (redirect rdbuf), and compare printed output.
  - mixed: tests should compare BOTH the returned value and captured std::cout output."#;

const SUITE_REPAIR_USER: &str = r#"Slot:
{slot_json}

Title:
{title}

Description:
{description}

Constraints:
{constraints}

Starter code (learner edits):
{starter_code}

Reference solution (must pass all tests):
{reference_solution}

Previous invalid test_suite:
{previous_test_suite}

Error:
{error}

Return JSON: {"test_suite":"..."} only."#;

/// Inputs for a one-shot test suite repair call.
#[derive(Debug, Clone, Copy)]
pub struct SuiteRepairInput<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub constraints: &'a str,
    pub starter_code: &'a str,
    pub reference_solution: &'a str,
    pub previous_test_suite: &'a str,
    pub error_message: &'a str,
}

/// `(system, user)` prompts asking for a corrected test suite only.
pub fn suite_repair_prompts(slot: &ProblemSlot, input: &SuiteRepairInput<'_>) -> (String, String) {
    let style = slot.problem_style.to_string();
    let system = match slot.language {
        Language::Cpp => render(
            CPP_SUITE_REPAIR_SYSTEM,
            &[("harness", CPP_HARNESS), ("problem_style", &style)],
        ),
        _ => render(PYTHON_SUITE_REPAIR_SYSTEM, &[("problem_style", &style)]),
    };
    let slot_json = serde_json::json!({
        "difficulty": slot.difficulty,
        "topics": slot.topics,
        "style": slot.problem_style,
    })
    .to_string();
    let user = render(
        SUITE_REPAIR_USER,
        &[
            ("slot_json", &slot_json),
            ("title", input.title),
            ("description", input.description),
            ("constraints", input.constraints),
            ("starter_code", input.starter_code),
            ("reference_solution", input.reference_solution),
            ("previous_test_suite", input.previous_test_suite),
            ("error", input.error_message),
        ],
    );
    (system, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(language: Language, topics: &[&str]) -> ProblemSlot {
        ProblemSlot {
            index: 0,
            difficulty: Difficulty::Easy,
            topics: topics.iter().map(|t| t.to_string()).collect(),
            language,
            problem_style: ProblemStyle::Return,
            constraints: language.default_constraints().to_string(),
            test_case_count: 8,
            pedagogy: None,
        }
    }

    #[test]
    fn test_render_is_single_pass() {
        let out = render("a={a} b={b} c={c}", &[("a", "{b}"), ("b", "2")]);
        assert_eq!(out, "a={b} b=2 c={c}");
    }

    #[test]
    fn test_java_prompt_carries_diversity_and_topic_rules() {
        let ctx = PromptContext {
            domain: Some("ride sharing".to_string()),
            avoid_domains: vec!["hotel booking".to_string()],
            avoid_titles: vec!["Trip Ledger".to_string()],
        };
        let prompt = slot_prompt(&slot(Language::Java, &["polymorphism"]), &ctx, false);
        assert!(prompt.contains("Scenario domain seed: ride sharing"));
        assert!(prompt.contains("Avoid repeating domains: hotel booking"));
        assert!(prompt.contains("Avoid titles too similar to: Trip Ledger"));
        assert!(prompt.contains("BankAccount"));
        assert!(prompt.contains("Polymorphism: include a base type"));
        assert!(prompt.contains("\"reference_solution\""));
        assert!(prompt.contains("\"topic_tag\": \"polymorphism\""));
        assert!(!prompt.contains("{constraints}"));
    }

    #[test]
    fn test_java_workspace_shape() {
        let s = slot(Language::Java, &["encapsulation"]);
        assert!(workspace_mode(&s, true));
        assert!(!workspace_mode(&s, false));
        let prompt = slot_prompt(&s, &PromptContext::default(), true);
        assert!(prompt.contains("\"reference_workspace\""));
        assert!(!prompt.contains("\"reference_solution\""));
    }

    #[test]
    fn test_python_style_rules() {
        let mut s = slot(Language::Python, &["strings"]);
        s.problem_style = ProblemStyle::Stdout;
        let prompt = slot_prompt(&s, &PromptContext::default(), false);
        assert!(prompt.contains("capsys.readouterr()"));
        assert!(!prompt.contains("Diversity constraints"));
    }

    #[test]
    fn test_cpp_system_prompt_uses_variadic_harness() {
        let system = system_prompt(Language::Cpp);
        assert!(system.contains("#define RUN_TEST(name, ...)"));
        assert!(system.contains("__VA_ARGS__"));
        assert!(!system.contains("{harness}"));
    }

    #[test]
    fn test_cpp_shape_keeps_include_lines() {
        let prompt = slot_prompt(&slot(Language::Cpp, &["arrays"]), &PromptContext::default(), false);
        assert!(prompt.contains(r##""test_suite": "#include <bits/stdc++.h>\n#include \"solution.cpp\""##));
        assert!(prompt.contains("\"topic_tag\": \"arrays\""));
        assert!(prompt.contains("avoid massive graphs/arrays"));
    }

    #[test]
    fn test_repair_prompt_snippets() {
        let repair = RepairContext {
            judge_stdout: Some("x".repeat(2000)),
            error_message: Some("Reference solution failed tests for \"T\": boom".to_string()),
            previous_draft: Some(serde_json::json!({"title": "T", "reference_workspace": {}})),
            ..Default::default()
        };
        let prompt = repair_prompt(&slot(Language::Java, &["oop"]), &repair, &PromptContext::default());
        assert!(prompt.contains("the reference_workspace FAILED"));
        assert!(prompt.contains(&"x".repeat(1600)));
        assert!(!prompt.contains(&"x".repeat(1601)));
        assert!(prompt.contains("STDERR:\n(empty)"));
        assert!(prompt.contains("Docker/JUnit"));
        assert!(prompt.contains("Here is your previous output (may be truncated):\n(not provided)"));
    }

    #[test]
    fn test_suite_repair_prompts() {
        let s = slot(Language::Cpp, &["arrays"]);
        let input = SuiteRepairInput {
            title: "T",
            description: "D",
            constraints: "C",
            starter_code: "S",
            reference_solution: "R",
            previous_test_suite: "#define RUN_TEST(name, body)",
            error_message: "Invalid test_suite",
        };
        let (system, user) = suite_repair_prompts(&s, &input);
        assert!(system.contains("__VA_ARGS__"));
        assert!(system.contains("\"return\""));
        assert!(user.contains("Previous invalid test_suite:\n#define RUN_TEST(name, body)"));
        assert!(user.ends_with("Return JSON: {\"test_suite\":\"...\"} only."));
    }
}
