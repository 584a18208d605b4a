//! C++20 contract rules and the `RUN_TEST` harness conventions.

use std::collections::BTreeSet;

use serde::Serialize;

use super::strip_c_style_comments;
use crate::contracts::ProblemStyle;

/// The harness every generated `test.cpp` is expected to follow.
pub const RUN_TEST_HARNESS: &str = r#"#include <bits/stdc++.h>
#include "solution.cpp"

static int __codem_failures = 0;
#define RUN_TEST(name, ...) do { \
  try { __VA_ARGS__; std::cout << "[PASS] " << (name) << "\n"; } \
  catch (const std::exception&) { std::cout << "[FAIL] " << (name) << "\n"; __codem_failures++; } \
  catch (...) { std::cout << "[FAIL] " << (name) << "\n"; __codem_failures++; } \
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
}
"#;

fn defines_main(code: &str) -> bool {
    regex!(r"\bint\s+main\s*\(").is_match(code)
}

fn reads_stdin(code: &str) -> bool {
    regex!(r"\b(?:std::)?cin\s*>>").is_match(code)
        || regex!(r"\bscanf\s*\(").is_match(code)
        || regex!(r"\bgetchar\s*\(").is_match(code)
        || regex!(r"\bfgets\s*\(").is_match(code)
        || regex!(r"\bgetline\s*\(\s*(?:std::)?cin\b").is_match(code)
}

pub fn has_stdout_writes(source: &str) -> bool {
    let code = strip_c_style_comments(source);
    regex!(r"\b(?:std::)?(?:cout|cerr)\s*<<").is_match(&code)
        || regex!(r"\b(?:f?printf|puts)\s*\(").is_match(&code)
}

/// Whether a test suite redirects `std::cout` to inspect printed output.
pub fn test_suite_captures_stdout(test_suite: &str) -> bool {
    let code = strip_c_style_comments(test_suite);
    regex!(r"\bcout\s*\.\s*rdbuf\s*\(").is_match(&code)
}

/// Source rules. Output is only forbidden for return-style problems.
pub fn validate_source(source: &str, style: ProblemStyle) -> Result<(), String> {
    let code = strip_c_style_comments(source);
    if defines_main(&code) {
        return Err(
            "C++ source must not define \"main()\"; grading uses a separate test runner."
                .to_string(),
        );
    }
    if !regex!(r"\bsolve\s*\(").is_match(&code) {
        return Err("C++ source must define a solve(...) function.".to_string());
    }
    if reads_stdin(&code) {
        return Err(
            "C++ solve(...) must not read from stdin (use only the function arguments; stdin reads will hang in the Docker judge)."
                .to_string(),
        );
    }
    if style == ProblemStyle::Return && has_stdout_writes(&code) {
        return Err(
            "C++ solve(...) must not write to stdout/stderr (return a value; the harness handles all printing)."
                .to_string(),
        );
    }
    Ok(())
}

/// Extra rule for the hidden reference: output must match the style.
pub fn check_reference_style(source: &str, style: ProblemStyle) -> Result<(), String> {
    if style != ProblemStyle::Return && !has_stdout_writes(source) {
        return Err(format!(
            "reference_solution must write to std::cout for {}-style problems.",
            style
        ));
    }
    Ok(())
}

/// What the suite scanner found; see [`diagnose_test_suite`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteDiagnostics {
    pub includes_solution: bool,
    pub has_main: bool,
    pub has_run_test_calls: bool,
    /// True when `RUN_TEST` is unused or declared with `...`.
    pub has_variadic_run_test_macro: bool,
    pub has_pass_fail_output: bool,
    /// Sorted, unique test numbers.
    pub found_test_numbers: Vec<u32>,
}

impl TestSuiteDiagnostics {
    pub fn has_all_tests(&self, expected_tests: usize) -> bool {
        self.found_test_numbers.len() == expected_tests
            && (1..=expected_tests as u32).all(|n| self.found_test_numbers.contains(&n))
    }

    pub fn is_valid(&self, expected_tests: usize) -> bool {
        self.includes_solution
            && self.has_main
            && self.has_all_tests(expected_tests)
            && self.has_variadic_run_test_macro
            && self.has_pass_fail_output
    }

    /// Human-readable list of the failed gates.
    pub fn problems(&self, expected_tests: usize) -> Vec<String> {
        let mut out = Vec::new();
        if !self.includes_solution {
            out.push("missing #include \"solution.cpp\"".to_string());
        }
        if !self.has_main {
            out.push("missing int main()".to_string());
        }
        if !self.has_all_tests(expected_tests) {
            out.push(format!(
                "expected test_case_1..test_case_{} (found {:?})",
                expected_tests, self.found_test_numbers
            ));
        }
        if !self.has_variadic_run_test_macro {
            out.push("RUN_TEST must be declared variadic: #define RUN_TEST(name, ...)".to_string());
        }
        if !self.has_pass_fail_output {
            out.push("runner must print [PASS]/[FAIL] lines".to_string());
        }
        out
    }
}

/// Scan a test suite.
///
/// Test numbers come from the first of three patterns that finds any:
/// `RUN_TEST("test_case_N"`, then `run("test_case_N"`, then bare
/// `void|bool|int test_case_N(` definitions.
pub fn diagnose_test_suite(test_suite: &str) -> TestSuiteDiagnostics {
    let code = strip_c_style_comments(test_suite);

    let strategies = [
        regex!(r#"\bRUN_TEST\s*\(\s*"test_case_(\d+)"\s*[,)]"#),
        regex!(r#"\brun\s*\(\s*"test_case_(\d+)"\s*[,)]"#),
        regex!(r"\b(?:void|bool|int)\s+test_case_(\d+)\s*\("),
    ];
    let found: BTreeSet<u32> = strategies
        .iter()
        .map(|re| {
            re.captures_iter(&code)
                .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
                .collect::<BTreeSet<u32>>()
        })
        .find(|set| !set.is_empty())
        .unwrap_or_default();

    let has_run_test_calls = regex!(r"\bRUN_TEST\s*\(").is_match(&code);
    let has_variadic_run_test_macro = !has_run_test_calls
        || regex!(r"(?m)^\s*#\s*define\s+RUN_TEST\s*\([^)]*\.\.\.[^)]*\)").is_match(&code);

    TestSuiteDiagnostics {
        includes_solution: regex!(r#"#\s*include\s+"solution\.cpp""#).is_match(&code),
        has_main: defines_main(&code),
        has_run_test_calls,
        has_variadic_run_test_macro,
        has_pass_fail_output: regex!(r"\[(?:PASS|FAIL)\]").is_match(&code),
        found_test_numbers: found.into_iter().collect(),
    }
}

pub fn is_valid_test_suite(test_suite: &str, expected_tests: usize) -> bool {
    diagnose_test_suite(test_suite).is_valid(expected_tests)
}

pub fn validate_test_suite(
    test_suite: &str,
    expected_tests: usize,
    style: ProblemStyle,
) -> Result<(), String> {
    let diagnostics = diagnose_test_suite(test_suite);
    if !diagnostics.is_valid(expected_tests) {
        return Err(format!(
            "Invalid test_suite: {}.",
            diagnostics.problems(expected_tests).join("; ")
        ));
    }
    let captures = test_suite_captures_stdout(test_suite);
    match style {
        ProblemStyle::Return if captures => Err(
            "Invalid test_suite: return-style tests must compare returned values, not captured std::cout."
                .to_string(),
        ),
        ProblemStyle::Stdout | ProblemStyle::Mixed if !captures => Err(format!(
            "Invalid test_suite: {}-style tests must capture std::cout (redirect rdbuf) and compare printed output.",
            style
        )),
        _ => Ok(()),
    }
}

/// `ret solve(params)` taken from a reference definition, whitespace collapsed.
pub fn solve_signature(reference: &str) -> Option<String> {
    let caps = regex!(r"(^|\n)\s*([A-Za-z_][\w:<>\s*&]+?)\s+solve\s*\(([\s\S]*?)\)\s*(?:const\s*)?\{")
        .captures(reference)?;
    let collapse = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    let return_type = collapse(caps.get(2)?.as_str());
    if return_type.is_empty() {
        return None;
    }
    let params = collapse(caps.get(3).map(|m| m.as_str()).unwrap_or(""));
    Some(format!("{} solve({})", return_type, params))
}

/// Starter stub with the reference's `solve` signature and a failing body.
pub fn synthesize_starter(reference: &str, topic: &str) -> Option<String> {
    let signature = solve_signature(reference)?;
    Some(format!(
        "#include <bits/stdc++.h>\n\n{} {{\n  // BEGIN STUDENT TODO\n  // TODO: Implement the missing core logic ({}).\n  // Hint: Use the problem description as your spec.\n  // Hint: Let the tests drive edge cases.\n  // END STUDENT TODO\n  throw std::runtime_error(\"TODO\");\n}}\n",
        signature, topic
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness_suite(define: &str) -> String {
        let mut s = format!(
            "#include <bits/stdc++.h>\n#include \"solution.cpp\"\n{}\nint main() {{\n",
            define
        );
        for i in 1..=8 {
            s.push_str(&format!(
                "  RUN_TEST(\"test_case_{}\", {{ if (solve({}) != {}) throw std::runtime_error(\"x\"); }});\n",
                i, i, i
            ));
        }
        s.push_str("  return 0;\n}\n");
        s
    }

    const VARIADIC: &str = "#define RUN_TEST(name, ...) do { try { __VA_ARGS__; std::cout << \"[PASS] \" << name << \"\\n\"; } catch (...) { std::cout << \"[FAIL] \" << name << \"\\n\"; } } while (0)";
    const FIXED: &str = "#define RUN_TEST(name, body) do { try { body; std::cout << \"[PASS] \" << name << \"\\n\"; } catch (...) { std::cout << \"[FAIL] \" << name << \"\\n\"; } } while (0)";

    #[test]
    fn test_variadic_harness_is_valid() {
        let suite = harness_suite(VARIADIC);
        let d = diagnose_test_suite(&suite);
        assert_eq!(d.found_test_numbers, (1..=8).collect::<Vec<u32>>());
        assert!(d.is_valid(8));
        assert!(validate_test_suite(&suite, 8, ProblemStyle::Return).is_ok());
    }

    #[test]
    fn test_non_variadic_macro_rejected_with_all_names() {
        let suite = harness_suite(FIXED);
        let d = diagnose_test_suite(&suite);
        assert_eq!(d.found_test_numbers.len(), 8);
        assert!(!d.has_variadic_run_test_macro);
        assert!(!is_valid_test_suite(&suite, 8));
    }

    #[test]
    fn test_fallback_strategies() {
        let mut run_style = String::from("#include \"solution.cpp\"\nint main() {\n");
        for i in 1..=8 {
            run_style.push_str(&format!("  run(\"test_case_{}\", [] {{ return solve({}) == 1; }});\n", i, i));
        }
        run_style.push_str("  std::cout << \"[PASS]\";\n}\n");
        assert!(is_valid_test_suite(&run_style, 8));

        let mut defs = String::from("#include \"solution.cpp\"\n");
        for i in 1..=8 {
            defs.push_str(&format!("bool test_case_{}() {{ return true; }}\n", i));
        }
        defs.push_str("int main() { puts(\"[FAIL]\"); }\n");
        assert_eq!(diagnose_test_suite(&defs).found_test_numbers.len(), 8);
    }

    #[test]
    fn test_primary_strategy_wins_even_when_incomplete() {
        let mut s = harness_suite(VARIADIC);
        s.push_str("void test_case_9() {}\n");
        s = s.replace("RUN_TEST(\"test_case_8\"", "RUN_TEST(\"other\"");
        let d = diagnose_test_suite(&s);
        assert_eq!(d.found_test_numbers, (1..=7).collect::<Vec<u32>>());
    }

    #[test]
    fn test_commented_tests_ignored() {
        let s = harness_suite(VARIADIC).replace(
            "  RUN_TEST(\"test_case_8\"",
            "  // RUN_TEST(\"test_case_8\"",
        );
        assert!(!is_valid_test_suite(&s, 8));
    }

    #[test]
    fn test_source_rules() {
        let ok = "int solve(int x) { return x * 2; }\n";
        assert!(validate_source(ok, ProblemStyle::Return).is_ok());
        assert!(validate_source("int main() { return 0; }\nint solve(int x) { return x; }", ProblemStyle::Return)
            .unwrap_err()
            .contains("main()"));
        assert!(validate_source("int solve() { int x; std::cin >> x; return x; }", ProblemStyle::Return).is_err());

        let prints = "void solve(int x) { std::cout << x; }";
        assert!(validate_source(prints, ProblemStyle::Return).is_err());
        assert!(validate_source(prints, ProblemStyle::Stdout).is_ok());
        assert!(check_reference_style(ok, ProblemStyle::Stdout).is_err());
    }

    #[test]
    fn test_style_capture_rules() {
        let captured = harness_suite(VARIADIC).replace(
            "int main() {\n",
            "int main() {\n  std::ostringstream buf; auto* old = std::cout.rdbuf(buf.rdbuf());\n",
        );
        assert!(validate_test_suite(&captured, 8, ProblemStyle::Stdout).is_ok());
        assert!(validate_test_suite(&captured, 8, ProblemStyle::Return).is_err());
        assert!(validate_test_suite(&harness_suite(VARIADIC), 8, ProblemStyle::Mixed).is_err());
    }

    #[test]
    fn test_starter_synthesis() {
        let reference = "#include <vector>\nstd::vector<int>  solve(const std::vector<int>& xs,\n    int k) const {\n  return xs;\n}\n";
        assert_eq!(
            solve_signature(reference).as_deref(),
            Some("std::vector<int> solve(const std::vector<int>& xs, int k)")
        );
        let starter = synthesize_starter(reference, "arrays").unwrap();
        assert!(starter.contains("// BEGIN STUDENT TODO"));
        assert!(starter.contains("throw std::runtime_error(\"TODO\");"));
        assert!(validate_source(&starter, ProblemStyle::Return).is_ok());
        assert!(solve_signature("int helper() { return 1; }").is_none());
    }

    #[test]
    fn test_harness_template_is_valid() {
        let filled = RUN_TEST_HARNESS.replace("/* TODO */", "if (solve(1) != 1) throw std::runtime_error(\"x\");");
        assert!(is_valid_test_suite(&filled, 8));
    }
}
