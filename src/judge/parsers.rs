//! Test-runner output parsers.

use std::collections::BTreeSet;

/// Passed and failed test names in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOutcome {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
}

/// Remove ANSI color escapes.
pub fn strip_ansi(text: &str) -> String {
    regex!(r"\x1b\[[0-9;]*m").replace_all(text, "").into_owned()
}

/// JUnit console launcher tree output, e.g. `+-- addsItems() [OK]`.
///
/// A `name:status` pair is reported once even if the tree repeats it.
pub fn parse_junit_tree(stdout: &str) -> TestOutcome {
    let clean = strip_ansi(stdout);
    let line_re = regex!(r"\b([A-Za-z_][A-Za-z0-9_]*)\(\)\s+\[(OK|X)\]");
    let mut seen = BTreeSet::new();
    let mut outcome = TestOutcome::default();

    for line in clean.lines() {
        let Some(caps) = line_re.captures(line) else {
            continue;
        };
        let name = &caps[1];
        let status = &caps[2];
        if !seen.insert(format!("{}:{}", name, status)) {
            continue;
        }
        match status {
            "OK" => outcome.passed.push(name.to_string()),
            _ => outcome.failed.push(name.to_string()),
        }
    }
    outcome
}

/// pytest `-rA` summary lines. Every inferred test that is not reported as
/// FAILED or ERROR counts as passed.
pub fn parse_pytest(combined_output: &str, inferred_tests: &[String]) -> TestOutcome {
    let clean = strip_ansi(combined_output);
    let mut failing = BTreeSet::new();
    for re in [
        regex!(r"\bFAILED\s+[^:\s]+::(test_[A-Za-z0-9_]+)\b"),
        regex!(r"\bERROR\s+[^:\s]+::(test_[A-Za-z0-9_]+)\b"),
    ] {
        for caps in re.captures_iter(&clean) {
            failing.insert(caps[1].to_string());
        }
    }

    TestOutcome {
        passed: inferred_tests
            .iter()
            .filter(|t| !failing.contains(*t))
            .cloned()
            .collect(),
        failed: failing.into_iter().collect(),
    }
}

/// `[PASS] test_case_N` / `[FAIL] test_case_N` lines.
pub fn parse_pass_fail(stdout: &str) -> TestOutcome {
    let clean = strip_ansi(stdout);
    let mut passed = BTreeSet::new();
    let mut failed = BTreeSet::new();
    for caps in regex!(r"(?m)^\s*\[(PASS|FAIL)\]\s+(test_case_[A-Za-z0-9_]+)\b").captures_iter(&clean) {
        let name = caps[2].to_string();
        if &caps[1] == "PASS" {
            passed.insert(name);
        } else {
            failed.insert(name);
        }
    }
    TestOutcome {
        passed: passed.into_iter().collect(),
        failed: failed.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_junit_tree() {
        let out = "\x1b[32m|   +-- addsItems() [OK]\x1b[0m\n\
                   |   +-- removesItems() [X] expected: <1> but was: <2>\n\
                   |   +-- addsItems() [OK]\n\
                   Test run finished";
        let outcome = parse_junit_tree(out);
        assert_eq!(outcome.passed, vec!["addsItems"]);
        assert_eq!(outcome.failed, vec!["removesItems"]);
    }

    #[test]
    fn test_pytest() {
        let inferred: Vec<String> = (1..=4).map(|i| format!("test_case_{}", i)).collect();
        let out = "FAILED test_solution.py::test_case_2 - assert 3 == 4\n\
                   ERROR test_solution.py::test_case_4 - NameError\n";
        let outcome = parse_pytest(out, &inferred);
        assert_eq!(outcome.passed, vec!["test_case_1", "test_case_3"]);
        assert_eq!(outcome.failed, vec!["test_case_2", "test_case_4"]);
    }

    #[test]
    fn test_pass_fail() {
        let out = "[PASS] test_case_1\n  [FAIL] test_case_2\n[PASS] test_case_1\nnoise [PASS] test_case_9\n";
        let outcome = parse_pass_fail(out);
        assert_eq!(outcome.passed, vec!["test_case_1"]);
        assert_eq!(outcome.failed, vec!["test_case_2"]);
    }
}
