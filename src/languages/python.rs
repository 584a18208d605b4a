//! Python 3.11 / pytest contract rules.

use std::collections::BTreeSet;

use crate::contracts::ProblemStyle;

/// Starter used when the model omits one.
pub const DEFAULT_STARTER: &str = "def solve(x):\n    # TODO: implement\n    raise NotImplementedError\n";

/// Drop `#` line comments.
///
/// Naive about `#` inside string literals; only used ahead of rule checks
/// where a false strip can at worst hide a forbidden call inside a string.
pub fn strip_comments(source: &str) -> String {
    regex!(r"(?m)#.*$").replace_all(source, "").into_owned()
}

pub fn defines_solve(source: &str) -> bool {
    regex!(r"(?m)^\s*def\s+solve\s*\(").is_match(source)
}

fn has_interactive_io(source: &str) -> bool {
    regex!(r"\b(?:input|open)\s*\(").is_match(source)
}

pub fn has_print(source: &str) -> bool {
    regex!(r"\bprint\s*\(").is_match(source)
}

/// `print(...)` or `sys.stdout.write(...)`.
pub fn has_stdout_writes(source: &str) -> bool {
    has_print(source) || regex!(r"\bsys\.stdout\.write\s*\(").is_match(source)
}

fn has_forbidden_imports(source: &str) -> bool {
    regex!(
        r"(?m)^\s*(?:from|import)\s+(?:os|pathlib|shutil|subprocess|socket|requests|urllib|http|ftplib|asyncio|multiprocessing)\b"
    )
    .is_match(source)
}

fn has_eval_or_exec(source: &str) -> bool {
    regex!(r"\b(?:eval|exec)\s*\(").is_match(source)
}

/// Source rules.
///
/// `print` is rejected only for return-style problems. Stdout and mixed
/// problems are graded on printed output, so their reference must be able
/// to print; [`check_reference_style`] then requires that it does.
pub fn validate_source(source: &str, style: ProblemStyle) -> Result<(), String> {
    let code = strip_comments(source);
    if !defines_solve(&code) {
        return Err("Python source must define a \"solve(...)\" function.".to_string());
    }
    let print_forbidden = style == ProblemStyle::Return && has_print(&code);
    if has_interactive_io(&code) || print_forbidden {
        return Err("Python source must not use input(), print(), or open().".to_string());
    }
    if has_forbidden_imports(&code) {
        return Err("Python source must not import filesystem/network/process modules.".to_string());
    }
    if has_eval_or_exec(&code) {
        return Err("Python source must not use eval() or exec().".to_string());
    }
    Ok(())
}

/// Extra rule for the hidden reference: output must match the style.
pub fn check_reference_style(source: &str, style: ProblemStyle) -> Result<(), String> {
    let writes = has_stdout_writes(&strip_comments(source));
    match style {
        ProblemStyle::Return if writes => Err(
            "reference_solution must return its result without writing to stdout for return-style problems."
                .to_string(),
        ),
        ProblemStyle::Stdout | ProblemStyle::Mixed if !writes => Err(format!(
            "reference_solution must print its output for {}-style problems.",
            style
        )),
        _ => Ok(()),
    }
}

/// Unique `test_*` function names in definition order.
pub fn test_function_names(test_suite: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    regex!(r"(?m)^\s*def\s+(test_[A-Za-z0-9_]+)\s*\(")
        .captures_iter(test_suite)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn captures_stdout(test_suite: &str) -> bool {
    test_suite.contains("capsys")
        && regex!(r"\.readouterr\s*\(\s*\)").is_match(test_suite)
        && regex!(r"\.out\b").is_match(test_suite)
}

/// pytest suite rules, first failing rule as the error.
pub fn validate_test_suite(
    test_suite: &str,
    expected_tests: usize,
    style: ProblemStyle,
) -> Result<(), String> {
    let ts = test_suite.trim();
    if ts.is_empty() {
        return Err("test_suite is empty.".to_string());
    }
    if !regex!(r"(?m)^\s*import\s+pytest\b").is_match(ts) {
        return Err("test_suite must import pytest.".to_string());
    }
    if !regex!(r"(?m)^\s*from\s+solution\s+import\s+solve\b").is_match(ts) {
        return Err("test_suite must import solve from solution.".to_string());
    }
    if has_interactive_io(ts) || has_print(ts) {
        return Err("test_suite must not use input(), print(), or open().".to_string());
    }
    if regex!(r"(?m)\bimport\s+random\b").is_match(ts) || regex!(r"\brandom\.").is_match(ts) {
        return Err("test_suite must not use randomness.".to_string());
    }
    if regex!(r"@pytest\.mark\.parametrize\b").is_match(ts) {
        return Err("test_suite must not use @pytest.mark.parametrize.".to_string());
    }
    if regex!(r"\bpytest\.approx\b").is_match(ts) || regex!(r"\bapprox\s*\(").is_match(ts) {
        return Err("test_suite must not use approximate comparisons.".to_string());
    }

    let names = test_function_names(ts);
    let expected: BTreeSet<String> = (1..=expected_tests)
        .map(|i| format!("test_case_{}", i))
        .collect();
    if names.len() != expected_tests || !names.iter().all(|n| expected.contains(n)) {
        return Err(format!(
            "test_suite must define exactly {} tests named test_case_1..test_case_{} (found {}).",
            expected_tests,
            expected_tests,
            names.len()
        ));
    }

    let solve_asserts = regex!(r"\bassert\s+solve\s*\(").find_iter(ts).count();
    let solve_calls = regex!(r"\bsolve\s*\(").find_iter(ts).count();
    let ok = match style {
        ProblemStyle::Return => solve_asserts >= expected_tests,
        ProblemStyle::Stdout => captures_stdout(ts) && solve_calls >= expected_tests,
        ProblemStyle::Mixed => captures_stdout(ts) && solve_asserts >= expected_tests,
    };
    if !ok {
        let rule = match style {
            ProblemStyle::Return => "assert solve(...) == expected in every test",
            ProblemStyle::Stdout => {
                "call solve(...) and assert on capsys.readouterr().out in every test"
            }
            ProblemStyle::Mixed => {
                "assert solve(...) == expected and assert on capsys.readouterr().out in every test"
            }
        };
        return Err(format!(
            "test_suite does not match the {} style: {}.",
            style, rule
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(body: impl Fn(usize) -> String) -> String {
        let mut s = String::from("import pytest\nfrom solution import solve\n\n");
        for i in 1..=8 {
            s.push_str(&format!("def test_case_{}(capsys):\n{}\n\n", i, body(i)));
        }
        s
    }

    #[test]
    fn test_source_rules() {
        assert!(validate_source("def solve(x):\n    return x\n", ProblemStyle::Return).is_ok());
        assert_eq!(
            validate_source("def helper(x):\n    return x\n", ProblemStyle::Return).unwrap_err(),
            "Python source must define a \"solve(...)\" function."
        );
        assert!(validate_source("import os\ndef solve(x):\n    return x\n", ProblemStyle::Return)
            .unwrap_err()
            .contains("filesystem"));
        assert!(validate_source("def solve(x):\n    return eval(x)\n", ProblemStyle::Return).is_err());
        assert!(validate_source("def solve(x):\n    return input()\n", ProblemStyle::Stdout).is_err());
    }

    #[test]
    fn test_print_depends_on_style() {
        let src = "def solve(x):\n    print(x)\n";
        assert!(validate_source(src, ProblemStyle::Return).is_err());
        assert!(validate_source(src, ProblemStyle::Stdout).is_ok());
        assert!(check_reference_style(src, ProblemStyle::Stdout).is_ok());
        assert!(check_reference_style(src, ProblemStyle::Return).is_err());
        assert!(check_reference_style("def solve(x):\n    return x\n", ProblemStyle::Mixed).is_err());
    }

    #[test]
    fn test_printing_reference_passes_both_rules_for_mixed() {
        let src = "import sys\n\ndef solve(xs):\n    total = sum(xs)\n    print(total)\n    sys.stdout.write(str(total))\n    return total\n";
        assert!(validate_source(src, ProblemStyle::Mixed).is_ok());
        assert!(check_reference_style(src, ProblemStyle::Mixed).is_ok());
        assert_eq!(
            validate_source(src, ProblemStyle::Return).unwrap_err(),
            "Python source must not use input(), print(), or open()."
        );
    }

    #[test]
    fn test_commented_calls_are_ignored() {
        let src = "def solve(x):\n    # print(x) for debugging\n    return x\n";
        assert!(validate_source(src, ProblemStyle::Return).is_ok());
    }

    #[test]
    fn test_return_style_suite() {
        let ts = suite(|i| format!("    assert solve({}) == {}", i, i));
        assert!(validate_test_suite(&ts, 8, ProblemStyle::Return).is_ok());
        assert_eq!(test_function_names(&ts).len(), 8);
        assert!(validate_test_suite(&ts, 8, ProblemStyle::Stdout).is_err());
    }

    #[test]
    fn test_stdout_style_suite() {
        let ts = suite(|i| {
            format!(
                "    solve({})\n    captured = capsys.readouterr()\n    assert captured.out == \"{}\\n\"",
                i, i
            )
        });
        assert!(validate_test_suite(&ts, 8, ProblemStyle::Stdout).is_ok());
        assert!(validate_test_suite(&ts, 8, ProblemStyle::Return).is_err());
    }

    #[test]
    fn test_suite_rejections() {
        let extra = suite(|i| format!("    assert solve({}) == {}", i, i))
            + "def test_extra():\n    assert solve(0) == 0\n";
        assert!(validate_test_suite(&extra, 8, ProblemStyle::Return)
            .unwrap_err()
            .contains("exactly 8"));

        let approx = suite(|i| format!("    assert solve({}) == pytest.approx({})", i, i));
        assert!(validate_test_suite(&approx, 8, ProblemStyle::Return).is_err());

        let random = format!("import random\n{}", suite(|i| format!("    assert solve({}) == {}", i, i)));
        assert_eq!(
            validate_test_suite(&random, 8, ProblemStyle::Return).unwrap_err(),
            "test_suite must not use randomness."
        );
    }
}
