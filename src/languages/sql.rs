//! SQLite read-only query rules and the JSON test-suite format.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const FORBIDDEN_KEYWORDS: [&str; 12] = [
    "insert", "update", "delete", "drop", "alter", "create", "replace", "pragma", "attach",
    "detach", "vacuum", "reindex",
];

/// Expected result of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlCase {
    pub name: String,
    #[serde(default)]
    pub seed_sql: String,
    pub expected: ExpectedRows,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_matters: Option<bool>,
}

/// The `test_suite` payload for SQL problems (stored as a JSON string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlTestSuite {
    pub schema_sql: String,
    pub cases: Vec<SqlCase>,
}

impl SqlTestSuite {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Drop `/* */` and `--` comments and blank out quoted text.
///
/// Single-quoted literals (with `''` escapes) and double-quoted identifiers
/// keep their quotes but their contents become spaces, so keywords and `;`
/// inside them are never mistaken for code.
pub fn mask_non_code(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            '\'' | '"' => {
                out.push(c);
                while let Some(next) = chars.next() {
                    if next == c {
                        if chars.peek() == Some(&c) {
                            chars.next();
                            out.push_str("  ");
                            continue;
                        }
                        out.push(c);
                        break;
                    }
                    out.push(if next == '\n' { '\n' } else { ' ' });
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// A single `SELECT`/`WITH` query without mutating keywords.
///
/// One trailing `;` is allowed; any other statement separator is not.
pub fn is_read_only_query(sql: &str) -> bool {
    let masked = mask_non_code(sql).to_lowercase();
    let s = masked.trim();
    let s = s.strip_suffix(';').unwrap_or(s).trim_end();
    if s.contains(';') {
        return false;
    }
    if !(s.starts_with("select") || s.starts_with("with")) {
        return false;
    }
    let words: BTreeSet<&str> = regex!(r"[a-z_]+").find_iter(s).map(|m| m.as_str()).collect();
    !FORBIDDEN_KEYWORDS.iter().any(|kw| words.contains(kw))
}

pub fn validate_source(sql: &str) -> Result<(), String> {
    if !is_read_only_query(sql) {
        return Err("SQL solution must be a read-only SELECT query (WITH/SELECT).".to_string());
    }
    Ok(())
}

/// Every structural problem with a raw test suite, in discovery order.
pub fn diagnose_test_suite(raw: &str, expected_tests: usize) -> Vec<String> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return vec![format!("test_suite is not valid JSON ({}).", e)],
    };
    let Some(obj) = value.as_object() else {
        return vec!["test_suite must be a JSON object.".to_string()];
    };

    let mut issues = Vec::new();
    match obj.get("schema_sql").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => {}
        _ => issues.push("schema_sql must be a non-empty string.".to_string()),
    }

    let Some(cases) = obj.get("cases").and_then(Value::as_array) else {
        issues.push("cases must be an array.".to_string());
        return issues;
    };
    if cases.len() != expected_tests {
        issues.push(format!(
            "cases must contain exactly {} entries (found {}).",
            expected_tests,
            cases.len()
        ));
    }

    let name_re = regex!(r"^test_case_(\d+)$");
    let mut seen = BTreeSet::new();
    for (i, case) in cases.iter().enumerate() {
        let Some(case) = case.as_object() else {
            issues.push(format!("cases[{}] must be an object.", i));
            continue;
        };
        match case.get("name").and_then(Value::as_str).map(str::trim) {
            Some(name) => {
                let in_range = name_re
                    .captures(name)
                    .and_then(|c| c.get(1)?.as_str().parse::<usize>().ok())
                    .is_some_and(|n| (1..=expected_tests).contains(&n));
                if !in_range {
                    issues.push(format!("cases[{}].name \"{}\" is not test_case_1..test_case_{}.", i, name, expected_tests));
                } else if !seen.insert(name.to_string()) {
                    issues.push(format!("Duplicate case name \"{}\".", name));
                }
            }
            None => issues.push(format!("cases[{}].name must be a string.", i)),
        }
        if !case.get("seed_sql").is_some_and(Value::is_string) {
            issues.push(format!("cases[{}].seed_sql must be a string.", i));
        }
        let expected = case.get("expected").and_then(Value::as_object);
        let columns_ok = expected
            .and_then(|e| e.get("columns"))
            .and_then(Value::as_array)
            .is_some_and(|c| !c.is_empty());
        if !columns_ok {
            issues.push(format!("cases[{}].expected.columns must be a non-empty array.", i));
        }
        if !expected.and_then(|e| e.get("rows")).is_some_and(Value::is_array) {
            issues.push(format!("cases[{}].expected.rows must be an array.", i));
        }
    }

    for n in 1..=expected_tests {
        let name = format!("test_case_{}", n);
        if !seen.contains(&name) && cases.len() == expected_tests {
            issues.push(format!("Missing case \"{}\".", name));
        }
    }
    issues
}

pub fn is_valid_test_suite(raw: &str, expected_tests: usize) -> bool {
    diagnose_test_suite(raw, expected_tests).is_empty()
}

pub fn validate_test_suite(raw: &str, expected_tests: usize) -> Result<(), String> {
    let issues = diagnose_test_suite(raw, expected_tests);
    if issues.is_empty() {
        return Ok(());
    }
    Err(format!(
        "Invalid test_suite: must be JSON with schema_sql + exactly {} cases named test_case_1..test_case_{} including expected columns/rows. Details: {}",
        expected_tests,
        expected_tests,
        issues.iter().take(2).cloned().collect::<Vec<_>>().join(" ")
    ))
}

/// Models sometimes emit the suite as an object instead of a JSON string.
pub fn coerce_test_suite(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(_) => serde_json::to_string_pretty(value).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn suite_value(count: usize) -> Value {
        let cases: Vec<Value> = (1..=count)
            .map(|i| {
                json!({
                    "name": format!("test_case_{}", i),
                    "seed_sql": format!("INSERT INTO t VALUES ({});", i),
                    "expected": {"columns": ["id"], "rows": [[i]]}
                })
            })
            .collect();
        json!({"schema_sql": "CREATE TABLE t (id INTEGER);", "cases": cases})
    }

    #[test]
    fn test_read_only_queries() {
        assert!(is_read_only_query("SELECT * FROM t"));
        assert!(is_read_only_query("-- top\nWITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(is_read_only_query("SELECT updated_at FROM t"));
        assert!(!is_read_only_query("DELETE FROM t"));
        assert!(!is_read_only_query("SELECT 1; DROP TABLE t"));
        assert!(!is_read_only_query("/* SELECT */ PRAGMA table_info(t)"));
        assert!(!is_read_only_query("   "));
        assert!(is_read_only_query("SELECT id FROM t;\n"));
    }

    #[test]
    fn test_read_only_rejects_second_statement() {
        assert!(!is_read_only_query("SELECT 1; SELECT name FROM users"));
        assert!(!is_read_only_query("SELECT 1;; "));
        assert!(is_read_only_query("SELECT 'a;b' AS s; -- trailing"));
    }

    #[test]
    fn test_read_only_ignores_quoted_text() {
        assert!(is_read_only_query("SELECT * FROM t WHERE note = 'please update me'"));
        assert!(is_read_only_query("SELECT 'it''s -- not a comment; drop' FROM t"));
        assert!(is_read_only_query("SELECT \"delete\" FROM audit"));
        assert!(!is_read_only_query("SELECT 'x' FROM t WHERE 1 = 1 UNION SELECT 1; DELETE FROM t"));
    }

    #[test]
    fn test_valid_suite() {
        let raw = suite_value(8).to_string();
        assert!(is_valid_test_suite(&raw, 8));
        let parsed = SqlTestSuite::parse(&raw).unwrap();
        assert_eq!(parsed.cases.len(), 8);
        assert_eq!(parsed.cases[0].order_matters, None);
    }

    #[test]
    fn test_invalid_suites() {
        assert!(!is_valid_test_suite("not json", 8));
        assert!(!is_valid_test_suite(&suite_value(7).to_string(), 8));

        let mut v = suite_value(8);
        v["cases"][3]["name"] = json!("test_case_1");
        let issues = diagnose_test_suite(&v.to_string(), 8);
        assert!(issues.iter().any(|i| i.contains("Duplicate")));

        let mut v = suite_value(8);
        v["cases"][0]["expected"]["columns"] = json!([]);
        let err = validate_test_suite(&v.to_string(), 8).unwrap_err();
        assert!(err.contains("Details: cases[0].expected.columns"));
    }

    #[test]
    fn test_coerce() {
        let obj = suite_value(8);
        let coerced = coerce_test_suite(&obj).unwrap();
        assert!(is_valid_test_suite(&coerced, 8));
        assert_eq!(coerce_test_suite(&json!(" {} ")), Some("{}".to_string()));
        assert_eq!(coerce_test_suite(&json!(3)), None);
    }
}
