//! Language profiles and structural contract validators.
//!
//! Each supported language has a static [`LanguageProfile`] describing its
//! runtime, judge image and file conventions, plus a rule module with
//! `validate_source` / `validate_test_suite`. The dispatch functions here are
//! the only entry points the generator needs; adding a language means adding
//! a profile and a rule module.

pub mod cpp;
pub mod java;
pub mod java_source;
pub mod python;
pub mod sql;

use crate::contracts::{Language, ProblemStyle};

/// Static facts about one language runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    pub language: Language,
    pub display_name: &'static str,
    pub runtime: &'static str,
    pub test_framework: &'static str,
    /// Docker image that compiles and runs the tests.
    pub judge_image: &'static str,
    /// Prefix for ephemeral judge directories.
    pub tmp_prefix: &'static str,
    /// Solution filename; Java derives it from the class name instead.
    pub solution_filename: Option<&'static str>,
    /// Reserved test filename; Java derives it from the test class instead.
    pub test_filename: Option<&'static str>,
    /// Line comment token used for scaffold markers.
    pub line_comment: &'static str,
    pub prompt_hints: &'static [&'static str],
}

static PROFILES: [LanguageProfile; 4] = [
    LanguageProfile {
        language: Language::Java,
        display_name: "Java",
        runtime: "Java 17",
        test_framework: "JUnit 5",
        judge_image: "codem-java-judge",
        tmp_prefix: "codem-judge-",
        solution_filename: None,
        test_filename: None,
        line_comment: "//",
        prompt_hints: &["No package declarations.", "JUnit 5 (exactly 8 @Test methods)."],
    },
    LanguageProfile {
        language: Language::Python,
        display_name: "Python",
        runtime: "Python 3.11",
        test_framework: "pytest",
        judge_image: "codem-python-judge",
        tmp_prefix: "codem-py-judge-",
        solution_filename: Some("solution.py"),
        test_filename: Some("test_solution.py"),
        line_comment: "#",
        prompt_hints: &["Python 3.11", "pytest (exactly 8 tests)", "stdlib only", "no I/O unless specified"],
    },
    LanguageProfile {
        language: Language::Cpp,
        display_name: "C++",
        runtime: "C++20 (g++)",
        test_framework: "RUN_TEST harness",
        judge_image: "codem-cpp-judge",
        tmp_prefix: "codem-cpp-judge-",
        solution_filename: Some("solution.cpp"),
        test_filename: Some("test.cpp"),
        line_comment: "//",
        prompt_hints: &["C++20", "solve(...) only, no main()", "exactly 8 RUN_TEST cases"],
    },
    LanguageProfile {
        language: Language::Sql,
        display_name: "SQL",
        runtime: "SQLite 3",
        test_framework: "JSON cases",
        judge_image: "codem-sql-judge",
        tmp_prefix: "codem-sql-judge-",
        solution_filename: Some("solution.sql"),
        test_filename: Some("test_suite.json"),
        line_comment: "--",
        prompt_hints: &["SQLite 3", "single read-only SELECT/WITH query", "exactly 8 cases"],
    },
];

/// Profile for a language.
pub fn profile(language: Language) -> &'static LanguageProfile {
    let idx = match language {
        Language::Java => 0,
        Language::Python => 1,
        Language::Cpp => 2,
        Language::Sql => 3,
    };
    &PROFILES[idx]
}

pub fn all_profiles() -> &'static [LanguageProfile] {
    &PROFILES
}

/// Remove `/* */` block comments and `//` line comments.
pub fn strip_c_style_comments(source: &str) -> String {
    let without_block = regex!(r"(?s)/\*.*?\*/").replace_all(source, "");
    regex!(r"(?m)//.*$")
        .replace_all(&without_block, "")
        .into_owned()
}

/// Source rules for a standalone student or reference artifact.
pub fn validate_source(language: Language, source: &str, style: ProblemStyle) -> Result<(), String> {
    match language {
        Language::Java => java::validate_source(source),
        Language::Python => python::validate_source(source, style),
        Language::Cpp => cpp::validate_source(source, style),
        Language::Sql => sql::validate_source(source),
    }
}

/// Structural rules for a test suite.
pub fn validate_test_suite(
    language: Language,
    test_suite: &str,
    expected_tests: usize,
    style: ProblemStyle,
) -> Result<(), String> {
    match language {
        Language::Java => java::validate_test_suite(test_suite, expected_tests),
        Language::Python => python::validate_test_suite(test_suite, expected_tests, style),
        Language::Cpp => cpp::validate_test_suite(test_suite, expected_tests, style),
        Language::Sql => sql::validate_test_suite(test_suite, expected_tests),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_language_has_a_profile() {
        for language in Language::ALL {
            assert_eq!(profile(language).language, language);
        }
        assert_eq!(all_profiles().len(), Language::ALL.len());
    }

    #[test]
    fn test_reserved_filenames() {
        assert_eq!(profile(Language::Python).test_filename, Some("test_solution.py"));
        assert_eq!(profile(Language::Cpp).test_filename, Some("test.cpp"));
        assert_eq!(profile(Language::Sql).solution_filename, Some("solution.sql"));
        assert!(profile(Language::Java).test_filename.is_none());
    }

    #[test]
    fn test_strip_c_style_comments() {
        let src = "int a; // one\n/* two\n three */int b;";
        assert_eq!(strip_c_style_comments(src), "int a; \nint b;");
    }

    #[test]
    fn test_dispatch() {
        assert!(validate_source(Language::Sql, "SELECT 1", ProblemStyle::Return).is_ok());
        assert!(validate_source(Language::Sql, "DROP TABLE t", ProblemStyle::Return).is_err());
        assert!(validate_test_suite(Language::Python, "", 8, ProblemStyle::Return).is_err());
    }
}
