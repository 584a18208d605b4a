//! Java 17 / JUnit 5 contract rules.
//!
//! Every check here is textual. Comment-sensitive checks run on
//! [`super::strip_c_style_comments`] output; structural checks on public types use the
//! lexical scanner in [`super::java_source`].

use regex::Regex;

use super::java_source::top_level_public_type_names;
use super::strip_c_style_comments as strip_comments;
use crate::contracts::{FileRole, Workspace};

/// Maximum files in a workspace.
pub const MAX_WORKSPACE_FILES: usize = 20;

pub fn has_package_declaration(source: &str) -> bool {
    regex!(r"(?m)^\s*package\s+").is_match(source)
}


/// First `class X` name in the source, or `fallback`.
pub fn infer_class_name(source: &str, fallback: &str) -> String {
    regex!(r"class\s+([A-Za-z_][A-Za-z0-9_]*)")
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// First top-level public type, else [`infer_class_name`].
pub fn infer_primary_class_name(source: &str, fallback: &str) -> String {
    top_level_public_type_names(source)
        .into_iter()
        .next()
        .unwrap_or_else(|| infer_class_name(source, fallback))
}

/// Starter used when the model's starter is unusable.
pub fn default_class_skeleton(class_name: &str) -> String {
    format!(
        "public class {} {{\n\n    // TODO: implement solution\n\n}}\n",
        class_name
    )
}

pub fn has_main_method(source: &str) -> bool {
    regex!(
        r"public\s+static\s+void\s+main\s*\(\s*(?:final\s+)?String\s*(?:(?:\[\s*\]|\.\.\.)\s*\w+|\w+\s*\[\s*\])\s*\)"
    )
    .is_match(&strip_comments(source))
}

pub fn count_junit_tests(test_suite: &str) -> usize {
    regex!(r"@Test\b").find_iter(test_suite).count()
}

pub fn has_junit5_imports(test_suite: &str) -> bool {
    regex!(r"org\.junit\.jupiter\.api\.Test").is_match(test_suite)
        && regex!(r"static\s+org\.junit\.jupiter\.api\.Assertions\.\*").is_match(test_suite)
}

/// At least one assertion that is not a tautology like `assertTrue(true)`.
pub fn has_non_trivial_assertions(test_suite: &str) -> bool {
    regex!(
        r"\bassert(?:Equals|True|False|Throws|ArrayEquals|LinesMatch|IterableEquals|NotNull|Null|Same|NotSame|DoesNotThrow)\b\s*\(([^)]*)\)"
    )
    .find_iter(test_suite)
    .any(|m| {
        let lower = m.as_str().to_lowercase();
        !lower.contains("asserttrue(true") && !lower.contains("assertfalse(false")
    })
}

/// `assertEquals("  padded ", ...)` style expectations.
///
/// All-whitespace literals are allowed; literals with content and
/// leading/trailing whitespace are flagged.
pub fn has_brittle_whitespace_expectations(test_suite: &str) -> bool {
    regex!(r#"\bassertEquals\s*\(\s*"((?:\\.|[^"\\])*)"\s*,"#)
        .captures_iter(test_suite)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|lit| lit.chars().any(|c| !c.is_whitespace()))
        .any(|lit| {
            lit.starts_with(char::is_whitespace) || lit.ends_with(char::is_whitespace)
        })
}

pub fn is_valid_junit5_test_suite(test_suite: &str, expected_tests: usize) -> bool {
    !test_suite.trim().is_empty()
        && !has_package_declaration(test_suite)
        && count_junit_tests(test_suite) == expected_tests
        && has_junit5_imports(test_suite)
        && has_non_trivial_assertions(test_suite)
}

/// Source rules for a standalone Java file.
pub fn validate_source(source: &str) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err("Java source must not be empty.".to_string());
    }
    if has_package_declaration(source) {
        return Err("Java source must not contain package declarations.".to_string());
    }
    if top_level_public_type_names(source).len() > 1 {
        return Err("Java source must not declare more than one top-level public type.".to_string());
    }
    Ok(())
}

pub fn validate_test_suite(test_suite: &str, expected_tests: usize) -> Result<(), String> {
    if !is_valid_junit5_test_suite(test_suite, expected_tests) {
        return Err(format!(
            "Invalid test_suite: must have exactly {} @Test methods, JUnit 5 imports, no package, and non-trivial assertions.",
            expected_tests
        ));
    }
    if has_brittle_whitespace_expectations(test_suite) {
        return Err(
            "Invalid test_suite: avoid assertEquals() against string literals with leading/trailing whitespace (brittle)."
                .to_string(),
        );
    }
    Ok(())
}

fn word_pattern(template: &str, name: &str) -> Option<Regex> {
    Regex::new(&template.replace("{}", &regex::escape(name))).ok()
}

/// `\b{name}\b` anywhere in the text.
pub fn mentions_identifier(text: &str, name: &str) -> bool {
    word_pattern(r"\b{}\b", name)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Whether test code *uses* a class (instantiates, calls, extends it).
///
/// Looser mentions such as a comment or a string are not counted.
pub fn test_suite_references_class(test_suite: &str, class_name: &str) -> bool {
    let code = strip_comments(test_suite);
    [
        r"\bnew\s+{}\b",
        r"\b{}\s*\.",
        r"\b{}\s*\(",
        r"\bextends\s+{}\b",
        r"\bimplements\s+{}\b",
    ]
    .iter()
    .filter_map(|t| word_pattern(t, class_name))
    .any(|re| re.is_match(&code))
}

fn class_from_path(path: &str) -> &str {
    path.strip_suffix(".java").unwrap_or(path)
}

/// A file's public type (if any) must match its filename.
pub fn check_filename_matches_public_type(path: &str, source: &str) -> Result<(), String> {
    let Some(public_type) = top_level_public_type_names(source).into_iter().next() else {
        return Ok(());
    };
    if public_type != class_from_path(path) {
        return Err(format!(
            "Public type \"{}\" must match filename \"{}\".",
            public_type, path
        ));
    }
    Ok(())
}

/// Structural rules for a multi-file workspace.
pub fn validate_workspace(ws: &Workspace) -> Result<(), String> {
    if ws.files.is_empty() {
        return Err("workspace must include at least one file.".to_string());
    }
    if ws.files.len() > MAX_WORKSPACE_FILES {
        return Err(format!(
            "workspace must not include more than {} files.",
            MAX_WORKSPACE_FILES
        ));
    }

    let path_re = regex!(r"^[A-Za-z_][A-Za-z0-9_]*\.java$");
    for (i, file) in ws.files.iter().enumerate() {
        if !path_re.is_match(file.path.trim()) {
            return Err(format!("Invalid Java file path \"{}\".", file.path));
        }
        if ws.files[..i].iter().any(|f| f.path == file.path) {
            return Err(format!("Duplicate workspace file path \"{}\".", file.path));
        }
        if has_package_declaration(&file.content) {
            return Err(format!(
                "File \"{}\" must not contain package declarations.",
                file.path
            ));
        }
        if top_level_public_type_names(&file.content).len() > 1 {
            return Err(format!(
                "File \"{}\" must not declare more than one top-level public type.",
                file.path
            ));
        }
        check_filename_matches_public_type(&file.path, &file.content)?;
    }

    let entries: Vec<_> = ws.files.iter().filter(|f| f.role == FileRole::Entry).collect();
    let [entry] = entries.as_slice() else {
        return Err(format!(
            "workspace.files must include exactly 1 entry file (found {}).",
            entries.len()
        ));
    };

    if !has_main_method(&entry.content) {
        return Err(format!(
            "Entry file \"{}\" must include public static void main(String[] args).",
            entry.path
        ));
    }

    let entrypoint = ws
        .entrypoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            format!(
                "workspace.entrypoint is required when using workspace problems (expected \"{}\").",
                class_from_path(&entry.path)
            )
        })?;

    let declares_entry = word_pattern(r"\bclass\s+{}\b", entrypoint)
        .map(|re| re.is_match(&strip_comments(&entry.content)))
        .unwrap_or(false);
    if !declares_entry {
        return Err(format!(
            "Entry file \"{}\" must declare class \"{}\".",
            entry.path, entrypoint
        ));
    }

    if let Some(region) = ws
        .scaffolded_regions
        .iter()
        .find(|r| !ws.files.iter().any(|f| f.path == r.path))
    {
        return Err(format!(
            "workspace.scaffolded_regions path \"{}\" must exist in workspace.files.",
            region.path
        ));
    }

    Ok(())
}

/// Rules tying a workspace, its reference and the test suite together.
pub fn validate_workspace_problem(
    workspace: &Workspace,
    reference: &Workspace,
    test_suite: &str,
    slot_index: usize,
) -> Result<(), String> {
    validate_workspace(workspace)?;
    validate_workspace(reference)?;

    let target = workspace
        .target_file()
        .ok_or_else(|| "workspace must include at least one file.".to_string())?;
    let target_class = class_from_path(&target.path);
    let expected_test_class = format!("{}Test", target_class);
    let actual_test_class = infer_class_name(test_suite, &expected_test_class);
    if actual_test_class != expected_test_class {
        return Err(format!(
            "Test suite class name \"{}\" must match \"{}\".",
            actual_test_class, expected_test_class
        ));
    }
    if !mentions_identifier(test_suite, target_class) {
        return Err(format!(
            "Test suite for slot {} does not reference class \"{}\".",
            slot_index, target_class
        ));
    }

    let mut student_paths = workspace.paths();
    let mut reference_paths = reference.paths();
    student_paths.sort_unstable();
    reference_paths.sort_unstable();
    if student_paths != reference_paths {
        return Err("reference_workspace must include the same file paths as workspace.".to_string());
    }

    if let Some(entrypoint) = workspace.entrypoint.as_deref().map(str::trim) {
        if !entrypoint.is_empty() && test_suite_references_class(test_suite, entrypoint) {
            return Err(format!(
                "test_suite must not reference the entry class \"{}\". Tests must target a non-entry class.",
                entrypoint
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::WorkspaceFile;

    fn junit_suite(class: &str, count: usize) -> String {
        let mut s = String::from(
            "import org.junit.jupiter.api.Test;\nimport static org.junit.jupiter.api.Assertions.*;\n\n",
        );
        s.push_str(&format!("public class {}Test {{\n", class));
        for i in 1..=count {
            s.push_str(&format!(
                "    @Test\n    void case{}() {{ assertEquals({}, new {}().compute({})); }}\n",
                i, i, class, i
            ));
        }
        s.push_str("}\n");
        s
    }

    #[test]
    fn test_valid_suite() {
        let suite = junit_suite("Counter", 8);
        assert!(is_valid_junit5_test_suite(&suite, 8));
        assert!(validate_test_suite(&suite, 8).is_ok());
    }

    #[test]
    fn test_wrong_count_and_missing_imports() {
        assert!(!is_valid_junit5_test_suite(&junit_suite("Counter", 7), 8));
        let suite = junit_suite("Counter", 8).replace("import static", "import");
        assert!(!has_junit5_imports(&suite));
    }

    #[test]
    fn test_trivial_assertions_rejected() {
        let suite = "assertTrue(true); assertFalse(false);";
        assert!(!has_non_trivial_assertions(suite));
        assert!(has_non_trivial_assertions("assertTrue(true); assertEquals(2, f());"));
        assert!(!has_non_trivial_assertions("no assertions here"));
    }

    #[test]
    fn test_brittle_whitespace() {
        assert!(has_brittle_whitespace_expectations(r#"assertEquals(" Bob", name);"#));
        assert!(has_brittle_whitespace_expectations(r#"assertEquals("Bob ", name);"#));
        assert!(!has_brittle_whitespace_expectations(r#"assertEquals("   ", pad);"#));
        assert!(!has_brittle_whitespace_expectations(r#"assertEquals("Bob", name);"#));
    }

    #[test]
    fn test_infer_class_names() {
        assert_eq!(infer_class_name("int x;", "Solution"), "Solution");
        let src = "class Helper {}\npublic class Main {}";
        assert_eq!(infer_class_name(src, "X"), "Helper");
        assert_eq!(infer_primary_class_name(src, "X"), "Main");
    }

    #[test]
    fn test_main_method_forms() {
        assert!(has_main_method("public static void main(String[] args) {}"));
        assert!(has_main_method("public static void main(final String... argv) {}"));
        assert!(has_main_method("public static void main(String args[]) {}"));
        assert!(!has_main_method("// public static void main(String[] args) {}"));
        assert!(!has_main_method("static void main(String[] args) {}"));
    }

    #[test]
    fn test_validate_source() {
        assert!(validate_source("package a;\npublic class A {}").is_err());
        assert!(validate_source("public class A {}\npublic class B {}").is_err());
        assert!(validate_source("public class A {}\nclass B {}").is_ok());
    }

    #[test]
    fn test_entry_class_reference_detection() {
        assert!(test_suite_references_class("Main.main(null);", "Main"));
        assert!(test_suite_references_class("new Main();", "Main"));
        assert!(!test_suite_references_class("// Main is the entry\nString s;", "Main"));
        assert!(!test_suite_references_class("MainHelper h;", "Main"));
    }

    fn file(path: &str, role: FileRole, content: &str) -> WorkspaceFile {
        WorkspaceFile {
            path: path.to_string(),
            role,
            content: content.to_string(),
        }
    }

    fn workspace() -> Workspace {
        Workspace {
            files: vec![
                file(
                    "Main.java",
                    FileRole::Entry,
                    "public class Main {\n  public static void main(String[] args) {\n    System.out.println(new Cart().total());\n  }\n}\n",
                ),
                file(
                    "Cart.java",
                    FileRole::Support,
                    "public class Cart {\n  public int total() { return 0; }\n}\n",
                ),
            ],
            entrypoint: Some("Main".to_string()),
            scaffolded_regions: vec![],
        }
    }

    #[test]
    fn test_workspace_validation() {
        let ws = workspace();
        assert!(validate_workspace(&ws).is_ok());

        let mut missing_entrypoint = ws.clone();
        missing_entrypoint.entrypoint = None;
        assert_eq!(
            validate_workspace(&missing_entrypoint).unwrap_err(),
            "workspace.entrypoint is required when using workspace problems (expected \"Main\")."
        );

        let mut dup = ws.clone();
        dup.files.push(dup.files[1].clone());
        assert!(validate_workspace(&dup).unwrap_err().starts_with("Duplicate"));

        let mut mismatch = ws.clone();
        mismatch.files[1].path = "Basket.java".to_string();
        assert_eq!(
            validate_workspace(&mismatch).unwrap_err(),
            "Public type \"Cart\" must match filename \"Basket.java\"."
        );
    }

    #[test]
    fn test_workspace_problem_rules() {
        let ws = workspace();
        let suite = junit_suite("Cart", 8).replace(".compute(", ".total(");
        assert!(validate_workspace_problem(&ws, &ws, &suite, 0).is_ok());

        let mut reference = ws.clone();
        reference.files.pop();
        assert!(validate_workspace_problem(&ws, &reference, &suite, 0).is_err());

        let touches_entry = suite.replacen("new Cart()", "new Main()", 1);
        let err = validate_workspace_problem(&ws, &ws, &touches_entry, 0).unwrap_err();
        assert!(err.contains("entry class \"Main\""), "{}", err);
    }
}
