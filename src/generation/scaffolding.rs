//! Guided-mode scaffolding.
//!
//! Derives the student-facing artifact from a *validated* reference by
//! hollowing out some of its bodies. Every hollowed body is wrapped in
//! `BEGIN STUDENT TODO` / `END STUDENT TODO` comment markers and ends in a
//! statement that always fails, so an unedited starter fails every test.
//!
//! How much is removed is controlled by the slot's scaffold level: a high
//! level keeps most of the reference and adds more guidance text, a low level
//! removes more and says less.

use tracing::{debug, warn};

use crate::contracts::{
    FileRole, GeneratedProblemDraft, Language, ProblemSlot, ReferenceArtifact, ScaffoldedRegion,
    Workspace,
};
use crate::languages::{self, java_source, java_source::MethodBody};

pub const BEGIN_MARKER: &str = "BEGIN STUDENT TODO";
pub const END_MARKER: &str = "END STUDENT TODO";

const HIGH_GUIDANCE: f64 = 0.75;
const MEDIUM_GUIDANCE: f64 = 0.45;
const LOW_GUIDANCE: f64 = 0.2;

/// Scaffold level 0..=100 as a fraction in 0.0..=1.0.
pub fn normalize_level(raw: Option<u8>) -> Option<f64> {
    raw.map(|level| (f64::from(level) / 100.0).clamp(0.0, 1.0))
}

/// Concept hints allowed at `level`. Zero below medium guidance.
pub fn max_hints_for_level(level: f64) -> usize {
    if level >= HIGH_GUIDANCE {
        4
    } else if level >= MEDIUM_GUIDANCE {
        2
    } else {
        0
    }
}

/// Everything a single TODO block depends on.
#[derive(Debug, Clone)]
pub struct ScaffoldOptions<'a> {
    pub level: f64,
    pub line_comment: &'a str,
    pub learning_goal: Option<&'a str>,
    pub hints_enabled: bool,
    pub topics: &'a [String],
    /// Pre-rendered hint comment lines from the hint generator.
    pub extra_hints: &'a [String],
}

impl ScaffoldOptions<'_> {
    fn begin_marker(&self) -> String {
        format!("{} {}", self.line_comment, BEGIN_MARKER)
    }

    fn end_marker(&self) -> String {
        format!("{} {}", self.line_comment, END_MARKER)
    }

    /// Hollow out `max(1, ceil(n * (1 - level)))` of `n` candidates.
    fn target_count(&self, candidates: usize) -> usize {
        let missing = (1.0 - self.level).clamp(0.0, 1.0);
        ((candidates as f64 * missing).ceil() as usize).clamp(1, candidates)
    }
}

fn concept_hint_lines(opts: &ScaffoldOptions<'_>) -> Vec<String> {
    let max = max_hints_for_level(opts.level);
    if max == 0 {
        return Vec::new();
    }
    let mut haystack: Vec<String> = opts
        .topics
        .iter()
        .map(|t| t.trim().to_lowercase())
        .collect();
    haystack.insert(0, opts.learning_goal.unwrap_or("").trim().to_lowercase());
    let haystack = haystack.join(" ");
    if haystack.trim().is_empty() {
        return Vec::new();
    }

    let lc = opts.line_comment;
    let mut hints = Vec::new();
    let mst = haystack.contains("kruskal")
        || haystack.contains("minimum spanning tree")
        || regex!(r"\bmst\b").is_match(&haystack)
        || haystack.contains("union find")
        || haystack.contains("dsu");
    if mst {
        hints.push(format!("{} Hint: Sort edges by weight (ascending).", lc));
        hints.push(format!("{} Hint: Use Union-Find (DSU) to track connected components.", lc));
        hints.push(format!(
            "{} Hint: Only add an edge if it connects two different components (avoid cycles).",
            lc
        ));
        hints.push(format!("{} Hint: Stop once you've added n-1 edges.", lc));
    }
    if haystack.contains("connected component")
        || (haystack.contains("graph") && haystack.contains("components"))
    {
        hints.push(format!(
            "{} Hint: Build an adjacency list, then run BFS/DFS from each unvisited node.",
            lc
        ));
    }
    if haystack.contains("interval")
        && (haystack.contains("non-overlapping")
            || haystack.contains("non overlapping")
            || haystack.contains("overlap"))
    {
        hints.push(format!(
            "{} Hint: Sort intervals by end time, then greedily pick the earliest finishing ones.",
            lc
        ));
    }
    hints.truncate(max);
    hints
}

/// Drop blank lines and case-insensitive duplicates, keeping first occurrence.
fn unique_lines(lines: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    lines
        .into_iter()
        .filter(|line| {
            let key = line.trim().to_lowercase();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

/// The comment block placed inside every hollowed body.
pub fn todo_lines(opts: &ScaffoldOptions<'_>) -> Vec<String> {
    let lc = opts.line_comment;
    let goal = opts.learning_goal.map(str::trim).unwrap_or("");
    let goal_suffix = if goal.is_empty() {
        String::new()
    } else {
        format!(" ({})", goal)
    };

    let mut lines = vec![opts.begin_marker()];
    let guidance = |todo: String, closing: &[&str], lines: &mut Vec<String>| {
        lines.push(todo);
        if opts.hints_enabled {
            lines.extend(concept_hint_lines(opts));
            lines.extend(opts.extra_hints.iter().cloned());
            lines.extend(closing.iter().map(|c| format!("{} Hint: {}", lc, c)));
        }
    };
    if opts.level >= HIGH_GUIDANCE {
        guidance(
            format!("{} TODO: Implement the missing core logic{}.", lc, goal_suffix),
            &[
                "Use the problem description as your spec.",
                "Let the existing tests drive edge cases.",
            ],
            &mut lines,
        );
    } else if opts.level >= MEDIUM_GUIDANCE {
        guidance(
            format!("{} TODO: Implement the missing logic{}.", lc, goal_suffix),
            &["Follow the problem description and tests."],
            &mut lines,
        );
    } else if opts.level >= LOW_GUIDANCE {
        lines.push(format!("{} TODO: Implement this{}.", lc, goal_suffix));
    } else {
        lines.push(format!("{} TODO: Implement this.", lc));
    }
    lines.push(opts.end_marker());
    unique_lines(lines)
}

/// Leading whitespace of the line containing byte offset `at`.
fn line_indent(source: &str, at: usize) -> &str {
    let line_start = source[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = &source[line_start..at];
    &line[..line.len() - line.trim_start().len()]
}

/// Replace the braces' contents with the TODO block and `failing` statement.
fn hollow_block(
    source: &str,
    open: usize,
    close: usize,
    failing: &str,
    opts: &ScaffoldOptions<'_>,
) -> String {
    let indent = line_indent(source, open);
    let body_indent = format!("{}  ", indent);
    let mut body = String::from("\n");
    for line in todo_lines(opts) {
        body.push_str(&body_indent);
        body.push_str(&line);
        body.push('\n');
    }
    body.push_str(&body_indent);
    body.push_str(failing);
    body.push('\n');
    body.push_str(indent);

    format!("{}{}{}", &source[..=open], body, &source[close..])
}

/// Hollow the largest Java method bodies (never `main`).
///
/// Returns the new source and the methods that were replaced.
pub fn scaffold_java(source: &str, opts: &ScaffoldOptions<'_>) -> (String, Vec<MethodBody>) {
    if source.contains(&opts.begin_marker()) {
        return (source.to_string(), Vec::new());
    }
    let methods: Vec<MethodBody> = java_source::method_bodies(source)
        .into_iter()
        .filter(|m| m.name != "main")
        .collect();
    if methods.is_empty() {
        return (source.to_string(), Vec::new());
    }

    let target = opts.target_count(methods.len());
    let mut chosen = methods;
    chosen.sort_by(|a, b| {
        b.body_length
            .cmp(&a.body_length)
            .then(a.open_brace.cmp(&b.open_brace))
    });
    chosen.truncate(target);
    // Edit back to front so earlier offsets stay valid.
    chosen.sort_by(|a, b| b.open_brace.cmp(&a.open_brace));

    let mut out = source.to_string();
    for method in &chosen {
        out = hollow_block(
            &out,
            method.open_brace,
            method.close_brace,
            "throw new UnsupportedOperationException(\"TODO\");",
            opts,
        );
    }
    (out, chosen)
}

#[derive(Debug, Clone)]
struct PythonFunction {
    name: String,
    start_line: usize,
    end_line: usize,
    body_lines: usize,
}

/// Top-level `def` blocks. A block ends at the next top-level `def`/`class`.
fn python_top_level_functions(lines: &[&str]) -> Vec<PythonFunction> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(name) = regex!(r"^def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(")
            .captures(lines[i])
            .and_then(|c| c.get(1))
        else {
            i += 1;
            continue;
        };
        let end = (i + 1..lines.len())
            .find(|&j| regex!(r"^(def|class)\s+").is_match(lines[j]))
            .unwrap_or(lines.len());
        blocks.push(PythonFunction {
            name: name.as_str().to_string(),
            start_line: i,
            end_line: end,
            body_lines: lines[i + 1..end].iter().filter(|l| !l.trim().is_empty()).count(),
        });
        i = end;
    }
    blocks
}

/// Hollow top-level Python functions; `solve` is always included.
///
/// Returns the new source and how many functions were replaced.
pub fn scaffold_python(source: &str, opts: &ScaffoldOptions<'_>) -> (String, usize) {
    if source.contains(&opts.begin_marker()) {
        return (source.to_string(), 0);
    }
    let lines: Vec<&str> = source.split('\n').collect();
    let blocks = python_top_level_functions(&lines);
    if blocks.is_empty() {
        return (source.to_string(), 0);
    }

    let target = opts.target_count(blocks.len());
    let mut by_size = blocks.clone();
    by_size.sort_by(|a, b| {
        b.body_lines
            .cmp(&a.body_lines)
            .then(a.start_line.cmp(&b.start_line))
    });
    let mut names: Vec<&str> = Vec::new();
    if blocks.iter().any(|b| b.name == "solve") {
        names.push("solve");
    }
    for block in &by_size {
        if names.len() >= target {
            break;
        }
        if !names.contains(&block.name.as_str()) {
            names.push(&block.name);
        }
    }

    let todo = todo_lines(opts);
    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    let mut chosen: Vec<&PythonFunction> =
        blocks.iter().filter(|b| names.contains(&b.name.as_str())).collect();
    chosen.sort_by(|a, b| b.start_line.cmp(&a.start_line));

    for block in &chosen {
        let body_indent = lines[block.start_line + 1..block.end_line]
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| &l[..l.len() - l.trim_start().len()])
            .find(|indent| !indent.is_empty())
            .unwrap_or("    ");
        let mut replacement = vec![lines[block.start_line].to_string()];
        replacement.extend(todo.iter().map(|l| format!("{}{}", body_indent, l)));
        replacement.push(format!("{}raise NotImplementedError(\"TODO\")", body_indent));
        out.splice(block.start_line..block.end_line, replacement);
    }
    (out.join("\n"), chosen.len())
}

/// Offset of the delimiter closing the one opened at `open` in masked text.
fn matching_close(masked: &[u8], open: usize, (opener, closer): (u8, u8)) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, &b) in masked[open..].iter().enumerate() {
        if b == opener {
            depth += 1;
        } else if b == closer {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(open + offset);
            }
        }
    }
    None
}

/// Hollow the first `solve(...)` definition in C++ source.
///
/// Matches inside comments and strings are ignored, as are prototypes and
/// calls: only a parameter list followed by a body counts.
pub fn scaffold_cpp(source: &str, opts: &ScaffoldOptions<'_>) -> (String, usize) {
    if source.contains(&opts.begin_marker()) {
        return (source.to_string(), 0);
    }
    let masked = java_source::mask_non_code(source);
    let bytes = masked.as_bytes();

    for m in regex!(r"\bsolve\s*\(").find_iter(&masked) {
        let open_paren = m.end() - 1;
        let Some(close_paren) = matching_close(bytes, open_paren, (b'(', b')')) else {
            continue;
        };
        let Some(qualifiers) = regex!(r"^(\s*(const|noexcept|override)\b)*\s*\{")
            .find(&masked[close_paren + 1..])
        else {
            continue;
        };
        let open_brace = close_paren + qualifiers.end();
        let Some(close_brace) = matching_close(bytes, open_brace, (b'{', b'}')) else {
            continue;
        };
        return (
            hollow_block(
                source,
                open_brace,
                close_brace,
                "throw std::runtime_error(\"TODO\");",
                opts,
            ),
            1,
        );
    }
    (source.to_string(), 0)
}

/// SQL has no bodies to hollow: prepend the TODO block to the starter query.
pub fn scaffold_sql(starter: &str, opts: &ScaffoldOptions<'_>) -> String {
    let starter = starter.trim();
    if starter.contains(&opts.begin_marker()) {
        return starter.to_string();
    }
    let query = if starter.is_empty() { "SELECT 1;" } else { starter };
    format!("{}\n{}\n", todo_lines(opts).join("\n"), query)
}

/// Hollow every non-entry file and record a region per replaced method.
fn scaffold_java_workspace(reference: &Workspace, opts: &ScaffoldOptions<'_>) -> Workspace {
    let mut regions = Vec::new();
    let files = reference
        .files
        .iter()
        .map(|file| {
            if file.role == FileRole::Entry {
                return file.clone();
            }
            let (content, replaced) = scaffold_java(&file.content, opts);
            regions.extend(replaced.into_iter().map(|m| ScaffoldedRegion {
                path: file.path.clone(),
                symbol: Some(m.name),
                begin_marker: opts.begin_marker(),
                end_marker: opts.end_marker(),
            }));
            let mut file = file.clone();
            file.content = content;
            file
        })
        .collect();
    Workspace {
        files,
        entrypoint: reference.entrypoint.clone(),
        scaffolded_regions: regions,
    }
}

/// Rewrite the draft's student artifact from its validated reference.
///
/// A no-op when the slot carries no scaffold level, and when nothing in the
/// reference could be hollowed: the generated starter is kept rather than
/// exposing the reference. `extra_hints` are pre-rendered comment lines added
/// to every TODO block.
pub fn apply_guided_scaffolding(
    mut draft: GeneratedProblemDraft,
    slot: &ProblemSlot,
    extra_hints: &[String],
) -> GeneratedProblemDraft {
    let Some(pedagogy) = slot.pedagogy.as_ref() else {
        return draft;
    };
    let Some(level) = normalize_level(pedagogy.scaffold_level) else {
        return draft;
    };
    let language = draft.problem.language;
    let opts = ScaffoldOptions {
        level,
        line_comment: languages::profile(language).line_comment,
        learning_goal: pedagogy.learning_goal.as_deref(),
        hints_enabled: pedagogy.hints_enabled(),
        topics: &slot.topics,
        extra_hints,
    };

    match (&draft.reference, language) {
        (ReferenceArtifact::Workspace(reference), Language::Java) => {
            let workspace = scaffold_java_workspace(reference, &opts);
            if workspace.scaffolded_regions.is_empty() {
                warn!(
                    "Nothing to scaffold in workspace for slot {}; keeping generated starter",
                    slot.index
                );
            } else {
                debug!(
                    "Scaffolded workspace for slot {} at level {:.2}: {} regions",
                    slot.index,
                    level,
                    workspace.scaffolded_regions.len()
                );
                draft.problem.workspace = Some(workspace);
            }
        }
        (ReferenceArtifact::Solution(reference), _) => {
            let (starter, replaced) = match language {
                Language::Java => {
                    let (code, replaced) = scaffold_java(reference, &opts);
                    (code, replaced.len())
                }
                Language::Python => scaffold_python(reference, &opts),
                Language::Cpp => scaffold_cpp(reference, &opts),
                Language::Sql => (
                    scaffold_sql(draft.problem.starter_code.as_deref().unwrap_or(""), &opts),
                    1,
                ),
            };
            if replaced == 0 {
                warn!(
                    "Nothing to scaffold in reference for slot {}; keeping generated starter",
                    slot.index
                );
            } else {
                debug!(
                    "Scaffolded starter for slot {} at level {:.2}: {} bodies replaced",
                    slot.index, level, replaced
                );
                draft.problem.starter_code = Some(starter);
            }
        }
        (ReferenceArtifact::Workspace(_), _) => {}
    }
    draft
}
