//! Permissive JSON ingestion for LLM responses.
//!
//! Model output is "almost JSON" often enough that a single `serde_json`
//! call is not sufficient. Parsing is modeled as an ordered chain:
//!
//! 1. Markdown fences (```` ```json ```` / ```` ``` ````) are stripped.
//! 2. Candidate substrings are produced in priority order: the whole text,
//!    the first balanced `{...}` object, the span from the first `{` to the
//!    last `}`, and the span from the first `[` to the last `]`.
//! 3. Each candidate is fed through parse stages in order: strict, lenient
//!    (JSON5 via the `json5` crate, falling back to [`relax_json`] for raw
//!    control characters), and repaired (relaxed plus closing unterminated
//!    strings and containers).
//!
//! The first stage that yields a value wins.
//!
//! # Example
//!
//! ```
//! use exercise_forge::utils::json_extraction::parse_model_json;
//!
//! let raw = "Sure! ```json\n{'title': 'Two Sum', 'tags': ['arrays',],}\n```";
//! let parsed = parse_model_json(raw).unwrap();
//! assert_eq!(parsed.value["title"], "Two Sum");
//! ```

use serde_json::Value;
use thiserror::Error;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("No JSON content found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },

    #[error("Failed to parse JSON after {attempts} attempts: {last_error}")]
    Invalid { attempts: usize, last_error: String },
}

/// Which parse stage produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Strict,
    Lenient,
    Repaired,
}

/// Which candidate substring produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Whole,
    BalancedObject,
    ObjectSpan,
    ArraySpan,
}

/// A successfully parsed value plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJson {
    pub value: Value,
    pub stage: ParseStage,
    pub candidate: CandidateKind,
}

type StageFn = fn(&str) -> Result<Value, String>;

const STAGES: &[(ParseStage, StageFn)] = &[
    (ParseStage::Strict, parse_strict),
    (ParseStage::Lenient, parse_lenient),
    (ParseStage::Repaired, parse_repaired),
];

/// Parse model output into a JSON value using the ordered fallback chain.
///
/// # Errors
///
/// Returns [`JsonExtractionError::NotFound`] when the text holds no `{` or `[`
/// at all, and [`JsonExtractionError::Invalid`] with the last parser error when
/// every candidate/stage combination failed.
pub fn parse_model_json(raw: &str) -> Result<ParsedJson, JsonExtractionError> {
    let text = strip_code_fences(raw);
    let candidates = candidate_spans(&text);

    if !text.contains('{') && !text.contains('[') {
        let preview: String = text.trim().chars().take(50).collect();
        return Err(JsonExtractionError::NotFound {
            content_preview: preview,
        });
    }

    let mut attempts = 0;
    let mut last_error = String::from("empty input");
    for (kind, candidate) in candidates {
        for (stage, parse) in STAGES {
            attempts += 1;
            match parse(candidate) {
                Ok(value) => {
                    return Ok(ParsedJson {
                        value,
                        stage: *stage,
                        candidate: kind,
                    })
                }
                Err(e) => last_error = e,
            }
        }
    }

    Err(JsonExtractionError::Invalid {
        attempts,
        last_error,
    })
}

/// Remove markdown code fences, keeping the content between them.
///
/// Only fence lines are dropped; prose outside the fence is left for the
/// candidate search to skip over.
pub fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip the info string ("json", "JSON", ...) up to the end of line.
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
        let body = &after[body_start..];
        let body = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        return body.trim().to_string();
    }

    trimmed.to_string()
}

fn candidate_spans(text: &str) -> Vec<(CandidateKind, &str)> {
    let mut spans: Vec<(CandidateKind, &str)> = Vec::new();
    push_span(&mut spans, CandidateKind::Whole, text);

    if let Some(open) = text.find('{') {
        if let Some(close) = find_matching_brace(&text[open..]) {
            push_span(
                &mut spans,
                CandidateKind::BalancedObject,
                &text[open..=open + close],
            );
        }
        if let Some(close) = text.rfind('}') {
            if close > open {
                push_span(&mut spans, CandidateKind::ObjectSpan, &text[open..=close]);
            }
        }
    }

    if let Some(open) = text.find('[') {
        if let Some(close) = text.rfind(']') {
            if close > open {
                push_span(&mut spans, CandidateKind::ArraySpan, &text[open..=close]);
            }
        }
    }

    spans
}

fn push_span<'a>(spans: &mut Vec<(CandidateKind, &'a str)>, kind: CandidateKind, span: &'a str) {
    let span = span.trim();
    if !span.is_empty() && !spans.iter().any(|(_, s)| *s == span) {
        spans.push((kind, span));
    }
}

/// Find the byte offset of the `}` closing the object that starts at `s[0]`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
///
/// # Returns
///
/// The offset of the matching brace, or `None` when the object never closes.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_strict(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| e.to_string())
}

/// JSON5 first, then the hand-relaxed text for what JSON5 still rejects
/// (raw control characters inside strings).
fn parse_lenient(s: &str) -> Result<Value, String> {
    json5::from_str::<Value>(s)
        .or_else(|_| serde_json::from_str(&relax_json(s)))
        .map_err(|e| e.to_string())
}

fn parse_repaired(s: &str) -> Result<Value, String> {
    serde_json::from_str(&close_unbalanced(&relax_json(s))).map_err(|e| e.to_string())
}

/// Rewrite common JSON5-isms into strict JSON.
///
/// Handles `//` and `/* */` comments, single-quoted strings, trailing commas
/// before `}`/`]`, and raw newlines/tabs inside string literals.
pub fn relax_json(s: &str) -> String {
    strip_trailing_commas(&normalize_strings_and_comments(s))
}

fn normalize_strings_and_comments(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    // Quote character of the string we are in, if any.
    let mut quote: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            match c {
                '\\' if i + 1 < chars.len() => {
                    let next = chars[i + 1];
                    if next == '\'' {
                        out.push('\'');
                    } else {
                        out.push('\\');
                        out.push(next);
                    }
                    i += 2;
                    continue;
                }
                '"' if q == '\'' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => {}
                '\t' => out.push_str("\\t"),
                _ if c == q => {
                    out.push('"');
                    quote = None;
                }
                _ => out.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                out.push('"');
                quote = Some(c);
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

fn strip_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &c) in chars.iter().enumerate() {
        if escape_next {
            escape_next = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            ',' if !in_string => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if matches!(next, Some(&'}') | Some(&']')) {
                    continue;
                }
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Close unterminated strings, objects and arrays at the end of `s`.
///
/// Truncated model output typically stops mid-string or mid-object. A dangling
/// `,` or `:` is dropped before the closers are appended.
pub fn close_unbalanced(s: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = s.trim_end().to_string();
    if escape_next {
        out.pop();
    }
    if in_string {
        out.push('"');
    }
    loop {
        let trimmed = out.trim_end();
        if trimmed.ends_with(',') || trimmed.ends_with(':') {
            let keep = trimmed.len() - 1;
            out.truncate(keep);
        } else {
            break;
        }
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}
