//! Best-effort lexical scanner for Java source.
//!
//! This is not a parser. It walks the byte stream tracking line comments,
//! block comments, string literals and char literals, and produces a *masked*
//! copy of the source in which everything that is not code is replaced by
//! spaces (newlines are kept). Offsets in the masked text are identical to
//! offsets in the original, so structure found in the mask (braces, parens,
//! keywords) can be used to edit the original.
//!
//! Known false negatives: text blocks (`"""`) are treated as a sequence of
//! ordinary strings.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment,
    Str,
    Char,
}

/// Replace comments and string/char literal contents with spaces.
pub fn mask_non_code(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut state = LexState::Code;
    let mut i = 0;

    let blank = |b: u8| if b == b'\n' { b'\n' } else { b' ' };

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            LexState::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = LexState::LineComment;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'/', Some(b'*')) => {
                    state = LexState::BlockComment;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'"', _) => {
                    state = LexState::Str;
                    out.push(b' ');
                }
                (b'\'', _) => {
                    state = LexState::Char;
                    out.push(b' ');
                }
                _ => out.push(b),
            },
            LexState::LineComment => {
                if b == b'\n' {
                    state = LexState::Code;
                }
                out.push(blank(b));
            }
            LexState::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    state = LexState::Code;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                out.push(blank(b));
            }
            LexState::Str | LexState::Char => {
                let quote = if state == LexState::Str { b'"' } else { b'\'' };
                if b == b'\\' {
                    out.push(b' ');
                    if let Some(n) = next {
                        out.push(blank(n));
                    }
                    i += 2;
                    continue;
                }
                if b == quote {
                    state = LexState::Code;
                }
                out.push(blank(b));
            }
        }
        i += 1;
    }

    out.truncate(bytes.len());
    // Only ASCII bytes were written in place of original bytes, and code bytes
    // were copied whole, so the result is valid UTF-8 unless a multi-byte
    // sequence was split by the escape skip.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn read_word(bytes: &[u8], i: usize) -> Option<(&str, usize)> {
    if i >= bytes.len() || !is_word_start(bytes[i]) {
        return None;
    }
    let mut j = i + 1;
    while j < bytes.len() && is_word_char(bytes[j]) {
        j += 1;
    }
    std::str::from_utf8(&bytes[i..j]).ok().map(|w| (w, j))
}

/// Skip `@Name`, `@a.b.Name` and `@Name(...)` starting at `i` (which is `@`).
fn skip_annotation(bytes: &[u8], i: usize) -> usize {
    let mut j = i + 1;
    while j < bytes.len() && (is_word_char(bytes[j]) || bytes[j] == b'.') {
        j += 1;
    }
    j = skip_ws(bytes, j);
    if bytes.get(j) != Some(&b'(') {
        return j;
    }
    let mut depth = 0usize;
    while j < bytes.len() {
        match bytes[j] {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return j + 1;
                }
            }
            _ => {}
        }
        j += 1;
    }
    j
}

const TYPE_KEYWORDS: [&str; 4] = ["class", "interface", "enum", "record"];
const TYPE_MODIFIERS: [&str; 5] = ["abstract", "final", "sealed", "static", "strictfp"];

/// Names of `public` types declared at brace depth 0, in source order.
///
/// Comments and literals are ignored. Modifiers (`abstract`, `final`,
/// `sealed`, `non-sealed`, `static`, `strictfp`) and annotations between
/// `public` and the type keyword are skipped.
pub fn top_level_public_type_names(source: &str) -> Vec<String> {
    let masked = mask_non_code(source);
    let bytes = masked.as_bytes();
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'{' => {
                depth += 1;
                i += 1;
                continue;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                i += 1;
                continue;
            }
            _ => {}
        }
        if depth != 0 || !is_word_start(b) || (i > 0 && is_word_char(bytes[i - 1])) {
            i += 1;
            continue;
        }
        let Some((word, after)) = read_word(bytes, i) else {
            i += 1;
            continue;
        };
        i = after;
        if word != "public" {
            continue;
        }

        let mut j = i;
        loop {
            j = skip_ws(bytes, j);
            if j >= bytes.len() {
                break;
            }
            if bytes[j] == b'@' {
                j = skip_annotation(bytes, j);
                continue;
            }
            if masked[j..].starts_with("non-sealed") {
                j += "non-sealed".len();
                continue;
            }
            let Some((token, next)) = read_word(bytes, j) else {
                break;
            };
            j = next;
            if TYPE_MODIFIERS.contains(&token) {
                continue;
            }
            if TYPE_KEYWORDS.contains(&token) {
                let k = skip_ws(bytes, j);
                if let Some((name, end)) = read_word(bytes, k) {
                    names.push(name.to_string());
                    j = end;
                }
            }
            break;
        }
        i = j;
    }

    names
}

/// A method body found at class-member depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    pub name: String,
    /// Byte offset of the opening `{`.
    pub open_brace: usize,
    /// Byte offset of the matching `}`.
    pub close_brace: usize,
    /// Bytes strictly between the braces.
    pub body_length: usize,
}

/// Offset of the `}` matching the `{` at `open` in already-masked text.
fn matching_brace(masked: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, &b) in masked[open..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn prev_non_ws(bytes: &[u8], from: usize) -> Option<usize> {
    (0..=from).rev().find(|&i| !bytes[i].is_ascii_whitespace())
}

/// The `)` closing the parameter list in front of the `{` at `open`,
/// looking past an optional `throws` clause.
fn parameter_list_end(masked: &str, open: usize) -> Option<usize> {
    let bytes = masked.as_bytes();
    let prev = prev_non_ws(bytes, open.checked_sub(1)?)?;
    if bytes[prev] == b')' {
        return Some(prev);
    }
    let paren = masked[..open].rfind(')')?;
    regex!(r"^\s*throws\s+[A-Za-z0-9_$.<>,\s]+$")
        .is_match(&masked[paren + 1..open])
        .then_some(paren)
}

/// Every `{ ... }` block opened at depth 1 after a parameter list.
///
/// In a single top-level class this is every method and constructor body.
/// The name is the identifier (`[A-Za-z0-9_$]`) in front of the parameter
/// list.
pub fn method_bodies(source: &str) -> Vec<MethodBody> {
    let masked = mask_non_code(source);
    let bytes = masked.as_bytes();
    let mut methods = Vec::new();
    let mut depth = 0usize;

    for i in 0..bytes.len() {
        match bytes[i] {
            b'{' => {
                let depth_before = depth;
                depth += 1;
                if depth_before != 1 || i == 0 {
                    continue;
                }
                let Some(prev) = parameter_list_end(&masked, i) else {
                    continue;
                };
                let Some(open_paren) = matching_open_paren(bytes, prev) else {
                    continue;
                };
                if open_paren == 0 {
                    continue;
                }
                let Some(name_end) = prev_non_ws(bytes, open_paren - 1) else {
                    continue;
                };
                let mut start = name_end + 1;
                while start > 0 && is_ident_char(bytes[start - 1]) {
                    start -= 1;
                }
                if start > name_end {
                    continue;
                }
                let name = &masked[start..=name_end];
                if let Some(close) = matching_brace(bytes, i) {
                    methods.push(MethodBody {
                        name: name.to_string(),
                        open_brace: i,
                        close_brace: close,
                        body_length: close - i - 1,
                    });
                }
            }
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    methods
}

fn is_ident_char(b: u8) -> bool {
    is_word_char(b) || b == b'$'
}

fn matching_open_paren(bytes: &[u8], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for j in (0..=close).rev() {
        match bytes[j] {
            b')' => depth += 1,
            b'(' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_preserves_offsets() {
        let src = "int a = 1; // {\nString s = \"}{\"; char c = '{'; /* } */ int b;";
        let masked = mask_non_code(src);
        assert_eq!(masked.len(), src.len());
        assert!(!masked.contains('{'));
        assert!(!masked.contains('}'));
        assert_eq!(masked.find("int b"), src.find("int b"));
        assert_eq!(masked.matches('\n').count(), 1);
    }

    #[test]
    fn test_mask_handles_escapes() {
        let src = r#"String s = "a\"{"; char q = '\''; int x;"#;
        let masked = mask_non_code(src);
        assert!(!masked.contains('{'));
        assert!(masked.contains("int x;"));
    }

    #[test]
    fn test_top_level_public_types() {
        let src = r#"
import java.util.*;
// public class Commented {}
@SuppressWarnings("unchecked")
public final class Inventory {
    public static class Inner {}
    String s = "public class InString {}";
}
class Helper {}
public sealed interface Shape permits Circle {}
public non-sealed class Circle implements Shape {}
public @Deprecated(since = "1") record Point(int x, int y) {}
"#;
        assert_eq!(
            top_level_public_type_names(src),
            vec!["Inventory", "Shape", "Circle", "Point"]
        );
    }

    #[test]
    fn test_no_public_types() {
        assert!(top_level_public_type_names("class A {}\ninterface B {}").is_empty());
    }

    #[test]
    fn test_method_bodies_skip_braces_in_literals() {
        let src = r#"public class Calc {
    private int total;

    public Calc(int start) {
        total = start;
    }

    public int add(int x) {
        String s = "}";
        // }
        if (x > 0) { total += x; }
        return total;
    }

    public static void main(String[] args) {
        System.out.println(new Calc(1).add(2));
    }
}
"#;
        let methods = method_bodies(src);
        let names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Calc", "add", "main"]);

        let add = &methods[1];
        assert_eq!(&src[add.open_brace..=add.open_brace], "{");
        assert_eq!(&src[add.close_brace..=add.close_brace], "}");
        assert!(src[add.open_brace..add.close_brace].contains("return total;"));
        assert_eq!(add.body_length, add.close_brace - add.open_brace - 1);
    }

    #[test]
    fn test_throws_clause_is_a_method() {
        let src = "class Loader {\n  String read(String path) throws java.io.IOException, IllegalStateException {\n    return path;\n  }\n  int size() throws\n      Exception {\n    return 1;\n  }\n}\n";
        let methods = method_bodies(src);
        let names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["read", "size"]);
        assert!(src[methods[0].open_brace..methods[0].close_brace].contains("return path;"));
    }

    #[test]
    fn test_nested_blocks_are_not_methods() {
        let src = "class A {\n  void f() {\n    g(() -> { return; });\n  }\n  static { init(); }\n}\n";
        let methods = method_bodies(src);
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "f");
    }
}
