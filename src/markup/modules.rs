//! Strips ES module syntax.
//!
//! The compiled script runs as a classic script with no module loader, so
//! top-level `import` statements are removed and `export` keywords are dropped
//! from the declarations they decorate. An anonymous default export is bound
//! to the default entry identifier so it stays reachable.

use super::scan::{Token, TokenKind};
use crate::Result;

struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

/// Remove module syntax from `source`, whose tokens are `tokens`.
///
/// `default_binding` names the identifier an anonymous default export is bound
/// to; when `binding_taken` is true that identifier is already declared and the
/// export is kept as a plain expression statement instead.
pub(crate) fn strip_module_syntax(
    source: &str,
    tokens: &[Token],
    default_binding: &str,
    binding_taken: bool,
) -> Result<String> {
    let mut edits = Vec::new();
    let bind = if binding_taken { "void ".to_string() } else { format!("const {} = ", default_binding) };
    let expr_bind = if binding_taken { String::new() } else { format!("const {} = ", default_binding) };

    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        let after_dot = i > 0 && tokens[i - 1].is_punct('.');
        if t.depth != 0 || t.kind != TokenKind::Word || after_dot {
            i += 1;
            continue;
        }

        if t.text == "import" {
            match tokens.get(i + 1) {
                Some(n) if n.is_punct('(') || n.is_punct('.') => {
                    i += 1;
                    continue;
                }
                _ => {}
            }
            let spec = find_specifier(tokens, i + 1).ok_or_else(|| unterminated(source, t))?;
            let end = statement_end(tokens, spec);
            edits.push(Edit { start: t.start, end: tokens[end].end, replacement: String::new() });
            i = end + 1;
            continue;
        }

        if t.text != "export" {
            i += 1;
            continue;
        }

        let next = tokens.get(i + 1).ok_or_else(|| unterminated(source, t))?;
        if next.is_word("default") {
            let decl = tokens.get(i + 2).ok_or_else(|| unterminated(source, t))?;
            let replacement;
            let mut end = decl.start;
            if let Some(anonymous) = declaration_is_anonymous(tokens, i + 2) {
                replacement = if anonymous { bind.clone() } else { String::new() };
            } else if decl.kind == TokenKind::Word && ends_statement(tokens, i + 3) {
                // `export default Name;`
                replacement = String::new();
                end = tokens[statement_end(tokens, i + 2)].end;
            } else {
                replacement = expr_bind.clone();
            }
            edits.push(Edit { start: t.start, end, replacement });
            i += 2;
        } else if next.is_punct('{') || next.is_punct('*') {
            let mut j = i + 1;
            if next.is_punct('{') {
                j = matching_close(tokens, j).ok_or_else(|| unterminated(source, t))?;
            }
            let has_from = tokens.get(j + 1).map_or(false, |n| n.is_word("from"));
            if has_from || next.is_punct('*') {
                j = find_specifier(tokens, j + 1).ok_or_else(|| unterminated(source, t))?;
            }
            let end = statement_end(tokens, j);
            edits.push(Edit { start: t.start, end: tokens[end].end, replacement: String::new() });
            i = end + 1;
        } else {
            edits.push(Edit { start: t.start, end: next.start, replacement: String::new() });
            i += 1;
        }
    }

    Ok(apply(source, &edits))
}

/// `Some(anonymous)` when the token at `i` starts a function or class declaration.
fn declaration_is_anonymous(tokens: &[Token], mut i: usize) -> Option<bool> {
    if tokens.get(i)?.is_word("async") && tokens.get(i + 1).map_or(false, |t| t.is_word("function")) {
        i += 1;
    }
    let kw = tokens.get(i)?;
    if kw.is_word("function") {
        let mut j = i + 1;
        if tokens.get(j).map_or(false, |t| t.is_punct('*')) {
            j += 1;
        }
        return Some(!tokens.get(j).map_or(false, |t| t.kind == TokenKind::Word));
    }
    if kw.is_word("class") {
        let named = tokens
            .get(i + 1)
            .map_or(false, |t| t.kind == TokenKind::Word && t.text != "extends");
        return Some(!named);
    }
    None
}

fn ends_statement(tokens: &[Token], i: usize) -> bool {
    match tokens.get(i) {
        None => true,
        Some(t) => t.is_punct(';') || t.newline_before,
    }
}

/// Index of the last token of a statement whose final meaningful token is
/// at `i`: the following `;` when there is one on the same statement.
fn statement_end(tokens: &[Token], i: usize) -> usize {
    match tokens.get(i + 1) {
        Some(t) if t.is_punct(';') => i + 1,
        _ => i,
    }
}

/// First depth-0 string literal at or after `from`.
fn find_specifier(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&j| tokens[j].kind == TokenKind::Str && tokens[j].depth == 0)
}

fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let depth = tokens.get(open)?.depth;
    (open + 1..tokens.len()).find(|&j| tokens[j].is_punct('}') && tokens[j].depth == depth)
}

fn unterminated(source: &str, t: &Token) -> crate::Error {
    super::scan::Cursor::new(source).error_at(t.start, format!("Unterminated {} statement", t.text))
}

fn apply(source: &str, edits: &[Edit]) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut pos = 0;
    for edit in edits {
        out.extend(&chars[pos..edit.start]);
        out.push_str(&edit.replacement);
        pos = edit.end;
    }
    out.extend(&chars[pos..]);
    out
}
