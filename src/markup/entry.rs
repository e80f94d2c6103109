//! Entry component resolution.

use super::scan::{Token, TokenKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Function,
    Class,
    Constant,
    Variable,
}

/// A top-level binding introduced by the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
}

/// How the entry component name was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Named by the request
    Explicit,
    /// First capitalized top-level function or class
    Declaration,
    /// First capitalized top-level `const`
    Constant,
    /// Nothing matched; the configured default identifier
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    pub name: String,
    pub source: EntrySource,
}

/// Collect top-level declarations in source order.
pub(crate) fn top_level_declarations(tokens: &[Token]) -> Vec<Declaration> {
    let mut decls = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        if t.depth != 0 || t.kind != TokenKind::Word || !at_statement_start(tokens, i) {
            continue;
        }
        let kind = match t.text.as_str() {
            "function" => DeclarationKind::Function,
            "class" => DeclarationKind::Class,
            "const" => DeclarationKind::Constant,
            "let" | "var" => DeclarationKind::Variable,
            _ => continue,
        };
        let mut j = i + 1;
        if kind == DeclarationKind::Function && tokens.get(j).map_or(false, |n| n.is_punct('*')) {
            j += 1;
        }
        match tokens.get(j) {
            Some(n) if n.kind == TokenKind::Word && n.text != "extends" => {
                decls.push(Declaration { name: n.text.clone(), kind });
            }
            _ => {}
        }
    }
    decls
}

/// True when the keyword at `i` begins a statement, looking through the
/// `export`, `default` and `async` modifiers.
fn at_statement_start(tokens: &[Token], i: usize) -> bool {
    let mut s = i;
    while s > 0 && matches!(tokens[s - 1].text.as_str(), "export" | "default" | "async") {
        s -= 1;
    }
    if s == 0 || tokens[s].newline_before {
        return true;
    }
    let prev = &tokens[s - 1];
    prev.is_punct(';') || prev.is_punct('}')
}

fn capitalized(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
}

/// Pick the entry component. An explicit name always wins; otherwise the first
/// capitalized function or class, then the first capitalized constant, then
/// `default_name`.
pub fn resolve_entry(explicit: Option<&str>, decls: &[Declaration], default_name: &str) -> EntryPoint {
    if let Some(name) = explicit {
        return EntryPoint { name: name.to_string(), source: EntrySource::Explicit };
    }
    let by_kind = |kinds: &[DeclarationKind]| {
        decls
            .iter()
            .find(|d| kinds.contains(&d.kind) && capitalized(&d.name))
            .map(|d| d.name.clone())
    };
    if let Some(name) = by_kind(&[DeclarationKind::Function, DeclarationKind::Class]) {
        return EntryPoint { name, source: EntrySource::Declaration };
    }
    if let Some(name) = by_kind(&[DeclarationKind::Constant]) {
        return EntryPoint { name, source: EntrySource::Constant };
    }
    EntryPoint { name: default_name.to_string(), source: EntrySource::Default }
}

#[cfg(test)]
mod tests {
    use super::super::scan::tokenize;
    use super::*;

    fn resolve(src: &str) -> EntryPoint {
        resolve_entry(None, &top_level_declarations(&tokenize(src).unwrap()), "App")
    }

    #[test]
    fn prefers_functions_and_classes_over_constants() {
        let src = "const Theme = {};\nfunction helper() {}\nfunction HomePage() { return null; }";
        assert_eq!(resolve(src), EntryPoint { name: "HomePage".into(), source: EntrySource::Declaration });

        let src = "const Theme = {};\nclass Screen extends React.Component {}";
        assert_eq!(resolve(src).name, "Screen");
    }

    #[test]
    fn falls_back_to_constant_then_default() {
        let src = "const styles = {};\nconst Login = () => null;";
        assert_eq!(resolve(src), EntryPoint { name: "Login".into(), source: EntrySource::Constant });
        assert_eq!(resolve("const x = 1;").source, EntrySource::Default);
        assert_eq!(resolve("const x = 1;").name, "App");
    }

    #[test]
    fn ignores_nested_and_expression_functions() {
        let src = "const make = () => { function Inner() {} };\nconst y = function Named() {};";
        assert_eq!(resolve(src).source, EntrySource::Default);
    }

    #[test]
    fn statement_without_semicolon_still_counts() {
        let src = "const a = 1\nasync function Loader() {}";
        assert_eq!(resolve(src).name, "Loader");
    }

    #[test]
    fn explicit_name_overrides_inference() {
        let decls = top_level_declarations(&tokenize("function First() {}").unwrap());
        let entry = resolve_entry(Some("Second"), &decls, "App");
        assert_eq!(entry, EntryPoint { name: "Second".into(), source: EntrySource::Explicit });
    }
}
