//! JSX to `createElement` calls.
//!
//! Walks the source once, copying plain JavaScript through untouched and
//! rewriting every JSX element or fragment found in expression position into a
//! call against the configured pragma. Tag, prop and child semantics follow the
//! classic React runtime transform.

use super::scan::{is_ident_part, is_ident_start, Brackets, Cursor, Prev};
use crate::Result;

/// Names of the runtime functions the transform emits calls to.
#[derive(Debug, Clone)]
pub struct JsxOptions {
    pub pragma: String,
    pub pragma_frag: String,
}

impl Default for JsxOptions {
    fn default() -> Self {
        Self { pragma: "React.createElement".to_string(), pragma_frag: "React.Fragment".to_string() }
    }
}

/// Transform JSX in `source` into plain JavaScript.
pub fn transform(source: &str, options: &JsxOptions) -> Result<String> {
    let mut t = Transformer { cur: Cursor::new(source), options };
    t.js(Stop::Eof)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Eof,
    /// The `}` closing an expression container or template substitution.
    Brace,
}

enum Prop {
    Pair(String, String),
    Spread(String),
}

struct Transformer<'a> {
    cur: Cursor,
    options: &'a JsxOptions,
}

impl<'a> Transformer<'a> {
    fn js(&mut self, stop: Stop) -> Result<String> {
        let mut out = String::new();
        let mut brackets = Brackets::default();
        let mut prev = Prev::Start;

        loop {
            let c = match self.cur.peek() {
                Some(c) => c,
                None => {
                    brackets.finish(&self.cur)?;
                    if stop == Stop::Brace {
                        return Err(self.cur.error_here("Unexpected end of input"));
                    }
                    return Ok(out);
                }
            };
            match c {
                _ if self.cur.at_comment() => out.push_str(&self.cur.eat_comment()?),
                '\'' | '"' => {
                    out.push_str(&self.cur.eat_string()?);
                    prev = Prev::Value;
                }
                '`' => {
                    out.push_str(&self.template()?);
                    prev = Prev::Value;
                }
                '/' if prev.expr_allowed() => {
                    out.push_str(&self.cur.eat_regex()?);
                    prev = Prev::Value;
                }
                '<' if prev.expr_allowed() && self.at_element_start() => {
                    out.push_str(&self.element()?);
                    prev = Prev::Value;
                }
                '{' | '(' | '[' => {
                    brackets.push(c, self.cur.pos);
                    self.cur.bump();
                    out.push(c);
                    prev = Prev::Punct(c);
                }
                '}' if brackets.depth() == 0 && stop == Stop::Brace => return Ok(out),
                '}' | ')' | ']' => {
                    brackets.close(c, &self.cur)?;
                    self.cur.bump();
                    out.push(c);
                    prev = Prev::Punct(c);
                }
                c if is_ident_start(c) => {
                    let word = self.cur.eat_word();
                    out.push_str(&word);
                    prev = if prev == Prev::Punct('.') { Prev::Value } else { Prev::Word(word) };
                }
                c if c.is_ascii_digit() => {
                    out.push_str(&self.cur.eat_number());
                    prev = Prev::Value;
                }
                c if c.is_whitespace() => {
                    self.cur.bump();
                    out.push(c);
                }
                c => {
                    self.cur.bump();
                    out.push(c);
                    prev = Prev::Punct(c);
                }
            }
        }
    }

    fn at_element_start(&self) -> bool {
        matches!(self.cur.peek_at(1), Some(c) if c == '>' || is_ident_start(c))
    }

    fn template(&mut self) -> Result<String> {
        let start = self.cur.pos;
        let mut out = String::new();
        self.cur.bump();
        out.push('`');
        loop {
            match self.cur.peek() {
                None => return Err(self.cur.error_at(start, "Unterminated template")),
                Some('\\') => {
                    self.cur.bump();
                    out.push('\\');
                    if let Some(c) = self.cur.bump() {
                        out.push(c);
                    }
                }
                Some('`') => {
                    self.cur.bump();
                    out.push('`');
                    return Ok(out);
                }
                Some('$') if self.cur.peek_at(1) == Some('{') => {
                    self.cur.pos += 2;
                    out.push_str("${");
                    out.push_str(&self.js(Stop::Brace)?);
                    self.expect('}')?;
                    out.push('}');
                }
                Some(c) => {
                    self.cur.bump();
                    out.push(c);
                }
            }
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.cur.peek() == Some(c) {
            self.cur.bump();
            Ok(())
        } else {
            Err(self.cur.error_here(format!("Expected '{}'", c)))
        }
    }

    /// Parse one element or fragment starting at `<`.
    fn element(&mut self) -> Result<String> {
        let start = self.cur.pos;
        self.expect('<')?;
        self.cur.eat_trivia()?;

        if self.cur.peek() == Some('>') {
            self.cur.bump();
            let children = self.children(start, None)?;
            let frag = self.options.pragma_frag.clone();
            return Ok(self.call(&frag, "null", &children));
        }

        let name = self.tag_name()?;
        let (props, self_closing) = self.attributes(start)?;
        let children = if self_closing { Vec::new() } else { self.children(start, Some(&name))? };
        Ok(self.call(&tag_expression(&name), &props_expression(&props), &children))
    }

    fn call(&self, tag: &str, props: &str, children: &[String]) -> String {
        let mut out = format!("{}({}, {}", self.options.pragma, tag, props);
        for child in children {
            out.push_str(", ");
            out.push_str(child);
        }
        out.push(')');
        out
    }

    fn tag_name(&mut self) -> Result<String> {
        match self.cur.peek() {
            Some(c) if is_ident_start(c) => {}
            _ => return Err(self.cur.error_here("Expected JSX tag name")),
        }
        let start = self.cur.pos;
        while matches!(self.cur.peek(), Some(c) if is_ident_part(c) || c == '-' || c == '.' || c == ':') {
            self.cur.bump();
        }
        Ok(self.cur.slice(start, self.cur.pos))
    }

    fn attribute_name(&mut self) -> String {
        let start = self.cur.pos;
        while matches!(self.cur.peek(), Some(c) if is_ident_part(c) || c == '-' || c == ':') {
            self.cur.bump();
        }
        self.cur.slice(start, self.cur.pos)
    }

    /// Parse attributes up to `>` or `/>`. Returns the props and whether the
    /// element closed itself.
    fn attributes(&mut self, element_start: usize) -> Result<(Vec<Prop>, bool)> {
        let mut props = Vec::new();
        loop {
            self.cur.eat_trivia()?;
            match self.cur.peek() {
                None => return Err(self.cur.error_at(element_start, "Unterminated JSX element")),
                Some('/') => {
                    self.cur.bump();
                    self.expect('>')?;
                    return Ok((props, true));
                }
                Some('>') => {
                    self.cur.bump();
                    return Ok((props, false));
                }
                Some('{') => {
                    self.cur.bump();
                    self.cur.eat_trivia()?;
                    if !self.cur.starts_with("...") {
                        return Err(self.cur.error_here("Expected '...' in JSX spread attribute"));
                    }
                    self.cur.pos += 3;
                    let expr = self.js(Stop::Brace)?;
                    self.expect('}')?;
                    props.push(Prop::Spread(expr.trim().to_string()));
                }
                Some(c) if is_ident_start(c) => {
                    let name = self.attribute_name();
                    self.cur.eat_trivia()?;
                    if self.cur.peek() != Some('=') {
                        props.push(Prop::Pair(name, "true".to_string()));
                        continue;
                    }
                    self.cur.bump();
                    self.cur.eat_trivia()?;
                    let value = self.attribute_value()?;
                    props.push(Prop::Pair(name, value));
                }
                Some(c) => return Err(self.cur.error_here(format!("Unexpected token '{}' in JSX element", c))),
            }
        }
    }

    fn attribute_value(&mut self) -> Result<String> {
        match self.cur.peek() {
            Some(q @ ('"' | '\'')) => {
                let start = self.cur.pos;
                self.cur.bump();
                let body_start = self.cur.pos;
                loop {
                    match self.cur.bump() {
                        None => return Err(self.cur.error_at(start, "Unterminated string constant")),
                        Some(c) if c == q => break,
                        Some(_) => {}
                    }
                }
                let raw = self.cur.slice(body_start, self.cur.pos - 1);
                Ok(js_string(&decode_entities(&raw)))
            }
            Some('{') => {
                let start = self.cur.pos;
                self.cur.bump();
                let expr = self.js(Stop::Brace)?;
                self.expect('}')?;
                let expr = expr.trim();
                if expr.is_empty() {
                    return Err(self.cur.error_at(start, "JSX attributes must only be assigned a non-empty expression"));
                }
                Ok(expr.to_string())
            }
            Some('<') if self.at_element_start() => self.element(),
            _ => Err(self.cur.error_here("JSX value should be either an expression or a quoted JSX text")),
        }
    }

    /// Parse children up to the closing tag for `name` (`None` for a fragment).
    fn children(&mut self, element_start: usize, name: Option<&str>) -> Result<Vec<String>> {
        let mut children = Vec::new();
        let mut text = String::new();
        loop {
            match self.cur.peek() {
                None => {
                    let what = name.map(|n| format!("<{}>", n)).unwrap_or_else(|| "fragment".into());
                    return Err(self.cur.error_at(element_start, format!("Unterminated JSX contents for {}", what)));
                }
                Some('<') if self.cur.peek_at(1) == Some('/') => {
                    push_text(&mut children, &mut text);
                    let close_start = self.cur.pos;
                    self.cur.pos += 2;
                    self.cur.eat_trivia()?;
                    let closing = if self.cur.peek() == Some('>') { String::new() } else { self.tag_name()? };
                    self.cur.eat_trivia()?;
                    self.expect('>')?;
                    let expected = name.unwrap_or("");
                    if closing != expected {
                        let msg = if expected.is_empty() {
                            "Expected corresponding closing tag for JSX fragment".to_string()
                        } else {
                            format!("Expected corresponding JSX closing tag for <{}>", expected)
                        };
                        return Err(self.cur.error_at(close_start, msg));
                    }
                    return Ok(children);
                }
                Some('<') => {
                    push_text(&mut children, &mut text);
                    children.push(self.element()?);
                }
                Some('{') => {
                    push_text(&mut children, &mut text);
                    self.cur.bump();
                    self.cur.eat_trivia()?;
                    if self.cur.peek() == Some('}') {
                        self.cur.bump();
                        continue;
                    }
                    let expr = self.js(Stop::Brace)?;
                    self.expect('}')?;
                    let expr = expr.trim();
                    if !expr.is_empty() {
                        children.push(expr.to_string());
                    }
                }
                Some(c) => {
                    self.cur.bump();
                    text.push(c);
                }
            }
        }
    }
}

fn push_text(children: &mut Vec<String>, text: &mut String) {
    if let Some(cleaned) = clean_text(text) {
        children.push(js_string(&decode_entities(&cleaned)));
    }
    text.clear();
}

/// Apply the JSX whitespace rule: lines are trimmed, whitespace-only lines are
/// dropped, the rest are joined by single spaces. Whitespace inside a line is
/// kept, as is leading space on the first line and trailing space on the last.
fn clean_text(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.split('\n').collect();
    let last_non_empty = lines.iter().rposition(|l| l.chars().any(|c| c != ' ' && c != '\t' && c != '\r'))?;

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.replace('\t', " ").replace('\r', "");
        let mut trimmed: &str = &line;
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ');
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ');
        }
        if !trimmed.is_empty() {
            out.push_str(trimmed);
            if i != last_non_empty {
                out.push(' ');
            }
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        "times" => '\u{d7}',
        "divide" => '\u{f7}',
        "yen" => '\u{a5}',
        "euro" => '\u{20ac}',
        "deg" => '\u{b0}',
        "larr" => '\u{2190}',
        "rarr" => '\u{2192}',
        _ => return None,
    };
    Some(c)
}

fn js_string(s: &str) -> String {
    // serde_json escapes quotes, backslashes and control characters
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Intrinsic elements (lowercase or namespaced) become string tags;
/// components are referenced by identifier or member expression.
fn tag_expression(name: &str) -> String {
    if name.contains('.') {
        return name.to_string();
    }
    let intrinsic = name.starts_with(|c: char| c.is_ascii_lowercase()) || name.contains('-') || name.contains(':');
    if intrinsic {
        js_string(name)
    } else {
        name.to_string()
    }
}

fn props_expression(props: &[Prop]) -> String {
    if props.is_empty() {
        return "null".to_string();
    }
    let parts: Vec<String> = props
        .iter()
        .map(|p| match p {
            Prop::Pair(k, v) if k.chars().all(is_ident_part) => format!("{}: {}", k, v),
            Prop::Pair(k, v) => format!("{}: {}", js_string(k), v),
            Prop::Spread(expr) => format!("...{}", expr),
        })
        .collect();
    format!("{{{}}}", parts.join(", "))
}
