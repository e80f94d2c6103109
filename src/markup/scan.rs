//! Character cursor over JavaScript source.
//!
//! Just enough lexing to walk JavaScript safely: strings, templates,
//! comments and regular expression literals are recognized so that braces and
//! angle brackets inside them are never mistaken for structure.

use crate::{Error, Result};

/// What the last significant token was. Decides whether `/` starts a regular
/// expression and whether `<` starts a JSX element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Prev {
    Start,
    Punct(char),
    Word(String),
    Value,
}

const EXPR_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await", "default", "extends",
];

impl Prev {
    /// True when an expression (rather than an operator) may follow.
    pub(crate) fn expr_allowed(&self) -> bool {
        match self {
            Prev::Start => true,
            Prev::Punct(c) => !matches!(c, ')' | ']' | '}' | '.'),
            Prev::Word(w) => EXPR_KEYWORDS.contains(&w.as_str()),
            Prev::Value => false,
        }
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

pub(crate) fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub(crate) struct Cursor {
    chars: Vec<char>,
    pub(crate) pos: usize,
}

impl Cursor {
    pub(crate) fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub(crate) fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for c in s.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Next non-whitespace character at or after the cursor, without moving.
    pub(crate) fn peek_non_ws(&self) -> Option<char> {
        self.chars[self.pos.min(self.chars.len())..]
            .iter()
            .copied()
            .find(|c| !c.is_whitespace())
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end.min(self.chars.len())].iter().collect()
    }

    /// 1-based line and column of a character offset.
    pub(crate) fn line_col(&self, pos: usize) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for &c in self.chars.iter().take(pos) {
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    pub(crate) fn error_at(&self, pos: usize, message: impl Into<String>) -> Error {
        let (line, column) = self.line_col(pos);
        Error::MarkupCompileError { message: message.into(), line, column }
    }

    pub(crate) fn error_here(&self, message: impl Into<String>) -> Error {
        self.error_at(self.pos, message)
    }

    pub(crate) fn eat_whitespace(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.slice(start, self.pos)
    }

    pub(crate) fn at_comment(&self) -> bool {
        self.starts_with("//") || self.starts_with("/*")
    }

    /// Consume a `//` or `/* */` comment and return its text.
    pub(crate) fn eat_comment(&mut self) -> Result<String> {
        let start = self.pos;
        if self.starts_with("//") {
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.pos += 1;
            }
            return Ok(self.slice(start, self.pos));
        }
        self.pos += 2;
        loop {
            if self.at_end() {
                return Err(self.error_at(start, "Unterminated comment"));
            }
            if self.starts_with("*/") {
                self.pos += 2;
                return Ok(self.slice(start, self.pos));
            }
            self.pos += 1;
        }
    }

    /// Skip whitespace and comments, returning everything skipped.
    pub(crate) fn eat_trivia(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            out.push_str(&self.eat_whitespace());
            if self.at_comment() {
                out.push_str(&self.eat_comment()?);
            } else {
                return Ok(out);
            }
        }
    }

    /// Consume a quoted string literal starting at the cursor.
    pub(crate) fn eat_string(&mut self) -> Result<String> {
        let start = self.pos;
        let quote = match self.bump() {
            Some(q) => q,
            None => return Err(self.error_here("Expected string literal")),
        };
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error_at(start, "Unterminated string constant")),
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => return Ok(self.slice(start, self.pos)),
                Some(_) => {}
            }
        }
    }

    /// Consume a regular expression literal including its flags.
    pub(crate) fn eat_regex(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error_at(start, "Unterminated regular expression"))
                }
                Some('\\') => {
                    self.bump();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some(_) => {}
            }
        }
        while matches!(self.peek(), Some(c) if is_ident_part(c)) {
            self.pos += 1;
        }
        Ok(self.slice(start, self.pos))
    }

    pub(crate) fn eat_word(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_part(c)) {
            self.pos += 1;
        }
        self.slice(start, self.pos)
    }

    /// Numeric literal, loosely: digits, letters (hex, exponents, bigint) and dots.
    pub(crate) fn eat_number(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '.' || c == '_') {
            self.pos += 1;
        }
        self.slice(start, self.pos)
    }
}

/// Skip a template literal without interpreting it, honoring nested
/// substitutions. Returns the literal text.
pub(crate) fn eat_template_opaque(cur: &mut Cursor) -> Result<String> {
    let start = cur.pos;
    cur.bump();
    loop {
        match cur.peek() {
            None => return Err(cur.error_at(start, "Unterminated template")),
            Some('\\') => {
                cur.pos += 2;
            }
            Some('`') => {
                cur.bump();
                return Ok(cur.slice(start, cur.pos));
            }
            Some('$') if cur.peek_at(1) == Some('{') => {
                cur.pos += 2;
                skip_balanced_js(cur)?;
                if cur.bump() != Some('}') {
                    return Err(cur.error_at(start, "Unterminated template substitution"));
                }
            }
            Some(_) => {
                cur.pos += 1;
            }
        }
    }
}

/// Open brackets with the offsets they were opened at.
#[derive(Debug, Default)]
pub(crate) struct Brackets {
    open: Vec<(char, usize)>,
}

impl Brackets {
    pub(crate) fn depth(&self) -> usize {
        self.open.len()
    }

    pub(crate) fn push(&mut self, c: char, pos: usize) {
        self.open.push((c, pos));
    }

    /// Pop the opener matching `c`, which sits at the cursor.
    pub(crate) fn close(&mut self, c: char, cur: &Cursor) -> Result<()> {
        match self.open.pop() {
            Some((opener, _)) if closer_for(opener) == c => Ok(()),
            Some((opener, pos)) => {
                let (line, column) = cur.line_col(pos);
                Err(cur.error_here(format!(
                    "Unexpected token '{}', expected '{}' to close '{}' at {}:{}",
                    c,
                    closer_for(opener),
                    opener,
                    line,
                    column
                )))
            }
            None => Err(cur.error_here(format!("Unexpected token '{}'", c))),
        }
    }

    /// Fail on the innermost bracket still open at end of input.
    pub(crate) fn finish(&self, cur: &Cursor) -> Result<()> {
        match self.open.last() {
            Some(&(opener, pos)) => Err(cur.error_at(
                pos,
                format!("Unexpected end of input, '{}' is never closed", opener),
            )),
            None => Ok(()),
        }
    }
}

fn closer_for(opener: char) -> char {
    match opener {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Skip JavaScript up to (not including) the `}` that closes the current
/// block. Stops at end of input.
pub(crate) fn skip_balanced_js(cur: &mut Cursor) -> Result<()> {
    let mut brackets = Brackets::default();
    let mut prev = Prev::Start;
    while let Some(c) = cur.peek() {
        match c {
            _ if cur.at_comment() => {
                cur.eat_comment()?;
            }
            '\'' | '"' => {
                cur.eat_string()?;
                prev = Prev::Value;
            }
            '`' => {
                eat_template_opaque(cur)?;
                prev = Prev::Value;
            }
            '/' if prev.expr_allowed() => {
                cur.eat_regex()?;
                prev = Prev::Value;
            }
            '{' | '(' | '[' => {
                brackets.push(c, cur.pos);
                cur.bump();
                prev = Prev::Punct(c);
            }
            '}' if brackets.depth() == 0 => return Ok(()),
            '}' | ')' | ']' => {
                brackets.close(c, cur)?;
                cur.bump();
                prev = Prev::Punct(c);
            }
            c if is_ident_start(c) => {
                let word = cur.eat_word();
                prev = if prev == Prev::Punct('.') { Prev::Value } else { Prev::Word(word) };
            }
            c if c.is_ascii_digit() => {
                cur.eat_number();
                prev = Prev::Value;
            }
            c if c.is_whitespace() => {
                cur.bump();
            }
            c => {
                cur.bump();
                prev = Prev::Punct(c);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word,
    Punct,
    Str,
    Template,
    Regex,
    Number,
}

/// A significant token of plain JavaScript. Offsets are character indices.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) text: String,
    pub(crate) start: usize,
    pub(crate) end: usize,
    /// Bracket depth the token sits at; a closing bracket shares its opener's depth.
    pub(crate) depth: usize,
    pub(crate) newline_before: bool,
}

impl Token {
    pub(crate) fn is_word(&self, w: &str) -> bool {
        self.kind == TokenKind::Word && self.text == w
    }

    pub(crate) fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.len() == 1 && self.text.starts_with(c)
    }
}

/// Split plain JavaScript (no JSX) into tokens, dropping comments and whitespace.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut cur = Cursor::new(source);
    let mut tokens: Vec<Token> = Vec::new();
    let mut brackets = Brackets::default();
    let mut prev = Prev::Start;
    let mut newline = false;

    loop {
        let trivia = cur.eat_trivia()?;
        if trivia.contains('\n') {
            newline = true;
        }
        let c = match cur.peek() {
            Some(c) => c,
            None => {
                brackets.finish(&cur)?;
                return Ok(tokens);
            }
        };
        let start = cur.pos;
        let mut token_depth = brackets.depth();
        let kind = match c {
            '\'' | '"' => {
                cur.eat_string()?;
                TokenKind::Str
            }
            '`' => {
                eat_template_opaque(&mut cur)?;
                TokenKind::Template
            }
            '/' if prev.expr_allowed() => {
                cur.eat_regex()?;
                TokenKind::Regex
            }
            c if is_ident_start(c) => {
                cur.eat_word();
                TokenKind::Word
            }
            c if c.is_ascii_digit() => {
                cur.eat_number();
                TokenKind::Number
            }
            '{' | '(' | '[' => {
                brackets.push(c, cur.pos);
                cur.bump();
                TokenKind::Punct
            }
            '}' | ')' | ']' => {
                brackets.close(c, &cur)?;
                cur.bump();
                token_depth = brackets.depth();
                TokenKind::Punct
            }
            _ => {
                cur.bump();
                TokenKind::Punct
            }
        };
        let text = cur.slice(start, cur.pos);
        prev = match kind {
            TokenKind::Punct => Prev::Punct(c),
            TokenKind::Word if prev == Prev::Punct('.') => Prev::Value,
            TokenKind::Word => Prev::Word(text.clone()),
            _ => Prev::Value,
        };
        tokens.push(Token { kind, text, start, end: cur.pos, depth: token_depth, newline_before: newline });
        newline = false;
    }
}
