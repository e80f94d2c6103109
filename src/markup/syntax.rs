//! Full JavaScript parse of compiled markup.
//!
//! The transform only lexes what it needs; this catches the remaining
//! grammar errors before a browser is ever launched.

use crate::{Error, Result};
use boa_engine::{Context, Script, Source};
use once_cell::sync::Lazy;
use regex::Regex;

static POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"line (\d+), col(?:umn)? (\d+)").expect("position pattern is valid"));

/// Parse `code` as a classic script without evaluating it.
pub(crate) fn check_script(code: &str) -> Result<()> {
    let mut context = Context::default();
    match Script::parse(Source::from_bytes(code.as_bytes()), None, &mut context) {
        Ok(_) => Ok(()),
        Err(err) => {
            let message = err.to_string();
            let (line, column) = position(&message).unwrap_or((1, 1));
            Err(Error::MarkupCompileError { message: format!("{} (compiled output)", message), line, column })
        }
    }
}

fn position(message: &str) -> Option<(usize, usize)> {
    let caps = POSITION.captures(message)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_compiled_component() {
        check_script("const App = () => React.createElement(\"div\", {className: \"a\"}, `x ${1}`);").unwrap();
    }

    #[test]
    fn rejects_grammar_errors_with_position() {
        let err = check_script("const a = 1;\nconst = 2;").unwrap_err();
        match err {
            Error::MarkupCompileError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn reads_position_from_message() {
        assert_eq!(position("expected token at line 3, col 14"), Some((3, 14)));
        assert_eq!(position("no position"), None);
    }
}
