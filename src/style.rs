//! Style compiler: `dx` unit normalization, asset rewriting and SCSS compilation.

use crate::assets::rewrite_asset_paths;
use crate::{Error, Result};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static DX_UNIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*dx").expect("dx pattern is valid"));

/// Output of the style stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledStyle {
    /// Flat CSS, or the fallback banner stylesheet when compilation failed
    pub css: String,
    /// Compiler message when the fallback was used
    pub error: Option<String>,
    /// True when there was no stylesheet at all
    pub skipped: bool,
}

impl CompiledStyle {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Rename the design-tool `dx` length unit to `px`. Values are not rescaled.
pub fn normalize_units(source: &str) -> Cow<'_, str> {
    DX_UNIT.replace_all(source, "${1}px")
}

/// Normalize and compile SCSS to flat CSS.
pub fn compile_scss(source: &str) -> Result<String> {
    let normalized = normalize_units(source);
    let rewritten = rewrite_asset_paths(&normalized);
    grass::from_string(rewritten.into_owned(), &grass::Options::default())
        .map_err(|e| Error::StyleCompileError(e.to_string()))
}

/// Run the style stage. Never fails: a compile error yields the fallback
/// stylesheet and the message, and an empty source skips compilation.
pub fn compile_style(source: Option<&str>) -> CompiledStyle {
    let source = match source {
        Some(s) if !s.trim().is_empty() => s,
        _ => return CompiledStyle { skipped: true, ..Default::default() },
    };

    match compile_scss(source) {
        Ok(css) => {
            debug!("Compiled {} bytes of SCSS into {} bytes of CSS", source.len(), css.len());
            CompiledStyle { css, error: None, skipped: false }
        }
        Err(e) => {
            let message = match e {
                Error::StyleCompileError(m) => m,
                other => other.to_string(),
            };
            CompiledStyle { css: fallback_stylesheet(&message), error: Some(message), skipped: false }
        }
    }
}

/// Stylesheet that tints the page and prints `message` above the mount point.
pub fn fallback_stylesheet(message: &str) -> String {
    let banner = message
        .replace('\\', "\\\\")
        .replace('"', "'")
        .replace('\n', "\\A ");
    format!(
        "/* SCSS Compilation Error: {comment} */\n\
         body {{ background-color: #ffe0e0; padding: 20px; font-family: sans-serif; }}\n\
         #root::before {{ content: \"SCSS ERROR: {banner}\"; color: red; display: block; white-space: pre-wrap; word-wrap: break-word; }}\n",
        comment = message.replace("*/", "* /"),
        banner = banner,
    )
}
