//! Markup compiler.
//!
//! Turns component markup (JSX with ES module syntax) into a classic script
//! that registers exactly one entry component with the page bootstrap.

mod entry;
mod jsx;
mod modules;
mod scan;
mod syntax;

pub use entry::{Declaration, DeclarationKind, EntryPoint, EntrySource};
pub use jsx::{transform as transform_jsx, JsxOptions};

use crate::assets::rewrite_asset_paths;
use crate::Result;
use log::debug;

/// Name of the registry object the bootstrap installs on `window`.
pub const REGISTRY_GLOBAL: &str = "__uishot";

#[derive(Debug, Clone)]
pub struct MarkupOptions {
    pub jsx: JsxOptions,
    /// Identifier used when no capitalized declaration is found
    pub default_entry: String,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self { jsx: JsxOptions::default(), default_entry: "App".to_string() }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledMarkup {
    /// Self-contained classic script; registers the entry on load
    pub script: String,
    pub entry: EntryPoint,
}

/// Compile markup source into a registering script.
///
/// Steps: asset path rewrite, JSX transform, module syntax removal, a full
/// parse of the result, entry resolution and wrapping in a function scope that ends with a single
/// registration call.
pub fn compile_markup(source: &str, explicit_entry: Option<&str>, options: &MarkupOptions) -> Result<CompiledMarkup> {
    let rewritten = rewrite_asset_paths(source);
    let js = jsx::transform(&rewritten, &options.jsx)?;

    let tokens = scan::tokenize(&js)?;
    let taken = entry::top_level_declarations(&tokens)
        .iter()
        .any(|d| d.name == options.default_entry);
    let stripped = modules::strip_module_syntax(&js, &tokens, &options.default_entry, taken)?;
    syntax::check_script(&stripped)?;

    let decls = declarations(&stripped)?;
    let entry = entry::resolve_entry(explicit_entry, &decls, &options.default_entry);
    debug!("Resolved entry component {} ({:?})", entry.name, entry.source);

    Ok(CompiledMarkup { script: wrap_script(&stripped, &entry.name), entry })
}

/// Top-level declarations of plain JavaScript, in source order.
pub fn declarations(script: &str) -> Result<Vec<Declaration>> {
    Ok(entry::top_level_declarations(&scan::tokenize(script)?))
}

fn wrap_script(code: &str, entry: &str) -> String {
    let name = serde_json::to_string(entry).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "(function ({registry}) {{\n{code}\n;{registry}.register(typeof {entry} !== 'undefined' ? {entry} : undefined, {name});\n}})(window.{registry});\n",
        registry = REGISTRY_GLOBAL,
        code = code,
        entry = entry,
        name = name,
    )
}
