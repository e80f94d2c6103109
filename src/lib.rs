//! uishot
//!
//! Renders a component-markup source (JSX) and an optional stylesheet (SCSS)
//! to a PNG screenshot through a sandboxed headless browser, recording
//! diagnostics along the way.
//!
//! # Features
//!
//! - **CDP Backend** (default): Chrome DevTools Protocol via headless Chrome
//! - **Swappable hosts**: the pipeline drives any [`host::HostLauncher`]
//! - **Always an artifact**: every failure still leaves an image and a log
//!
//! # Example
//!
//! ```no_run
//! use uishot::{Pipeline, RenderConfig, RenderRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = RenderRequest::new("out/item_001/rendered_screenshot.png", "const App = () => <h1>Hello</h1>;")?
//!     .with_style(".title { font-size: 24dx; }");
//!
//! let pipeline = Pipeline::with_chrome(RenderConfig::default());
//! let outcome = pipeline.run(&request);
//! println!("{:?} -> {}", outcome.status, outcome.screenshot_path.display());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod assemble;
pub mod assets;
pub mod cancel;
pub mod capture;
pub mod diagnostics;
pub mod host;
pub mod markup;
pub mod pipeline;
pub mod raster;
pub mod report;
pub mod request;
pub mod server;
pub mod style;

// Batch facade over the blocking pipeline
pub mod async_api;

pub use async_api::RenderService;
pub use cancel::{CancelToken, Deadline};
pub use diagnostics::{DiagnosticsLog, Severity};
pub use pipeline::{Pipeline, RenderOutcome, RenderStatus, Stage};
pub use request::{ArtifactPaths, EncodedRequest, RenderRequest};

/// React 18 production bundles.
pub const DEFAULT_RUNTIME_SCRIPTS: [&str; 2] = [
    "https://unpkg.com/react@18/umd/react.production.min.js",
    "https://unpkg.com/react-dom@18/umd/react-dom.production.min.js",
];

/// Configuration for one render
///
/// Defaults match the dataset renderer: a 780x1760 viewport, port 8080 and
/// a 3 second settle delay after the network goes idle.
///
/// # Examples
///
/// ```
/// let cfg = uishot::RenderConfig::default();
/// assert_eq!(cfg.viewport.width, 780);
/// assert_eq!(cfg.default_entry, "App");
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Viewport in CSS pixels
    pub viewport: Viewport,
    /// Content server port; 0 picks a free port
    pub port: u16,
    /// Budget for navigating to the served document
    pub navigation_timeout_ms: u64,
    /// Budget for the readiness record and network idle
    pub ready_timeout_ms: u64,
    /// Budget for the whole request
    pub request_timeout_ms: u64,
    /// Quiet period that counts as network idle
    pub network_idle_ms: u64,
    /// Extra delay after idle (0 disables)
    pub settle_delay_ms: u64,
    /// Run Chrome with its sandbox
    pub sandbox: bool,
    /// Chrome executable; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
    /// UI runtime scripts loaded before the compiled script
    pub runtime_scripts: Vec<String>,
    /// Element factory the JSX transform calls
    pub pragma: String,
    /// Fragment component the JSX transform references
    pub pragma_frag: String,
    /// Entry identifier used when inference finds nothing
    pub default_entry: String,
    /// Optional body background image relative to the served root
    pub page_background: Option<String>,
    /// Write received/compiled sources and DOM snapshots next to the artifact
    pub write_debug_artifacts: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            port: 8080,
            navigation_timeout_ms: 30_000,
            ready_timeout_ms: 15_000,
            request_timeout_ms: 120_000,
            network_idle_ms: 500,
            settle_delay_ms: 3_000,
            sandbox: true,
            chrome_path: None,
            runtime_scripts: DEFAULT_RUNTIME_SCRIPTS.iter().map(|s| s.to_string()).collect(),
            pragma: "React.createElement".to_string(),
            pragma_frag: "React.Fragment".to_string(),
            default_entry: "App".to_string(),
            page_background: None,
            write_debug_artifacts: true,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        if self.navigation_timeout_ms == 0 || self.ready_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::ConfigError("timeouts must be greater than zero".into()));
        }
        if self.pragma.trim().is_empty() || self.default_entry.trim().is_empty() {
            return Err(Error::ConfigError("pragma and default entry must be set".into()));
        }
        Ok(())
    }

    pub fn markup_options(&self) -> markup::MarkupOptions {
        markup::MarkupOptions {
            jsx: markup::JsxOptions { pragma: self.pragma.clone(), pragma_frag: self.pragma_frag.clone() },
            default_entry: self.default_entry.clone(),
        }
    }

    pub fn document_options(&self) -> assemble::DocumentOptions {
        assemble::DocumentOptions {
            runtime_scripts: self.runtime_scripts.clone(),
            page_background: self.page_background.clone(),
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 780, height: 1760 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert_eq!(config.viewport, Viewport { width: 780, height: 1760 });
        assert_eq!(config.port, 8080);
        assert_eq!(config.settle_delay_ms, 3000);
        assert_eq!(config.runtime_scripts.len(), 2);
        assert!(config.sandbox);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = RenderConfig { viewport: Viewport { width: 0, height: 10 }, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

        let config = RenderConfig { ready_timeout_ms: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_options_follow_config() {
        let config = RenderConfig { pragma: "h".into(), default_entry: "Main".into(), ..Default::default() };
        let opts = config.markup_options();
        assert_eq!(opts.jsx.pragma, "h");
        assert_eq!(opts.default_entry, "Main");
    }
}
