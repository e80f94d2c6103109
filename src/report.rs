//! Failure reporter: turns a fatal error into an artifact at the output path.

use crate::cancel::{CancelToken, Deadline};
use crate::capture::write_png;
use crate::diagnostics::{Channel, DiagnosticsCollector, DiagnosticsLog};
use crate::host::{HostLauncher, Session};
use crate::raster::render_placeholder;
use crate::{Error, ErrorKind, RenderConfig, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// What went wrong, in the form shown on the error artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub message: String,
    /// Extra context such as a stack or the page text at the time of failure
    pub detail: Option<String>,
}

impl FailureReport {
    pub fn from_error(err: &Error) -> Self {
        Self { kind: err.kind(), message: err.to_string(), detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// How the failure artifact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    /// Error page rendered in a fresh browser session
    ErrorPage,
    /// Rasterized in-process because no browser was usable
    Placeholder,
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

pub fn error_page_html(report: &FailureReport) -> String {
    let detail = report
        .detail
        .as_deref()
        .map(|d| format!("<pre style=\"white-space: pre-wrap; font-size: 13px;\">{}</pre>", escape_html(d)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><title>Render failed</title></head>\
         <body style=\"margin: 0; background: #ffe0e0; font-family: sans-serif;\">\
         <div style=\"color: red; padding: 20px;\"><h2>Render failed: {kind}</h2><p>{message}</p>{detail}</div>\
         </body></html>",
        kind = report.kind,
        message = escape_html(&report.message),
        detail = detail,
    )
}

/// Write a failure artifact to `output`.
///
/// Renders the error page in a fresh, isolated session; if that session
/// cannot be launched or captured, rasterizes a placeholder instead.
pub fn write_failure_artifact(
    launcher: &dyn HostLauncher,
    config: &RenderConfig,
    report: &FailureReport,
    output: &Path,
    log: &DiagnosticsLog,
    cancel: &CancelToken,
) -> Result<FallbackKind> {
    match render_error_page(launcher, config, report, output, cancel) {
        Ok(()) => {
            log.info(Channel::Lifecycle, format!("Error page screenshot written to {}", output.display()));
            return Ok(FallbackKind::ErrorPage);
        }
        Err(e) => log.warn(Channel::Lifecycle, format!("Error page session failed ({}); rasterizing placeholder", e)),
    }

    let mut lines = vec![format!("{}: {}", report.kind, report.message)];
    if let Some(detail) = &report.detail {
        lines.extend(detail.lines().map(str::to_string));
    }
    let png = render_placeholder(config.viewport.width, config.viewport.height, "Render failed", &lines)?;
    write_png(output, &png)?;
    log.info(Channel::Lifecycle, format!("Placeholder screenshot written to {}", output.display()));
    Ok(FallbackKind::Placeholder)
}

fn render_error_page(
    launcher: &dyn HostLauncher,
    config: &RenderConfig,
    report: &FailureReport,
    output: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    // The error page's own events are not part of the request's diagnostics.
    let scratch = DiagnosticsCollector::new(DiagnosticsLog::new());
    let mut session = Session::new(launcher.launch(config, scratch)?);
    let deadline = Deadline::after(Duration::from_millis(config.navigation_timeout_ms));
    let host = session.host()?;
    host.render_html(&error_page_html(report), &deadline, cancel)?;
    let png = host.capture_viewport()?;
    write_png(output, &png)?;
    session.close()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_page_escapes_message() {
        let report = FailureReport {
            kind: ErrorKind::MarkupCompileError,
            message: "Unexpected token '<'".into(),
            detail: Some("<script>".into()),
        };
        let html = error_page_html(&report);
        assert!(html.contains("Render failed: MarkupCompileError"));
        assert!(html.contains("Unexpected token '&lt;'"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn report_classifies_error() {
        let report = FailureReport::from_error(&Error::Timeout(15000)).with_detail("page text");
        assert_eq!(report.kind, ErrorKind::NavigationError);
        assert_eq!(report.detail.as_deref(), Some("page text"));
    }
}
