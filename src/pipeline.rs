//! Render pipeline: one request from encoded input to a screenshot.
//!
//! ```text
//! Init -> Decoding -> Compiling (style || markup) -> Assembling -> Serving
//!      -> Rendering -> Capturing -> Finalizing -> Done
//! ```
//!
//! A fatal error in any stage moves to `Failing`, which writes the fallback
//! artifact, and then to `Finalizing`. Both paths release the server and the
//! browser session and flush the diagnostics log, so every request ends with
//! exactly one image and one log at the requested location.

use crate::assemble::{assemble_document, CompiledUnit};
use crate::cancel::{CancelToken, Deadline};
use crate::capture::{capture_to, save_dom_snapshots};
use crate::diagnostics::{Channel, DiagnosticsCollector, DiagnosticsLog, Severity};
use crate::host::{body_text_excerpt, inspect_styles, wait_for_ready, HostLauncher, MountStatus, ReadinessPolicy, RenderHost, Session};
use crate::markup::{compile_markup, EntryPoint, EntrySource};
use crate::report::{write_failure_artifact, FailureReport, FallbackKind};
use crate::request::{ensure_parent_dir, ArtifactPaths, EncodedRequest, RenderRequest};
use crate::server::ContentServer;
use crate::style::{compile_style, fallback_stylesheet, CompiledStyle};
use crate::{Error, ErrorKind, RenderConfig, Result};
use log::{error, info, warn};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Length of the page text kept as crash context.
const CRASH_CONTEXT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Decoding,
    Compiling,
    Assembling,
    Serving,
    Rendering,
    Capturing,
    Failing,
    Finalizing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Decoding => "decoding",
            Stage::Compiling => "compiling",
            Stage::Assembling => "assembling",
            Stage::Serving => "serving",
            Stage::Rendering => "rendering",
            Stage::Capturing => "capturing",
            Stage::Failing => "failing",
            Stage::Finalizing => "finalizing",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Success,
    Failure,
}

/// Terminal summary of one request, also written to `<stem>_outcome.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RenderOutcome {
    pub status: RenderStatus,
    pub screenshot_path: PathBuf,
    pub log_path: PathBuf,
    /// Set when at least one error-severity entry was recorded
    pub error_log_path: Option<PathBuf>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub failed_stage: Option<Stage>,
    pub entry_component: Option<String>,
    pub entry_source: Option<EntrySource>,
    pub source_digest: Option<String>,
    pub fallback: Option<FallbackKind>,
    /// Non-fatal diagnostics that were flagged (style fallback, missing entry)
    pub warnings: Vec<ErrorKind>,
    pub duration_ms: u64,
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RenderStatus::Success
    }

    /// 0 on success, otherwise the exit code of the terminating error kind.
    pub fn exit_code(&self) -> i32 {
        match (self.status, self.error_kind) {
            (RenderStatus::Success, _) => 0,
            (RenderStatus::Failure, Some(kind)) if kind.exit_code() != 0 => kind.exit_code(),
            (RenderStatus::Failure, _) => ErrorKind::Unexpected.exit_code(),
        }
    }
}

/// Runs render requests against a host launcher.
pub struct Pipeline {
    config: RenderConfig,
    launcher: Arc<dyn HostLauncher>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: RenderConfig, launcher: Arc<dyn HostLauncher>) -> Self {
        Self { config, launcher, cancel: CancelToken::new() }
    }

    /// Pipeline backed by headless Chrome.
    #[cfg(feature = "cdp")]
    pub fn with_chrome(config: RenderConfig) -> Self {
        Self::new(config, Arc::new(crate::host::cdp::ChromeLauncher))
    }

    /// Share a cancellation flag with other pipelines.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Cancelling this token aborts in-flight waits; the request still
    /// finishes with a fallback artifact.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Decode and render CLI input. A decode failure still produces an
    /// artifact and a log at the requested output path.
    pub fn run_encoded(&self, encoded: &EncodedRequest) -> RenderOutcome {
        let mut run = Run::new(self, &encoded.output_path);
        run.enter(Stage::Decoding);
        match run.guarded(|_| encoded.decode()) {
            Ok(request) => {
                run.digest = Some(request.source_digest());
                let result = run.guarded(|run| run.execute(&request));
                run.finish(result)
            }
            Err(e) => run.finish(Err(e)),
        }
    }

    pub fn run(&self, request: &RenderRequest) -> RenderOutcome {
        let mut run = Run::new(self, request.output_path());
        run.digest = Some(request.source_digest());
        let result = run.guarded(|run| run.execute(request));
        run.finish(result)
    }
}

/// State of one request in flight.
struct Run<'a> {
    pipeline: &'a Pipeline,
    paths: ArtifactPaths,
    log: DiagnosticsLog,
    stage: Stage,
    deadline: Deadline,
    started: Instant,
    server: Option<ContentServer>,
    session: Option<Session>,
    entry: Option<EntryPoint>,
    digest: Option<String>,
    failure: Option<(Stage, ErrorKind, String)>,
    fallback: Option<FallbackKind>,
}

impl<'a> Run<'a> {
    fn new(pipeline: &'a Pipeline, output: &Path) -> Self {
        let log = DiagnosticsLog::new();
        if let Err(e) = ensure_parent_dir(output) {
            log.warn(Channel::Lifecycle, format!("Could not create output directory: {}", e));
        }
        log.info(Channel::Lifecycle, format!("Render requested for {}", output.display()));
        Self {
            pipeline,
            paths: ArtifactPaths::for_output(output),
            log,
            stage: Stage::Init,
            deadline: Deadline::after(Duration::from_millis(pipeline.config.request_timeout_ms)),
            started: Instant::now(),
            server: None,
            session: None,
            entry: None,
            digest: None,
            failure: None,
            fallback: None,
        }
    }

    fn config(&self) -> &'a RenderConfig {
        &self.pipeline.config
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.log.debug(Channel::Lifecycle, format!("Stage: {}", stage));
    }

    /// Run `f`, converting a panic into an unexpected error.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(result) => result,
            Err(payload) => Err(Error::Other(format!("panic during {}: {}", self.stage, panic_message(&*payload)))),
        }
    }

    fn host(&mut self) -> Result<&mut dyn RenderHost> {
        match self.session.as_mut() {
            Some(session) => session.host(),
            None => Err(Error::Other("no render session".into())),
        }
    }

    /// Log a recoverable error as a tagged diagnostic and carry on; fatal
    /// errors are handed back to the caller.
    fn recover(&self, err: Error, severity: Severity) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        self.log.tagged(err.kind(), severity, err.to_string());
        Ok(())
    }

    /// Best-effort debug artifact.
    fn write_debug(&self, path: &Path, contents: &str) {
        if !self.config().write_debug_artifacts {
            return;
        }
        match std::fs::write(path, contents) {
            Ok(()) => self.log.debug(Channel::Lifecycle, format!("Wrote {}", path.display())),
            Err(e) => self.log.warn(Channel::Lifecycle, format!("Could not write {}: {}", path.display(), e)),
        }
    }

    fn execute(&mut self, request: &RenderRequest) -> Result<()> {
        let config = self.config();
        config.validate()?;
        let cancel = self.pipeline.cancel.clone();
        let log = self.log.clone();

        self.enter(Stage::Compiling);
        self.write_debug(&self.paths.received_markup, request.markup_source());
        if let Some(style) = request.style_source() {
            self.write_debug(&self.paths.received_style, style);
        }

        let markup_options = config.markup_options();
        let (style, markup) = std::thread::scope(|s| {
            let style_job = s.spawn(|| compile_style(request.style_source()));
            let markup = compile_markup(request.markup_source(), request.entry_point(), &markup_options);
            let style = style_job.join().unwrap_or_else(|_| {
                let message = "style compiler panicked".to_string();
                CompiledStyle { css: fallback_stylesheet(&message), error: Some(message), skipped: false }
            });
            (style, markup)
        });

        match (&style.error, style.skipped) {
            (Some(message), _) => self.recover(Error::StyleCompileError(message.clone()), Severity::Error)?,
            (None, true) => log.info(Channel::Lifecycle, "No stylesheet supplied; style stage skipped"),
            (None, false) => log.info(Channel::Lifecycle, format!("Compiled stylesheet: {} chars", style.css.len())),
        }
        if !style.skipped {
            self.write_debug(&self.paths.compiled_style, &style.css);
        }

        let markup = markup?;
        self.write_debug(&self.paths.compiled_script, &markup.script);
        log.info(
            Channel::Lifecycle,
            format!("Entry component {} ({:?})", markup.entry.name, markup.entry.source),
        );
        if markup.entry.source == EntrySource::Default {
            log.warn(Channel::Lifecycle, format!("No component declaration found; falling back to {}", markup.entry.name));
            self.recover(Error::EntryPointNotFound(markup.entry.name.clone()), Severity::Warning)?;
        }
        self.entry = Some(markup.entry.clone());

        self.enter(Stage::Assembling);
        let unit = CompiledUnit { css: style.css, script: markup.script, entry: markup.entry };
        let html = assemble_document(&unit, &config.document_options());
        std::fs::write(&self.paths.served_page, &html)?;

        self.enter(Stage::Serving);
        let server = ContentServer::start(&self.paths.dir, config.port, log.clone(), cancel.child())?;
        let url = server.url_for(&self.paths.served_page_name());
        log.info(
            Channel::Lifecycle,
            format!("Serving {} on port {} at {}", self.paths.dir.display(), server.port(), url),
        );
        self.server = Some(server);

        self.enter(Stage::Rendering);
        let collector = DiagnosticsCollector::new(log.clone());
        let host = self.pipeline.launcher.launch(config, collector)?;
        log.info(Channel::Lifecycle, format!("Launched {} render host", self.pipeline.launcher.name()));
        self.session = Some(Session::new(host));

        let navigation = self.deadline.min_with(Duration::from_millis(config.navigation_timeout_ms));
        let policy = ReadinessPolicy::from_config(config);
        let request_deadline = self.deadline;
        let entry_name = self.entry.as_ref().map(|e| e.name.clone()).unwrap_or_default();
        let host = self.host()?;
        host.navigate(&url, &navigation, &cancel)?;
        let state = wait_for_ready(host, &policy, &request_deadline, &cancel, &log)?;
        let message = state.message.unwrap_or_default();
        match state.status {
            MountStatus::Mounted => {}
            MountStatus::Missing => {
                log.warn(Channel::PageError, message);
                self.recover(Error::EntryPointNotFound(entry_name), Severity::Warning)?;
            }
            MountStatus::Error => log.error(Channel::PageError, format!("Mount failed: {}", message)),
        }
        let host = self.host()?;
        inspect_styles(host, &log);

        self.enter(Stage::Capturing);
        self.deadline.check(&cancel)?;
        let paths = self.paths.clone();
        let host = self.host()?;
        if config.write_debug_artifacts {
            save_dom_snapshots(host, &paths, &log);
        }
        let bytes = capture_to(host, &paths.screenshot)?;
        log.info(Channel::Lifecycle, format!("Screenshot saved: {} ({} bytes)", paths.screenshot.display(), bytes));
        Ok(())
    }

    fn fail(&mut self, err: Error) {
        let failed_stage = self.stage;
        self.enter(Stage::Failing);
        self.log.tagged(err.kind(), Severity::Error, format!("{} failed: {}", failed_stage, err));
        error!("Render failed during {}: {}", failed_stage, err);

        let mut report = FailureReport::from_error(&err);
        if let Ok(host) = self.host() {
            if let Some(text) = body_text_excerpt(host, CRASH_CONTEXT_CHARS) {
                if !text.trim().is_empty() {
                    self.log.error(Channel::PageError, format!("Page text at failure: {}", text));
                    report = report.with_detail(text);
                }
            }
        }
        self.release();

        let config = self.config();
        let launcher = self.pipeline.launcher.as_ref();
        let output = self.paths.screenshot.clone();
        let log = self.log.clone();
        let cancel = self.pipeline.cancel.clone();
        let written = panic::catch_unwind(AssertUnwindSafe(|| {
            write_failure_artifact(launcher, config, &report, &output, &log, &cancel)
        }))
        .unwrap_or_else(|payload| Err(Error::Other(format!("panic in failure reporter: {}", panic_message(&*payload)))));
        match written {
            Ok(kind) => self.fallback = Some(kind),
            Err(e) => self.log.tagged(ErrorKind::CaptureError, Severity::Error, format!("Could not write failure artifact: {}", e)),
        }

        self.failure = Some((failed_stage, err.kind(), err.to_string()));
    }

    /// Stop the server and close the session. Safe to call twice.
    fn release(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close() {
                self.log.warn(Channel::Lifecycle, format!("Failed to close render session: {}", e));
            }
        }
    }

    fn finish(mut self, result: Result<()>) -> RenderOutcome {
        if let Err(err) = result {
            self.fail(err);
        }

        self.enter(Stage::Finalizing);
        self.release();
        if self.failure.is_none() && !self.paths.screenshot.is_file() {
            self.fail(Error::CaptureError("screenshot missing after capture".into()));
            self.enter(Stage::Finalizing);
        }

        let mut warnings = Vec::new();
        for kind in [ErrorKind::StyleCompileError, ErrorKind::EntryPointNotFound] {
            if self.log.has_kind(kind) {
                warnings.push(kind);
            }
        }

        let status = if self.failure.is_none() { RenderStatus::Success } else { RenderStatus::Failure };
        self.log.info(
            Channel::Lifecycle,
            format!("Finished with {:?} in {}ms", status, self.started.elapsed().as_millis()),
        );
        self.enter(Stage::Done);

        let error_log_path = match self.log.flush(&self.paths.log, &self.paths.error_log) {
            Ok(true) => Some(self.paths.error_log.clone()),
            Ok(false) => None,
            Err(e) => {
                warn!("Failed to write diagnostics log {}: {}", self.paths.log.display(), e);
                None
            }
        };

        let (failed_stage, error_kind, error_message) = match self.failure.take() {
            Some((stage, kind, message)) => (Some(stage), Some(kind), Some(message)),
            None => (None, None, None),
        };
        let outcome = RenderOutcome {
            status,
            screenshot_path: self.paths.screenshot.clone(),
            log_path: self.paths.log.clone(),
            error_log_path,
            error_kind,
            error_message,
            failed_stage,
            entry_component: self.entry.as_ref().map(|e| e.name.clone()),
            entry_source: self.entry.as_ref().map(|e| e.source),
            source_digest: self.digest.take(),
            fallback: self.fallback,
            warnings,
            duration_ms: self.started.elapsed().as_millis() as u64,
        };

        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.paths.outcome, json) {
                    warn!("Failed to write {}: {}", self.paths.outcome.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize outcome: {}", e),
        }
        info!("{} -> {:?}", outcome.screenshot_path.display(), outcome.status);
        outcome
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_follows_terminal_kind() {
        let mut outcome = RenderOutcome {
            status: RenderStatus::Success,
            screenshot_path: PathBuf::from("a.png"),
            log_path: PathBuf::from("a_browser_log.txt"),
            error_log_path: None,
            error_kind: None,
            error_message: None,
            failed_stage: None,
            entry_component: Some("App".into()),
            entry_source: Some(EntrySource::Declaration),
            source_digest: None,
            fallback: None,
            warnings: vec![ErrorKind::StyleCompileError],
            duration_ms: 1,
        };
        assert_eq!(outcome.exit_code(), 0);

        outcome.status = RenderStatus::Failure;
        outcome.error_kind = Some(ErrorKind::MarkupCompileError);
        assert_eq!(outcome.exit_code(), 1);
        outcome.error_kind = Some(ErrorKind::NavigationError);
        assert_eq!(outcome.exit_code(), 2);
        outcome.error_kind = Some(ErrorKind::EntryPointNotFound);
        assert_eq!(outcome.exit_code(), 2);
    }

    #[test]
    fn outcome_serializes_lowercase_tags() {
        let outcome = RenderOutcome {
            status: RenderStatus::Failure,
            screenshot_path: PathBuf::from("a.png"),
            log_path: PathBuf::from("a_browser_log.txt"),
            error_log_path: Some(PathBuf::from("a_error_log.txt")),
            error_kind: Some(ErrorKind::DecodeError),
            error_message: Some("bad".into()),
            failed_stage: Some(Stage::Decoding),
            entry_component: None,
            entry_source: None,
            source_digest: None,
            fallback: Some(FallbackKind::Placeholder),
            warnings: Vec::new(),
            duration_ms: 3,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["failed_stage"], "decoding");
        assert_eq!(json["error_kind"], "DecodeError");
        assert_eq!(json["fallback"], "placeholder");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom 1");
    }
}
