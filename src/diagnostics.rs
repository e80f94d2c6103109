//! Diagnostics collector.
//!
//! Every browser event and pipeline milestone becomes one timestamped line.
//! The log is append-only and is flushed to two files at finalize: the full
//! log and an error-only copy.

use crate::ErrorKind;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Console,
    Network,
    PageError,
    Lifecycle,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Console => "console",
            Channel::Network => "network",
            Channel::PageError => "pageerror",
            Channel::Lifecycle => "lifecycle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticEntry {
    pub timestamp: DateTime<Utc>,
    pub channel: Channel,
    pub severity: Severity,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] [{}] ",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.channel.as_str(),
            self.severity.as_str()
        )?;
        if let Some(kind) = self.kind {
            write!(f, "[{}] ", kind)?;
        }
        f.write_str(&self.message)
    }
}

/// Shared, append-only diagnostics log for one request.
///
/// Cheap to clone; event handlers on browser threads hold clones.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsLog {
    entries: Arc<Mutex<Vec<DiagnosticEntry>>>,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DiagnosticEntry>> {
        // a panicking writer cannot leave a half-pushed entry behind
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, channel: Channel, severity: Severity, kind: Option<ErrorKind>, message: impl Into<String>) {
        let entry = DiagnosticEntry { timestamp: Utc::now(), channel, severity, kind, message: message.into() };
        match severity {
            Severity::Error => log::error!("{}", entry),
            Severity::Warning => log::warn!("{}", entry),
            Severity::Info => log::info!("{}", entry),
            Severity::Debug => log::debug!("{}", entry),
        }
        self.lock().push(entry);
    }

    pub fn debug(&self, channel: Channel, message: impl Into<String>) {
        self.record(channel, Severity::Debug, None, message);
    }

    pub fn info(&self, channel: Channel, message: impl Into<String>) {
        self.record(channel, Severity::Info, None, message);
    }

    pub fn warn(&self, channel: Channel, message: impl Into<String>) {
        self.record(channel, Severity::Warning, None, message);
    }

    pub fn error(&self, channel: Channel, message: impl Into<String>) {
        self.record(channel, Severity::Error, None, message);
    }

    /// Record a classified failure on the lifecycle channel.
    pub fn tagged(&self, kind: ErrorKind, severity: Severity, message: impl Into<String>) {
        self.record(Channel::Lifecycle, severity, Some(kind), message);
    }

    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.lock().iter().any(|e| e.kind == Some(kind))
    }

    pub fn error_count(&self) -> usize {
        self.lock().iter().filter(|e| e.severity == Severity::Error).count()
    }

    /// Write the full log, and the error-only log when any error was recorded.
    /// Returns whether the error log was written.
    pub fn flush(&self, full_log: &Path, error_log: &Path) -> std::io::Result<bool> {
        let entries = self.entries();
        let mut full = String::new();
        let mut errors = String::new();
        for entry in &entries {
            let line = entry.to_string();
            full.push_str(&line);
            full.push('\n');
            if entry.severity == Severity::Error {
                errors.push_str(&line);
                errors.push('\n');
            }
        }
        std::fs::write(full_log, full)?;
        if errors.is_empty() {
            if error_log.exists() {
                std::fs::remove_file(error_log)?;
            }
            return Ok(false);
        }
        std::fs::write(error_log, errors)?;
        Ok(true)
    }
}

/// A browser-side event as reported by a render host.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
    Console { level: String, text: String },
    PageError { message: String },
    Request { method: String, url: String },
    Response { url: String, status: u16, resource_type: Option<String> },
    RequestFailed { url: String, reason: String },
}

/// Turns browser events into log entries, applying the severity rules.
#[derive(Debug, Clone)]
pub struct DiagnosticsCollector {
    log: DiagnosticsLog,
}

impl DiagnosticsCollector {
    pub fn new(log: DiagnosticsLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &DiagnosticsLog {
        &self.log
    }

    pub fn observe(&self, event: BrowserEvent) {
        match event {
            BrowserEvent::Console { level, text } => {
                let severity = match level.as_str() {
                    "error" => Severity::Error,
                    "warn" | "warning" => Severity::Warning,
                    "debug" => Severity::Debug,
                    _ => Severity::Info,
                };
                self.log.record(Channel::Console, severity, None, format!("[{}] {}", level, text));
            }
            BrowserEvent::PageError { message } => {
                self.log.record(Channel::PageError, Severity::Error, None, message);
            }
            BrowserEvent::Request { method, url } => {
                self.log.debug(Channel::Network, format!("Request: {} {}", method, url));
            }
            BrowserEvent::Response { url, status, resource_type } => {
                let severity = if (200..400).contains(&status) { Severity::Info } else { Severity::Error };
                let kind = resource_type.map(|t| format!(" ({})", t)).unwrap_or_default();
                self.log.record(Channel::Network, severity, None, format!("Response: {} {}{}", status, url, kind));
            }
            BrowserEvent::RequestFailed { url, reason } => {
                self.log.error(Channel::Network, format!("Request failed: {} ({})", url, reason));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format_includes_channel_severity_and_kind() {
        let log = DiagnosticsLog::new();
        log.tagged(ErrorKind::StyleCompileError, Severity::Error, "Undefined variable.");
        let line = log.entries()[0].to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("[lifecycle] [ERROR] [StyleCompileError] Undefined variable."), "{}", line);
    }

    #[test]
    fn severity_rules_for_browser_events() {
        let log = DiagnosticsLog::new();
        let collector = DiagnosticsCollector::new(log.clone());
        collector.observe(BrowserEvent::Console { level: "log".into(), text: "hi".into() });
        collector.observe(BrowserEvent::Console { level: "error".into(), text: "boom".into() });
        collector.observe(BrowserEvent::Response { url: "/a".into(), status: 304, resource_type: None });
        collector.observe(BrowserEvent::Response { url: "/b".into(), status: 404, resource_type: Some("Image".into()) });
        collector.observe(BrowserEvent::RequestFailed { url: "/c".into(), reason: "net::ERR".into() });
        collector.observe(BrowserEvent::PageError { message: "TypeError".into() });

        let severities: Vec<Severity> = log.entries().iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Info, Severity::Error, Severity::Info, Severity::Error, Severity::Error, Severity::Error]
        );
        assert_eq!(log.error_count(), 4);
    }

    #[test]
    fn response_lines_carry_the_resource_type() {
        let log = DiagnosticsLog::new();
        let collector = DiagnosticsCollector::new(log.clone());
        collector.observe(BrowserEvent::Response {
            url: "http://127.0.0.1/assets/hero.png".into(),
            status: 404,
            resource_type: Some("Image".into()),
        });
        assert_eq!(log.entries()[0].message, "Response: 404 http://127.0.0.1/assets/hero.png (Image)");
    }

    #[test]
    fn flush_writes_error_log_only_with_errors() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("log.txt");
        let errors = dir.path().join("errors.txt");

        let log = DiagnosticsLog::new();
        log.info(Channel::Lifecycle, "started");
        assert!(!log.flush(&full, &errors).unwrap());
        assert!(full.exists());
        assert!(!errors.exists());

        log.error(Channel::Network, "Response: 404 /missing.png");
        assert!(log.flush(&full, &errors).unwrap());
        let err_text = std::fs::read_to_string(&errors).unwrap();
        assert_eq!(err_text.lines().count(), 1);
        assert_eq!(std::fs::read_to_string(&full).unwrap().lines().count(), 2);
    }

    #[test]
    fn clones_share_entries() {
        let log = DiagnosticsLog::new();
        let other = log.clone();
        other.warn(Channel::Console, "x");
        assert_eq!(log.len(), 1);
        assert!(!log.has_kind(ErrorKind::DecodeError));
    }
}
