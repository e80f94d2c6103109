//! Render host abstraction.
//!
//! A render host is one sandboxed browser session. The pipeline only talks to
//! the [`RenderHost`] and [`HostLauncher`] traits, so the Chrome backend can be
//! swapped for a scripted host in tests.

#[cfg(feature = "cdp")]
pub mod cdp;

use crate::assemble::{READY_GLOBAL, STYLE_ID};
use crate::cancel::{sleep_cancellable, CancelToken, Deadline};
use crate::diagnostics::{Channel, DiagnosticsCollector, DiagnosticsLog};
use crate::{Error, RenderConfig, Result};
use log::{debug, warn};
use serde::Deserialize;
use std::time::{Duration, Instant};

/// One browser session.
pub trait RenderHost {
    /// Navigate and wait for the document to load.
    fn navigate(&mut self, url: &str, deadline: &Deadline, cancel: &CancelToken) -> Result<()>;

    /// Evaluate an expression in the page and return its JSON value.
    fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value>;

    /// Requests sent but not yet finished or failed.
    fn inflight_requests(&self) -> usize;

    /// PNG of the whole document, not clipped to the viewport.
    fn capture_full_page(&mut self) -> Result<Vec<u8>>;

    /// PNG of the viewport.
    fn capture_viewport(&mut self) -> Result<Vec<u8>>;

    /// Replace the page with literal HTML.
    fn render_html(&mut self, html: &str, deadline: &Deadline, cancel: &CancelToken) -> Result<()>;

    /// Release the session. Must be safe to call after a failed navigation.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Creates render hosts. Diagnostics listeners are attached inside `launch`,
/// before the host is returned, so no early event is lost.
pub trait HostLauncher: Send + Sync {
    fn launch(&self, config: &RenderConfig, collector: DiagnosticsCollector) -> Result<Box<dyn RenderHost>>;

    fn name(&self) -> &str;
}

/// Owns a render host and closes it on every exit path.
pub struct Session {
    host: Option<Box<dyn RenderHost>>,
}

impl Session {
    pub fn new(host: Box<dyn RenderHost>) -> Self {
        Self { host: Some(host) }
    }

    pub fn host(&mut self) -> Result<&mut dyn RenderHost> {
        match self.host.as_deref_mut() {
            Some(host) => Ok(host),
            None => Err(Error::Other("render session already closed".into())),
        }
    }

    pub fn close(mut self) -> Result<()> {
        match self.host.take() {
            Some(host) => host.close(),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(host) = self.host.take() {
            if let Err(e) = host.close() {
                warn!("Failed to close render session: {}", e);
            }
        }
    }
}

/// Outcome of mounting as published by the page bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountStatus {
    Mounted,
    Missing,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadyState {
    pub status: MountStatus,
    pub message: Option<String>,
}

/// How long and how to wait before capturing.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    /// No in-flight requests for this long counts as idle
    pub network_idle: Duration,
    /// Extra delay after idle for image decode and animations
    pub settle_delay: Duration,
    /// Bound on waiting for the readiness record and network idle
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ReadinessPolicy {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            network_idle: Duration::from_millis(config.network_idle_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            timeout: Duration::from_millis(config.ready_timeout_ms),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Wait until the bootstrap has published its readiness record and the
/// network has been quiet for the idle window, then sleep the settle delay.
///
/// Every step is bounded by `request`, the deadline of the whole render, as
/// well as by the policy's own timeout.
///
/// The settle delay is best-effort tuning; it does not make the capture
/// deterministic for pages that keep animating.
pub fn wait_for_ready(
    host: &mut dyn RenderHost,
    policy: &ReadinessPolicy,
    request: &Deadline,
    cancel: &CancelToken,
    log: &DiagnosticsLog,
) -> Result<ReadyState> {
    let deadline = request.min_with(policy.timeout);
    let query = format!("window.{} || null", READY_GLOBAL);

    let state = loop {
        deadline.check(cancel)?;
        let value = host.evaluate(&query)?;
        if !value.is_null() {
            match serde_json::from_value::<ReadyState>(value.clone()) {
                Ok(state) => break state,
                Err(e) => debug!("Ignoring malformed readiness record {}: {}", value, e),
            }
        }
        sleep_cancellable(policy.poll_interval, &deadline, cancel)?;
    };
    log.info(Channel::Lifecycle, format!("Bootstrap reported {:?}", state.status));

    let mut idle_since: Option<Instant> = None;
    loop {
        deadline.check(cancel)?;
        if host.inflight_requests() == 0 {
            let since = *idle_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= policy.network_idle {
                break;
            }
        } else {
            idle_since = None;
        }
        sleep_cancellable(policy.poll_interval, &deadline, cancel)?;
    }
    log.info(Channel::Lifecycle, "Network idle");

    if !policy.settle_delay.is_zero() {
        let settle = request.min_with(policy.settle_delay + Duration::from_secs(1));
        sleep_cancellable(policy.settle_delay, &settle, cancel)?;
    }
    Ok(state)
}

const STYLE_REPORT: &str = r#"(function () {
  var s = document.getElementById('__STYLE_ID__');
  return {
    present: !!s,
    length: s ? s.textContent.length : 0,
    head: s ? s.textContent.trim().slice(0, 200) : '',
    background: document.body ? getComputedStyle(document.body).backgroundImage : null
  };
})()"#;

/// Record what the page actually applied: the generated style block and the
/// computed body background.
pub fn inspect_styles(host: &mut dyn RenderHost, log: &DiagnosticsLog) {
    let script = STYLE_REPORT.replace("__STYLE_ID__", STYLE_ID);
    match host.evaluate(&script) {
        Ok(v) => {
            if v.get("present").and_then(|p| p.as_bool()) != Some(true) {
                log.warn(Channel::Lifecycle, format!("<style id=\"{}\"> not found in the rendered page", STYLE_ID));
                return;
            }
            let length = v.get("length").and_then(|l| l.as_u64()).unwrap_or(0);
            let head = v.get("head").and_then(|h| h.as_str()).unwrap_or("");
            let background = v.get("background").and_then(|b| b.as_str()).unwrap_or("none");
            log.info(Channel::Lifecycle, format!("Generated style: {} chars: {}", length, head));
            log.info(Channel::Lifecycle, format!("Computed body background-image: {}", background));
        }
        Err(e) => log.warn(Channel::Lifecycle, format!("Style inspection failed: {}", e)),
    }
}

/// First `limit` characters of the page's body text, if the page is still
/// reachable.
pub fn body_text_excerpt(host: &mut dyn RenderHost, limit: usize) -> Option<String> {
    let value = host
        .evaluate("document.body ? document.body.innerText : ''")
        .ok()?;
    let text = value.as_str()?;
    Some(text.chars().take(limit).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;

    struct Scripted {
        ready: VecDeque<serde_json::Value>,
        inflight: std::cell::Cell<usize>,
        closed: std::rc::Rc<std::cell::Cell<bool>>,
    }

    impl RenderHost for Scripted {
        fn navigate(&mut self, _: &str, _: &Deadline, _: &CancelToken) -> Result<()> {
            Ok(())
        }
        fn evaluate(&mut self, expr: &str) -> Result<serde_json::Value> {
            if expr.contains(READY_GLOBAL) {
                return Ok(self.ready.pop_front().unwrap_or(serde_json::Value::Null));
            }
            Ok(json!("body text that is long"))
        }
        fn inflight_requests(&self) -> usize {
            let n = self.inflight.get();
            self.inflight.set(n.saturating_sub(1));
            n
        }
        fn capture_full_page(&mut self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn capture_viewport(&mut self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn render_html(&mut self, _: &str, _: &Deadline, _: &CancelToken) -> Result<()> {
            Ok(())
        }
        fn close(self: Box<Self>) -> Result<()> {
            self.closed.set(true);
            Ok(())
        }
    }

    fn policy(timeout_ms: u64) -> ReadinessPolicy {
        ReadinessPolicy {
            network_idle: Duration::from_millis(20),
            settle_delay: Duration::ZERO,
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn scripted(ready: Vec<serde_json::Value>, inflight: usize) -> Scripted {
        Scripted {
            ready: ready.into(),
            inflight: std::cell::Cell::new(inflight),
            closed: Default::default(),
        }
    }

    fn far() -> Deadline {
        Deadline::after(Duration::from_secs(30))
    }

    #[test]
    fn request_deadline_cuts_the_readiness_wait_short() {
        let mut host = scripted(vec![], 0);
        let started = Instant::now();
        let request = Deadline::after(Duration::from_millis(40));
        let err = wait_for_ready(&mut host, &policy(2000), &request, &CancelToken::new(), &DiagnosticsLog::new()).unwrap_err();
        assert!(matches!(err, Error::Timeout(40)), "{:?}", err);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn request_deadline_cuts_the_settle_delay_short() {
        let mut host = scripted(vec![json!({"status": "mounted", "message": null})], 0);
        let settle = ReadinessPolicy { settle_delay: Duration::from_secs(5), ..policy(2000) };
        let started = Instant::now();
        let request = Deadline::after(Duration::from_millis(150));
        let err = wait_for_ready(&mut host, &settle, &request, &CancelToken::new(), &DiagnosticsLog::new()).unwrap_err();
        assert!(matches!(err, Error::Timeout(150)), "{:?}", err);
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[test]
    fn waits_for_record_then_idle() {
        let mut host = scripted(vec![json!(null), json!({"status": "missing", "message": "nope"})], 3);
        let log = DiagnosticsLog::new();
        let state = wait_for_ready(&mut host, &policy(2000), &far(), &CancelToken::new(), &log).unwrap();
        assert_eq!(state.status, MountStatus::Missing);
        assert_eq!(state.message.as_deref(), Some("nope"));
        assert_eq!(host.inflight.get(), 0);
    }

    #[test]
    fn missing_record_times_out() {
        let mut host = scripted(vec![], 0);
        let err = wait_for_ready(&mut host, &policy(60), &far(), &CancelToken::new(), &DiagnosticsLog::new()).unwrap_err();
        assert!(matches!(err, Error::Timeout(60)));
        assert_eq!(err.kind(), crate::ErrorKind::NavigationError);
    }

    #[test]
    fn cancellation_stops_the_wait() {
        let mut host = scripted(vec![], 0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = wait_for_ready(&mut host, &policy(2000), &far(), &cancel, &DiagnosticsLog::new()).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn session_closes_on_drop() {
        let host = scripted(vec![], 0);
        let closed = host.closed.clone();
        drop(Session::new(Box::new(host)));
        assert!(closed.get());
    }

    #[test]
    fn excerpt_is_truncated() {
        let mut host = scripted(vec![], 0);
        assert_eq!(body_text_excerpt(&mut host, 9).as_deref(), Some("body text"));
    }
}
