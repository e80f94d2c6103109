//! Chrome DevTools Protocol render host (uses the `headless_chrome` crate).
//!
//! Launches one headless Chrome per session with a single tab. Console output
//! and page errors reach the diagnostics collector through an exposed binding;
//! network events come from the Network domain and also drive the in-flight
//! request count used for idle detection.

use super::{HostLauncher, RenderHost};
use crate::cancel::{CancelToken, Deadline};
use crate::diagnostics::{BrowserEvent, Channel, DiagnosticsCollector, DiagnosticsLog};
use crate::{Error, RenderConfig, Result, Viewport};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Network::events::ResponseReceivedEventParams;
use headless_chrome::protocol::cdp::Network::{GetResponseBodyReturnObject, ResourceType};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CONSOLE_BINDING: &str = "__uishotConsole";

/// Tallest surface captured in one shot. Chrome refuses larger textures.
const MAX_CAPTURE_HEIGHT: f64 = 16_384.0;

const BRIDGE_SCRIPT: &str = r#"(function () {
  var bind = window.__uishotConsole;
  if (!bind) return;
  function text(a) {
    try {
      if (typeof a === 'string') return a;
      if (a instanceof Error) return a.stack || String(a);
      return JSON.stringify(a);
    } catch (e) {
      return String(a);
    }
  }
  ['log', 'info', 'warn', 'error', 'debug'].forEach(function (k) {
    var orig = console[k];
    console[k] = function () {
      var args = Array.prototype.slice.call(arguments);
      try { bind(JSON.stringify({ kind: 'console', level: k, args: args.map(text) })); } catch (e) {}
      try { orig.apply(console, args); } catch (e) {}
    };
  });
  window.addEventListener('error', function (e) {
    var msg = e && e.error && e.error.stack ? e.error.stack : String(e && e.message);
    try { bind(JSON.stringify({ kind: 'pageerror', message: msg })); } catch (_) {}
  });
  window.addEventListener('unhandledrejection', function (e) {
    var r = e && e.reason;
    try { bind(JSON.stringify({ kind: 'pageerror', message: 'Unhandled rejection: ' + String(r && r.stack ? r.stack : r) })); } catch (_) {}
  });
})();"#;

/// Launches [`CdpHost`] sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

impl HostLauncher for ChromeLauncher {
    fn launch(&self, config: &RenderConfig, collector: DiagnosticsCollector) -> Result<Box<dyn RenderHost>> {
        Ok(Box::new(CdpHost::launch(config, collector)?))
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

pub struct CdpHost {
    browser: Browser,
    tab: Arc<Tab>,
    viewport: Viewport,
    inflight: Arc<Mutex<HashMap<String, String>>>,
    log: DiagnosticsLog,
}

/// Region a full-page capture covers, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CaptureExtent {
    pub(crate) width: f64,
    pub(crate) height: f64,
    /// Document height before clamping, when it was too tall
    pub(crate) clamped_from: Option<f64>,
}

/// Never smaller than the viewport; never taller than one capture surface.
pub(crate) fn capture_extent(scroll_width: f64, scroll_height: f64, viewport: Viewport) -> CaptureExtent {
    let width = scroll_width.max(viewport.width as f64);
    let height = scroll_height.max(viewport.height as f64);
    if height > MAX_CAPTURE_HEIGHT {
        CaptureExtent { width, height: MAX_CAPTURE_HEIGHT, clamped_from: Some(height) }
    } else {
        CaptureExtent { width, height, clamped_from: None }
    }
}

fn resource_label(resource: &ResourceType) -> String {
    format!("{:?}", resource)
}

impl CdpHost {
    pub fn launch(config: &RenderConfig, collector: DiagnosticsCollector) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.chrome_path.clone())
            .idle_browser_timeout(Duration::from_millis(config.request_timeout_ms))
            .args(vec![
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--force-device-scale-factor=1"),
                OsStr::new("--hide-scrollbars"),
            ])
            .build()
            .map_err(|e| Error::CdpError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::CdpError(format!("Failed to launch browser: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| Error::CdpError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.navigation_timeout_ms));

        let inflight = Arc::new(Mutex::new(HashMap::new()));
        let log = collector.log().clone();
        attach_console_bridge(&tab, collector.clone())?;
        attach_network_listeners(&tab, collector, Arc::clone(&inflight))?;

        debug!("Chrome session ready ({}x{})", config.viewport.width, config.viewport.height);
        Ok(Self { browser, tab, viewport: config.viewport, inflight, log })
    }

    /// PNG of `clip`, or of the viewport when `None`. A clip may extend past
    /// the viewport.
    fn screenshot(&self, clip: Option<Page::Viewport>) -> Result<Vec<u8>> {
        let beyond = clip.is_some();
        let data = self
            .tab
            .call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Png),
                quality: None,
                clip,
                from_surface: Some(true),
                capture_beyond_viewport: Some(beyond),
                optimize_for_speed: None,
            })
            .map_err(|e| Error::CaptureError(format!("Screenshot failed: {}", e)))?
            .data;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::CaptureError(format!("Screenshot data is not base64: {}", e)))
    }
}

fn attach_console_bridge(tab: &Arc<Tab>, collector: DiagnosticsCollector) -> Result<()> {
    tab.expose_function(
        CONSOLE_BINDING,
        Arc::new(move |payload: serde_json::Value| {
            let msg = match payload.as_str() {
                Some(s) => serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.to_string())),
                None => payload,
            };
            match msg.get("kind").and_then(|k| k.as_str()) {
                Some("pageerror") => {
                    let message = msg.get("message").and_then(|m| m.as_str()).unwrap_or("").to_string();
                    collector.observe(BrowserEvent::PageError { message });
                }
                Some("console") => {
                    let level = msg.get("level").and_then(|l| l.as_str()).unwrap_or("log").to_string();
                    let text = msg
                        .get("args")
                        .and_then(|a| a.as_array())
                        .map(|args| {
                            args.iter()
                                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .unwrap_or_default();
                    collector.observe(BrowserEvent::Console { level, text });
                }
                _ => debug!("Ignoring unknown bridge payload {}", msg),
            }
        }),
    )
    .map_err(|e| Error::CdpError(format!("Failed to expose console binding: {}", e)))?;

    tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
        source: BRIDGE_SCRIPT.to_string(),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    })
    .map_err(|e| Error::CdpError(format!("Failed to inject console bridge: {}", e)))?;
    Ok(())
}

fn attach_network_listeners(
    tab: &Arc<Tab>,
    collector: DiagnosticsCollector,
    inflight: Arc<Mutex<HashMap<String, String>>>,
) -> Result<()> {
    // Registering a response handler also enables the Network domain.
    let responses = collector.clone();
    tab.register_response_handling(
        "uishot-diagnostics",
        Box::new(
            move |params: ResponseReceivedEventParams,
                  _body: &dyn Fn() -> std::result::Result<GetResponseBodyReturnObject, anyhow::Error>| {
                responses.observe(BrowserEvent::Response {
                    url: params.response.url.clone(),
                    status: params.response.status as u16,
                    resource_type: Some(resource_label(&params.Type)),
                });
            },
        ),
    )
    .map_err(|e| Error::CdpError(format!("Failed to enable network events: {}", e)))?;

    tab.add_event_listener(Arc::new(move |event: &Event| {
        let mut pending = inflight.lock().unwrap_or_else(|p| p.into_inner());
        match event {
            Event::NetworkRequestWillBeSent(e) => {
                pending.insert(e.params.request_id.clone(), e.params.request.url.clone());
                collector.observe(BrowserEvent::Request {
                    method: e.params.request.method.clone(),
                    url: e.params.request.url.clone(),
                });
            }
            Event::NetworkLoadingFinished(e) => {
                pending.remove(&e.params.request_id);
            }
            Event::NetworkLoadingFailed(e) => {
                let url = pending.remove(&e.params.request_id).unwrap_or_else(|| e.params.request_id.clone());
                collector.observe(BrowserEvent::RequestFailed {
                    url,
                    reason: e.params.error_text.clone(),
                });
            }
            _ => {}
        }
    }))
    .map_err(|e| Error::CdpError(format!("Failed to attach network listener: {}", e)))?;
    Ok(())
}

impl RenderHost for CdpHost {
    fn navigate(&mut self, url: &str, deadline: &Deadline, cancel: &CancelToken) -> Result<()> {
        deadline.check(cancel)?;
        self.tab.set_default_timeout(deadline.remaining().max(Duration::from_millis(1)));
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::NavigationError(format!("Navigation to {} failed: {}", url, e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::NavigationError(format!("Waiting for {} failed: {}", url, e)))?;
        deadline.check(cancel)
    }

    fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value> {
        // Objects come back as remote references; serialize in the page instead.
        let wrapped = format!("JSON.stringify(({}) ?? null)", expression);
        let result = self
            .tab
            .evaluate(&wrapped, false)
            .map_err(|e| Error::CdpError(format!("Evaluation failed: {}", e)))?;
        match result.value {
            Some(serde_json::Value::String(json)) => {
                serde_json::from_str(&json).map_err(|e| Error::CdpError(format!("Bad evaluation result: {}", e)))
            }
            Some(other) => Ok(other),
            None => Ok(serde_json::Value::Null),
        }
    }

    fn inflight_requests(&self) -> usize {
        self.inflight.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn capture_full_page(&mut self) -> Result<Vec<u8>> {
        let dims = self.evaluate(
            "({ width: Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0), \
               height: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0) })",
        )?;
        let extent = capture_extent(
            dims.get("width").and_then(|w| w.as_f64()).unwrap_or(0.0),
            dims.get("height").and_then(|h| h.as_f64()).unwrap_or(0.0),
            self.viewport,
        );
        if let Some(full) = extent.clamped_from {
            self.log.warn(
                Channel::Lifecycle,
                format!("Page is {}px tall; capture truncated to {}px", full, extent.height),
            );
        }

        // Clip past the viewport instead of resizing the window, so `vh`
        // units keep resolving against the configured viewport.
        debug!("Capturing {}x{} beyond the viewport", extent.width, extent.height);
        self.screenshot(Some(Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width,
            height: extent.height,
            scale: 1.0,
        }))
    }

    fn capture_viewport(&mut self) -> Result<Vec<u8>> {
        self.screenshot(None)
    }

    fn render_html(&mut self, html: &str, deadline: &Deadline, cancel: &CancelToken) -> Result<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(html);
        self.navigate(&format!("data:text/html;charset=utf-8;base64,{}", encoded), deadline, cancel)
    }

    fn close(self: Box<Self>) -> Result<()> {
        let CdpHost { browser, tab, .. } = *self;
        if let Err(e) = tab.close(true) {
            warn!("Failed to close tab cleanly: {}", e);
        }
        drop(tab);
        drop(browser);
        Ok(())
    }
}
