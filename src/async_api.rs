use crate::host::HostLauncher;
use crate::{CancelToken, EncodedRequest, Error, Pipeline, RenderConfig, RenderOutcome, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::thread;
use tokio::sync::{oneshot, Semaphore};

/// An async-friendly batch renderer backed by one worker thread per request.
///
/// Every request gets its own pipeline, its own ephemeral server port and its
/// own browser session, so concurrent renders never share assets or ports.
/// At most `concurrency` requests run at once.
#[derive(Clone)]
pub struct RenderService {
    config: RenderConfig,
    launcher: Arc<dyn HostLauncher>,
    permits: Arc<Semaphore>,
    cancel: CancelToken,
}

impl RenderService {
    /// One concurrent render per CPU.
    pub fn new(config: RenderConfig, launcher: Arc<dyn HostLauncher>) -> Self {
        Self::with_concurrency(config, launcher, num_cpus::get())
    }

    pub fn with_concurrency(config: RenderConfig, launcher: Arc<dyn HostLauncher>, concurrency: usize) -> Self {
        Self {
            config,
            launcher,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            cancel: CancelToken::new(),
        }
    }

    #[cfg(feature = "cdp")]
    pub fn with_chrome(config: RenderConfig) -> Self {
        Self::new(config, Arc::new(crate::host::cdp::ChromeLauncher))
    }

    /// Abort every in-flight and queued render. Each still ends with a
    /// fallback artifact.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Render one request on a dedicated worker thread.
    pub async fn render(&self, request: EncodedRequest) -> Result<RenderOutcome> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("Render service closed: {}", e)))?;

        let mut config = self.config.clone();
        config.port = 0;
        let launcher = self.launcher.clone();
        let cancel = self.cancel.clone();
        let (tx, rx) = oneshot::channel();

        thread::Builder::new()
            .name("uishot-render".into())
            .spawn(move || {
                let pipeline = Pipeline::new(config, launcher).with_cancel_token(cancel);
                let outcome = pipeline.run_encoded(&request);
                // Receiver gone means the caller stopped waiting
                let _ = tx.send(outcome);
            })?;

        rx.await
            .map_err(|e| Error::Other(format!("Render worker exited: {}", e)))
    }

    /// Render all requests, preserving input order in the result.
    pub async fn render_batch(&self, requests: Vec<EncodedRequest>) -> Vec<Result<RenderOutcome>> {
        join_all(requests.into_iter().map(|request| self.render(request))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticsCollector;
    use crate::host::RenderHost;
    use crate::report::FallbackKind;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    struct NoBrowser;

    impl HostLauncher for NoBrowser {
        fn launch(&self, _: &RenderConfig, _: DiagnosticsCollector) -> Result<Box<dyn RenderHost>> {
            Err(Error::CdpError("no browser available".into()))
        }

        fn name(&self) -> &str {
            "none"
        }
    }

    #[tokio::test]
    async fn batch_renders_each_request_independently() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig { settle_delay_ms: 0, ..Default::default() };
        let service = RenderService::with_concurrency(config, Arc::new(NoBrowser), 2);

        let requests = (0..3)
            .map(|i| {
                EncodedRequest::new(
                    dir.path().join(format!("item_{:03}/shot.png", i)),
                    STANDARD.encode("const App = () => <div>Hi</div>;"),
                    "",
                )
            })
            .collect();
        let outcomes = service.render_batch(requests).await;

        assert_eq!(outcomes.len(), 3);
        for (i, outcome) in outcomes.into_iter().enumerate() {
            let outcome = outcome.unwrap();
            assert!(!outcome.is_success());
            assert_eq!(outcome.fallback, Some(FallbackKind::Placeholder));
            assert_eq!(outcome.screenshot_path, dir.path().join(format!("item_{:03}/shot.png", i)));
            assert!(outcome.screenshot_path.is_file());
            assert!(outcome.log_path.is_file());
        }
    }
}
