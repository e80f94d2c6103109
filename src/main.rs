use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use uishot::{EncodedRequest, Pipeline, RenderConfig, RenderStatus};

/// Render a base64-encoded JSX component and SCSS stylesheet to a PNG.
///
/// Exit codes: 0 success, 1 input could not be decoded or compiled,
/// 2 rendering failed. A PNG and a log are written in every case.
#[derive(Parser, Debug)]
#[command(name = "uishot", version, about)]
struct Cli {
    /// Screenshot path; logs and debug artifacts are written next to it
    output: PathBuf,

    /// Base64-encoded JSX source
    markup: String,

    /// Base64-encoded SCSS source (empty for none)
    #[arg(default_value = "")]
    style: String,

    /// Entry component name, overriding inference
    #[arg(long)]
    entry: Option<String>,

    /// Content server port (0 picks a free one)
    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Delay after network idle before capturing
    #[arg(long = "settle-ms")]
    settle_ms: Option<u64>,

    /// Overall budget for the request
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Chrome executable
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Disable the Chrome sandbox (containers without user namespaces)
    #[arg(long)]
    no_sandbox: bool,

    /// UI runtime script URL, repeatable; replaces the default React bundles
    #[arg(long = "runtime-script")]
    runtime_script: Vec<String>,

    /// Skip received/compiled sources and DOM snapshots
    #[arg(long)]
    no_debug_artifacts: bool,
}

impl Cli {
    fn config(&self) -> RenderConfig {
        let mut config = RenderConfig::default();
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(width) = self.width {
            config.viewport.width = width;
        }
        if let Some(height) = self.height {
            config.viewport.height = height;
        }
        if let Some(settle) = self.settle_ms {
            config.settle_delay_ms = settle;
        }
        if let Some(timeout) = self.timeout_ms {
            config.request_timeout_ms = timeout;
        }
        config.chrome_path = self.chrome.clone();
        config.sandbox = !self.no_sandbox;
        if !self.runtime_script.is_empty() {
            config.runtime_scripts = self.runtime_script.clone();
        }
        config.write_debug_artifacts = !self.no_debug_artifacts;
        config
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.config();
    if !config.sandbox {
        warn!("Chrome sandbox disabled");
    }

    let mut request = EncodedRequest::new(&cli.output, cli.markup, cli.style);
    request.entry_point = cli.entry;

    let pipeline = Pipeline::with_chrome(config);
    let outcome = pipeline.run_encoded(&request);

    match outcome.status {
        RenderStatus::Success => info!(
            "Rendered {} in {}ms",
            outcome.screenshot_path.display(),
            outcome.duration_ms
        ),
        RenderStatus::Failure => error!(
            "{}: {} (fallback image at {}, log at {})",
            outcome.error_kind.map(|k| k.to_string()).unwrap_or_default(),
            outcome.error_message.as_deref().unwrap_or("unknown error"),
            outcome.screenshot_path.display(),
            outcome.log_path.display()
        ),
    }
    std::process::exit(outcome.exit_code());
}
