//! End-to-end renders through headless Chrome.
//!
//! Ignored by default: they need a local Chrome and network access to the
//! React bundles. Run with `cargo test --test chrome_e2e -- --ignored`.

#![cfg(feature = "cdp")]

use scraper::{Html, Selector};
use std::fs;
use uishot::{ErrorKind, Pipeline, RenderConfig, RenderRequest, RenderStatus};

fn config() -> RenderConfig {
    RenderConfig {
        port: 0,
        settle_delay_ms: 500,
        sandbox: std::env::var("UISHOT_NO_SANDBOX").is_err(),
        ..Default::default()
    }
}

#[test]
#[ignore]
fn renders_title_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("item_001/rendered_screenshot.png");
    let markup = r#"
export default function App() {
  return <div className="app"><div className="title">Hello</div></div>;
}
"#;
    let request = RenderRequest::new(&out, markup).unwrap().with_style(".title { font-size: 24dx; }");
    let outcome = Pipeline::with_chrome(config()).run(&request);

    assert_eq!(outcome.status, RenderStatus::Success, "{:?}", outcome.error_message);
    assert!(fs::metadata(&out).unwrap().len() > 0);

    let paths = request.artifacts();
    let css = fs::read_to_string(&paths.compiled_style).unwrap();
    assert!(css.contains("font-size: 24px"), "{}", css);

    let dom = Html::parse_document(&fs::read_to_string(&paths.final_dom).unwrap());
    let title = Selector::parse("#root .app .title").unwrap();
    let texts: Vec<String> = dom.select(&title).map(|e| e.text().collect()).collect();
    assert_eq!(texts, vec!["Hello".to_string()]);

    let style = Selector::parse("style#generated-style").unwrap();
    assert_eq!(dom.select(&style).count(), 1);
}

#[test]
#[ignore]
fn missing_asset_is_logged_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("shot.png");
    let markup = r#"const App = () => <img src="../img/missing.png" alt="x" />;"#;
    let outcome = Pipeline::with_chrome(config()).run(&RenderRequest::new(&out, markup).unwrap());

    assert!(outcome.is_success(), "{:?}", outcome.error_message);
    let log = fs::read_to_string(&outcome.log_path).unwrap();
    assert!(log.contains("404"), "{}", log);
}

#[test]
#[ignore]
fn markup_error_renders_error_page() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("shot.png");
    let outcome = Pipeline::with_chrome(config()).run(&RenderRequest::new(&out, "const App = () => <div>").unwrap());

    assert_eq!(outcome.error_kind, Some(ErrorKind::MarkupCompileError));
    assert!(fs::metadata(&out).unwrap().len() > 0);
}
