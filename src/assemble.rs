//! Content assembler: one self-contained HTML document per request.

use crate::markup::{EntryPoint, REGISTRY_GLOBAL};
use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(script)").expect("script close pattern is valid"));
static STYLE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(style)").expect("style close pattern is valid"));

/// Id of the mount point element.
pub const ROOT_ID: &str = "root";
/// Id of the `<style>` block holding the compiled CSS.
pub const STYLE_ID: &str = "generated-style";
/// Global the bootstrap sets once mounting has settled.
pub const READY_GLOBAL: &str = "__uishotReady";

/// Compiled output of both compilers.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub css: String,
    pub script: String,
    pub entry: EntryPoint,
}

/// Page-level knobs that do not depend on the request.
#[derive(Debug, Clone, Default)]
pub struct DocumentOptions {
    /// UI runtime scripts loaded in order before the compiled script
    pub runtime_scripts: Vec<String>,
    /// Optional body background image, relative to the served root
    pub page_background: Option<String>,
}

/// Build the HTML document for `unit`.
pub fn assemble_document(unit: &CompiledUnit, options: &DocumentOptions) -> String {
    let mut html = String::with_capacity(unit.css.len() + unit.script.len() + 4096);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    html.push_str("<title>Generated Page</title>\n");
    for src in &options.runtime_scripts {
        html.push_str(&format!("<script crossorigin src=\"{}\"></script>\n", escape_attr(src)));
    }

    html.push_str(&format!("<style id=\"{}\">\n", STYLE_ID));
    html.push_str("html, body { height: 100%; min-height: 100vh; margin: 0; padding: 0; }\n");
    if let Some(bg) = &options.page_background {
        html.push_str(&format!(
            "body {{ background-image: url(\"{}\"); background-size: cover; background-position: center; background-repeat: no-repeat; }}\n",
            bg.replace('"', "%22")
        ));
    }
    html.push_str(&escape_style(&unit.css));
    html.push_str("\n</style>\n</head>\n<body>\n");
    html.push_str(&format!("<div id=\"{}\" style=\"min-height: 100vh;\"></div>\n", ROOT_ID));

    html.push_str("<script>\n");
    html.push_str(&registry_script());
    html.push_str("</script>\n<script>\n");
    html.push_str(&escape_script(&unit.script));
    html.push_str("</script>\n<script>\n");
    html.push_str(&bootstrap_script(&unit.entry.name));
    html.push_str("</script>\n</body>\n</html>\n");
    html
}

/// Escape `</script` so compiled code cannot end its block early.
pub fn escape_script(code: &str) -> String {
    SCRIPT_CLOSE.replace_all(code, "<\\/$1").into_owned()
}

pub fn escape_style(css: &str) -> String {
    STYLE_CLOSE.replace_all(css, "<\\/$1").into_owned()
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;").replace('>', "&gt;")
}

fn registry_script() -> String {
    format!(
        r#"window.{registry} = {{
  name: null,
  entry: undefined,
  loadError: null,
  register: function (component, name) {{
    this.name = name;
    this.entry = component;
    if (component !== undefined) {{ window[name] = component; }}
  }}
}};
window.addEventListener('error', function (e) {{
  var reg = window.{registry};
  if (reg && !reg.loadError) {{ reg.loadError = e && e.error && e.error.stack ? e.error.stack : String(e && e.message); }}
}});
"#,
        registry = REGISTRY_GLOBAL
    )
}

fn bootstrap_script(entry_name: &str) -> String {
    let name = serde_json::to_string(entry_name).unwrap_or_else(|_| "\"App\"".to_string());
    format!(
        r#"(function () {{
  var root = document.getElementById('{root}');
  function ready(status, message) {{
    var publish = function () {{ window.{ready} = {{ status: status, message: message || null }}; }};
    if (window.requestAnimationFrame) {{
      requestAnimationFrame(function () {{ requestAnimationFrame(publish); }});
    }} else {{
      setTimeout(publish, 0);
    }}
  }}
  function fail(status, message) {{
    root.textContent = message;
    root.style.color = 'red';
    root.style.padding = '20px';
    root.style.whiteSpace = 'pre-wrap';
    console.error(message);
    ready(status, message);
  }}
  var registry = window.{registry} || {{}};
  var Component = registry.entry;
  if (Component === undefined || Component === null) {{
    if (registry.loadError) {{
      fail('error', 'Script error: ' + registry.loadError);
    }} else {{
      fail('missing', 'Component not found: ' + (registry.name || {name}) + ' is not defined');
    }}
    return;
  }}
  if (typeof React === 'undefined' || typeof ReactDOM === 'undefined') {{
    fail('error', 'UI runtime failed to load');
    return;
  }}
  try {{
    var element = React.createElement(Component);
    if (ReactDOM.createRoot) {{
      var app = ReactDOM.createRoot(root);
      if (ReactDOM.flushSync) {{
        ReactDOM.flushSync(function () {{ app.render(element); }});
      }} else {{
        app.render(element);
      }}
    }} else {{
      ReactDOM.render(element, root);
    }}
    ready('mounted');
  }} catch (e) {{
    fail('error', 'Error rendering component: ' + (e && e.message ? e.message : String(e)));
  }}
}})();
"#,
        root = ROOT_ID,
        ready = READY_GLOBAL,
        registry = REGISTRY_GLOBAL,
        name = name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::EntrySource;

    fn unit(css: &str, script: &str) -> CompiledUnit {
        CompiledUnit {
            css: css.to_string(),
            script: script.to_string(),
            entry: EntryPoint { name: "HomePage".into(), source: EntrySource::Declaration },
        }
    }

    #[test]
    fn document_has_style_root_and_scripts_in_order() {
        let opts = DocumentOptions {
            runtime_scripts: vec!["https://cdn.test/react.js".into(), "https://cdn.test/react-dom.js".into()],
            page_background: None,
        };
        let html = assemble_document(&unit(".title { font-size: 24px; }", "var x = 1;"), &opts);

        let react = html.find("react.js").unwrap();
        let style = html.find("<style id=\"generated-style\">").unwrap();
        let root = html.find("<div id=\"root\"").unwrap();
        let user = html.find("var x = 1;").unwrap();
        let boot = html.find("Component not found").unwrap();
        assert!(react < style && style < root && root < user && user < boot);
        assert!(html.contains(".title { font-size: 24px; }"));
        assert!(html.contains("window.__uishotReady"));
    }

    #[test]
    fn closing_tags_inside_content_are_escaped() {
        let html = assemble_document(
            &unit(".a::after { content: \"</style>\"; }", "var s = '</SCRIPT>';"),
            &DocumentOptions::default(),
        );
        assert!(html.contains("var s = '<\\/SCRIPT>';"));
        assert!(html.contains("content: \"<\\/style>\""));
        assert_eq!(html.matches("</style>").count(), 1);
    }

    #[test]
    fn background_is_optional() {
        let plain = assemble_document(&unit("", ""), &DocumentOptions::default());
        assert!(!plain.contains("background-image"));

        let opts = DocumentOptions { page_background: Some("./assets/bg.jpg".into()), ..Default::default() };
        let html = assemble_document(&unit("", ""), &opts);
        assert!(html.contains("background-image: url(\"./assets/bg.jpg\")"));
    }

    #[test]
    fn runtime_urls_are_attribute_escaped() {
        let opts = DocumentOptions { runtime_scripts: vec!["a.js?x=1&y=\"2\"".into()], ..Default::default() };
        let html = assemble_document(&unit("", ""), &opts);
        assert!(html.contains("src=\"a.js?x=1&amp;y=&quot;2&quot;\""));
    }
}
