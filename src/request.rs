//! Render requests: decoding CLI input and deriving per-request artifact paths.

use crate::{Error, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as Base64Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

// Inputs arrive from shell scripts that sometimes drop the padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

/// Raw CLI input before decoding.
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub output_path: PathBuf,
    pub markup_base64: String,
    /// Empty string means "no stylesheet"
    pub style_base64: String,
    pub entry_point: Option<String>,
}

impl EncodedRequest {
    pub fn new(output_path: impl Into<PathBuf>, markup_base64: impl Into<String>, style_base64: impl Into<String>) -> Self {
        Self {
            output_path: output_path.into(),
            markup_base64: markup_base64.into(),
            style_base64: style_base64.into(),
            entry_point: None,
        }
    }

    /// Decode both sources into a validated [`RenderRequest`].
    pub fn decode(&self) -> Result<RenderRequest> {
        let markup = decode_source("markup", &self.markup_base64)?;
        let style = if self.style_base64.trim().is_empty() {
            None
        } else {
            Some(decode_source("style", &self.style_base64)?)
        };

        let mut request = RenderRequest::new(&self.output_path, markup)?;
        if let Some(style) = style {
            request = request.with_style(style);
        }
        if let Some(entry) = &self.entry_point {
            request = request.with_entry_point(entry)?;
        }
        Ok(request)
    }
}

fn decode_source(label: &str, encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = LENIENT_BASE64
        .decode(compact.as_bytes())
        .map_err(|e| Error::DecodeError(format!("{} is not valid base64: {}", label, e)))?;
    String::from_utf8(bytes).map_err(|e| Error::DecodeError(format!("{} is not valid UTF-8: {}", label, e)))
}

/// One render invocation. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    output_path: PathBuf,
    markup_source: String,
    style_source: Option<String>,
    entry_point: Option<String>,
}

impl RenderRequest {
    /// Create a request, checking that the markup is non-empty and that the
    /// output directory exists (it is created when missing).
    pub fn new(output_path: impl AsRef<Path>, markup_source: impl Into<String>) -> Result<Self> {
        let markup_source = markup_source.into();
        if markup_source.trim().is_empty() {
            return Err(Error::DecodeError("markup source is empty".into()));
        }

        let output_path = output_path.as_ref().to_path_buf();
        if output_path.file_name().is_none() {
            return Err(Error::ConfigError(format!(
                "output path {} does not name a file",
                output_path.display()
            )));
        }
        ensure_parent_dir(&output_path)?;

        Ok(Self { output_path, markup_source, style_source: None, entry_point: None })
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        let style = style.into();
        self.style_source = if style.is_empty() { None } else { Some(style) };
        self
    }

    /// Name the entry component explicitly instead of inferring it.
    pub fn with_entry_point(mut self, name: &str) -> Result<Self> {
        if !IDENTIFIER.is_match(name) {
            return Err(Error::DecodeError(format!("entry point {:?} is not an identifier", name)));
        }
        self.entry_point = Some(name.to_string());
        Ok(self)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn markup_source(&self) -> &str {
        &self.markup_source
    }

    pub fn style_source(&self) -> Option<&str> {
        self.style_source.as_deref()
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    pub fn artifacts(&self) -> ArtifactPaths {
        ArtifactPaths::for_output(&self.output_path)
    }

    /// SHA-256 over both sources, so the dataset builder can pair the
    /// screenshot with the exact input that produced it.
    pub fn source_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.markup_source.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.style_source.as_deref().unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Make sure the directory that will hold the artifact exists.
pub fn ensure_parent_dir(output_path: &Path) -> Result<()> {
    match output_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Every file a request writes, derived from the output artifact path.
///
/// For `out/item_001/rendered_screenshot.png` the stem is
/// `rendered_screenshot` and all siblings live in `out/item_001/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub stem: String,
    pub screenshot: PathBuf,
    pub log: PathBuf,
    pub error_log: PathBuf,
    pub received_markup: PathBuf,
    pub compiled_script: PathBuf,
    pub received_style: PathBuf,
    pub compiled_style: PathBuf,
    pub served_page: PathBuf,
    pub final_dom: PathBuf,
    pub root_html: PathBuf,
    pub outcome: PathBuf,
}

impl ArtifactPaths {
    pub fn for_output(output_path: &Path) -> Self {
        let dir = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "render".to_string());
        let sibling = |suffix: &str| dir.join(format!("{}_{}", stem, suffix));

        Self {
            screenshot: output_path.to_path_buf(),
            log: sibling("browser_log.txt"),
            error_log: sibling("error_log.txt"),
            received_markup: sibling("received_code.jsx"),
            compiled_script: sibling("compiled_code.js"),
            received_style: sibling("received_style.scss"),
            compiled_style: sibling("compiled_style.css"),
            served_page: sibling("served_page.html"),
            final_dom: sibling("final_rendered_dom.html"),
            root_html: sibling("root_inner_html.html"),
            outcome: sibling("outcome.json"),
            dir,
            stem,
        }
    }

    /// File name of the assembled document, relative to the server root.
    pub fn served_page_name(&self) -> String {
        format!("{}_served_page.html", self.stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn decodes_markup_and_optional_style() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("shot.png");
        let req = EncodedRequest::new(&out, STANDARD.encode("const App = () => null;"), "");
        let decoded = req.decode().unwrap();
        assert_eq!(decoded.markup_source(), "const App = () => null;");
        assert!(decoded.style_source().is_none());

        let req = EncodedRequest::new(&out, STANDARD.encode("x"), STANDARD.encode(".a { color: red; }"));
        assert_eq!(req.decode().unwrap().style_source(), Some(".a { color: red; }"));
    }

    #[test]
    fn accepts_unpadded_and_wrapped_base64() {
        let dir = tempfile::tempdir().unwrap();
        let encoded = STANDARD.encode("function App() {}");
        let unpadded = encoded.trim_end_matches('=').to_string();
        let wrapped = format!("{}\n{}", &unpadded[..4], &unpadded[4..]);
        let req = EncodedRequest::new(dir.path().join("a.png"), wrapped, "");
        assert_eq!(req.decode().unwrap().markup_source(), "function App() {}");
    }

    #[test]
    fn rejects_malformed_input() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.png");
        let err = EncodedRequest::new(&out, "!!not base64!!", "").decode().unwrap_err();
        assert!(matches!(err, Error::DecodeError(_)));

        let err = EncodedRequest::new(&out, STANDARD.encode([0xffu8, 0xfe]), "").decode().unwrap_err();
        assert!(matches!(err, Error::DecodeError(_)));

        let err = EncodedRequest::new(&out, STANDARD.encode("   "), "").decode().unwrap_err();
        assert!(matches!(err, Error::DecodeError(_)));
    }

    #[test]
    fn entry_point_must_be_an_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let req = RenderRequest::new(dir.path().join("a.png"), "x").unwrap();
        assert!(req.clone().with_entry_point("HomePage").is_ok());
        assert!(req.with_entry_point("x; alert(1)").is_err());
    }

    #[test]
    fn creates_missing_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/item_001/shot.png");
        RenderRequest::new(&out, "x").unwrap();
        assert!(out.parent().unwrap().is_dir());
    }

    #[test]
    fn artifact_paths_share_the_stem() {
        let paths = ArtifactPaths::for_output(Path::new("data/item_001/rendered_screenshot.png"));
        assert_eq!(paths.dir, PathBuf::from("data/item_001"));
        assert_eq!(paths.log, PathBuf::from("data/item_001/rendered_screenshot_browser_log.txt"));
        assert_eq!(paths.error_log, PathBuf::from("data/item_001/rendered_screenshot_error_log.txt"));
        assert_eq!(paths.served_page_name(), "rendered_screenshot_served_page.html");
    }

    #[test]
    fn digest_depends_on_both_sources() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a.png");
        let a = RenderRequest::new(&out, "x").unwrap();
        let b = RenderRequest::new(&out, "x").unwrap().with_style(".a{}");
        assert_ne!(a.source_digest(), b.source_digest());
        assert_eq!(a.source_digest().len(), 64);
    }
}
