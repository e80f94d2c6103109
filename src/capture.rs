//! Screenshot capturer.

use crate::assemble::ROOT_ID;
use crate::diagnostics::{Channel, DiagnosticsLog};
use crate::host::RenderHost;
use crate::request::ArtifactPaths;
use crate::{Error, Result};
use log::debug;
use std::path::Path;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.len() > PNG_MAGIC.len() && bytes.starts_with(PNG_MAGIC)
}

/// Save the rendered DOM and the mount point's markup next to the artifact.
/// Failures are recorded as warnings.
pub fn save_dom_snapshots(host: &mut dyn RenderHost, paths: &ArtifactPaths, log: &DiagnosticsLog) {
    let root_query = format!(
        "(function () {{ var r = document.getElementById('{}'); return r ? r.innerHTML : 'N/A'; }})()",
        ROOT_ID
    );
    let snapshots = [
        ("document.documentElement.outerHTML", &paths.final_dom, "rendered DOM"),
        (root_query.as_str(), &paths.root_html, "mount point markup"),
    ];
    for (expression, path, what) in snapshots {
        let saved = host
            .evaluate(expression)
            .and_then(|v| {
                let text = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                std::fs::write(path, text).map_err(Error::from)
            });
        match saved {
            Ok(()) => log.debug(Channel::Lifecycle, format!("Saved {} to {}", what, path.display())),
            Err(e) => log.warn(Channel::Lifecycle, format!("Could not save {}: {}", what, e)),
        }
    }
}

/// Write PNG bytes through a temporary sibling so a reader never sees a
/// partial file.
pub fn write_png(path: &Path, bytes: &[u8]) -> Result<()> {
    if !is_png(bytes) {
        return Err(Error::CaptureError(format!("refusing to write {} bytes that are not a PNG", bytes.len())));
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::CaptureError(format!("{} has no file name", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.partial", name));
    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Capture the full rendered surface to `path`. Returns the PNG size.
pub fn capture_to(host: &mut dyn RenderHost, path: &Path) -> Result<usize> {
    let bytes = host.capture_full_page()?;
    if bytes.is_empty() {
        return Err(Error::CaptureError("screenshot produced no bytes".into()));
    }
    write_png(path, &bytes)?;
    debug!("Wrote {} byte screenshot to {}", bytes.len(), path.display());
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        crate::raster::render_placeholder(64, 64, "x", &[]).unwrap()
    }

    #[test]
    fn writes_only_png_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("shot.png");
        assert!(matches!(write_png(&out, b"not a png"), Err(Error::CaptureError(_))));
        assert!(!out.exists());

        write_png(&out, &tiny_png()).unwrap();
        assert!(is_png(&std::fs::read(&out).unwrap()));
        assert!(!dir.path().join(".shot.png.partial").exists());
    }
}
