//! Asset path rewriting shared by the style and markup compilers.
//!
//! Sources reference images relative to their original project layout
//! (`../img/banner.png`). The content server exposes the same files under the
//! request directory's `assets/` folder, so both compilers canonicalize the
//! reference to `./assets/banner.png` before compiling.

use std::borrow::Cow;

/// Prefix used by sources for image references.
pub const SOURCE_ASSET_PREFIX: &str = "../img/";

/// Prefix the content server resolves against the request directory.
pub const SERVED_ASSET_PREFIX: &str = "./assets/";

/// Rewrite every `../img/` reference to the served `./assets/` convention.
pub fn rewrite_asset_paths(source: &str) -> Cow<'_, str> {
    if source.contains(SOURCE_ASSET_PREFIX) {
        Cow::Owned(source.replace(SOURCE_ASSET_PREFIX, SERVED_ASSET_PREFIX))
    } else {
        Cow::Borrowed(source)
    }
}

/// URL path (relative to the server root) for a rewritten asset reference.
///
/// Returns `None` when `reference` does not use the served convention.
pub fn served_url_path(reference: &str) -> Option<String> {
    reference
        .strip_prefix(SERVED_ASSET_PREFIX)
        .map(|rest| format!("/assets/{}", rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_all_occurrences() {
        let src = r#"url("../img/a.png") url('../img/b/c.jpg')"#;
        assert_eq!(
            rewrite_asset_paths(src),
            r#"url("./assets/a.png") url('./assets/b/c.jpg')"#
        );
    }

    #[test]
    fn leaves_other_paths_untouched() {
        let src = "../images/a.png ./img/b.png";
        assert!(matches!(rewrite_asset_paths(src), Cow::Borrowed(_)));
    }

    #[test]
    fn maps_served_reference_to_url_path() {
        assert_eq!(served_url_path("./assets/foo.png").as_deref(), Some("/assets/foo.png"));
        assert_eq!(served_url_path("../img/foo.png"), None);
    }
}
