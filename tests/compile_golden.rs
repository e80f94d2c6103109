//! Compiler output goldens. Run with `UPDATE_GOLDENS=1` to (re)write them.

use std::fs;
use std::path::{Path, PathBuf};
use uishot::markup::{compile_markup, declarations, EntrySource, MarkupOptions};
use uishot::style::compile_style;

fn fixtures(dir: &str, ext: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(Path::new("tests/goldens").join(dir))
        .expect("read fixtures")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
        .collect();
    files.sort();
    files
}

fn expected_path(fixture: &Path, ext: &str) -> PathBuf {
    let name = fixture.file_stem().and_then(|s| s.to_str()).unwrap_or("fixture");
    PathBuf::from("tests/goldens/expected").join(format!("{}.{}", name, ext))
}

/// Compare against the stored golden, or write it when updating.
fn check_golden(path: &Path, actual: &str) {
    if std::env::var("UPDATE_GOLDENS").is_ok() {
        fs::create_dir_all("tests/goldens/expected").ok();
        fs::write(path, actual).expect("write golden");
        println!("Updated golden: {:?}", path);
        return;
    }

    let expected = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("missing golden {:?} ({}); run with UPDATE_GOLDENS=1 to create it", path, e));
    assert_eq!(actual, expected, "output differs from {:?}", path);
}

#[test]
fn markup_goldens() {
    let files = fixtures("markup", "jsx");
    assert!(!files.is_empty());
    for fixture in files {
        let source = fs::read_to_string(&fixture).unwrap();
        let compiled = compile_markup(&source, None, &MarkupOptions::default())
            .unwrap_or_else(|e| panic!("{:?} failed to compile: {}", fixture, e));

        assert!(!compiled.script.contains("import "), "{:?} kept an import", fixture);
        assert!(!compiled.script.contains("export "), "{:?} kept an export", fixture);
        assert!(!compiled.script.contains("../img/"), "{:?} kept a source asset path", fixture);
        assert_eq!(compiled.script.matches(".register(").count(), 1);

        check_golden(&expected_path(&fixture, "js"), &compiled.script);
    }
}

#[test]
fn every_fixture_has_a_committed_golden() {
    for (dir, ext, golden) in [("markup", "jsx", "js"), ("styles", "scss", "css")] {
        for fixture in fixtures(dir, ext) {
            let path = expected_path(&fixture, golden);
            assert!(path.exists(), "no golden committed for {:?}", fixture);
        }
    }
}

#[test]
fn landing_page_entry_inference_and_override() {
    let source = fs::read_to_string("tests/goldens/markup/landing.jsx").unwrap();

    // inference takes the first capitalized function
    let inferred = compile_markup(&source, None, &MarkupOptions::default()).unwrap();
    assert_eq!(inferred.entry.name, "FeatureList");
    assert_eq!(inferred.entry.source, EntrySource::Declaration);

    let compiled = compile_markup(&source, Some("Landing"), &MarkupOptions::default()).unwrap();
    assert_eq!(compiled.entry.name, "Landing");
    assert_eq!(compiled.entry.source, EntrySource::Explicit);
    assert!(compiled.script.contains("register(typeof Landing"));
    assert!(compiled.script.contains("React.Fragment"));
    assert!(compiled.script.contains("./assets/hero.png"));

    let names: Vec<String> = declarations(&compiled.script)
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    // everything is nested inside the registering function scope
    assert!(names.is_empty(), "{:?}", names);
}

#[test]
fn anonymous_default_export_binds_default_name() {
    let source = fs::read_to_string("tests/goldens/markup/anonymous_default.jsx").unwrap();
    let compiled = compile_markup(&source, None, &MarkupOptions::default()).unwrap();
    assert_eq!(compiled.entry.name, "App");
    assert_ne!(compiled.entry.source, EntrySource::Default);
    assert!(compiled.script.contains("const App = "));
    assert!(compiled.script.contains("\"Multi-line text\""));
}

#[test]
fn style_goldens() {
    for fixture in fixtures("styles", "scss") {
        let source = fs::read_to_string(&fixture).unwrap();
        let compiled = compile_style(Some(&source));
        assert!(!compiled.failed(), "{:?}: {:?}", fixture, compiled.error);
        assert!(!compiled.css.contains("dx"), "{:?} kept a dx unit", fixture);
        assert!(!compiled.css.contains("$"), "{:?} kept a variable", fixture);

        check_golden(&expected_path(&fixture, "css"), &compiled.css);
    }
}

#[test]
fn card_style_flattens_and_rewrites() {
    let source = fs::read_to_string("tests/goldens/styles/card.scss").unwrap();
    let css = compile_style(Some(&source)).css;
    assert!(css.contains("border-radius: 8px"), "{}", css);
    assert!(css.contains("padding: 12px 16px"), "{}", css);
    assert!(css.contains(".card .title:hover"), "{}", css);
    assert!(css.contains("./assets/card.png"), "{}", css);
}
