use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uishot::assemble::{assemble_document, CompiledUnit, DocumentOptions};
use uishot::markup::{compile_markup, MarkupOptions};
use uishot::style::compile_style;

const MARKUP: &str = include_str!("../tests/goldens/markup/landing.jsx");
const STYLE: &str = include_str!("../tests/goldens/styles/card.scss");

fn bench_compile_markup(c: &mut Criterion) {
    let options = MarkupOptions::default();
    c.bench_function("compile_markup_landing", |b| {
        b.iter(|| compile_markup(black_box(MARKUP), None, &options).unwrap())
    });
}

fn bench_compile_style(c: &mut Criterion) {
    c.bench_function("compile_style_card", |b| b.iter(|| compile_style(black_box(Some(STYLE)))));
}

fn bench_assemble(c: &mut Criterion) {
    let compiled = compile_markup(MARKUP, None, &MarkupOptions::default()).unwrap();
    let unit = CompiledUnit { css: compile_style(Some(STYLE)).css, script: compiled.script, entry: compiled.entry };
    let options = DocumentOptions {
        runtime_scripts: uishot::DEFAULT_RUNTIME_SCRIPTS.iter().map(|s| s.to_string()).collect(),
        page_background: None,
    };
    c.bench_function("assemble_document", |b| b.iter(|| assemble_document(black_box(&unit), &options)));
}

criterion_group!(benches, bench_compile_markup, bench_compile_style, bench_assemble);
criterion_main!(benches);
