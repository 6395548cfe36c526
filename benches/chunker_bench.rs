use agentweb::chunker::{chunk_page, find_relevant, ChunkOptions};
use agentweb::lite::extract_page_record;
use agentweb::page::BackendTag;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

fn sample_html(paragraphs: usize) -> String {
    let mut body = String::from("<main><h1>Benchmark Page</h1>");
    for i in 0..paragraphs {
        body.push_str(&format!(
            "<h2>Section {i}</h2><p>This is paragraph number {i} with enough words in it to score like real prose does, mentioning rust and performance along the way.</p>"
        ));
    }
    body.push_str("</main>");
    format!("<html><head><title>Bench</title></head><body>{body}</body></html>")
}

fn bench_chunk_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_page");
    group.measurement_time(Duration::from_secs(10));

    for &size in &[10usize, 100, 500] {
        let html = sample_html(size);
        let page = extract_page_record(
            &html,
            "https://example.com/",
            200,
            "text/html",
            50_000,
            BackendTag::Lite,
            None,
            true,
            false,
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("paragraphs", size), &page, |b, page| {
            b.iter(|| chunk_page(black_box(page), &ChunkOptions::default()))
        });
    }

    group.finish();
}

fn bench_find_relevant(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_relevant");
    let html = sample_html(200);
    let page = extract_page_record(
        &html,
        "https://example.com/",
        200,
        "text/html",
        50_000,
        BackendTag::Lite,
        None,
        true,
        false,
    )
    .unwrap();
    let chunks = chunk_page(&page, &ChunkOptions::default());

    group.bench_function("rust performance", |b| {
        b.iter(|| find_relevant(black_box(&chunks), black_box("rust performance"), 8))
    });

    group.finish();
}

criterion_group!(benches, bench_chunk_page, bench_find_relevant);
criterion_main!(benches);
