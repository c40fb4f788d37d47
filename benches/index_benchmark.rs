use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use inkdex::{AnalyzerConfig, Config, Document, Index, Schema, SortBy, SortOrder};
use rand::Rng;

const WORDS: [&str; 12] = [
    "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "search", "index", "segment", "merge",
];

fn schema() -> Schema {
    Schema::new()
        .add_text_field("title", AnalyzerConfig::default())
        .add_text_field("content", AnalyzerConfig::stemming())
        .add_keyword_field("path")
        .add_numeric_field("score")
}

/// Helper to create test documents
fn create_test_document(id: usize, content_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let content: String = (0..content_size)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ");

    Document::new()
        .with_text("title", &format!("Document {}", id))
        .with_text("content", &content)
        .with_text("path", &format!("docs/{}.md", id))
        .with_number("score", rng.gen_range(0.0..100.0))
}

fn bench_config() -> Config {
    Config::default()
        .with_sync_on_commit(false)
        .with_background_merge(false)
        .with_cache_size(0)
}

/// Index with `segments` commits of `per_segment` documents each
fn populated_index(dir: &std::path::Path, segments: usize, per_segment: usize) -> Index {
    let index = Index::open_or_create_with_config(dir, schema(), bench_config()).unwrap();
    let mut writer = index.new_writer().unwrap();
    for s in 0..segments {
        for i in 0..per_segment {
            writer.add_document(create_test_document(s * per_segment + i, 50)).unwrap();
        }
        writer.commit().unwrap();
    }
    index
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.sample_size(10);

    for batch_size in [100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &batch_size| {
            let dir = tempfile::tempdir().unwrap();
            let index = Index::open_or_create_with_config(dir.path(), schema(), bench_config()).unwrap();
            let mut writer = index.new_writer().unwrap();
            let mut id = 0;
            b.iter(|| {
                for _ in 0..batch_size {
                    writer.add_document(create_test_document(id, 50)).unwrap();
                    id += 1;
                }
                black_box(writer.commit().unwrap());
            });
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let index = populated_index(dir.path(), 4, 2500);
    let reader = index.new_reader().unwrap();

    let mut group = c.benchmark_group("search");
    for query in ["fox", "quick AND fox", "fox OR dog", "\"quick brown\"~2", "seg*", "serch~1", "-lazy fox"] {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, &query| {
            b.iter(|| black_box(reader.search(query, 10, 0, SortBy::Relevance).unwrap()));
        });
    }
    group.bench_function("field_sort", |b| {
        b.iter(|| black_box(reader.search("fox", 10, 0, SortBy::field("score", SortOrder::Descending)).unwrap()));
    });
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.sample_size(10);
    group.bench_function("force_merge_8x500", |b| {
        b.iter_with_setup(
            || {
                let dir = tempfile::tempdir().unwrap();
                let index = populated_index(dir.path(), 8, 500);
                (dir, index)
            },
            |(_dir, index)| {
                let mut writer = index.new_writer().unwrap();
                black_box(writer.force_merge().unwrap());
            },
        );
    });
    group.finish();
}

criterion_group!(benches, bench_commit, bench_search, bench_merge);
criterion_main!(benches);
