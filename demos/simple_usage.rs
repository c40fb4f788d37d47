/// inkdex API demo
///
/// Demonstrates the main index operations:
/// - Schema declaration and opening an index directory
/// - Adding, updating and deleting documents
/// - Search (terms, phrases, boolean, ranges, field sort, pagination)
/// - Highlighting and statistics

use inkdex::{AnalyzerConfig, Config, Document, Index, Schema, SortBy, SortOrder};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inkdex=info")))
        .init();

    let dir = tempfile::tempdir()?;
    let schema = Schema::new()
        .add_keyword_field("path")
        .add_text_field("title", AnalyzerConfig::default())
        .add_text_field("body", AnalyzerConfig::stemming())
        .add_numeric_field("year");

    // Step 1: Open
    let index = Index::open_or_create_with_config(dir.path(), schema, Config::default())?;
    println!("Opened index at {}", index.path().display());

    // Step 2: Add documents
    let mut writer = index.new_writer()?;
    let notes = [
        ("notes/rust.md", "Rust Programming", "Learning the Rust language and its borrow checker", 2015.0),
        ("notes/db.md", "Database Systems", "Indexes, segments and merges in search databases", 2009.0),
        ("notes/web.md", "Web Development", "Building web apps that search quickly", 2020.0),
    ];
    for (path, title, body, year) in notes {
        writer.add_document(
            Document::new()
                .with_text("path", path)
                .with_text("title", title)
                .with_text("body", body)
                .with_number("year", year),
        )?;
    }
    let info = writer.commit()?;
    println!("Committed {} documents (generation {})", info.documents, info.generation);

    // Step 3: Search
    let reader = index.new_reader()?;
    for query in ["rust", "title:database", "search AND -web", "\"borrow checker\"", "year:[2010 TO *]", "serch~1"] {
        let results = reader.search(query, 10, 0, SortBy::Relevance)?;
        println!("  {:<22} -> {} hit(s)", query, results.total_matches);
        for hit in &results.hits {
            println!("      doc {} score {:.3}", hit.doc_id, hit.score);
        }
    }

    let by_year = reader.search("", 2, 0, SortBy::field("year", SortOrder::Descending))?;
    println!("Newest first: {:?}", by_year.doc_ids());

    // Malformed queries report where they went wrong
    if let Err(e) = reader.search("(rust OR", 10, 0, SortBy::Relevance) {
        println!("Query error: {}", e);
    }

    // Step 4: Highlight
    if let Some(hit) = reader.search("search", 1, 0, SortBy::Relevance)?.hits.first() {
        for fragment in reader.highlight(hit.doc_id, "search")? {
            println!("  [{}] {}", fragment.field, fragment.render("**", "**"));
        }
    }

    // Step 5: Update by key and delete
    writer.update_by_key(
        "path",
        "notes/web.md",
        Document::new()
            .with_text("path", "notes/web.md")
            .with_text("title", "Web Development")
            .with_text("body", "Rewritten note about servers")
            .with_number("year", 2024.0),
    )?;
    writer.delete_by_term("path", "notes/db.md")?;
    writer.commit()?;

    let reader = index.new_reader()?;
    println!("After update: {} live documents", reader.num_docs());

    // Step 6: Merge and statistics
    writer.force_merge()?;
    let stats = index.stats();
    println!(
        "Stats: {} segment(s), {} live, {} deleted, {} bytes, cache hit rate {:.2}",
        stats.segment_count,
        stats.live_documents,
        stats.deleted_documents,
        stats.disk_bytes,
        stats.cache.hit_rate()
    );

    Ok(())
}
