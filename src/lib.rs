pub mod core;
pub mod storage;
pub mod analysis;
pub mod schema;
pub mod index;
pub mod scoring;
pub mod search;
pub mod query;
pub mod mvcc;
pub mod writer;
pub mod reader;
pub mod mmap;
pub mod compression;

pub use crate::analysis::analyzer::{AnalyzerConfig, StemmerKind};
pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::index::Index;
pub use crate::core::stats::IndexStats;
pub use crate::core::types::{DocId, Document, FieldValue, StoredDocument};
pub use crate::query::ast::Query;
pub use crate::reader::index_reader::IndexReader;
pub use crate::schema::schema::{FieldDefinition, FieldType, Schema};
pub use crate::search::highlight::HighlightFragment;
pub use crate::search::results::{CancellationToken, Hit, SearchRequest, SearchResults, SortBy, SortOrder, TermMatch};
pub use crate::writer::index_writer::{CommitInfo, IndexWriter};

/*
┌──────────────────────────────────────────────────────────────────────────────────┐
│                              INKDEX ARCHITECTURE                                  │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── CORE ────────────────────────────────────────┐
│  struct Index ──────────────► Arc<IndexState>                                     │
│  • open_or_create(path, schema)   • config, schema, analyzers, parser            │
│  • new_writer / new_reader        • storage: StorageLayout, _lock: FileLock      │
│  • merge_now / stats              • mvcc: MVCCController, cache: QueryCache      │
│  • scheduler: MergeScheduler      • merge_policy, merge_lock, next_doc_id        │
└───────────────────────────────────────────────────────────────────────────────────┘
            │ new_writer (one at a time)              │ new_reader (any number)
            ▼                                         ▼
┌────────────── WRITE PATH ──────────────┐  ┌────────────── READ PATH ──────────────┐
│ IndexWriter                             │  │ IndexReader { Arc<Snapshot> }         │
│ • buffer: Vec<PendingDocument>          │  │ • search / search_with / search_query │
│ • delete_* → copy-on-write bitmaps      │  │ • highlight / document                │
│ • commit:                               │  │                                       │
│     SegmentWriter::build (rayon)        │  │ QueryParser (nom lexer) → Query       │
│     → Manifest::store (tmp+rename)      │  │ QueryPlanner → LogicalPlan            │
│     → MVCCController::transition        │  │ MatchContext → Box<dyn DocScorer>     │
│ • notifies MergeScheduler (crossbeam)   │  │ BM25Scorer + TopKCollector            │
│                                         │  │ Highlighter → HighlightFragment       │
│ merger::merge                           │  │ QueryCache (LRU, keyed by version)    │
│ • posting-level rebuild, DocId order    │  │                                       │
│ • carries late deletes, retires inputs  │  │                                       │
└─────────────────────────────────────────┘  └───────────────────────────────────────┘
            │                                         │
            ▼                                         ▼
┌──────────────────────────────────── STORAGE ─────────────────────────────────────┐
│  <root>/meta/manifest.bin   Manifest { generation, next_doc_id, segments+deletes }│
│  <root>/meta/schema.json    Schema                                                │
│  <root>/idx/<uuid>.idx      fst term dict │ vbyte/delta postings │ norms │ numeric│
│  <root>/segments/<uuid>.seg stored fields, one Lz4/Zstd block per document        │
│  SegmentReader (memmap2): Arc-shared, files removed when a retired reader drops  │
└───────────────────────────────────────────────────────────────────────────────────┘
*/
