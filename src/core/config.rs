use crate::query::parser::BooleanOperator;
use crate::storage::segment::CompressionType;

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_size: usize,          // Cached query result pages (0 disables)
    pub sync_on_commit: bool,       // fsync segment files and manifest
    pub writer: WriterConfig,
    pub merge: MergeConfig,
    pub scoring: Bm25Params,
    pub query: QueryConfig,
    pub highlight: HighlightConfig,
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub compression: CompressionType,       // Stored-fields block compression
    pub parallel_threshold: usize,          // Analyze batches at least this big with rayon
    pub analysis_threads: usize,
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub max_segments: usize,        // Merge once the index holds more segments than this
    pub min_live_ratio: f32,        // ... or the average live/total ratio falls below this
    pub max_merge_at_once: usize,
    pub background: bool,           // Run merges on the scheduler thread after commits
}

/// BM25 parameters
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub default_operator: BooleanOperator,
    pub max_expansions: usize,      // Terms a prefix/wildcard/fuzzy query may expand to per field
    pub default_fuzzy_distance: u8,
}

#[derive(Debug, Clone)]
pub struct HighlightConfig {
    pub fragment_size: usize,       // Characters of context per fragment
    pub max_fragments: usize,       // Per field
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache_size: 256,
            sync_on_commit: true,
            writer: WriterConfig::default(),
            merge: MergeConfig::default(),
            scoring: Bm25Params::default(),
            query: QueryConfig::default(),
            highlight: HighlightConfig::default(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            compression: CompressionType::Lz4,
            parallel_threshold: 256,
            analysis_threads: num_cpus::get(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            max_segments: 10,
            min_live_ratio: 0.5,
            max_merge_at_once: 10,
            background: true,
        }
    }
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params { k1: 1.2, b: 0.75 }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            default_operator: BooleanOperator::And,
            max_expansions: 1024,
            default_fuzzy_distance: 1,
        }
    }
}

impl Default for HighlightConfig {
    fn default() -> Self {
        HighlightConfig {
            fragment_size: 120,
            max_fragments: 3,
        }
    }
}

impl Config {
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.writer.compression = compression;
        self
    }

    pub fn with_background_merge(mut self, background: bool) -> Self {
        self.merge.background = background;
        self
    }

    pub fn with_merge_thresholds(mut self, max_segments: usize, min_live_ratio: f32) -> Self {
        self.merge.max_segments = max_segments;
        self.merge.min_live_ratio = min_live_ratio;
        self
    }

    pub fn with_default_operator(mut self, op: BooleanOperator) -> Self {
        self.query.default_operator = op;
        self
    }

    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.query.max_expansions = max_expansions;
        self
    }

    pub fn with_bm25(mut self, k1: f32, b: f32) -> Self {
        self.scoring = Bm25Params { k1, b };
        self
    }

    pub fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.highlight.fragment_size = fragment_size;
        self
    }
}
