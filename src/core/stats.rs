use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::query::cache::CacheStats;

/// Index statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    // Snapshot
    pub version: u64,
    pub generation: u64,            // Manifest generation
    pub snapshot_time: DateTime<Utc>,

    // Storage metrics
    pub segment_count: usize,
    pub live_documents: u64,
    pub deleted_documents: u64,
    pub disk_bytes: u64,

    // Query metrics
    pub cache: CacheStats,
}

impl IndexStats {
    /// Share of stored documents that are tombstoned
    pub fn deleted_ratio(&self) -> f64 {
        let total = self.live_documents + self.deleted_documents;
        if total == 0 {
            0.0
        } else {
            self.deleted_documents as f64 / total as f64
        }
    }
}
