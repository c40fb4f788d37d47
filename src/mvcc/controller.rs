use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;
use roaring::RoaringBitmap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::storage::manifest::{Manifest, ManifestEntry};
use crate::storage::merge_policy::MergeCandidate;
use crate::storage::segment_reader::SegmentReader;

/// A segment as seen by one snapshot: the shared reader plus its deletion set
#[derive(Debug, Clone)]
pub struct SegmentView {
    pub reader: Arc<SegmentReader>,
    pub deletes: Arc<RoaringBitmap>,
    pub live_count: u32,
    /// Sum of indexed token counts per field over live documents
    pub live_field_tokens: BTreeMap<String, u64>,
}

impl SegmentView {
    pub fn new(reader: Arc<SegmentReader>, deletes: Arc<RoaringBitmap>) -> Self {
        let doc_count = reader.doc_count();
        let live_count = doc_count - deletes.len().min(doc_count as u64) as u32;

        let mut live_field_tokens = BTreeMap::new();
        for field in reader.meta_fields() {
            let total = reader.field_length_column(&field)
                .map(|column| {
                    column.iter()
                        .enumerate()
                        .filter(|(ordinal, _)| !deletes.contains(*ordinal as u32))
                        .map(|(_, &len)| len as u64)
                        .sum()
                })
                .unwrap_or(0);
            live_field_tokens.insert(field, total);
        }

        SegmentView { reader, deletes, live_count, live_field_tokens }
    }

    pub fn is_deleted(&self, ordinal: u32) -> bool {
        self.deletes.contains(ordinal)
    }

    /// Copy-on-write delete; `None` if the ordinal was already deleted
    pub fn with_deleted(&self, ordinal: u32) -> Option<SegmentView> {
        self.with_deleted_many([ordinal]).map(|(view, _)| view)
    }

    /// Copy-on-write delete of several ordinals; `None` if none of them was live
    pub fn with_deleted_many<I>(&self, ordinals: I) -> Option<(SegmentView, u32)>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut deletes = (*self.deletes).clone();
        let mut live_field_tokens = self.live_field_tokens.clone();
        let mut removed = 0u32;

        for ordinal in ordinals {
            if ordinal >= self.reader.doc_count() || !deletes.insert(ordinal) {
                continue;
            }
            for (field, total) in live_field_tokens.iter_mut() {
                *total = total.saturating_sub(self.reader.field_length(field, ordinal) as u64);
            }
            removed += 1;
        }

        if removed == 0 {
            return None;
        }

        let view = SegmentView {
            reader: Arc::clone(&self.reader),
            deletes: Arc::new(deletes),
            live_count: self.live_count - removed,
            live_field_tokens,
        };
        Some((view, removed))
    }

    pub fn merge_candidate(&self) -> MergeCandidate {
        MergeCandidate {
            id: self.reader.id(),
            doc_count: self.reader.doc_count(),
            live_count: self.live_count,
            size_bytes: self.reader.meta.size_bytes(),
        }
    }
}

/// Collection statistics over live documents, the inputs of BM25
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    pub live_docs: u64,
    pub field_tokens: BTreeMap<String, u64>,
}

impl CollectionStats {
    pub fn avg_field_length(&self, field: &str) -> f32 {
        if self.live_docs == 0 {
            return 0.0;
        }
        self.field_tokens.get(field).copied().unwrap_or(0) as f32 / self.live_docs as f32
    }
}

/// Snapshot of index at a point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    /// Manifest generation this snapshot extends
    pub generation: u64,
    pub next_doc_id: u64,
    pub segments: Vec<SegmentView>,
    pub timestamp: DateTime<Utc>,
    pub stats: CollectionStats,
}

impl Snapshot {
    pub fn new(generation: u64, next_doc_id: u64, segments: Vec<SegmentView>) -> Self {
        let mut stats = CollectionStats::default();
        for view in &segments {
            stats.live_docs += view.live_count as u64;
            for (field, total) in &view.live_field_tokens {
                *stats.field_tokens.entry(field.clone()).or_insert(0) += total;
            }
        }

        Snapshot {
            version: 0,
            generation,
            next_doc_id,
            segments,
            timestamp: Utc::now(),
            stats,
        }
    }

    pub fn empty() -> Self {
        Snapshot::new(0, 0, Vec::new())
    }

    /// (segment index, ordinal) of a committed document, deleted or not
    pub fn locate(&self, doc_id: DocId) -> Option<(usize, u32)> {
        self.segments.iter().enumerate().find_map(|(i, view)| {
            if doc_id < view.reader.meta.min_doc_id || doc_id > view.reader.meta.max_doc_id {
                return None;
            }
            view.reader.ordinal_of(doc_id).map(|ordinal| (i, ordinal))
        })
    }

    pub fn is_live(&self, doc_id: DocId) -> bool {
        self.locate(doc_id)
            .is_some_and(|(seg, ordinal)| !self.segments[seg].is_deleted(ordinal))
    }

    pub fn num_docs(&self) -> u64 {
        self.stats.live_docs
    }

    pub fn num_deleted(&self) -> u64 {
        self.segments.iter().map(|v| v.deletes.len()).sum()
    }

    pub fn merge_candidates(&self) -> Vec<MergeCandidate> {
        self.segments.iter().map(SegmentView::merge_candidate).collect()
    }

    pub fn to_manifest(&self, generation: u64) -> Result<Manifest> {
        let segments = self.segments.iter()
            .map(|view| ManifestEntry::new(view.reader.meta.clone(), &view.deletes))
            .collect::<Result<Vec<_>>>()?;

        Ok(Manifest {
            generation,
            next_doc_id: self.next_doc_id,
            segments,
            timestamp: Utc::now(),
        })
    }
}

/// Publishes snapshots by swapping one `Arc`
/// Note: transitions serialize on `commit_lock`; readers only touch `current` for a clone
pub struct MVCCController {
    current: RwLock<Arc<Snapshot>>,
    commit_lock: Mutex<()>,
    next_version: AtomicU64,
}

impl MVCCController {
    pub fn new(initial: Snapshot) -> Self {
        let mut initial = initial;
        initial.version = 1;
        MVCCController {
            current: RwLock::new(Arc::new(initial)),
            commit_lock: Mutex::new(()),
            next_version: AtomicU64::new(2),
        }
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Derive and publish a new snapshot from the current one
    /// `build` may do I/O (manifest write); a failure publishes nothing
    pub fn transition<F>(&self, build: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce(&Snapshot) -> Result<Option<Snapshot>>,
    {
        let _guard = self.commit_lock.lock();
        let base = self.current_snapshot();

        let Some(mut next) = build(&base)? else {
            return Ok(base);
        };
        next.version = self.next_version.fetch_add(1, Ordering::SeqCst);

        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        Ok(next)
    }
}
