use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use crossbeam::channel::{Receiver, Sender};
use fst::Streamer;
use roaring::RoaringBitmap;
use tracing::{debug, info, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::index::IndexState;
use crate::core::types::DocId;
use crate::index::posting::Posting;
use crate::mvcc::controller::{SegmentView, Snapshot};
use crate::storage::segment::SegmentId;
use crate::storage::segment_reader::SegmentReader;
use crate::storage::segment_writer::{SegmentData, SegmentWriter};

/// Policy merges run back to back after one trigger, at most
const MAX_MERGES_PER_TRIGGER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Whatever the merge policy selects
    Policy,
    /// Every segment into one
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub merged: Vec<SegmentId>,
    /// `None` when every input document was deleted
    pub output: Option<SegmentId>,
    pub documents: u32,
}

/// Merge segments of the current snapshot into one and publish the result
///
/// Deletes that land while the merge runs are carried over to the output
/// before it is published. Returns `None` when there is nothing to merge.
pub(crate) fn merge(state: &IndexState, mode: MergeMode) -> Result<Option<MergeOutcome>> {
    let _guard = state.merge_lock.lock();
    match prepare(state, mode)? {
        Some(prepared) => publish(state, prepared).map(Some),
        None => Ok(None),
    }
}

/// A merged segment written to disk but not yet visible
struct PreparedMerge {
    start: Instant,
    selected: Vec<SegmentId>,
    inputs: Vec<SegmentView>,
    remaps: Vec<Vec<Option<u32>>>,
    output: Option<Arc<SegmentReader>>,
    documents: u32,
}

fn prepare(state: &IndexState, mode: MergeMode) -> Result<Option<PreparedMerge>> {
    let start = Instant::now();

    let base = state.mvcc.current_snapshot();
    let selected: Vec<SegmentId> = match mode {
        MergeMode::Policy => state.merge_policy.select_segments_to_merge(&base.merge_candidates()),
        MergeMode::All if base.segments.len() > 1 => base.segments.iter().map(|v| v.reader.id()).collect(),
        MergeMode::All => base.segments.iter()
            .filter(|v| !v.deletes.is_empty())
            .map(|v| v.reader.id())
            .collect(),
    };
    if selected.is_empty() {
        return Ok(None);
    }

    let inputs: Vec<SegmentView> = base.segments.iter()
        .filter(|v| selected.contains(&v.reader.id()))
        .cloned()
        .collect();

    let (data, remaps) = gather(&inputs)?;
    let documents = data.doc_ids.len() as u32;

    let output = if data.doc_ids.is_empty() {
        None
    } else {
        let writer = SegmentWriter::new(
            &state.storage,
            &state.schema,
            &state.analyzers,
            state.config.writer.compression,
            state.config.sync_on_commit,
        );
        let meta = writer.write(data).map_err(Error::into_write)?;
        Some(SegmentReader::open(&state.storage, meta)?)
    };

    Ok(Some(PreparedMerge { start, selected, inputs, remaps, output, documents }))
}

/// Swap the inputs for the output in the current snapshot
fn publish(state: &IndexState, prepared: PreparedMerge) -> Result<MergeOutcome> {
    let PreparedMerge { start, selected, inputs, remaps, output, documents } = prepared;

    let merged_ids: HashSet<SegmentId> = selected.iter().copied().collect();
    let published = state.mvcc.transition(|current| {
        let mut segments = Vec::with_capacity(current.segments.len());
        let mut late_deletes = RoaringBitmap::new();

        for view in &current.segments {
            if !merged_ids.contains(&view.reader.id()) {
                segments.push(view.clone());
                continue;
            }
            let input = inputs.iter().position(|i| i.reader.id() == view.reader.id())
                .ok_or_else(|| Error::invalid_state(format!("segment {} vanished during merge", view.reader.id())))?;
            for ordinal in view.deletes.iter() {
                if !inputs[input].is_deleted(ordinal) {
                    if let Some(target) = remaps[input].get(ordinal as usize).copied().flatten() {
                        late_deletes.insert(target);
                    }
                }
            }
        }

        if let Some(reader) = &output {
            segments.push(SegmentView::new(Arc::clone(reader), Arc::new(late_deletes)));
        }
        segments.sort_by_key(|v| v.reader.meta.min_doc_id);

        let next = Snapshot::new(current.generation + 1, current.next_doc_id, segments);
        next.to_manifest(next.generation)?
            .store(&state.storage, state.config.sync_on_commit)?;
        Ok(Some(next))
    });

    let published = match published {
        Ok(snapshot) => snapshot,
        Err(e) => {
            if let Some(reader) = &output {
                reader.retire();
            }
            return Err(e.into_commit());
        }
    };

    for view in &inputs {
        view.reader.retire();
    }
    state.cache.evict_before(published.version);

    info!(
        merged = inputs.len(),
        documents,
        output = ?output.as_ref().map(|r| r.id()),
        version = published.version,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "segments merged"
    );

    Ok(MergeOutcome {
        merged: selected,
        output: output.map(|r| r.id()),
        documents,
    })
}

/// Live documents of `inputs` in DocId order, plus old ordinal -> new ordinal per input
fn gather(inputs: &[SegmentView]) -> Result<(SegmentData, Vec<Vec<Option<u32>>>)> {
    let mut live: Vec<(DocId, usize, u32)> = Vec::new();
    for (input, view) in inputs.iter().enumerate() {
        for ordinal in 0..view.reader.doc_count() {
            if view.is_deleted(ordinal) {
                continue;
            }
            let doc_id = view.reader.doc_id(ordinal)
                .ok_or_else(|| Error::corrupt(format!("ordinal {} outside segment {}", ordinal, view.reader.id())))?;
            live.push((doc_id, input, ordinal));
        }
    }
    live.sort_by_key(|&(doc_id, _, _)| doc_id);

    let mut remaps: Vec<Vec<Option<u32>>> = inputs.iter()
        .map(|v| vec![None; v.reader.doc_count() as usize])
        .collect();
    for (target, &(_, input, ordinal)) in live.iter().enumerate() {
        remaps[input][ordinal as usize] = Some(target as u32);
    }

    let mut data = SegmentData::default();
    for field in inputs.iter().flat_map(|v| v.reader.meta_fields()) {
        data.field_lengths.entry(field).or_insert_with(|| Vec::with_capacity(live.len()));
    }
    for field in inputs.iter().flat_map(|v| v.reader.numeric_fields()) {
        data.numeric.entry(field).or_insert_with(|| Vec::with_capacity(live.len()));
    }

    for &(doc_id, input, ordinal) in &live {
        let reader = &inputs[input].reader;
        data.doc_ids.push(doc_id);
        data.stored.push(reader.stored_fields(ordinal)?);
        for (field, column) in data.field_lengths.iter_mut() {
            column.push(reader.field_length(field, ordinal));
        }
        for (field, column) in data.numeric.iter_mut() {
            column.push(reader.numeric_value(field, ordinal));
        }
    }

    // Union of all term keys; postings re-addressed to output ordinals
    let mut merged: BTreeMap<Vec<u8>, Vec<Posting>> = BTreeMap::new();
    for (input, view) in inputs.iter().enumerate() {
        let mut stream = view.reader.dictionary().as_fst().stream();
        while let Some((key, offset)) = stream.next() {
            let list = view.reader.postings_at(offset)?;
            let remapped = list.postings.into_iter().filter_map(|posting| {
                remaps[input].get(posting.ordinal as usize).copied().flatten()
                    .map(|ordinal| Posting { ordinal, ..posting })
            });
            let entry = merged.entry(key.to_vec()).or_default();
            entry.extend(remapped);
            if entry.is_empty() {
                merged.remove(key);
            }
        }
    }

    for (key, mut postings) in merged {
        postings.sort_by_key(|p| p.ordinal);
        for posting in postings {
            data.index.add_posting(&key, posting)?;
        }
    }
    data.index.doc_count = data.doc_ids.len() as u32;
    data.index.total_tokens = data.field_lengths.values()
        .flat_map(|c| c.iter())
        .map(|&len| len as u64)
        .sum();

    debug!(inputs = inputs.len(), live = live.len(), terms = data.index.postings.len(), "merge input gathered");
    Ok((data, remaps))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeSignal {
    /// A commit or delete changed the segment set
    Check,
    Shutdown,
}

/// Background thread running policy merges after commits
pub(crate) struct MergeScheduler {
    sender: Sender<MergeSignal>,
    handle: Option<JoinHandle<()>>,
}

impl MergeScheduler {
    pub fn start(state: Arc<IndexState>, sender: Sender<MergeSignal>, receiver: Receiver<MergeSignal>) -> Result<Self> {
        // The thread only holds a weak handle so the shared state can drop with its users
        let weak = Arc::downgrade(&state);
        drop(state);

        let handle = thread::Builder::new()
            .name("inkdex-merge".to_string())
            .spawn(move || {
                while let Ok(signal) = receiver.recv() {
                    if signal == MergeSignal::Shutdown {
                        break;
                    }
                    // Coalesce a burst of commits into one pass
                    if receiver.try_iter().any(|s| s == MergeSignal::Shutdown) {
                        break;
                    }
                    let Some(state) = weak.upgrade() else {
                        break;
                    };
                    run_policy_merges(&state);
                }
                debug!("merge scheduler stopped");
            })
            .map_err(|e| Error::new(ErrorKind::Internal, format!("merge thread: {}", e)))?;

        Ok(MergeScheduler { sender, handle: Some(handle) })
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.sender.send(MergeSignal::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("merge thread panicked");
            }
        }
    }
}

impl Drop for MergeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_policy_merges(state: &IndexState) {
    for _ in 0..MAX_MERGES_PER_TRIGGER {
        match merge(state, MergeMode::Policy) {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                // Index is unchanged; the next trigger retries
                warn!(error = %e, "background merge failed");
                break;
            }
        }
    }
}
