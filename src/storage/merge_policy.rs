use crate::core::config::MergeConfig;
use crate::storage::segment::SegmentId;

/// What a policy sees of a live segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeCandidate {
    pub id: SegmentId,
    pub doc_count: u32,
    pub live_count: u32,
    pub size_bytes: u64,
}

impl MergeCandidate {
    pub fn live_ratio(&self) -> f32 {
        if self.doc_count == 0 {
            return 0.0;
        }
        self.live_count as f32 / self.doc_count as f32
    }
}

/// Policy for deciding when and how to merge segments
pub trait MergePolicy: Send + Sync {
    /// Check if segments should be merged
    fn should_merge(&self, segments: &[MergeCandidate]) -> bool;

    /// Select segments to merge; empty means nothing worth doing
    fn select_segments_to_merge(&self, segments: &[MergeCandidate]) -> Vec<SegmentId>;
}

/// Smallest-first policy bounding segment count and dead-document share
#[derive(Debug, Clone)]
pub struct TieredMergePolicy {
    pub max_segments: usize,
    pub min_live_ratio: f32,
    pub max_merge_at_once: usize,
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        TieredMergePolicy::from_config(&MergeConfig::default())
    }
}

impl TieredMergePolicy {
    pub fn from_config(config: &MergeConfig) -> Self {
        TieredMergePolicy {
            max_segments: config.max_segments.max(1),
            min_live_ratio: config.min_live_ratio,
            max_merge_at_once: config.max_merge_at_once.max(2),
        }
    }

    fn average_live_ratio(segments: &[MergeCandidate]) -> f32 {
        if segments.is_empty() {
            return 1.0;
        }
        segments.iter().map(|s| s.live_ratio()).sum::<f32>() / segments.len() as f32
    }
}

impl MergePolicy for TieredMergePolicy {
    fn should_merge(&self, segments: &[MergeCandidate]) -> bool {
        if segments.len() > self.max_segments {
            return true;
        }
        if segments.iter().any(|s| s.live_count == 0) {
            return true;
        }
        Self::average_live_ratio(segments) < self.min_live_ratio
    }

    fn select_segments_to_merge(&self, segments: &[MergeCandidate]) -> Vec<SegmentId> {
        if !self.should_merge(segments) {
            return Vec::new();
        }

        let mut sorted = segments.to_vec();
        sorted.sort_by_key(|s| (s.live_count, s.size_bytes));

        // Mostly-dead segments first, regardless of size
        let mut selected: Vec<MergeCandidate> = sorted.iter()
            .filter(|s| s.live_ratio() < self.min_live_ratio)
            .copied()
            .collect();

        // Then smallest-first until the merged result fits the segment budget
        if segments.len() > self.max_segments {
            let needed = (segments.len() - self.max_segments + 1).max(2);
            for segment in &sorted {
                if selected.len() >= needed {
                    break;
                }
                if !selected.iter().any(|s| s.id == segment.id) {
                    selected.push(*segment);
                }
            }
        }

        selected.truncate(self.max_merge_at_once);

        // A lone segment is only worth rewriting to drop deleted documents
        if selected.len() == 1 && selected[0].live_count == selected[0].doc_count {
            return Vec::new();
        }
        selected.into_iter().map(|s| s.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(doc_count: u32, live_count: u32) -> MergeCandidate {
        MergeCandidate {
            id: SegmentId::new(),
            doc_count,
            live_count,
            size_bytes: doc_count as u64 * 100,
        }
    }

    fn policy(max_segments: usize) -> TieredMergePolicy {
        TieredMergePolicy {
            max_segments,
            min_live_ratio: 0.5,
            max_merge_at_once: 10,
        }
    }

    #[test]
    fn too_many_segments_merges_smallest() {
        let segments: Vec<MergeCandidate> = (1..=5).map(|n| candidate(n * 10, n * 10)).collect();
        let selected = policy(3).select_segments_to_merge(&segments);
        assert_eq!(selected, vec![segments[0].id, segments[1].id, segments[2].id]);
    }

    #[test]
    fn mostly_deleted_segment_is_rewritten_alone() {
        let segments = vec![candidate(100, 100), candidate(100, 10)];
        let selected = policy(10).select_segments_to_merge(&segments);
        assert_eq!(selected, vec![segments[1].id]);
    }

    #[test]
    fn healthy_index_is_left_alone() {
        let segments = vec![candidate(100, 90), candidate(50, 50)];
        assert!(!policy(10).should_merge(&segments));
        assert!(policy(10).select_segments_to_merge(&segments).is_empty());
    }
}
