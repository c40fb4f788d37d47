/// Skip table over a sorted ordinal array
/// Entries every ~sqrt(n) postings let `seek` jump past whole runs
#[derive(Debug, Clone)]
pub struct SkipList {
    pub entries: Vec<SkipEntry>,
    pub ordinals: Vec<u32>,
    pub skip_interval: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SkipEntry {
    pub ordinal: u32,
    pub position: usize,          // Position in ordinals array
}

impl SkipList {
    pub fn build(ordinals: &[u32]) -> Self {
        let len = ordinals.len();
        let interval = ((len as f32).sqrt() as usize).max(4);  // At least 4

        let entries = (0..len)
            .step_by(interval)
            .map(|i| SkipEntry { ordinal: ordinals[i], position: i })
            .collect();

        SkipList {
            entries,
            ordinals: ordinals.to_vec(),
            skip_interval: interval,
        }
    }

    /// First position >= `from` whose ordinal is >= target, or `len` if none
    pub fn seek(&self, target: u32, from: usize) -> usize {
        let mut pos = from;

        // Last skip entry at or after `from` that does not overshoot
        let first_entry = self.entries.partition_point(|e| e.position < from);
        for entry in &self.entries[first_entry..] {
            if entry.ordinal > target {
                break;
            }
            pos = entry.position;
        }

        // Linear scan from skip position
        while pos < self.ordinals.len() && self.ordinals[pos] < target {
            pos += 1;
        }
        pos
    }

    /// Intersect two sorted ordinal sets with leap-frogging seeks
    pub fn intersect(a: &SkipList, b: &SkipList) -> Vec<u32> {
        let mut result = Vec::new();
        let mut i = 0;
        let mut j = 0;

        while i < a.ordinals.len() && j < b.ordinals.len() {
            let (x, y) = (a.ordinals[i], b.ordinals[j]);
            if x == y {
                result.push(x);
                i += 1;
                j += 1;
            } else if x < y {
                i = a.seek(y, i);
            } else {
                j = b.seek(x, j);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_lands_on_first_not_less() {
        let ordinals: Vec<u32> = (0..100).map(|i| i * 2).collect();
        let skips = SkipList::build(&ordinals);
        assert_eq!(skips.seek(0, 0), 0);
        assert_eq!(skips.seek(51, 0), 26);
        assert_eq!(skips.seek(51, 40), 40);
        assert_eq!(skips.seek(1000, 0), 100);
    }

    #[test]
    fn intersection_matches_naive() {
        let a: Vec<u32> = (0..500).filter(|n| n % 3 == 0).collect();
        let b: Vec<u32> = (0..500).filter(|n| n % 5 == 0).collect();
        let expected: Vec<u32> = (0..500).filter(|n| n % 15 == 0).collect();
        assert_eq!(SkipList::intersect(&SkipList::build(&a), &SkipList::build(&b)), expected);
    }
}
