use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use crate::core::error::Result;
use crate::storage::segment::SegmentId;

/// Directory structure for data files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory
    pub segments_dir: PathBuf,  // Stored fields (.seg files)
    pub idx_dir: PathBuf,       // Inverted index files (.idx files)
    pub meta_dir: PathBuf,      // Manifest and schema
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let segments_dir = base_dir.join("segments");
        let idx_dir = base_dir.join("idx");
        let meta_dir = base_dir.join("meta");

        fs::create_dir_all(&segments_dir)?;
        fs::create_dir_all(&idx_dir)?;
        fs::create_dir_all(&meta_dir)?;

        Ok(StorageLayout {
            base_dir,
            segments_dir,
            idx_dir,
            meta_dir,
        })
    }

    pub fn segment_path(&self, id: &SegmentId) -> PathBuf {
        self.segments_dir.join(format!("{}.seg", id.0))
    }

    pub fn index_path(&self, id: &SegmentId) -> PathBuf {
        self.idx_dir.join(format!("{}.idx", id.0))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.meta_dir.join("manifest.bin")
    }

    pub fn schema_path(&self) -> PathBuf {
        self.meta_dir.join("schema.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    /// Write `<path>.tmp`, fsync, rename over `path`, fsync the directory
    ///
    /// An error means `path` still holds its previous content. Once the
    /// rename has happened the write counts as done; a failed directory
    /// fsync after that point is only logged.
    pub fn write_atomic(&self, path: &Path, data: &[u8], sync: bool) -> Result<()> {
        replace_file(path, data, sync, sync_dir)
    }

    /// Remove stray `*.tmp` files and segment files the manifest does not list
    pub fn collect_garbage(&self, live: &HashSet<SegmentId>) -> Result<usize> {
        let mut removed = 0;

        for (dir, ext) in [(&self.segments_dir, "seg"), (&self.idx_dir, "idx")] {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

                let stale = if name.ends_with(".tmp") {
                    true
                } else if path.extension().and_then(|e| e.to_str()) == Some(ext) {
                    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                    SegmentId::parse(stem).is_none_or(|id| !live.contains(&id))
                } else {
                    false
                };

                if stale {
                    match fs::remove_file(&path) {
                        Ok(()) => {
                            debug!(path = %path.display(), "removed unreferenced file");
                            removed += 1;
                        }
                        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale file"),
                    }
                }
            }
        }

        let manifest_tmp = tmp_path(&self.manifest_path());
        if manifest_tmp.exists() {
            fs::remove_file(&manifest_tmp)?;
            removed += 1;
        }

        Ok(removed)
    }

    /// Bytes used by segment and manifest files
    pub fn disk_usage(&self) -> u64 {
        [&self.segments_dir, &self.idx_dir, &self.meta_dir]
            .iter()
            .filter_map(|dir| fs::read_dir(dir).ok())
            .flat_map(|entries| entries.filter_map(|e| e.ok()))
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum()
    }
}

pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn replace_file(path: &Path, data: &[u8], sync: bool, dir_sync: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let tmp = tmp_path(path);
    let staged = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(data)?;
        if sync {
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if let Err(e) = staged {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    if sync {
        if let Some(dir) = path.parent() {
            if let Err(e) = dir_sync(dir) {
                warn!(path = %path.display(), error = %e, "directory fsync failed after rename");
            }
        }
    }
    Ok(())
}

pub fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_collection_spares_live_segments() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let live = SegmentId::new();
        let dead = SegmentId::new();

        for id in [live, dead] {
            fs::write(layout.segment_path(&id), b"x").unwrap();
            fs::write(layout.index_path(&id), b"x").unwrap();
        }
        fs::write(tmp_path(&layout.segment_path(&live)), b"partial").unwrap();

        let removed = layout.collect_garbage(&HashSet::from([live])).unwrap();
        assert_eq!(removed, 3);
        assert!(layout.segment_path(&live).exists());
        assert!(!layout.index_path(&dead).exists());
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let path = layout.manifest_path();
        layout.write_atomic(&path, b"one", true).unwrap();
        layout.write_atomic(&path, b"two", true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn directory_sync_failure_after_rename_keeps_new_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.bin");
        fs::write(&path, b"old").unwrap();

        let result = replace_file(&path, b"new", true, |_| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "fsync refused").into())
        });

        // The rename is visible, so callers must treat the write as published
        assert!(result.is_ok());
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn failure_before_rename_leaves_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.bin");
        fs::write(&path, b"old").unwrap();
        // A directory where the staging file should go blocks the write
        fs::create_dir(tmp_path(&path)).unwrap();

        let result = replace_file(&path, b"new", true, |_| Ok(()));
        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"old");
    }
}
