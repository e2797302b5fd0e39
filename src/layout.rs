//! Output-directory layout for one encoded trail store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const INFO_FILE: &str = "info";
const TRAILS_FILE: &str = "trails.data";
const CODEBOOK_FILE: &str = "trails.codebook";

#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self) -> StorePaths {
        StorePaths {
            info: self.root.join(INFO_FILE),
            trails: self.root.join(TRAILS_FILE),
            codebook: self.root.join(CODEBOOK_FILE),
        }
    }

    /// Deterministic per-process name for the grouped spill file.
    pub fn grouped_spill(&self) -> PathBuf {
        self.root.join(format!("tmp.grouped.{}", std::process::id()))
    }

    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }
}

#[derive(Debug, Clone)]
pub struct StorePaths {
    pub info: PathBuf,
    pub trails: PathBuf,
    pub codebook: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_root_at_output_directory() {
        let layout = StoreLayout::new("/out/store");
        let paths = layout.paths();
        assert_eq!(paths.info, Path::new("/out/store/info"));
        assert_eq!(paths.trails, Path::new("/out/store/trails.data"));
        assert_eq!(paths.codebook, Path::new("/out/store/trails.codebook"));
    }

    #[test]
    fn spill_name_carries_process_id() {
        let layout = StoreLayout::new("/out/store");
        let spill = layout.grouped_spill();
        let name = spill.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tmp.grouped."));
        assert_eq!(
            name.trim_start_matches("tmp.grouped."),
            std::process::id().to_string()
        );
    }

    #[test]
    fn ensure_creates_missing_root() {
        let tmp = TempDir::new().unwrap();
        let layout = StoreLayout::new(tmp.path().join("nested/store"));
        layout.ensure().unwrap();
        assert!(layout.root().is_dir());
    }
}
