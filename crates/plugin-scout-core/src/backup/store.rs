//! Snapshot storage
//!
//! Keys are `/`-separated relative paths (`daily/<id>/stats.json.gz`). The
//! manager only talks to `BackupStorage`, so the medium can change without
//! touching retention or checksum logic.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

pub trait BackupStorage: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    fn get(&self, key: &str) -> Result<Vec<u8>>;

    fn exists(&self, key: &str) -> bool;

    /// Immediate children of a prefix, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove a key and everything below it
    fn delete(&self, prefix: &str) -> Result<()>;

    /// Copy everything below `from` to `to`
    fn copy(&self, from: &str, to: &str) -> Result<()>;
}

/// Directory-backed storage
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl BackupStorage for LocalStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(key))?)
    }

    fn exists(&self, key: &str) -> bool {
        self.path(key).exists()
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.path(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, prefix: &str) -> Result<()> {
        let path = self.path(prefix);
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        let src_root = self.path(from);
        let dst_root = self.path(to);
        for entry in WalkDir::new(&src_root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
        {
            let src = entry.path();
            if let Ok(relative) = src.strip_prefix(&src_root) {
                let dst = dst_root.join(relative);
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(src, dst)?;
            }
        }
        Ok(())
    }
}
