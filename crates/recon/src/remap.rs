// Durable legacy id -> new id mapping
//
// Loaded once at start, consulted and extended during reconciliation,
// written back wholesale at the end of the run. Mappings created by a run
// that dies before the flush are lost; mappings for inserts that never
// reached the store are forgotten before the flush.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ImportError;

#[derive(Debug, Clone, Default)]
pub struct RemapStore {
    path: Option<PathBuf>,
    map: BTreeMap<String, i64>,
}

impl RemapStore {
    /// Map that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self, ImportError> {
        let map = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| ImportError::Remap(format!("{}: {e}", path.display())))?;
            serde_json::from_str(&content)
                .map_err(|e| ImportError::Remap(format!("{}: {e}", path.display())))?
        } else {
            log::info!("remap file {} not found, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            map,
        })
    }

    pub fn lookup(&self, legacy: &str) -> Option<i64> {
        self.map.get(legacy).copied()
    }

    /// Record a mapping. An existing mapping is kept and returned.
    pub fn record(&mut self, legacy: impl Into<String>, new_id: i64) -> i64 {
        let legacy = legacy.into();
        if let Some(existing) = self.map.get(&legacy) {
            if *existing != new_id {
                log::warn!("remap for {legacy} already points at {existing}, ignoring {new_id}");
            }
            return *existing;
        }
        self.map.insert(legacy, new_id);
        new_id
    }

    /// Drop a mapping whose record was never written.
    pub fn forget(&mut self, legacy: &str) -> Option<i64> {
        self.map.remove(legacy)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Replace the file atomically: write a sibling temp file, then rename.
    pub fn flush(&self) -> Result<(), ImportError> {
        let Some(path) = &self.path else {
            log::debug!("no remap file configured, {} mapping(s) kept in memory", self.map.len());
            return Ok(());
        };

        let json = serde_json::to_string_pretty(&self.map)
            .map_err(|e| ImportError::Remap(e.to_string()))?;

        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        fs::write(&tmp, json).map_err(|e| ImportError::Remap(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, path).map_err(|e| ImportError::Remap(format!("{}: {e}", path.display())))?;

        log::info!("Saved remap file {} ({} mappings)", path.display(), self.map.len());
        Ok(())
    }
}
