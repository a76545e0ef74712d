//! Height map persistence.
//!
//! Writes go to a temporary file next to the target and are renamed into
//! place, so a reader polling the same directory never observes a partially
//! written artifact.

use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use crate::core::{HeightMap, RunIdentity};
use crate::error::{Error, Result};

use super::layout::ArtifactLayout;
use super::npy::{encode_npy, read_npy};

/// Write `bytes` to `path` via temp file + rename, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .map_err(|e| Error::storage(&parent, format!("Failed to create directory: {}", e)))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".samatala-")
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|e| Error::storage(path, format!("Failed to create temp file: {}", e)))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::storage(path, format!("Write error: {}", e)))?;
    tmp.persist(path)
        .map_err(|e| Error::storage(path, format!("Failed to rename into place: {}", e.error)))?;
    Ok(())
}

/// Loads and saves height maps under an [`ArtifactLayout`].
#[derive(Clone, Debug)]
pub struct HeightmapStore {
    layout: ArtifactLayout,
}

impl HeightmapStore {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Deterministic path of a derived height map.
    pub fn path_for(&self, id: &RunIdentity, stage: &str) -> PathBuf {
        self.layout.heightmap(id, stage)
    }

    /// Load a 2-D height map.
    pub fn load(&self, path: &Path) -> Result<HeightMap> {
        let file = fs::File::open(path)
            .map_err(|e| Error::storage(path, format!("Failed to open: {}", e)))?;
        let map = read_npy(&mut BufReader::new(file))
            .map_err(|e| Error::storage(path, format!("Failed to decode: {}", e)))?;
        log::debug!(
            "Loaded height map {} ({}x{})",
            path.display(),
            map.rows(),
            map.cols()
        );
        Ok(map)
    }

    /// Save a height map, replacing any previous file atomically.
    pub fn save(&self, path: &Path, map: &HeightMap) -> Result<()> {
        let bytes = encode_npy(map)
            .map_err(|e| Error::storage(path, format!("Failed to encode: {}", e)))?;
        write_atomic(path, &bytes)?;
        log::info!("Saved height map to {}", path.display());
        Ok(())
    }
}
