//! # Model Cache
//!
//! Durable copy of the fitted [`TidalModel`], stored as JSON.
//!
//! There is no TTL: a cached model stays valid until the lifecycle controller
//! explicitly rebuilds it. Writes go to a sibling temp file that is renamed
//! over the target, so a reader never sees a half-written model and the old
//! model survives a failed write.

use crate::harmonic::TidalModel;
use crate::TideError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ModelCache {
    path: PathBuf,
}

impl ModelCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the cached model.
    ///
    /// Returns `Ok(None)` when no cache file exists; a file that exists but
    /// cannot be read or decoded is an error.
    pub fn load(&self) -> Result<Option<TidalModel>, TideError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cached model");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let model = serde_json::from_slice(&data)?;
        Ok(Some(model))
    }

    /// Replace the cached model.
    pub fn save(&self, model: &TidalModel) -> Result<(), TideError> {
        let data = serde_json::to_vec_pretty(model)?;
        write_atomic(&self.path, &data)?;
        info!(
            path = %self.path.display(),
            constituents = model.constituents.len(),
            "cached harmonic model"
        );
        Ok(())
    }
}

/// Write `data` to `path` through a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })
}
