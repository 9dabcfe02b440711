use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::registry::BenchId;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create results directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode durations: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn durations_path(dir: &Path, name: &str, id: BenchId) -> PathBuf {
    dir.join(format!("durations-{name}-{id}.json"))
}

/// Write the sorted durations of a finished benchmark as a flat JSON array.
pub fn write_durations(
    dir: &Path,
    name: &str,
    id: BenchId,
    durations: &[f64],
) -> Result<PathBuf, PersistError> {
    fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = durations_path(dir, name, id);
    let json = serde_json::to_vec(durations)?;
    fs::write(&path, json).map_err(|source| PersistError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
