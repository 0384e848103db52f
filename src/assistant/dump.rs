//! Flat JSON dumps of the last action batch, messages and run steps.
//!
//! Diagnostics only; a failed dump is logged and never fails a run.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writer for debug dumps. Disabled when it has no directory.
#[derive(Debug, Clone, Default)]
pub struct DebugDumps {
    dir: Option<PathBuf>,
}

impl DebugDumps {
    /// Dumps written into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// Dumps that are dropped.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Overwrite `<dir>/<name>` with pretty-printed JSON.
    pub fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) {
        let Some(dir) = &self.dir else {
            return;
        };

        let path = dir.join(name);
        let result = std::fs::create_dir_all(dir)
            .and_then(|_| {
                serde_json::to_vec_pretty(value)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })
            .and_then(|bytes| std::fs::write(&path, bytes));

        match result {
            Ok(()) => debug!("Wrote debug dump {:?}", path),
            Err(e) => warn!("Failed to write debug dump {:?}: {}", path, e),
        }
    }
}
