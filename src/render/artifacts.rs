//! Saving downloaded files (images, CSV tables) under collision-free names.

use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

/// What a downloaded file is saved as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Csv,
}

impl ArtifactKind {
    /// Classify a file by name, falling back to its content.
    pub fn detect(filename: &str, content: &[u8]) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Some(ArtifactKind::Image),
            Some("csv") => Some(ArtifactKind::Csv),
            _ if content.starts_with(PNG_SIGNATURE) => Some(ArtifactKind::Image),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "image",
            ArtifactKind::Csv => "data",
        }
    }
}

/// Output directory with a session-wide sequence counter.
///
/// Names are `<run_id>-image-<n>.png` and `<run_id>-data-<n>.csv`; `n` never
/// repeats within a session. Image bytes are written as received.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    next: AtomicUsize,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next: AtomicUsize::new(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&self, run_id: &str, kind: ArtifactKind, extension: &str) -> PathBuf {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        self.dir
            .join(format!("{}-{}-{}.{}", run_id, kind.label(), n, extension))
    }

    /// Save one downloaded file. Unsupported types are skipped with a warning.
    pub fn save(&self, run_id: &str, filename: &str, content: &[u8]) -> Result<Option<PathBuf>> {
        let Some(kind) = ArtifactKind::detect(filename, content) else {
            warn!("Unsupported file type for {}, skipping", filename);
            return Ok(None);
        };
        self.save_as(run_id, kind, content).map(Some)
    }

    /// Save `content` as an artifact of `kind`.
    pub fn save_as(&self, run_id: &str, kind: ArtifactKind, content: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let path = match kind {
            ArtifactKind::Image => {
                let path = self.next_path(run_id, kind, "png");
                std::fs::write(&path, content)?;
                path
            }
            ArtifactKind::Csv => {
                let path = self.next_path(run_id, kind, "csv");
                let text = String::from_utf8_lossy(content);
                match crate::csv::parse(&text) {
                    Ok(rows) => std::fs::write(&path, crate::csv::write(&rows))?,
                    Err(e) => {
                        warn!("Saving {:?} unparsed: {}", path, e);
                        std::fs::write(&path, content)?;
                    }
                }
                path
            }
        };

        info!("Saved {:?}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension_and_signature() {
        assert_eq!(ArtifactKind::detect("plot.PNG", b""), Some(ArtifactKind::Image));
        assert_eq!(ArtifactKind::detect("results.csv", b"a,b"), Some(ArtifactKind::Csv));
        assert_eq!(
            ArtifactKind::detect("file-abc", b"\x89PNG\r\n\x1a\nrest"),
            Some(ArtifactKind::Image)
        );
        assert_eq!(ArtifactKind::detect("notes.txt", b"hello"), None);
    }

    #[test]
    fn test_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let a = store.save_as("run_1", ArtifactKind::Image, PNG_SIGNATURE).unwrap();
        let b = store.save_as("run_1", ArtifactKind::Image, PNG_SIGNATURE).unwrap();
        let c = store.save_as("run_2", ArtifactKind::Csv, b"x,y\n1,2\n").unwrap();

        assert_eq!(a, dir.path().join("run_1-image-1.png"));
        assert_eq!(b, dir.path().join("run_1-image-2.png"));
        assert_eq!(c, dir.path().join("run_2-data-3.csv"));
    }

    #[test]
    fn test_every_image_is_named_png() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let jpeg = b"\xff\xd8\xff\xe0\0\x10JFIF\0";

        let path = store.save("run_1", "plot.jpg", jpeg).unwrap().unwrap();
        assert_eq!(path, dir.path().join("run_1-image-1.png"));
        assert_eq!(std::fs::read(&path).unwrap(), jpeg);

        let path = store.save("run_1", "scan.tiff", b"II*\0").unwrap().unwrap();
        assert_eq!(path, dir.path().join("run_1-image-2.png"));
    }

    #[test]
    fn test_saved_csv_reads_back_to_same_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let original = "Microstructure,Tau,Note\r\nx.tif,1.52,\"porous, layered\"\r\ny.tif,2.01,\r\n";

        let path = store
            .save("run_1", "results.csv", original.as_bytes())
            .unwrap()
            .unwrap();

        let saved = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            crate::csv::parse(&saved).unwrap(),
            crate::csv::parse(original).unwrap()
        );
    }

    #[test]
    fn test_unsupported_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.save("run_1", "report.pdf", b"%PDF").unwrap().is_none());
    }
}
