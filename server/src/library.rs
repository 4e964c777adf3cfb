//! Videos found under the media directory.
//!
//! Ids stay stable across scans for files that are still present. New files
//! get fresh ids in path order.

use lockstep_core::{Video, VideoId};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "mkv", "mov", "ogv"];

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug)]
pub struct Library {
    root: PathBuf,
    entries: BTreeMap<VideoId, PathBuf>,
    next_id: u64,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn videos(&self) -> Vec<Video> {
        self.entries
            .iter()
            .map(|(id, path)| Video {
                id: *id,
                display_name: self.display_name(path),
            })
            .collect()
    }

    pub fn path_of(&self, id: VideoId) -> Option<&Path> {
        self.entries.get(&id).map(PathBuf::as_path)
    }

    /// Replace the entries with `found`, keeping the ids of known paths.
    pub fn merge(&mut self, mut found: Vec<PathBuf>) {
        found.sort();
        found.dedup();

        let mut known: BTreeMap<PathBuf, VideoId> = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(id, path)| (path, id))
            .collect();

        for path in found {
            let id = match known.remove(&path) {
                Some(id) => id,
                None => {
                    let id = VideoId(self.next_id);
                    self.next_id += 1;
                    id
                }
            };
            self.entries.insert(id, path);
        }
    }

    fn display_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

/// Walk `root` recursively and collect every file with a video extension.
pub async fn discover(root: &Path) -> Result<Vec<PathBuf>, LibraryError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let io_err = |source| LibraryError::Io {
            path: dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(io_err)?;
            if file_type.is_dir() {
                pending.push(path);
            } else if is_video(&path) {
                found.push(path);
            }
        }
    }

    Ok(found)
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
