use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Identifier of one preview handle, unique within its slot.
pub type PreviewId = u64;

/// Where a preview's media comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewSource {
    /// A file the user picked. Never deleted by the slot.
    File(PathBuf),
    /// Encoded media held in memory, written to a temporary file.
    Bytes { bytes: Vec<u8>, extension: String },
}

/// Playable reference to one preview.
#[derive(Debug)]
pub struct PreviewHandle {
    id: PreviewId,
    path: PathBuf,
    temp: Option<TempPath>,
}

impl PreviewHandle {
    pub fn id(&self) -> PreviewId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the slot owns the backing file.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

/// Holds at most one live preview handle.
///
/// Replacing or clearing the slot releases the previous handle first;
/// temporary files are deleted on release and when the slot is dropped.
#[derive(Debug)]
pub struct PreviewSlot {
    name: &'static str,
    current: Option<PreviewHandle>,
    next_id: PreviewId,
}

impl PreviewSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: None,
            next_id: 1,
        }
    }

    pub fn current(&self) -> Option<&PreviewHandle> {
        self.current.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.current.as_ref().map(PreviewHandle::path)
    }

    /// Releases the old handle, then creates one for `source`.
    ///
    /// # Example
    /// ```
    /// use engine::slot::{PreviewSlot, PreviewSource};
    ///
    /// let mut slot = PreviewSlot::new("result");
    /// let first = slot
    ///     .replace(PreviewSource::Bytes { bytes: vec![1, 2, 3], extension: "mp4".into() })
    ///     .unwrap()
    ///     .path()
    ///     .to_path_buf();
    /// assert!(first.exists());
    ///
    /// slot.replace(PreviewSource::Bytes { bytes: vec![4], extension: "mp4".into() })
    ///     .unwrap();
    /// assert!(!first.exists());
    /// ```
    pub fn replace(&mut self, source: PreviewSource) -> Result<&PreviewHandle> {
        self.revoke();

        let id = self.next_id;
        self.next_id += 1;
        let handle = match source {
            PreviewSource::File(path) => PreviewHandle {
                id,
                path,
                temp: None,
            },
            PreviewSource::Bytes { bytes, extension } => {
                let temp = write_temp_media(&bytes, &extension)?;
                PreviewHandle {
                    id,
                    path: temp.to_path_buf(),
                    temp: Some(temp),
                }
            }
        };
        debug!(slot = self.name, id, path = ?handle.path, "preview handle created");
        Ok(self.current.insert(handle))
    }

    /// Releases the current handle, if any.
    pub fn revoke(&mut self) -> Option<PreviewId> {
        let handle = self.current.take()?;
        debug!(slot = self.name, id = handle.id, "preview handle released");
        Some(handle.id)
    }
}

fn write_temp_media(bytes: &[u8], extension: &str) -> Result<TempPath> {
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let mut file = tempfile::Builder::new()
        .prefix("placement-preview-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|source| EngineError::PreviewIo {
            context: "failed to create preview file",
            source,
        })?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|source| EngineError::PreviewIo {
            context: "failed to write preview file",
            source,
        })?;
    Ok(file.into_temp_path())
}
