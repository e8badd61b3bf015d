use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::media::PreviewFrame;

/// Fallback bucket: one frame at 30 fps.
pub const DEFAULT_PREVIEW_BUCKET_TL: i64 = 33_333;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FrameKey {
    path: PathBuf,
    bucket: i64,
}

/// LRU cache of decoded preview frames, bucketed by playhead ticks.
///
/// Playback ticks that land in the same frame bucket reuse one decode.
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// use engine::PreviewFrame;
/// use engine::cache::PreviewFrameCache;
///
/// let mut cache = PreviewFrameCache::new(8, 40_000);
/// cache.insert(
///     "clip.mp4",
///     1_500_000,
///     PreviewFrame { width: 2, height: 2, bytes: Arc::from(vec![0; 16]) },
/// );
///
/// assert!(cache.get("clip.mp4", 1_510_000).is_some());
/// assert!(cache.get("result.mp4", 1_500_000).is_none());
/// ```
#[derive(Debug)]
pub struct PreviewFrameCache {
    capacity: usize,
    bucket_size_tl: i64,
    entries: HashMap<FrameKey, PreviewFrame>,
    lru_order: VecDeque<FrameKey>,
}

impl PreviewFrameCache {
    /// Creates a cache. Zero capacity or bucket size is raised to one.
    pub fn new(capacity: usize, bucket_size_tl: i64) -> Self {
        Self {
            capacity: capacity.max(1),
            bucket_size_tl: bucket_size_tl.max(1),
            entries: HashMap::new(),
            lru_order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bucket_size_tl(&self) -> i64 {
        self.bucket_size_tl
    }

    /// Changes the bucket size. Cached frames are dropped when it differs.
    pub fn set_bucket_size(&mut self, bucket_size_tl: i64) {
        let bucket_size_tl = bucket_size_tl.max(1);
        if bucket_size_tl != self.bucket_size_tl {
            self.bucket_size_tl = bucket_size_tl;
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_order.clear();
    }

    /// Drops every frame decoded from `path`.
    pub fn forget(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.entries.retain(|key, _| key.path != path);
        self.lru_order.retain(|key| key.path != path);
    }

    /// Returns one cached frame and marks it as recently used.
    pub fn get(&mut self, path: impl AsRef<Path>, t_tl: i64) -> Option<PreviewFrame> {
        let key = self.make_key(path.as_ref(), t_tl);
        let frame = self.entries.get(&key)?.clone();
        self.touch(&key);
        Some(frame)
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, t_tl: i64, frame: PreviewFrame) {
        let key = self.make_key(path.as_ref(), t_tl);
        self.entries.insert(key.clone(), frame);
        self.touch(&key);
        self.evict_if_needed();
    }

    fn make_key(&self, path: &Path, t_tl: i64) -> FrameKey {
        FrameKey {
            path: path.to_path_buf(),
            bucket: t_tl.max(0).div_euclid(self.bucket_size_tl),
        }
    }

    fn touch(&mut self, key: &FrameKey) {
        if let Some(index) = self.lru_order.iter().position(|existing| existing == key) {
            let _ = self.lru_order.remove(index);
        }
        self.lru_order.push_back(key.clone());
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.lru_order.pop_front() else {
                break;
            };
            let _ = self.entries.remove(&oldest);
        }
    }
}
