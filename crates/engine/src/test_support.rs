use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use placement_api::{ApiError, DetectedItem, ServiceReply};

use crate::error::EngineError;
use crate::media::{MediaBackend, PreviewFrame, ProbedMedia, TrimJob};
use crate::service::PlacementService;

/// Media backend that records calls. Clones share recorded state.
#[derive(Debug, Clone)]
pub(crate) struct MockBackend {
    default_duration_tl: i64,
    durations: Arc<Mutex<HashMap<String, i64>>>,
    write_output: bool,
    probe_calls: Arc<Mutex<Vec<PathBuf>>>,
    decode_calls: Arc<Mutex<Vec<(PathBuf, f64)>>>,
    trim_jobs: Arc<Mutex<Vec<TrimJob>>>,
}

impl MockBackend {
    pub(crate) fn with_duration(duration_tl: i64) -> Self {
        Self {
            default_duration_tl: duration_tl,
            durations: Arc::new(Mutex::new(HashMap::new())),
            write_output: true,
            probe_calls: Arc::new(Mutex::new(Vec::new())),
            decode_calls: Arc::new(Mutex::new(Vec::new())),
            trim_jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn writing_nothing(mut self) -> Self {
        self.write_output = false;
        self
    }

    /// Overrides the probed duration for paths containing `pattern`.
    pub(crate) fn set_duration(&self, pattern: &str, duration_tl: i64) {
        self.durations
            .lock()
            .expect("lock durations")
            .insert(pattern.to_owned(), duration_tl);
    }

    pub(crate) fn probe_calls(&self) -> usize {
        self.probe_calls.lock().expect("lock probe calls").len()
    }

    pub(crate) fn decode_calls(&self) -> Vec<(PathBuf, f64)> {
        self.decode_calls.lock().expect("lock decode calls").clone()
    }

    pub(crate) fn trim_jobs(&self) -> Vec<TrimJob> {
        self.trim_jobs.lock().expect("lock trim jobs").clone()
    }

    fn duration_for(&self, path: &Path) -> i64 {
        let durations = self.durations.lock().expect("lock durations");
        let path = path.to_string_lossy();
        durations
            .iter()
            .find(|(pattern, _)| path.contains(pattern.as_str()))
            .map(|(_, duration)| *duration)
            .unwrap_or(self.default_duration_tl)
    }
}

impl MediaBackend for MockBackend {
    fn probe(&self, path: &Path) -> crate::Result<ProbedMedia> {
        self.probe_calls
            .lock()
            .expect("lock probe calls")
            .push(path.to_path_buf());
        if path.to_string_lossy().contains("broken") {
            return Err(EngineError::MetadataLoad {
                path: path.to_path_buf(),
                source: media_ffmpeg::MediaFfmpegError::MissingVideoStream(path.to_path_buf()),
            });
        }
        Ok(ProbedMedia {
            path: path.to_path_buf(),
            duration_tl: self.duration_for(path),
            frame_duration_tl: Some(40_000),
            width: Some(160),
            height: Some(90),
            has_audio: true,
        })
    }

    fn decode_preview_frame(&self, path: &Path, at_seconds: f64) -> crate::Result<PreviewFrame> {
        self.decode_calls
            .lock()
            .expect("lock decode calls")
            .push((path.to_path_buf(), at_seconds));
        Ok(PreviewFrame {
            width: 2,
            height: 2,
            bytes: Arc::from(vec![0; 16]),
        })
    }

    fn trim(&self, job: &TrimJob) -> crate::Result<()> {
        self.trim_jobs
            .lock()
            .expect("lock trim jobs")
            .push(job.clone());
        if self.write_output {
            std::fs::write(&job.output, b"trimmed").expect("write trimmed output");
        }
        Ok(())
    }
}

/// One recorded service call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ServiceCall {
    Process {
        video: PathBuf,
        image: Option<PathBuf>,
        prompt: String,
    },
    Analyze {
        video: PathBuf,
        image: Option<PathBuf>,
    },
    Generate {
        video: PathBuf,
        image: Option<PathBuf>,
        targets: Vec<DetectedItem>,
    },
}

/// Service that answers from a queue of canned replies.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockService {
    replies: Arc<Mutex<VecDeque<placement_api::Result<ServiceReply>>>>,
    calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl MockService {
    pub(crate) fn push_reply(&self, reply: placement_api::Result<ServiceReply>) {
        self.replies
            .lock()
            .expect("lock replies")
            .push_back(reply);
    }

    pub(crate) fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().expect("lock calls").clone()
    }

    fn answer(&self, call: ServiceCall) -> placement_api::Result<ServiceReply> {
        self.calls.lock().expect("lock calls").push(call);
        self.replies
            .lock()
            .expect("lock replies")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ApiError::Backend {
                    status: 500,
                    message: "no canned reply".to_owned(),
                })
            })
    }
}

impl PlacementService for MockService {
    fn process_video(
        &self,
        video: &Path,
        image: Option<&Path>,
        prompt: &str,
    ) -> placement_api::Result<ServiceReply> {
        self.answer(ServiceCall::Process {
            video: video.to_path_buf(),
            image: image.map(Path::to_path_buf),
            prompt: prompt.to_owned(),
        })
    }

    fn analyze(&self, video: &Path, image: Option<&Path>) -> placement_api::Result<ServiceReply> {
        self.answer(ServiceCall::Analyze {
            video: video.to_path_buf(),
            image: image.map(Path::to_path_buf),
        })
    }

    fn generate(
        &self,
        video: &Path,
        image: Option<&Path>,
        targets: &[DetectedItem],
    ) -> placement_api::Result<ServiceReply> {
        self.answer(ServiceCall::Generate {
            video: video.to_path_buf(),
            image: image.map(Path::to_path_buf),
            targets: targets.to_vec(),
        })
    }
}
