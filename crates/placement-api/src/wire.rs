use serde::{Deserialize, Serialize};

/// Detection reply of `/analyze`.
///
/// Both backend variants are accepted: the target phrase arrives either as
/// `target_description` or `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionPayload {
    #[serde(default, alias = "target", skip_serializing_if = "Option::is_none")]
    pub target_description: Option<String>,
    pub items: Vec<DetectedItem>,
}

/// One candidate object and the spans where it is visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedItem {
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timestamps: Vec<TimeSpan>,
}

/// Visibility span in seconds. Deserializes from `{start_time, end_time}`
/// objects or `[start, end]` pairs; reversed bounds are swapped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTimeSpan")]
pub struct TimeSpan {
    pub start_time: f64,
    pub end_time: f64,
}

impl TimeSpan {
    /// Length of the span in seconds.
    pub fn length(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimeSpan {
    Object { start_time: f64, end_time: f64 },
    Pair([f64; 2]),
}

impl From<RawTimeSpan> for TimeSpan {
    fn from(value: RawTimeSpan) -> Self {
        let (start, end) = match value {
            RawTimeSpan::Object {
                start_time,
                end_time,
            } => (start_time, end_time),
            RawTimeSpan::Pair([start, end]) => (start, end),
        };
        Self {
            start_time: start.min(end),
            end_time: start.max(end),
        }
    }
}

/// Reply of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}
