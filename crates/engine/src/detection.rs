use std::collections::BTreeSet;

use placement_api::{DetectedItem, DetectionPayload, TimeSpan};

use crate::error::{EngineError, Result};

/// Stable identifier assigned to a detected target when the reply arrives.
pub type TargetId = u64;

/// Spans closer than this (seconds) count as one visibility interval.
pub const SPAN_MERGE_GAP_SECONDS: f64 = 0.30;

/// One detected target.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTarget {
    pub id: TargetId,
    pub label: String,
    pub description: String,
    pub spans: Vec<TimeSpan>,
}

impl DetectionTarget {
    /// Total visible time after merging nearby spans.
    pub fn visible_seconds(&self) -> f64 {
        merge_spans(&self.spans, SPAN_MERGE_GAP_SECONDS)
            .iter()
            .map(TimeSpan::length)
            .sum()
    }

    fn to_item(&self) -> DetectedItem {
        DetectedItem {
            label: self.label.clone(),
            description: self.description.clone(),
            timestamps: self.spans.clone(),
        }
    }
}

/// Detection result plus the user's selection over it.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSet {
    target_description: Option<String>,
    targets: Vec<DetectionTarget>,
    selected: BTreeSet<TargetId>,
}

impl DetectionSet {
    /// Builds a set from a service reply with every target selected.
    ///
    /// Ids are drawn from `next_id`, which keeps counting across results.
    pub fn from_payload(payload: DetectionPayload, next_id: &mut TargetId) -> Self {
        let targets: Vec<DetectionTarget> = payload
            .items
            .into_iter()
            .map(|item| {
                let id = *next_id;
                *next_id += 1;
                DetectionTarget {
                    id,
                    label: item.label,
                    description: item.description,
                    spans: item.timestamps,
                }
            })
            .collect();
        let selected = targets.iter().map(|target| target.id).collect();
        Self {
            target_description: payload.target_description,
            targets,
            selected,
        }
    }

    pub fn target_description(&self) -> Option<&str> {
        self.target_description.as_deref()
    }

    pub fn targets(&self) -> &[DetectionTarget] {
        &self.targets
    }

    pub fn is_selected(&self, id: TargetId) -> bool {
        self.selected.contains(&id)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Flips one target. Returns its new state.
    pub fn toggle(&mut self, id: TargetId) -> Result<bool> {
        if !self.targets.iter().any(|target| target.id == id) {
            return Err(EngineError::UnknownTarget { id });
        }
        if self.selected.remove(&id) {
            Ok(false)
        } else {
            self.selected.insert(id);
            Ok(true)
        }
    }

    /// Selected targets in reply order, ids stripped.
    pub fn selected_items(&self) -> Vec<DetectedItem> {
        self.targets
            .iter()
            .filter(|target| self.selected.contains(&target.id))
            .map(DetectionTarget::to_item)
            .collect()
    }
}

/// Merges spans whose gap is at most `gap_seconds`. Output is sorted.
///
/// # Example
/// ```
/// use engine::detection::merge_spans;
/// use placement_api::TimeSpan;
///
/// let merged = merge_spans(
///     &[
///         TimeSpan { start_time: 2.0, end_time: 3.0 },
///         TimeSpan { start_time: 0.0, end_time: 1.0 },
///         TimeSpan { start_time: 1.2, end_time: 1.5 },
///     ],
///     0.3,
/// );
/// assert_eq!(merged.len(), 2);
/// assert_eq!(merged[0].end_time, 1.5);
/// ```
pub fn merge_spans(spans: &[TimeSpan], gap_seconds: f64) -> Vec<TimeSpan> {
    let mut sorted: Vec<TimeSpan> = spans
        .iter()
        .copied()
        .filter(|span| span.start_time.is_finite() && span.end_time.is_finite())
        .collect();
    sorted.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut merged: Vec<TimeSpan> = Vec::with_capacity(sorted.len());
    for span in sorted {
        match merged.last_mut() {
            Some(last) if span.start_time - last.end_time <= gap_seconds => {
                last.end_time = last.end_time.max(span.end_time);
            }
            _ => merged.push(span),
        }
    }
    merged
}
