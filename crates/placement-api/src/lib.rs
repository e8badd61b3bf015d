//! Blocking HTTP client for the product-placement inference service.

mod client;
mod error;
mod reply;
mod wire;

pub use client::{ENDPOINT_ANALYZE, ENDPOINT_GENERATE, ENDPOINT_PROCESS_VIDEO, PlacementClient};
pub use error::{ApiError, GENERIC_FAILURE_MESSAGE, Result};
pub use reply::{ServiceReply, VideoPayload, interpret_reply};
pub use wire::{DetectedItem, DetectionPayload, HealthStatus, TimeSpan};
