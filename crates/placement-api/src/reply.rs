use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::error::{ApiError, GENERIC_FAILURE_MESSAGE, Result};
use crate::wire::DetectionPayload;

/// Successful reply of the placement service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceReply {
    Video(VideoPayload),
    Detection(DetectionPayload),
}

/// Encoded video returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    /// Free text the service attached to the video, if any.
    pub note: Option<String>,
}

impl VideoPayload {
    /// File extension to use when materializing the payload.
    ///
    /// # Example
    /// ```
    /// use placement_api::VideoPayload;
    ///
    /// let payload = VideoPayload {
    ///     bytes: Vec::new(),
    ///     content_type: Some("video/webm".to_owned()),
    ///     filename: None,
    ///     note: None,
    /// };
    /// assert_eq!(payload.extension(), "webm");
    /// ```
    pub fn extension(&self) -> &str {
        if let Some(ext) = self
            .filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        {
            return ext;
        }
        match self.content_type.as_deref().map(mime_essence) {
            Some("video/webm") => "webm",
            Some("video/quicktime") => "mov",
            Some("video/x-matroska") => "mkv",
            _ => "mp4",
        }
    }
}

/// Classifies one HTTP reply.
///
/// Non-2xx replies become [`ApiError::Backend`] carrying the server message
/// (`error`, `detail` or `detail.error`) or [`GENERIC_FAILURE_MESSAGE`].
/// Successful JSON with an `items` array is a detection result, JSON with a
/// base64 `video` field is decoded, and anything else is a binary video.
pub fn interpret_reply(
    status: u16,
    content_type: Option<&str>,
    body: Vec<u8>,
) -> Result<ServiceReply> {
    if !(200..300).contains(&status) {
        let message = backend_message(&body).unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_owned());
        return Err(ApiError::Backend { status, message });
    }

    if !looks_like_json(content_type, &body) {
        return Ok(ServiceReply::Video(VideoPayload {
            bytes: body,
            content_type: content_type.map(str::to_owned),
            filename: None,
            note: None,
        }));
    }

    let value: Value = serde_json::from_slice(&body).map_err(|source| ApiError::Json {
        context: "service reply",
        source,
    })?;

    if value.get("items").is_some_and(Value::is_array) {
        let payload: DetectionPayload =
            serde_json::from_value(value).map_err(|source| ApiError::Json {
                context: "detection result",
                source,
            })?;
        return Ok(ServiceReply::Detection(payload));
    }

    if let Some(encoded) = value.get("video").and_then(Value::as_str) {
        let bytes = STANDARD.decode(encoded.trim())?;
        return Ok(ServiceReply::Video(VideoPayload {
            bytes,
            content_type: Some("video/mp4".to_owned()),
            filename: value
                .get("filename")
                .and_then(Value::as_str)
                .map(str::to_owned),
            note: value
                .get("text")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(str::to_owned),
        }));
    }

    Ok(ServiceReply::Video(VideoPayload {
        bytes: body,
        content_type: content_type.map(str::to_owned),
        filename: None,
        note: None,
    }))
}

fn backend_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Some(message.to_owned());
    }
    match value.get("detail")? {
        Value::String(message) => Some(message.clone()),
        Value::Object(detail) => detail
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_owned),
        // FastAPI validation errors
        Value::Array(entries) => entries
            .first()
            .and_then(|entry| entry.get("msg"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

fn looks_like_json(content_type: Option<&str>, body: &[u8]) -> bool {
    match content_type.map(mime_essence) {
        Some(mime) => mime == "application/json" || mime.ends_with("+json"),
        None => body
            .iter()
            .find(|byte| !byte.is_ascii_whitespace())
            .is_some_and(|byte| *byte == b'{'),
    }
}

fn mime_essence(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or(content_type)
}
