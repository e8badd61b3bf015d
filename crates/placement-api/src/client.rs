use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::Form;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::reply::{ServiceReply, interpret_reply};
use crate::wire::{DetectedItem, HealthStatus};

pub const ENDPOINT_PROCESS_VIDEO: &str = "process-video";
pub const ENDPOINT_ANALYZE: &str = "analyze";
pub const ENDPOINT_GENERATE: &str = "generate";
const ENDPOINT_HEALTH: &str = "health";

/// Blocking client bound to one service base URL.
#[derive(Debug, Clone)]
pub struct PlacementClient {
    base_url: String,
    http: Client,
}

impl PlacementClient {
    /// Creates a client for `base_url`.
    ///
    /// `timeout` of `None` waits for the service indefinitely.
    ///
    /// # Example
    /// ```no_run
    /// use placement_api::PlacementClient;
    ///
    /// let client = PlacementClient::new("http://localhost:5000", None).expect("valid url");
    /// assert_eq!(client.endpoint("analyze"), "http://localhost:5000/analyze");
    /// ```
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let parsed = reqwest::Url::parse(base_url.trim()).map_err(|err| ApiError::InvalidBaseUrl {
            value: base_url.to_owned(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidBaseUrl {
                value: base_url.to_owned(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: base_url.to_owned(),
                source,
            })?;

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_owned(),
            http,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of `name`.
    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.trim_start_matches('/'))
    }

    /// `POST /process-video` with `video`, `text` and an optional `image`.
    pub fn process_video(
        &self,
        video: &Path,
        image: Option<&Path>,
        prompt: &str,
    ) -> Result<ServiceReply> {
        let mut form = attach(Form::new(), "video", video)?.text("text", prompt.to_owned());
        if let Some(image) = image {
            form = attach(form, "image", image)?;
        }
        self.post_form(ENDPOINT_PROCESS_VIDEO, form)
    }

    /// `POST /analyze` with `video` and an optional `image`.
    pub fn analyze(&self, video: &Path, image: Option<&Path>) -> Result<ServiceReply> {
        let mut form = attach(Form::new(), "video", video)?;
        if let Some(image) = image {
            form = attach(form, "image", image)?;
        }
        self.post_form(ENDPOINT_ANALYZE, form)
    }

    /// `POST /generate` with `video`, `image` and the JSON-encoded `targets`.
    pub fn generate(
        &self,
        video: &Path,
        image: Option<&Path>,
        targets: &[DetectedItem],
    ) -> Result<ServiceReply> {
        let targets = serde_json::to_string(targets).map_err(|source| ApiError::Json {
            context: "targets",
            source,
        })?;
        let mut form = attach(Form::new(), "video", video)?;
        if let Some(image) = image {
            form = attach(form, "image", image)?;
        }
        self.post_form(ENDPOINT_GENERATE, form.text("targets", targets))
    }

    /// `GET /health`.
    pub fn health(&self) -> Result<HealthStatus> {
        let endpoint = self.endpoint(ENDPOINT_HEALTH);
        let response = self
            .http
            .get(&endpoint)
            .send()
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;
        let status = response.status().as_u16();
        let body = read_body(&endpoint, response)?;
        if !(200..300).contains(&status) {
            return Err(ApiError::Backend {
                status,
                message: format!("health check returned {status}"),
            });
        }
        serde_json::from_slice(&body).map_err(|source| ApiError::Json {
            context: "health reply",
            source,
        })
    }

    fn post_form(&self, name: &str, form: Form) -> Result<ServiceReply> {
        let endpoint = self.endpoint(name);
        info!(endpoint = %endpoint, "sending request");
        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = read_body(&endpoint, response)?;
        debug!(
            endpoint = %endpoint,
            status,
            content_type = ?content_type,
            bytes = body.len(),
            "received reply"
        );

        interpret_reply(status, content_type.as_deref(), body)
    }
}

fn attach(form: Form, field: &'static str, path: &Path) -> Result<Form> {
    form.file(field, path).map_err(|source| ApiError::ReadFile {
        field,
        path: path.to_path_buf(),
        source,
    })
}

fn read_body(endpoint: &str, response: Response) -> Result<Vec<u8>> {
    response
        .bytes()
        .map(|bytes| bytes.to_vec())
        .map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_owned(),
            source,
        })
}
