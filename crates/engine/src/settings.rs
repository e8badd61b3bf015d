use std::env;
use std::path::PathBuf;
use std::time::Duration;

use placement_api::PlacementClient;
use serde::Deserialize;

use crate::media::{DEFAULT_PREVIEW_MAX_WIDTH, FfmpegMediaBackend};
use crate::session::{SessionConfig, Workflow};
use crate::time::seconds_to_ticks;

const ENV_PREFIX: &str = "PLACEMENT";
const ENV_CONFIG_PATH: &str = "PLACEMENT_CONFIG_PATH";
const ENV_API_URL: &str = "PLACEMENT_API_URL";

/// Client settings.
///
/// Sources, later wins: struct defaults, the optional TOML file, then
/// `PLACEMENT__SECTION__KEY` environment variables, then `PLACEMENT_API_URL`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub editing: EditingSettings,
    pub preview: PreviewSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Request timeout; unset waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EditingSettings {
    pub min_clip_seconds: f64,
    /// Upload only the selected range when it is narrower than the video.
    pub trim_before_upload: bool,
    pub workflow: Workflow,
}

impl Default for EditingSettings {
    fn default() -> Self {
        Self {
            min_clip_seconds: 2.0,
            trim_before_upload: true,
            workflow: Workflow::Prompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub cache_capacity: usize,
    pub max_width: u32,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            cache_capacity: 96,
            max_width: DEFAULT_PREVIEW_MAX_WIDTH,
        }
    }
}

impl Settings {
    /// Loads settings from the config file and environment.
    ///
    /// # Example
    /// ```no_run
    /// use engine::Settings;
    ///
    /// let settings = Settings::load().expect("settings should load");
    /// settings.validate().expect("settings should be valid");
    /// println!("{}", settings.api.base_url);
    /// ```
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = resolve_config_path() {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("api.base_url", env::var(ENV_API_URL).ok())?;

        builder.build()?.try_deserialize()
    }

    /// Basic sanity checks on loaded values.
    pub fn validate(&self) -> Result<(), String> {
        if self.api.base_url.trim().is_empty() {
            return Err("api.base_url must not be empty".to_string());
        }
        if self.api.timeout_secs == Some(0) {
            return Err("api.timeout_secs must be >= 1 when set".to_string());
        }
        if !self.editing.min_clip_seconds.is_finite() || self.editing.min_clip_seconds <= 0.0 {
            return Err("editing.min_clip_seconds must be a positive number".to_string());
        }
        if self.preview.cache_capacity == 0 {
            return Err("preview.cache_capacity must be >= 1".to_string());
        }
        if self.preview.max_width < 2 {
            return Err("preview.max_width must be >= 2".to_string());
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            min_clip_tl: seconds_to_ticks(self.editing.min_clip_seconds),
            trim_before_upload: self.editing.trim_before_upload,
            workflow: self.editing.workflow,
            preview_cache_capacity: self.preview.cache_capacity,
        }
    }

    pub fn media_backend(&self) -> FfmpegMediaBackend {
        FfmpegMediaBackend {
            max_preview_width: self.preview.max_width,
        }
    }

    pub fn client(&self) -> placement_api::Result<PlacementClient> {
        PlacementClient::new(
            &self.api.base_url,
            self.api.timeout_secs.map(Duration::from_secs),
        )
    }
}

/// Config path from `PLACEMENT_CONFIG_PATH`, else the XDG default.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(ENV_CONFIG_PATH) {
        return Some(PathBuf::from(path));
    }
    default_config_path()
}

/// `$XDG_CONFIG_HOME/placement/config.toml`, or `~/.config/placement/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|dir| dir.join("placement").join("config.toml"))
}
