//! Application configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! `FALLWATCH__SECTION__KEY` environment variables.

use alerting::{AlertLogConfig, DispatchConfig, NotifierConfig};
use camera_capture::{CameraConfig, MAX_CLIP_DURATION, MAX_CLIP_FPS, MAX_DIMENSION};
use fall_detection::{DetectionSettings, PoseServerConfig, SlotId};
use serde::{Deserialize, Serialize};
use slot_scheduler::SchedulerConfig;
use std::path::{Path, PathBuf};

use crate::ApiError;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Root for received screenshots and videos
    pub captures_dir: PathBuf,
    /// Largest accepted alert upload (MiB)
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".to_string(),
            captures_dir: PathBuf::from("captures"),
            max_upload_mb: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// One monitored camera
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    pub id: SlotId,
    pub camera: CameraConfig,
    pub pose: PoseServerConfig,
    pub detection: DetectionSettings,
    /// Start monitoring as soon as the server is up
    pub autostart: bool,
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub scheduler: SchedulerConfig,
    pub dispatch: DispatchConfig,
    pub notifiers: NotifierConfig,
    pub alert_log: AlertLogConfig,
    pub slots: Vec<SlotConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log: LogConfig::default(),
            scheduler: SchedulerConfig::default(),
            dispatch: DispatchConfig::default(),
            notifiers: NotifierConfig::default(),
            alert_log: AlertLogConfig::default(),
            slots: vec![SlotConfig::default()],
        }
    }
}

impl AppConfig {
    /// Load configuration. Without an explicit path, `fallwatch.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ApiError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("fallwatch").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("FALLWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ApiError> {
        let mut ids: Vec<SlotId> = self.slots.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ApiError::Startup(format!("slot {} configured twice", pair[0])));
        }

        let capture = &self.scheduler.capture;
        if capture.clip_secs > MAX_CLIP_DURATION.as_secs() {
            return Err(ApiError::Startup(format!(
                "clip_secs {} exceeds {}",
                capture.clip_secs,
                MAX_CLIP_DURATION.as_secs()
            )));
        }
        if capture.clip_fps == 0 || capture.clip_fps > MAX_CLIP_FPS {
            return Err(ApiError::Startup(format!(
                "clip_fps {} outside 1..={}",
                capture.clip_fps, MAX_CLIP_FPS
            )));
        }

        for slot in &self.slots {
            let camera = &slot.camera;
            let valid = 1..=MAX_DIMENSION;
            if !valid.contains(&camera.width) || !valid.contains(&camera.height) {
                return Err(ApiError::Startup(format!(
                    "slot {}: camera size {}x{} outside 1..={}",
                    slot.id, camera.width, camera.height, MAX_DIMENSION
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("fallwatch-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr, "0.0.0.0:3000");
        assert_eq!(config.slots.len(), 1);
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert!(config.notifiers.sms.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = write_temp(
            r#"
            [server]
            captures_dir = "/var/lib/fallwatch"

            [log]
            format = "json"

            [[slots]]
            id = 1
            autostart = true
            camera = { snapshot_url = "http://10.0.0.12/snapshot.jpg" }
            detection = { sensitivity = 2.0, countdown_secs = 15 }

            [[slots]]
            id = 2

            [notifiers.sms]
            user = "12345678"
            pass = "secret"
            "#,
        );

        let config = AppConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.captures_dir, PathBuf::from("/var/lib/fallwatch"));
        assert_eq!(config.server.addr, "0.0.0.0:3000");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.slots.len(), 2);
        assert!(config.slots[0].autostart);
        assert_eq!(config.slots[0].detection.sensitivity, 2.0);
        assert_eq!(config.slots[0].detection.confirmation_secs, 2.0);
        assert!(config.slots[1].camera.snapshot_url.is_none());
        let sms = config.notifiers.sms.unwrap();
        assert_eq!(sms.endpoint, "https://smsapi.free-mobile.fr/sendmsg");
    }

    #[test]
    fn test_duplicate_slot_ids_rejected() {
        let path = write_temp("[[slots]]\nid = 4\n\n[[slots]]\nid = 4\n");
        let result = AppConfig::load(Some(&path));
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ApiError::Startup(_))));
    }

    #[test]
    fn test_out_of_range_sizes_rejected() {
        for contents in [
            "[scheduler.capture]\nclip_secs = 100000\n",
            "[scheduler.capture]\nclip_fps = 0\n",
            "[[slots]]\nid = 1\ncamera = { width = 100000, height = 480 }\n",
        ] {
            let path = write_temp(contents);
            let result = AppConfig::load(Some(&path));
            std::fs::remove_file(&path).ok();
            assert!(matches!(result, Err(ApiError::Startup(_))), "{}", contents);
        }
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let path = std::env::temp_dir().join("fallwatch-does-not-exist.toml");
        assert!(matches!(AppConfig::load(Some(&path)), Err(ApiError::Config(_))));
    }
}
