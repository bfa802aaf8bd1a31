use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::ingest::{IpCameraConfig, PlaybackConfig};

pub const CONFIG_ENV: &str = "VIDEOPLAYBACK_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct ProducerConfigFile {
    ip_camera: Option<IpCameraConfigFile>,
    playback: Option<PlaybackConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct IpCameraConfigFile {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    rate: Option<f64>,
    wrap_image: Option<bool>,
    timeout_secs: Option<f64>,
    retry_attempts: Option<u32>,
    retry_delay_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct PlaybackConfigFile {
    path: Option<String>,
    fps: Option<f64>,
    loop_playback: Option<bool>,
    wrap_image: Option<bool>,
}

/// Producer settings from an optional JSON file plus environment overrides.
///
/// A section is present when the file has it or when its address variable
/// (`VIDEOPLAYBACK_CAMERA_URL`, `VIDEOPLAYBACK_VIDEO_PATH`) is set.
#[derive(Debug, Clone, Default)]
pub struct ProducerConfig {
    pub ip_camera: Option<IpCameraConfig>,
    pub playback: Option<PlaybackConfig>,
}

impl ProducerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let cfg = Self::read_from(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Merge the file at `path` with environment overrides without
    /// validating the sections.
    ///
    /// For callers that apply further overrides before building a producer;
    /// the producer constructors validate their own section.
    pub fn read_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: ProducerConfigFile) -> Result<Self> {
        let ip_camera = match file.ip_camera {
            Some(section) => {
                let mut camera = IpCameraConfig::new(section.url.unwrap_or_default());
                camera.username = section.username;
                camera.password = section.password;
                camera.width = section.width;
                camera.height = section.height;
                if let Some(rate) = section.rate {
                    camera.rate = rate;
                }
                if let Some(wrap_image) = section.wrap_image {
                    camera.wrap_image = wrap_image;
                }
                if let Some(secs) = section.timeout_secs {
                    camera.timeout = secs_to_duration("ip_camera.timeout_secs", secs)?;
                }
                if let Some(attempts) = section.retry_attempts {
                    camera.retry_attempts = attempts;
                }
                if let Some(secs) = section.retry_delay_secs {
                    camera.retry_delay = secs_to_duration("ip_camera.retry_delay_secs", secs)?;
                }
                Some(camera)
            }
            None => None,
        };
        let playback = file.playback.map(|section| {
            let mut playback = PlaybackConfig::new(section.path.unwrap_or_default());
            playback.fps = section.fps;
            if let Some(loop_playback) = section.loop_playback {
                playback.loop_playback = loop_playback;
            }
            if let Some(wrap_image) = section.wrap_image {
                playback.wrap_image = wrap_image;
            }
            playback
        });
        Ok(Self {
            ip_camera,
            playback,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("VIDEOPLAYBACK_CAMERA_URL") {
            let camera = self
                .ip_camera
                .get_or_insert_with(|| IpCameraConfig::new(url.clone()));
            camera.url = url;
        }
        if let Some(camera) = self.ip_camera.as_mut() {
            if let Some(username) = env_value("VIDEOPLAYBACK_CAMERA_USERNAME") {
                camera.username = Some(username);
            }
            if let Some(password) = env_value("VIDEOPLAYBACK_CAMERA_PASSWORD") {
                camera.password = Some(password);
            }
            if let Some(attempts) = env_value("VIDEOPLAYBACK_RETRY_ATTEMPTS") {
                camera.retry_attempts = attempts.parse().map_err(|_| {
                    anyhow!("VIDEOPLAYBACK_RETRY_ATTEMPTS must be a positive integer")
                })?;
            }
            if let Some(delay) = env_value("VIDEOPLAYBACK_RETRY_DELAY_SECS") {
                let secs: f64 = delay.parse().map_err(|_| {
                    anyhow!("VIDEOPLAYBACK_RETRY_DELAY_SECS must be a number of seconds")
                })?;
                camera.retry_delay = secs_to_duration("VIDEOPLAYBACK_RETRY_DELAY_SECS", secs)?;
            }
        }

        if let Some(path) = env_value("VIDEOPLAYBACK_VIDEO_PATH") {
            let playback = self
                .playback
                .get_or_insert_with(|| PlaybackConfig::new(path.clone()));
            playback.path = path;
        }
        if let Some(playback) = self.playback.as_mut() {
            if let Some(fps) = env_value("VIDEOPLAYBACK_VIDEO_FPS") {
                let fps: f64 = fps
                    .parse()
                    .map_err(|_| anyhow!("VIDEOPLAYBACK_VIDEO_FPS must be a number"))?;
                playback.fps = Some(fps);
            }
            if let Some(value) = env_value("VIDEOPLAYBACK_VIDEO_LOOP") {
                playback.loop_playback = parse_bool(&value)
                    .ok_or_else(|| anyhow!("VIDEOPLAYBACK_VIDEO_LOOP must be true or false"))?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if let Some(camera) = &self.ip_camera {
            camera
                .validate()
                .map_err(|e| anyhow!("invalid ip_camera config: {:#}", e))?;
        }
        if let Some(playback) = &self.playback {
            playback
                .validate()
                .map_err(|e| anyhow!("invalid playback config: {:#}", e))?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ProducerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn secs_to_duration(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds", name))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
