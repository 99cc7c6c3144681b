use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::call::layout::{LayoutMetrics, Size};
use crate::call::CallOptions;
use crate::media::CameraSettings;

const MIN_CAPTURE_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub media_base_url: String,
    pub capture_interval_ms: u64,
    pub jpeg_quality: f32,
    pub camera_enabled: bool,
    pub ffmpeg_cmd: String,
    pub camera_device: String,
    pub camera_format: String,
    pub camera_width: u32,
    pub camera_height: u32,
    pub pip_width: f64,
    pub pip_height: f64,
    pub dock_right: f64,
    pub dock_bottom: f64,
    pub avatar_enabled: bool,
    pub avatar_model_url: String,
    pub chat_enabled: bool,
    pub global_hotkey: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:5000/ws".to_string(),
            media_base_url: "http://127.0.0.1:5000".to_string(),
            capture_interval_ms: 500,
            jpeg_quality: 0.5,
            camera_enabled: true,
            ffmpeg_cmd: "ffmpeg".to_string(),
            camera_device: default_camera_device().to_string(),
            camera_format: default_camera_format().to_string(),
            camera_width: 640,
            camera_height: 480,
            pip_width: 320.0,
            pip_height: 180.0,
            dock_right: 30.0,
            dock_bottom: 100.0,
            avatar_enabled: false,
            avatar_model_url: String::new(),
            chat_enabled: false,
            global_hotkey: true,
        }
    }
}

fn default_camera_device() -> &'static str {
    if cfg!(target_os = "macos") {
        "0"
    } else if cfg!(target_os = "windows") {
        "video=Integrated Camera"
    } else {
        "/dev/video0"
    }
}

fn default_camera_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("kai-call");
        config_dir.join("config.toml")
    }

    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            return Self::load_from(&path);
        }

        let config = Config::default().with_env_fallback();
        // Save defaults on first run
        if let Err(e) = config.save_to(&path) {
            log::warn!("Failed to write default config: {}", e);
        }
        config
    }

    /// Read and parse `path`, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return config.with_env_fallback();
                }
                Err(e) => {
                    log::warn!("Failed to parse config: {}. Using defaults.", e);
                }
            },
            Err(e) => {
                log::warn!("Failed to read config: {}. Using defaults.", e);
            }
        }
        Config::default().with_env_fallback()
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Use env vars as fallback if the URL fields are empty
    fn with_env_fallback(mut self) -> Self {
        if self.server_url.is_empty() {
            if let Ok(url) = std::env::var("KAI_SERVER_URL") {
                self.server_url = url;
            }
        }
        if self.media_base_url.is_empty() {
            if let Ok(url) = std::env::var("KAI_MEDIA_BASE_URL") {
                self.media_base_url = url;
            }
        }
        self
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms.max(MIN_CAPTURE_INTERVAL_MS))
    }

    pub fn effective_jpeg_quality(&self) -> f32 {
        if self.jpeg_quality.is_finite() {
            self.jpeg_quality.clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    pub fn effective_avatar_model(&self) -> Option<&str> {
        if self.avatar_enabled && !self.avatar_model_url.is_empty() {
            Some(&self.avatar_model_url)
        } else {
            None
        }
    }

    pub fn layout_metrics(&self) -> LayoutMetrics {
        LayoutMetrics {
            pip_size: Size::new(self.pip_width.max(1.0), self.pip_height.max(1.0)),
            dock_right: self.dock_right.max(0.0),
            dock_bottom: self.dock_bottom.max(0.0),
        }
    }

    /// Core options; layout metrics are scaled to physical pixels.
    pub fn call_options(&self, scale_factor: f64) -> CallOptions {
        CallOptions {
            metrics: self.layout_metrics().scaled(scale_factor),
            capture_interval: self.capture_interval(),
            jpeg_quality: self.effective_jpeg_quality(),
            camera_enabled: self.camera_enabled,
            chat_enabled: self.chat_enabled,
        }
    }

    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            ffmpeg_cmd: self.ffmpeg_cmd.clone(),
            device: self.camera_device.clone(),
            input_format: self.camera_format.clone(),
            width: self.camera_width,
            height: self.camera_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let c = Config::default();
        assert_eq!(c.capture_interval(), Duration::from_millis(500));
        assert_eq!(c.effective_jpeg_quality(), 0.5);
        assert_eq!(c.layout_metrics(), LayoutMetrics::default());
    }

    #[test]
    fn round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut c = Config::default();
        c.chat_enabled = true;
        c.capture_interval_ms = 750;
        c.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), c);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "avatar_enabled = true\navatar_model_url = \"kai.glb\"\n").unwrap();
        let c = Config::load_from(&path);
        assert_eq!(c.effective_avatar_model(), Some("kai.glb"));
        assert_eq!(c.server_url, Config::default().server_url);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert_eq!(Config::load_from(&path).capture_interval_ms, 500);
    }

    #[test]
    fn out_of_range_values_are_tamed() {
        let c = Config {
            capture_interval_ms: 1,
            jpeg_quality: 3.0,
            ..Config::default()
        };
        assert_eq!(c.capture_interval(), Duration::from_millis(MIN_CAPTURE_INTERVAL_MS));
        assert_eq!(c.effective_jpeg_quality(), 1.0);
    }

    #[test]
    fn call_options_scale_metrics() {
        let opts = Config::default().call_options(2.0);
        assert_eq!(opts.metrics.pip_size, Size::new(640.0, 360.0));
        assert!(opts.camera_enabled);
        assert!(!opts.chat_enabled);
    }
}
