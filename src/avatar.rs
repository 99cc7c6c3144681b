use std::path::Path;

use crate::call::speech::Emotion;

/// Optional talking-head renderer driven by the speech player.
pub trait AvatarEngine {
    /// Load the avatar model from a local path or `file://` URL. Remote
    /// models are fetched by the caller and handed to `load_model_bytes`.
    /// Failure leaves the call audio-only.
    fn load_model(&mut self, url: &str) -> Result<(), String> {
        if is_remote(url) {
            return Err(format!("{} must be fetched before loading", url));
        }
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        let bytes =
            std::fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        self.load_model_bytes(url, &bytes)
    }

    /// Load an already fetched model; `source` names it in logs and errors.
    fn load_model_bytes(&mut self, source: &str, bytes: &[u8]) -> Result<(), String>;

    /// Playback of `audio_url` started; drive lip sync from output levels.
    fn speak(&mut self, audio_url: &str);

    /// Per-frame update. Returns true while anything is still animating.
    fn update(&mut self, output_levels: [f32; 4]) -> bool;

    fn set_mood(&mut self, mood: Emotion);

    /// Playback finished: close the mouth and relax to neutral.
    fn speech_ended(&mut self) {
        self.set_mood(Emotion::Neutral);
    }

    fn pose(&self) -> AvatarPose;
}

/// What the compositor needs to draw the avatar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarPose {
    /// 0.0 closed .. 1.0 fully open
    pub mouth_open: f32,
    /// Presence glow while speaking
    pub intensity: f32,
    pub color: [f32; 3],
    pub mood: Emotion,
}

pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn mood_color(mood: Emotion) -> [f32; 3] {
    let c = mood.color();
    [
        ((c >> 16) & 0xff) as f32 / 255.0,
        ((c >> 8) & 0xff) as f32 / 255.0,
        (c & 0xff) as f32 / 255.0,
    ]
}

/// 2D stand-in avatar: a face disc whose mouth follows playback levels.
pub struct LipSyncAvatar {
    model: Option<String>,
    speaking: bool,
    levels: [f32; 4],
    intensity: f32,
    color: [f32; 3],
    mood: Emotion,
}

impl Default for LipSyncAvatar {
    fn default() -> Self {
        Self::new()
    }
}

impl LipSyncAvatar {
    pub fn new() -> Self {
        Self {
            model: None,
            speaking: false,
            levels: [0.0; 4],
            intensity: 0.0,
            color: mood_color(Emotion::Neutral),
            mood: Emotion::Neutral,
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// glTF binary magic or a JSON document with an `asset` block.
fn looks_like_gltf(bytes: &[u8]) -> bool {
    if bytes.starts_with(b"glTF") {
        return true;
    }
    serde_json::from_slice::<serde_json::Value>(bytes)
        .map(|v| v.get("asset").is_some())
        .unwrap_or(false)
}

impl AvatarEngine for LipSyncAvatar {
    fn load_model_bytes(&mut self, source: &str, bytes: &[u8]) -> Result<(), String> {
        if !looks_like_gltf(bytes) {
            return Err(format!("{} is not a glTF model", source));
        }
        log::info!("[Avatar] Loaded model {} ({} bytes)", source, bytes.len());
        self.model = Some(source.to_string());
        Ok(())
    }

    fn speak(&mut self, audio_url: &str) {
        log::debug!("[Avatar] Lip sync for {}", audio_url);
        self.speaking = true;
    }

    fn update(&mut self, output_levels: [f32; 4]) -> bool {
        // Fast attack while talking, slower release afterwards
        let speed = if self.speaking { 0.35 } else { 0.2 };
        let target = if self.speaking { output_levels } else { [0.0; 4] };
        for i in 0..4 {
            self.levels[i] += (target[i] - self.levels[i]) * speed;
            if self.levels[i] < 0.003 {
                self.levels[i] = 0.0;
            }
        }

        let int_target = if self.speaking { 1.0 } else { 0.0 };
        self.intensity += (int_target - self.intensity) * 0.15;
        if self.intensity < 0.003 {
            self.intensity = 0.0;
        }

        let tc = mood_color(self.mood);
        for i in 0..3 {
            self.color[i] += (tc[i] - self.color[i]) * 0.08;
        }

        self.speaking
            || self.intensity > 0.001
            || self.levels.iter().any(|&l| l > 0.001)
            || (0..3).any(|i| (tc[i] - self.color[i]).abs() > 0.004)
    }

    fn set_mood(&mut self, mood: Emotion) {
        if self.mood != mood {
            log::debug!("[Avatar] Mood: {:?} -> {:?}", self.mood, mood);
        }
        self.mood = mood;
    }

    fn speech_ended(&mut self) {
        self.speaking = false;
        self.set_mood(Emotion::Neutral);
    }

    fn pose(&self) -> AvatarPose {
        // Low bands carry most of the voice energy
        let mouth = self.levels[0] * 0.4 + self.levels[1] * 0.3 + self.levels[2] * 0.2 + self.levels[3] * 0.1;
        AvatarPose {
            mouth_open: mouth.clamp(0.0, 1.0),
            intensity: self.intensity,
            color: self.color,
            mood: self.mood,
        }
    }
}
