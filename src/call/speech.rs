use std::time::Instant;

/// Emotions with a dedicated tag color. Anything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Happy,
    Sad,
    Neutral,
    Angry,
    Other,
}

const COLOR_HAPPY: u32 = 0x2ecc71;
const COLOR_SAD: u32 = 0x3498db;
const COLOR_NEUTRAL: u32 = 0x5a5a5a;
const COLOR_ANGRY: u32 = 0xf39c12;
pub const DEFAULT_EMOTION_COLOR: u32 = 0x9b59b6;

/// Label shown when a response carries no usable emotion.
pub const UNKNOWN_EMOTION_LABEL: &str = "UNKNOWN";

impl Emotion {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "neutral" => Emotion::Neutral,
            "angry" => Emotion::Angry,
            _ => Emotion::Other,
        }
    }

    /// Tag background as 0xRRGGBB.
    pub fn color(self) -> u32 {
        match self {
            Emotion::Happy => COLOR_HAPPY,
            Emotion::Sad => COLOR_SAD,
            Emotion::Neutral => COLOR_NEUTRAL,
            Emotion::Angry => COLOR_ANGRY,
            Emotion::Other => DEFAULT_EMOTION_COLOR,
        }
    }
}

/// The visible emotion indicator: upper-cased label plus color.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionTag {
    pub label: String,
    pub emotion: Emotion,
    pub color: u32,
}

impl EmotionTag {
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(label) => {
                let emotion = Emotion::from_label(label);
                Self {
                    label: label.to_uppercase(),
                    emotion,
                    color: emotion.color(),
                }
            }
            None => Self::unknown(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_EMOTION_LABEL.to_string(),
            emotion: Emotion::Other,
            color: DEFAULT_EMOTION_COLOR,
        }
    }
}

impl Default for EmotionTag {
    fn default() -> Self {
        let emotion = Emotion::Neutral;
        Self {
            label: "NEUTRAL".to_string(),
            emotion,
            color: emotion.color(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechState {
    Idle,
    Speaking { audio_url: String, since: Instant },
}

/// What the app must do after a play request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Playback should begin for this url.
    Started { audio_url: String },
    /// Something is already playing; the request is discarded.
    Dropped,
}

/// Single-active-playback gate. Sole writer of the speaking flag.
///
/// `Idle --play--> Speaking --ended--> Idle`; a play request while speaking is
/// a no-op.
#[derive(Debug)]
pub struct SpeechGate {
    state: SpeechState,
    dropped: u64,
}

impl Default for SpeechGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechGate {
    pub fn new() -> Self {
        Self {
            state: SpeechState::Idle,
            dropped: 0,
        }
    }

    pub fn state(&self) -> &SpeechState {
        &self.state
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self.state, SpeechState::Speaking { .. })
    }

    /// Responses discarded because they arrived mid-playback.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn play(&mut self, audio_url: &str, now: Instant) -> PlayOutcome {
        if self.is_speaking() {
            self.dropped += 1;
            log::debug!("Response dropped while speaking: {}", audio_url);
            return PlayOutcome::Dropped;
        }
        log::debug!("Speech: Idle -> Speaking ({})", audio_url);
        self.state = SpeechState::Speaking {
            audio_url: audio_url.to_string(),
            since: now,
        };
        PlayOutcome::Started {
            audio_url: audio_url.to_string(),
        }
    }

    /// Playback finished. Returns false if nothing was playing.
    pub fn ended(&mut self) -> bool {
        match std::mem::replace(&mut self.state, SpeechState::Idle) {
            SpeechState::Speaking { since, .. } => {
                log::debug!("Speech: Speaking -> Idle after {:?}", since.elapsed());
                true
            }
            SpeechState::Idle => false,
        }
    }
}
