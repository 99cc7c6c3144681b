use serde_json::Value;

use super::speech::EmotionTag;

/// Inbound `ai_response` payload: `{ emotion, audio_url? }`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AiResponse {
    pub emotion: Option<String>,
    pub audio_url: Option<String>,
}

impl AiResponse {
    /// Lenient parse: wrong-typed or missing fields become `None`.
    pub fn from_value(data: &Value) -> Self {
        let field = |key: &str| {
            data.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            emotion: field("emotion"),
            audio_url: field("audio_url"),
        }
    }
}

/// Dispatch decision for one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Always applied to the emotion indicator.
    pub tag: EmotionTag,
    /// Present only when the response carries audio.
    pub play: Option<String>,
}

pub fn route(response: &AiResponse) -> Route {
    Route {
        tag: EmotionTag::from_raw(response.emotion.as_deref()),
        play: response.audio_url.clone(),
    }
}
