use reqwest::Client;
use std::error::Error;

use crate::audio::{decode_to_mono, DecodedAudio};

/// Fetches spoken responses from the call server.
#[derive(Clone)]
pub struct MediaClient {
    client: Client,
    base_url: String,
}

impl MediaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL for a possibly server-relative `audio_url`.
    pub fn resolve(&self, audio_url: &str) -> String {
        if audio_url.starts_with("http://") || audio_url.starts_with("https://") {
            audio_url.to_string()
        } else if audio_url.starts_with('/') {
            format!("{}{}", self.base_url, audio_url)
        } else {
            format!("{}/{}", self.base_url, audio_url)
        }
    }

    pub async fn fetch(&self, audio_url: &str) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        let url = self.resolve(audio_url);
        log::debug!("[Audio] GET {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(format!("GET {} failed: {}", url, status).into());
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Download and decode one response, decoding off the async workers.
    pub async fn fetch_speech(&self, audio_url: &str) -> Result<DecodedAudio, String> {
        let bytes = self.fetch(audio_url).await.map_err(|e| e.to_string())?;
        let ext = extension_of(audio_url).map(str::to_string);
        tokio::task::spawn_blocking(move || decode_to_mono(bytes, ext.as_deref()))
            .await
            .map_err(|e| format!("Decode task failed: {}", e))?
    }
}

/// File extension of a URL path, ignoring query and fragment.
pub fn extension_of(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}
