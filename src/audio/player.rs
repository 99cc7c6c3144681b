use cpal::traits::*;
use cpal::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::decode::{resample_linear, DecodedAudio};

/// One-shot end-of-playback notification.
pub type EndedCallback = Box<dyn FnOnce() + Send>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Speech output on the default device.
///
/// The main thread enqueues a decoded response; the cpal output callback
/// drains it to the speakers and fires the pending end callback the moment the
/// buffer runs dry.
pub struct AudioPlayer {
    _stream: Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
    /// Recent output samples for lip-sync levels (last 2048)
    recent_output: Arc<Mutex<Vec<f32>>>,
    playing: Arc<AtomicBool>,
    on_ended: Arc<Mutex<Option<EndedCallback>>>,
    sample_rate: u32,
}

impl AudioPlayer {
    pub fn new() -> Result<Self, String> {
        log::info!("[Audio] Initializing speech player");

        let host = cpal::default_host();
        let output_device = host
            .default_output_device()
            .ok_or("No output device available")?;
        log::info!(
            "[Audio] Output device: {}",
            output_device.name().unwrap_or_default()
        );

        let config: cpal::StreamConfig = output_device
            .default_output_config()
            .map_err(|e| e.to_string())?
            .into();
        let sample_rate = config.sample_rate.0;

        log::info!(
            "[Audio] Output config: {} Hz, {} channel(s)",
            sample_rate,
            config.channels
        );

        let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::with_capacity(48_000)));
        let recent_output = Arc::new(Mutex::new(Vec::<f32>::with_capacity(2048)));
        let playing = Arc::new(AtomicBool::new(false));
        let on_ended: Arc<Mutex<Option<EndedCallback>>> = Arc::new(Mutex::new(None));

        let buf_clone = buffer.clone();
        let recent_clone = recent_output.clone();
        let playing_clone = playing.clone();
        let ended_clone = on_ended.clone();
        let out_channels = config.channels as usize;

        let stream = output_device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    let mut buf = lock(&buf_clone);
                    let mono_samples_needed = data.len() / out_channels;

                    if buf.is_empty() {
                        data.fill(0.0);
                        playing_clone.store(false, Ordering::Relaxed);
                        let finished = lock(&ended_clone).take();
                        drop(buf);
                        if let Some(notify) = finished {
                            notify();
                        }
                        return;
                    }

                    playing_clone.store(true, Ordering::Relaxed);

                    let available = buf.len().min(mono_samples_needed);
                    let drained: Vec<f32> = buf.drain(..available).collect();
                    drop(buf);

                    // Duplicate mono to all channels, pad the tail with silence
                    for (i, frame) in data.chunks_mut(out_channels).enumerate() {
                        let sample = drained.get(i).copied().unwrap_or(0.0);
                        frame.fill(sample);
                    }

                    let mut recent = lock(&recent_clone);
                    recent.extend_from_slice(&drained);
                    if recent.len() > 2048 {
                        let excess = recent.len() - 2048;
                        recent.drain(..excess);
                    }
                },
                |err| log::error!("[Audio] Output stream error: {err}"),
                None,
            )
            .map_err(|e| e.to_string())?;

        stream.play().map_err(|e| e.to_string())?;
        log::info!("[Audio] Player started");

        Ok(Self {
            _stream: stream,
            buffer,
            recent_output,
            playing,
            on_ended,
            sample_rate,
        })
    }

    /// Queue a decoded response. `on_ended` runs on the audio thread once the
    /// last sample has been handed to the device.
    pub fn play(&self, audio: DecodedAudio, on_ended: EndedCallback) {
        let samples = resample_linear(&audio.samples, audio.sample_rate, self.sample_rate);
        log::info!(
            "[Audio] Playing {:.1}s response ({} Hz -> {} Hz)",
            audio.duration_secs(),
            audio.sample_rate,
            self.sample_rate
        );
        // Hold the buffer lock so the callback never sees the new callback
        // with an empty buffer.
        let mut buf = lock(&self.buffer);
        *lock(&self.on_ended) = Some(on_ended);
        buf.extend_from_slice(&samples);
    }

    /// Drop queued audio without notifying (shutdown).
    pub fn clear(&self) {
        let mut buf = lock(&self.buffer);
        lock(&self.on_ended).take();
        buf.clear();
        lock(&self.recent_output).clear();
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// 4-band levels of recent output, for lip sync.
    pub fn get_output_levels(&self) -> [f32; 4] {
        if !self.is_playing() {
            return [0.0; 4];
        }
        band_levels(&lock(&self.recent_output))
    }
}

/// RMS of the last 1024 samples split into four bands, boosted by overall RMS.
pub fn band_levels(recent: &[f32]) -> [f32; 4] {
    if recent.is_empty() {
        return [0.0; 4];
    }

    let samples = if recent.len() > 1024 {
        &recent[recent.len() - 1024..]
    } else {
        recent
    };

    let rms = |chunk: &[f32]| (chunk.iter().map(|&x| x * x).sum::<f32>() / chunk.len() as f32).sqrt();
    let overall = rms(samples);

    let chunk_size = (samples.len() / 4).max(1);
    let mut levels = [0.0f32; 4];

    for (i, level) in levels.iter_mut().enumerate() {
        let start = i * chunk_size;
        let end = if i == 3 {
            samples.len()
        } else {
            ((i + 1) * chunk_size).min(samples.len())
        };
        if start < end {
            *level = (rms(&samples[start..end]) * 10.0).min(1.0);
        }
    }

    let boost = overall * 7.0;
    for level in &mut levels {
        *level = (*level + boost).min(1.0);
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_no_levels() {
        assert_eq!(band_levels(&[]), [0.0; 4]);
        assert_eq!(band_levels(&[0.0; 2048]), [0.0; 4]);
    }

    #[test]
    fn loud_output_saturates() {
        assert_eq!(band_levels(&[0.8; 1024]), [1.0; 4]);
    }

    #[test]
    fn quiet_tail_only_lifts_last_band_most() {
        let mut samples = vec![0.0f32; 1024];
        for s in &mut samples[768..] {
            *s = 0.02;
        }
        let levels = band_levels(&samples);
        assert!(levels[3] > levels[0]);
        assert!(levels.iter().all(|&l| (0.0..=1.0).contains(&l)));
    }

    #[test]
    fn short_input_is_handled() {
        let levels = band_levels(&[0.5, 0.5]);
        assert!(levels.iter().all(|&l| l > 0.0));
    }
}
