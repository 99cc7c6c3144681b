use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{Frame, MediaError};
use crate::call::capture::FrameSource;

/// How to reach the webcam through ffmpeg.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub ffmpeg_cmd: String,
    pub device: String,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`, ...)
    pub input_format: String,
    pub width: u32,
    pub height: u32,
}

impl CameraSettings {
    /// Raw RGB24 frames on stdout, nothing else.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            self.input_format.clone(),
            "-video_size".into(),
            format!("{}x{}", self.width, self.height),
            "-i".into(),
            self.device.clone(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", self.width, self.height),
            "-".into(),
        ]
    }
}

/// Reader-thread notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraStatus {
    /// First frame arrived.
    Ready,
    /// The stream ended before any frame was produced.
    Failed(String),
    /// The stream ended after it had been running.
    Lost(String),
}

/// Live webcam stream read from an ffmpeg child process.
///
/// A background thread keeps only the most recent complete frame.
pub struct CameraFeed {
    child: Child,
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
}

impl CameraFeed {
    pub fn open<F>(settings: &CameraSettings, on_status: F) -> Result<Self, MediaError>
    where
        F: Fn(CameraStatus) + Send + 'static,
    {
        if settings.width == 0 || settings.height == 0 {
            return Err(MediaError::Unavailable(format!(
                "invalid capture size {}x{}",
                settings.width, settings.height
            )));
        }

        log::info!(
            "[Camera] Opening {} ({}) at {}x{}",
            settings.device,
            settings.input_format,
            settings.width,
            settings.height
        );

        let mut child = Command::new(&settings.ffmpeg_cmd)
            .args(settings.ffmpeg_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MediaError::Spawn {
                command: settings.ffmpeg_cmd.clone(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Unavailable("ffmpeg stdout not captured".into()))?;
        let mut stderr = child.stderr.take();

        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let (width, height) = (settings.width, settings.height);
        let reader_latest = latest.clone();
        let reader_running = running.clone();
        std::thread::Builder::new()
            .name("camera-reader".into())
            .spawn(move || {
                let mut buf = vec![0u8; Frame::byte_len(width, height)];
                let mut frames: u64 = 0;
                while reader_running.load(Ordering::Relaxed) {
                    if let Err(e) = stdout.read_exact(&mut buf) {
                        let mut detail = String::new();
                        if let Some(err) = stderr.as_mut() {
                            let _ = err.read_to_string(&mut detail);
                        }
                        let detail = detail.trim();
                        let reason = if detail.is_empty() {
                            e.to_string()
                        } else {
                            detail.to_string()
                        };
                        if reader_running.load(Ordering::Relaxed) {
                            if frames == 0 {
                                on_status(CameraStatus::Failed(reason));
                            } else {
                                on_status(CameraStatus::Lost(reason));
                            }
                        }
                        break;
                    }

                    let frame = Frame {
                        width,
                        height,
                        rgb: buf.clone(),
                    };
                    if let Ok(mut slot) = reader_latest.lock() {
                        *slot = Some(frame);
                    }
                    frames += 1;
                    if frames == 1 {
                        log::info!("[Camera] First frame received");
                        on_status(CameraStatus::Ready);
                    }
                }
                log::info!("[Camera] Reader exiting after {} frames", frames);
            })
            .map_err(|e| MediaError::Unavailable(format!("reader thread: {}", e)))?;

        Ok(Self {
            child,
            latest,
            running,
        })
    }

    /// Borrow the newest frame without copying it.
    pub fn with_latest<R>(&self, f: impl FnOnce(Option<&Frame>) -> R) -> R {
        match self.latest.lock() {
            Ok(slot) => f(slot.as_ref()),
            Err(_) => f(None),
        }
    }

    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::Relaxed) {
            let _ = self.child.kill();
            let _ = self.child.wait();
            log::info!("[Camera] Stopped");
        }
    }
}

impl FrameSource for CameraFeed {
    fn latest_frame(&mut self) -> Option<Frame> {
        self.with_latest(|frame| frame.cloned())
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
