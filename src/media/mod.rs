pub mod camera;
pub mod frame;

pub use camera::{CameraFeed, CameraSettings, CameraStatus};
pub use frame::Frame;

use thiserror::Error;

/// Camera acquisition and frame encoding failures.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("camera unavailable: failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("camera unavailable: {0}")]
    Unavailable(String),

    #[error("frame is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("JPEG encode failed: {0}")]
    Encode(String),
}
