use std::time::{Duration, Instant};

use crate::media::Frame;

pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_JPEG_QUALITY: f32 = 0.5;

/// Where captured frames come from.
pub trait FrameSource {
    fn latest_frame(&mut self) -> Option<Frame>;
}

/// Where encoded frames go. Fire-and-forget, no acknowledgment.
pub trait FrameSink {
    fn send_frame(&mut self, payload: String);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotStarted,
    Speaking,
    Dragging,
    CameraDisabled,
    NoFrame,
    EncodeFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Captured,
    Skipped(SkipReason),
}

/// Snapshot of the flags that suppress a capture tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureGate {
    pub speaking: bool,
    pub dragging: bool,
    pub camera_enabled: bool,
}

impl CaptureGate {
    pub fn check(&self) -> Result<(), SkipReason> {
        if self.speaking {
            Err(SkipReason::Speaking)
        } else if self.dragging {
            Err(SkipReason::Dragging)
        } else if !self.camera_enabled {
            Err(SkipReason::CameraDisabled)
        } else {
            Ok(())
        }
    }
}

/// Fixed-period frame sampler. A suppressed tick is dropped, never queued,
/// and ticks missed while the loop was busy are not replayed.
#[derive(Debug)]
pub struct CaptureCycle {
    interval: Duration,
    quality: f32,
    next_due: Option<Instant>,
    captured: u64,
    skipped: u64,
}

impl CaptureCycle {
    pub fn new(interval: Duration, quality: f32) -> Self {
        Self {
            interval,
            quality,
            next_due: None,
            captured: 0,
            skipped: 0,
        }
    }

    /// Begin ticking. Only called once the camera is live.
    pub fn start(&mut self, now: Instant) {
        if self.next_due.is_none() {
            log::info!("Capture loop started ({} ms)", self.interval.as_millis());
            self.next_due = Some(now + self.interval);
        }
    }

    /// Stop ticking for good; the camera is gone.
    pub fn stop(&mut self) {
        if self.next_due.take().is_some() {
            log::info!("Capture loop stopped ({} sent, {} skipped)", self.captured, self.skipped);
        }
    }

    pub fn is_started(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.captured, self.skipped)
    }

    /// True when a tick is due at `now`; schedules the following one.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// Gate, sample, encode and emit one frame.
    pub fn run_tick(
        &mut self,
        gate: CaptureGate,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> TickOutcome {
        let outcome = self.sample(gate, source, sink);
        match outcome {
            TickOutcome::Captured => self.captured += 1,
            TickOutcome::Skipped(reason) => {
                self.skipped += 1;
                log::trace!("Capture tick skipped: {:?}", reason);
            }
        }
        if (self.captured + self.skipped) % 120 == 0 {
            log::debug!("Capture ticks: {} sent, {} skipped", self.captured, self.skipped);
        }
        outcome
    }

    fn sample(
        &self,
        gate: CaptureGate,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> TickOutcome {
        if !self.is_started() {
            return TickOutcome::Skipped(SkipReason::NotStarted);
        }
        if let Err(reason) = gate.check() {
            return TickOutcome::Skipped(reason);
        }
        let Some(frame) = source.latest_frame() else {
            return TickOutcome::Skipped(SkipReason::NoFrame);
        };
        match frame.to_jpeg_data_url(self.quality) {
            Ok(payload) => {
                sink.send_frame(payload);
                TickOutcome::Captured
            }
            Err(e) => {
                log::warn!("Frame encode failed: {}", e);
                TickOutcome::Skipped(SkipReason::EncodeFailed)
            }
        }
    }
}
