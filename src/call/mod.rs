//! Call-screen core: pane layout, PiP dragging, speech gating and the capture
//! duty cycle, coordinated by [`CallState`].
//!
//! All of this runs on the winit event loop. Handlers run to completion one at
//! a time, so the speaking/dragging flags are read synchronously at the top of
//! each handler and no locking is needed.

pub mod capture;
pub mod drag;
pub mod layout;
pub mod router;
pub mod speech;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use capture::{CaptureCycle, CaptureGate, FrameSink, FrameSource, TickOutcome};
use drag::DragController;
use layout::{Layout, LayoutMetrics, PaneId, Point, Role, Size};
use router::AiResponse;
use speech::{EmotionTag, PlayOutcome, SpeechGate};

const CHAT_LOG_CAPACITY: usize = 50;

/// Current time as Unix milliseconds (chat log timestamps).
fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct CallOptions {
    pub metrics: LayoutMetrics,
    pub capture_interval: Duration,
    pub jpeg_quality: f32,
    pub camera_enabled: bool,
    pub chat_enabled: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            metrics: LayoutMetrics::default(),
            capture_interval: capture::DEFAULT_CAPTURE_INTERVAL,
            jpeg_quality: capture::DEFAULT_JPEG_QUALITY,
            camera_enabled: true,
            chat_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub timestamp_ms: u128,
    pub emotion: String,
    pub audio_url: Option<String>,
    pub played: bool,
}

/// Bounded history of AI responses, kept when chat is enabled.
#[derive(Debug)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: ChatEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        log::info!(
            "[Chat] Kai ({}){}",
            entry.emotion,
            if entry.played { " spoke" } else { "" }
        );
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Owns every piece of call-screen state and exposes only gated mutators.
///
/// Layout and drag state change through the toggle and pointer methods, the
/// speaking flag only through [`CallState::play_response`] and
/// [`CallState::playback_ended`]. The capture cycle only reads both.
pub struct CallState {
    layout: Layout,
    drag: DragController,
    speech: SpeechGate,
    capture: CaptureCycle,
    emotion: EmotionTag,
    camera_enabled: bool,
    chat: Option<ChatLog>,
}

impl CallState {
    pub fn new(viewport: Size, options: CallOptions) -> Self {
        Self {
            layout: Layout::new(viewport, options.metrics),
            drag: DragController::new(),
            speech: SpeechGate::new(),
            capture: CaptureCycle::new(options.capture_interval, options.jpeg_quality),
            emotion: EmotionTag::default(),
            camera_enabled: options.camera_enabled,
            chat: options.chat_enabled.then(|| ChatLog::new(CHAT_LOG_CAPACITY)),
        }
    }

    // ── Read side ────────────────────────────────────────────────────

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn emotion(&self) -> &EmotionTag {
        &self.emotion
    }

    pub fn is_speaking(&self) -> bool {
        self.speech.is_speaking()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_active()
    }

    pub fn drag_target(&self) -> Option<PaneId> {
        self.drag.session().map(|s| s.target)
    }

    /// Pane showing the active-speech indicator.
    pub fn speaking_pane(&self) -> Option<PaneId> {
        self.is_speaking().then_some(PaneId::Remote)
    }

    pub fn is_draggable(&self, pane: PaneId) -> bool {
        self.layout.pane(pane).role == Role::SecondaryPip && !self.is_speaking()
    }

    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled
    }

    pub fn capture(&self) -> &CaptureCycle {
        &self.capture
    }

    pub fn chat_log(&self) -> Option<&ChatLog> {
        self.chat.as_ref()
    }

    pub fn dropped_responses(&self) -> u64 {
        self.speech.dropped()
    }

    // ── Layout toggle ────────────────────────────────────────────────

    pub fn toggle_layout(&mut self) {
        if self.drag.is_active() {
            self.drag.pointer_up(&mut self.layout);
        }
        self.layout.toggle();
        log::info!("Layout toggled: {:?} full-size", self.layout.primary());
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.layout.set_viewport(viewport);
    }

    pub fn set_metrics(&mut self, metrics: LayoutMetrics) {
        self.layout.set_metrics(metrics);
    }

    // ── Pointer / drag ───────────────────────────────────────────────

    /// Pointer pressed at `pos`; starts a drag when it lands on a draggable PiP.
    pub fn pointer_down(&mut self, pos: Point) -> bool {
        match self.layout.hit_test(pos) {
            Some(pane) => self.pointer_down_on(pane, pos),
            None => false,
        }
    }

    pub fn pointer_down_on(&mut self, pane: PaneId, pos: Point) -> bool {
        let speaking = self.speech.is_speaking();
        self.drag.pointer_down(&mut self.layout, pane, pos, speaking)
    }

    pub fn pointer_move(&mut self, pos: Point) -> Option<Point> {
        self.drag.pointer_move(&mut self.layout, pos)
    }

    pub fn pointer_up(&mut self) -> Option<PaneId> {
        self.drag.pointer_up(&mut self.layout)
    }

    // ── Capture ──────────────────────────────────────────────────────

    pub fn set_camera_enabled(&mut self, enabled: bool) {
        if self.camera_enabled != enabled {
            log::info!("Camera {}", if enabled { "enabled" } else { "disabled" });
        }
        self.camera_enabled = enabled;
    }

    pub fn toggle_camera(&mut self) -> bool {
        self.set_camera_enabled(!self.camera_enabled);
        self.camera_enabled
    }

    /// Camera is live; begin ticking.
    pub fn start_capture(&mut self, now: Instant) {
        self.capture.start(now);
    }

    /// Camera lost or failed; no further ticks are scheduled.
    pub fn stop_capture(&mut self) {
        self.capture.stop();
    }

    pub fn next_capture_due(&self) -> Option<Instant> {
        self.capture.next_due()
    }

    /// Run at most one tick if one is due.
    pub fn poll_capture(
        &mut self,
        now: Instant,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Option<TickOutcome> {
        if !self.capture.poll_due(now) {
            return None;
        }
        Some(self.capture_tick(source, sink))
    }

    pub fn capture_tick(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> TickOutcome {
        let gate = CaptureGate {
            speaking: self.speech.is_speaking(),
            dragging: self.drag.is_active(),
            camera_enabled: self.camera_enabled,
        };
        self.capture.run_tick(gate, source, sink)
    }

    // ── Responses / speech ───────────────────────────────────────────

    /// Route one inbound response. The emotion tag is always updated; the
    /// returned url, if any, must be played by the caller.
    pub fn handle_response(&mut self, response: &AiResponse, now: Instant) -> Option<String> {
        let route = router::route(response);
        self.emotion = route.tag;

        let started = match route.play {
            Some(url) => match self.start_speech(&url, now) {
                PlayOutcome::Started { audio_url } => Some(audio_url),
                PlayOutcome::Dropped => None,
            },
            None => None,
        };

        if let Some(chat) = self.chat.as_mut() {
            chat.push(ChatEntry {
                timestamp_ms: now_ms(),
                emotion: self.emotion.label.clone(),
                audio_url: response.audio_url.clone(),
                played: started.is_some(),
            });
        }
        started
    }

    /// Gate a playback request; on start the tag follows `emotion`.
    pub fn play_response(&mut self, audio_url: &str, emotion: &str, now: Instant) -> PlayOutcome {
        let outcome = self.start_speech(audio_url, now);
        if matches!(outcome, PlayOutcome::Started { .. }) {
            self.emotion = EmotionTag::from_raw(Some(emotion));
        }
        outcome
    }

    fn start_speech(&mut self, audio_url: &str, now: Instant) -> PlayOutcome {
        let outcome = self.speech.play(audio_url, now);
        if matches!(outcome, PlayOutcome::Started { .. }) && self.drag.is_active() {
            log::debug!("Speech started mid-drag; closing drag session");
            self.drag.pointer_up(&mut self.layout);
        }
        outcome
    }

    /// External end-of-playback notification.
    pub fn playback_ended(&mut self) -> bool {
        self.speech.ended()
    }
}

#[cfg(test)]
mod tests {
    use super::capture::tests::{grey_frame, RecordingSink, StillCamera};
    use super::capture::SkipReason;
    use super::layout::PanePosition;
    use super::speech::{Emotion, DEFAULT_EMOTION_COLOR};
    use super::*;
    use serde_json::json;

    fn call() -> CallState {
        let mut state = CallState::new(Size::new(1280.0, 720.0), CallOptions::default());
        state.start_capture(Instant::now());
        state
    }

    fn response(v: serde_json::Value) -> AiResponse {
        AiResponse::from_value(&v)
    }

    #[test]
    fn happy_response_starts_speech_until_playback_ends() {
        let mut state = call();
        let url = state.handle_response(
            &response(json!({"emotion": "happy", "audio_url": "a.mp3"})),
            Instant::now(),
        );
        assert_eq!(url.as_deref(), Some("a.mp3"));
        assert_eq!(state.emotion().label, "HAPPY");
        assert_eq!(state.emotion().color, Emotion::Happy.color());
        assert!(state.is_speaking());
        assert_eq!(state.speaking_pane(), Some(PaneId::Remote));

        assert!(state.playback_ended());
        assert!(!state.is_speaking());
        assert_eq!(state.speaking_pane(), None);
    }

    #[test]
    fn confused_without_audio_only_updates_tag() {
        let mut state = call();
        let url = state.handle_response(&response(json!({"emotion": "confused"})), Instant::now());
        assert_eq!(url, None);
        assert_eq!(state.emotion().label, "CONFUSED");
        assert_eq!(state.emotion().color, DEFAULT_EMOTION_COLOR);
        assert!(!state.is_speaking());
    }

    #[test]
    fn response_during_playback_is_dropped_but_retags() {
        let mut state = call();
        let now = Instant::now();
        state.handle_response(&response(json!({"emotion": "happy", "audio_url": "a.mp3"})), now);
        let second =
            state.handle_response(&response(json!({"emotion": "sad", "audio_url": "b.mp3"})), now);
        assert_eq!(second, None);
        assert!(state.is_speaking());
        assert_eq!(state.emotion().label, "SAD");
        assert_eq!(state.dropped_responses(), 1);
    }

    #[test]
    fn play_response_is_a_no_op_while_speaking() {
        let mut state = call();
        let now = Instant::now();
        assert!(matches!(state.play_response("a.mp3", "happy", now), PlayOutcome::Started { .. }));
        assert_eq!(state.play_response("b.mp3", "angry", now), PlayOutcome::Dropped);
        assert_eq!(state.emotion().label, "HAPPY");
    }

    #[test]
    fn primary_pane_pointer_down_is_ignored() {
        let mut state = call();
        assert!(!state.pointer_down(Point::new(10.0, 10.0)));
        assert!(!state.is_dragging());
    }

    #[test]
    fn capture_is_skipped_while_speaking_or_dragging() {
        let mut state = call();
        let mut cam = StillCamera(Some(grey_frame()));
        let mut sink = RecordingSink::default();

        assert!(state.pointer_down(Point::new(1000.0, 500.0)));
        assert_eq!(
            state.capture_tick(&mut cam, &mut sink),
            TickOutcome::Skipped(SkipReason::Dragging)
        );
        state.pointer_up();

        state.play_response("a.mp3", "happy", Instant::now());
        assert_eq!(
            state.capture_tick(&mut cam, &mut sink),
            TickOutcome::Skipped(SkipReason::Speaking)
        );
        state.playback_ended();

        assert_eq!(state.capture_tick(&mut cam, &mut sink), TickOutcome::Captured);
        assert_eq!(sink.0.len(), 1);
    }

    #[test]
    fn camera_toggle_gates_capture() {
        let mut state = call();
        let mut cam = StillCamera(Some(grey_frame()));
        let mut sink = RecordingSink::default();
        assert!(!state.toggle_camera());
        assert_eq!(
            state.capture_tick(&mut cam, &mut sink),
            TickOutcome::Skipped(SkipReason::CameraDisabled)
        );
    }

    #[test]
    fn poll_capture_runs_only_when_due() {
        let mut state = CallState::new(Size::new(1280.0, 720.0), CallOptions::default());
        let t0 = Instant::now();
        state.start_capture(t0);
        let mut cam = StillCamera(Some(grey_frame()));
        let mut sink = RecordingSink::default();
        assert_eq!(state.poll_capture(t0, &mut cam, &mut sink), None);
        assert_eq!(
            state.poll_capture(t0 + Duration::from_millis(500), &mut cam, &mut sink),
            Some(TickOutcome::Captured)
        );
    }

    #[test]
    fn stopped_capture_schedules_no_wakeup() {
        let mut state = CallState::new(Size::new(1280.0, 720.0), CallOptions::default());
        let t0 = Instant::now();
        state.start_capture(t0);
        assert_eq!(state.next_capture_due(), Some(t0 + Duration::from_millis(500)));

        state.stop_capture();
        assert_eq!(state.next_capture_due(), None);
        let mut cam = StillCamera(None);
        let mut sink = RecordingSink::default();
        assert_eq!(state.poll_capture(t0 + Duration::from_secs(2), &mut cam, &mut sink), None);
    }

    #[test]
    fn speech_start_closes_open_drag() {
        let mut state = call();
        assert!(state.pointer_down(Point::new(1000.0, 500.0)));
        state.play_response("a.mp3", "happy", Instant::now());
        assert!(!state.is_dragging());
        assert!(state.layout().pane(PaneId::Local).transition_enabled);
        assert!(!state.is_draggable(PaneId::Local));
        assert!(!state.pointer_down(Point::new(1000.0, 500.0)));
    }

    #[test]
    fn toggle_closes_drag_and_redocks() {
        let mut state = call();
        assert!(state.pointer_down(Point::new(1000.0, 500.0)));
        state.pointer_move(Point::new(200.0, 200.0));
        state.toggle_layout();
        assert!(!state.is_dragging());
        assert_eq!(state.layout().primary(), PaneId::Local);
        assert_eq!(state.layout().pane(PaneId::Remote).position, PanePosition::Docked);
        assert!(state.is_draggable(PaneId::Remote));
        assert!(!state.is_draggable(PaneId::Local));
    }

    #[test]
    fn chat_log_is_bounded() {
        let mut state = CallState::new(
            Size::new(800.0, 600.0),
            CallOptions {
                chat_enabled: true,
                ..CallOptions::default()
            },
        );
        for _ in 0..(CHAT_LOG_CAPACITY + 5) {
            state.handle_response(&response(json!({"emotion": "sad"})), Instant::now());
        }
        let chat = state.chat_log().unwrap();
        assert_eq!(chat.len(), CHAT_LOG_CAPACITY);
        assert!(chat.entries().all(|e| e.emotion == "SAD" && !e.played));
    }

    #[test]
    fn chat_disabled_keeps_no_log() {
        let state = call();
        assert!(state.chat_log().is_none());
    }
}
