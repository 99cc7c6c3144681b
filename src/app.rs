use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{CursorIcon, Window, WindowId};

use crate::api::{CallSocket, MediaClient, SocketEvent};
use crate::audio::{AudioPlayer, DecodedAudio};
use crate::avatar::{self, AvatarEngine, LipSyncAvatar};
use crate::call::capture::TickOutcome;
use crate::call::layout::{PaneId, Point, Size};
use crate::call::router::AiResponse;
use crate::call::CallState;
use crate::compositor::{Compositor, Scene};
use crate::config::Config;
use crate::media::{CameraFeed, CameraStatus, Frame};
use crate::system::hotkeys::HotkeyManager;

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(280);
const DOUBLE_CLICK_SLOP: f64 = 8.0;
const HOTKEY_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Preview refresh for the local pane while the camera is live.
const PREVIEW_INTERVAL: Duration = Duration::from_millis(33);

/// Events sent from async tasks and worker threads back to the event loop
#[derive(Debug)]
pub enum AppEvent {
    SocketConnected(CallSocket),
    SocketFailed(String),
    Socket(SocketEvent),
    Camera(CameraStatus),
    SpeechReady { audio_url: String, audio: DecodedAudio },
    SpeechFailed { audio_url: String, error: String },
    PlaybackEnded,
    AvatarModel { url: String, result: Result<Vec<u8>, String> },
}

/// Double-click detection on press: two presses within 280 ms and 8 px.
#[derive(Debug, Default)]
struct ClickState {
    last: Option<(Instant, Point)>,
}

impl ClickState {
    /// Record a press. True when it completes a double click; the pair is
    /// consumed so a third press starts over.
    fn register(&mut self, now: Instant, pos: Point) -> bool {
        if let Some((at, prev)) = self.last.take() {
            let d = pos - prev;
            if now.duration_since(at) <= DOUBLE_CLICK_WINDOW
                && (d.x * d.x + d.y * d.y).sqrt() <= DOUBLE_CLICK_SLOP
            {
                return true;
            }
        }
        self.last = Some((now, pos));
        false
    }
}

/// Title line: emotion tag, speaking flag, which pane is full-size and any
/// device or connection problem.
fn window_title(call: &CallState, camera_error: Option<&str>, socket_error: Option<&str>) -> String {
    let mut title = format!("Kai · {}", call.emotion().label);
    if call.is_speaking() {
        title.push_str(" · speaking");
    }
    if call.layout().primary() == PaneId::Local {
        title.push_str(" · you full-size");
    }
    if !call.camera_enabled() {
        title.push_str(" · camera off");
    }
    if let Some(e) = camera_error {
        title.push_str(&format!(" · camera unavailable: {}", e));
    }
    if let Some(e) = socket_error {
        title.push_str(&format!(" · offline: {}", e));
    }
    title
}

pub struct App {
    window: Option<Arc<Window>>,
    compositor: Option<Compositor>,
    call: Option<CallState>,
    camera: Option<CameraFeed>,
    camera_error: Option<String>,
    socket: Option<CallSocket>,
    socket_error: Option<String>,
    media: MediaClient,
    audio_player: Option<AudioPlayer>,
    avatar: Option<Box<dyn AvatarEngine>>,
    config: Config,
    hotkey_manager: Option<HotkeyManager>,
    tokio_rt: Arc<tokio::runtime::Runtime>,
    event_proxy: EventLoopProxy<AppEvent>,
    click_state: ClickState,
    cursor: Point,
    title: String,
    next_preview: Instant,
}

impl App {
    pub fn new(tokio_rt: Arc<tokio::runtime::Runtime>, event_proxy: EventLoopProxy<AppEvent>) -> Self {
        let config = Config::load();
        let media = MediaClient::new(&config.media_base_url);

        Self {
            window: None,
            compositor: None,
            call: None,
            camera: None,
            camera_error: None,
            socket: None,
            socket_error: None,
            media,
            audio_player: None,
            avatar: None,
            config,
            hotkey_manager: None,
            tokio_rt,
            event_proxy,
            click_state: ClickState::default(),
            cursor: Point::default(),
            title: String::new(),
            next_preview: Instant::now(),
        }
    }

    fn request_redraw(&self) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn refresh_title(&mut self) {
        let (Some(call), Some(window)) = (&self.call, &self.window) else {
            return;
        };
        let title = window_title(call, self.camera_error.as_deref(), self.socket_error.as_deref());
        if title != self.title {
            window.set_title(&title);
            self.title = title;
        }
    }

    fn set_cursor(&self, icon: CursorIcon) {
        if let Some(w) = &self.window {
            w.set_cursor(icon);
        }
    }

    fn update_cursor(&self) {
        let Some(call) = &self.call else { return };
        let icon = if call.is_dragging() {
            CursorIcon::Grabbing
        } else {
            match call.layout().hit_test(self.cursor) {
                Some(pane) if call.is_draggable(pane) => CursorIcon::Grab,
                _ => CursorIcon::Default,
            }
        };
        self.set_cursor(icon);
    }

    fn toggle_layout(&mut self) {
        if let Some(call) = &mut self.call {
            call.toggle_layout();
        }
        self.update_cursor();
        self.refresh_title();
        self.request_redraw();
    }

    // ── Camera ───────────────────────────────────────────────────────

    fn open_camera(&mut self) {
        let proxy = self.event_proxy.clone();
        let settings = self.config.camera_settings();
        match CameraFeed::open(&settings, move |status| {
            let _ = proxy.send_event(AppEvent::Camera(status));
        }) {
            Ok(feed) => self.camera = Some(feed),
            Err(e) => {
                log::error!("[Camera] {}", e);
                self.camera_error = Some(e.to_string());
            }
        }
    }

    fn handle_camera_status(&mut self, status: CameraStatus) {
        match status {
            CameraStatus::Ready => {
                self.camera_error = None;
                if let Some(call) = &mut self.call {
                    call.start_capture(Instant::now());
                }
            }
            CameraStatus::Failed(reason) => {
                log::error!("[Camera] Acquisition failed: {}", reason);
                if let Some(call) = &mut self.call {
                    call.stop_capture();
                }
                self.camera = None;
                self.camera_error = Some(reason);
            }
            CameraStatus::Lost(reason) => {
                log::warn!("[Camera] Stream lost: {}", reason);
                if let Some(call) = &mut self.call {
                    call.stop_capture();
                }
                self.camera = None;
                self.camera_error = Some(reason);
            }
        }
    }

    // ── Socket ───────────────────────────────────────────────────────

    fn connect_socket(&mut self) {
        if self.config.server_url.is_empty() {
            log::error!("[Socket] No server URL! Set server_url in config.toml or KAI_SERVER_URL");
            self.socket_error = Some("no server configured".to_string());
            return;
        }

        let url = self.config.server_url.clone();
        let proxy = self.event_proxy.clone();

        self.tokio_rt.spawn(async move {
            let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<SocketEvent>();

            match CallSocket::connect(&url, event_tx).await {
                Ok(client) => {
                    let proxy_clone = proxy.clone();
                    tokio::spawn(async move {
                        while let Some(event) = event_rx.recv().await {
                            if proxy_clone.send_event(AppEvent::Socket(event)).is_err() {
                                break;
                            }
                        }
                    });
                    let _ = proxy.send_event(AppEvent::SocketConnected(client));
                }
                Err(e) => {
                    log::error!("[Socket] Connection failed: {}", e);
                    let _ = proxy.send_event(AppEvent::SocketFailed(e));
                }
            }
        });
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Response(response) => self.handle_response(response),
            SocketEvent::Closed(reason) => {
                self.socket = None;
                self.socket_error = Some(format!("closed ({})", reason));
            }
            SocketEvent::Error(e) => {
                self.socket = None;
                self.socket_error = Some(e);
            }
        }
    }

    // ── Speech ───────────────────────────────────────────────────────

    fn handle_response(&mut self, response: AiResponse) {
        let Some(call) = &mut self.call else { return };
        let play = call.handle_response(&response, Instant::now());
        let mood = call.emotion().emotion;

        if let Some(avatar) = &mut self.avatar {
            avatar.set_mood(mood);
        }
        match play {
            Some(audio_url) => self.start_playback(audio_url),
            None if response.audio_url.is_some() => {
                log::debug!("[Audio] Busy speaking; dropped {:?}", response.audio_url);
            }
            None => {}
        }
        self.request_redraw();
    }

    fn start_playback(&mut self, audio_url: String) {
        if self.audio_player.is_none() {
            match AudioPlayer::new() {
                Ok(player) => self.audio_player = Some(player),
                Err(e) => {
                    log::error!("Failed to init audio player: {}", e);
                    self.finish_speech();
                    return;
                }
            }
        }

        if let Some(avatar) = &mut self.avatar {
            avatar.speak(&audio_url);
        }

        let media = self.media.clone();
        let proxy = self.event_proxy.clone();
        self.tokio_rt.spawn(async move {
            let fetched = media.fetch_speech(&audio_url).await;
            let event = match fetched {
                Ok(audio) => AppEvent::SpeechReady { audio_url, audio },
                Err(error) => AppEvent::SpeechFailed { audio_url, error },
            };
            let _ = proxy.send_event(event);
        });
    }

    fn finish_speech(&mut self) {
        if let Some(call) = &mut self.call {
            if call.playback_ended() {
                log::debug!("[Audio] Playback finished");
            }
        }
        if let Some(avatar) = &mut self.avatar {
            avatar.speech_ended();
        }
        self.update_cursor();
        self.request_redraw();
    }

    fn init_avatar(&mut self) {
        let Some(url) = self.config.effective_avatar_model().map(str::to_string) else {
            return;
        };
        if avatar::is_remote(&url) {
            let media = self.media.clone();
            let proxy = self.event_proxy.clone();
            self.tokio_rt.spawn(async move {
                let result = media.fetch(&url).await.map_err(|e| e.to_string());
                let _ = proxy.send_event(AppEvent::AvatarModel { url, result });
            });
            return;
        }
        let mut avatar = LipSyncAvatar::new();
        match avatar.load_model(&url) {
            Ok(()) => self.avatar = Some(Box::new(avatar)),
            Err(e) => log::warn!("[Avatar] {}; continuing audio-only", e),
        }
    }

    fn handle_avatar_model(&mut self, url: String, result: Result<Vec<u8>, String>) {
        let mut avatar = LipSyncAvatar::new();
        match result.and_then(|bytes| avatar.load_model_bytes(&url, &bytes)) {
            Ok(()) => self.avatar = Some(Box::new(avatar)),
            Err(e) => log::warn!("[Avatar] {}: {}; continuing audio-only", url, e),
        }
    }

    // ── Rendering ────────────────────────────────────────────────────

    fn redraw(&mut self) {
        let output_levels = self
            .audio_player
            .as_ref()
            .map(|p| p.get_output_levels())
            .unwrap_or([0.0; 4]);
        let avatar_moving = self
            .avatar
            .as_mut()
            .map(|a| a.update(output_levels))
            .unwrap_or(false);

        let (Some(window), Some(compositor), Some(call)) =
            (&self.window, &mut self.compositor, &self.call)
        else {
            return;
        };

        let panes_moving = compositor.animate(call.layout());
        let size = window.inner_size();
        let rects = compositor.rects(call.layout());
        let avatar = self.avatar.as_ref().map(|a| a.pose());
        let camera_failed = self.camera_error.is_some();

        let mut draw = |frame: Option<&Frame>| {
            let scene = Scene {
                layout: call.layout(),
                rects,
                camera: frame,
                camera_failed,
                avatar,
                speaking: call.is_speaking(),
                emotion: call.emotion(),
                dragging: call.is_dragging(),
            };
            compositor.render(size.width, size.height, &scene);
        };
        match &self.camera {
            Some(feed) => feed.with_latest(|frame| draw(frame)),
            None => draw(None),
        }

        if panes_moving || avatar_moving {
            window.request_redraw();
        }
    }

    fn run_capture(&mut self) {
        let (Some(call), Some(camera)) = (&mut self.call, &mut self.camera) else {
            return;
        };
        if let Some(TickOutcome::Captured) = call.poll_capture(Instant::now(), camera, &mut self.socket) {
            log::trace!("[Camera] Frame sent");
        }
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("Kai")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .with_min_inner_size(LogicalSize::new(480.0, 320.0));

        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create call window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let compositor = match Compositor::new(window.clone()) {
            Ok(c) => c,
            Err(e) => {
                log::error!("{}", e);
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        let scale = window.scale_factor();
        let call = CallState::new(
            Size::new(size.width as f64, size.height as f64),
            self.config.call_options(scale),
        );
        log::info!(
            "Call window {}x{} (scale {:.2}), remote pane full-size",
            size.width,
            size.height,
            scale
        );

        self.compositor = Some(compositor);
        self.call = Some(call);
        self.window = Some(window);

        if self.config.global_hotkey {
            match HotkeyManager::new() {
                Ok(hk) => self.hotkey_manager = Some(hk),
                Err(e) => log::warn!("Global hotkeys unavailable: {}", e),
            }
        }

        self.init_avatar();
        self.open_camera();
        self.connect_socket();
        self.refresh_title();
        self.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(call) = &mut self.call {
                    call.set_viewport(Size::new(size.width as f64, size.height as f64));
                }
                self.request_redraw();
            }

            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                let metrics = self.config.layout_metrics().scaled(scale_factor);
                if let Some(call) = &mut self.call {
                    call.set_metrics(metrics);
                }
                log::info!("Scale factor now {:.2}", scale_factor);
                self.request_redraw();
            }

            WindowEvent::RedrawRequested => self.redraw(),

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Point::new(position.x, position.y);
                let moved = self
                    .call
                    .as_mut()
                    .and_then(|call| call.pointer_move(self.cursor))
                    .is_some();
                if moved {
                    self.request_redraw();
                } else {
                    self.update_cursor();
                }
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    if self.click_state.register(Instant::now(), self.cursor) {
                        self.toggle_layout();
                        return;
                    }
                    if let Some(call) = &mut self.call {
                        if call.pointer_down(self.cursor) {
                            self.set_cursor(CursorIcon::Grabbing);
                            self.request_redraw();
                        }
                    }
                }
                ElementState::Released => {
                    if let Some(call) = &mut self.call {
                        if call.pointer_up().is_some() {
                            self.request_redraw();
                        }
                    }
                    self.update_cursor();
                }
            },

            WindowEvent::Focused(false) => {
                if let Some(call) = &mut self.call {
                    if call.pointer_up().is_some() {
                        log::debug!("Focus lost mid-drag; drag closed");
                        self.request_redraw();
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }

                match &event.logical_key {
                    Key::Named(NamedKey::Tab) => self.toggle_layout(),
                    Key::Named(NamedKey::Escape) => event_loop.exit(),
                    Key::Character(c) if c.as_str().eq_ignore_ascii_case("v") => {
                        if let Some(call) = &mut self.call {
                            call.toggle_camera();
                        }
                        self.refresh_title();
                        self.request_redraw();
                    }
                    _ => {}
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(ref hk) = self.hotkey_manager {
            if hk.poll_toggle() {
                self.toggle_layout();
            }
        }

        self.run_capture();

        let now = Instant::now();
        let mut wake = self.call.as_ref().and_then(|c| c.next_capture_due());
        if self.camera.is_some() {
            if now >= self.next_preview {
                self.next_preview = now + PREVIEW_INTERVAL;
                self.request_redraw();
            }
            wake = Some(wake.map_or(self.next_preview, |w| w.min(self.next_preview)));
        }
        if self.hotkey_manager.is_some() {
            let poll = now + HOTKEY_POLL_INTERVAL;
            wake = Some(wake.map_or(poll, |w| w.min(poll)));
        }
        event_loop.set_control_flow(match wake {
            Some(at) => ControlFlow::WaitUntil(at),
            None => ControlFlow::Wait,
        });
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::SocketConnected(client) => {
                self.socket = Some(client);
                self.socket_error = None;
            }
            AppEvent::SocketFailed(e) => {
                self.socket = None;
                self.socket_error = Some(e);
            }
            AppEvent::Socket(event) => self.handle_socket_event(event),
            AppEvent::Camera(status) => self.handle_camera_status(status),
            AppEvent::SpeechReady { audio_url, audio } => match &self.audio_player {
                Some(player) => {
                    log::debug!("[Audio] Fetched {}", audio_url);
                    let proxy = self.event_proxy.clone();
                    player.play(
                        audio,
                        Box::new(move || {
                            let _ = proxy.send_event(AppEvent::PlaybackEnded);
                        }),
                    );
                }
                None => self.finish_speech(),
            },
            AppEvent::SpeechFailed { audio_url, error } => {
                log::warn!("[Audio] Could not play {}: {}", audio_url, error);
                self.finish_speech();
            }
            AppEvent::PlaybackEnded => self.finish_speech(),
            AppEvent::AvatarModel { url, result } => self.handle_avatar_model(url, result),
        }
        self.refresh_title();
        self.request_redraw();
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(player) = &self.audio_player {
            player.clear();
        }
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        if let Some(mut camera) = self.camera.take() {
            camera.stop();
        }
        if let Some(call) = &self.call {
            let (sent, skipped) = call.capture().stats();
            log::info!("Call ended: {} frames sent, {} ticks skipped", sent, skipped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallOptions;

    #[test]
    fn double_click_needs_two_close_presses() {
        let mut clicks = ClickState::default();
        let t0 = Instant::now();
        let p = Point::new(100.0, 100.0);
        assert!(!clicks.register(t0, p));
        assert!(clicks.register(t0 + Duration::from_millis(200), Point::new(104.0, 103.0)));
        // Third press starts a new pair
        assert!(!clicks.register(t0 + Duration::from_millis(250), p));
    }

    #[test]
    fn slow_or_distant_presses_are_single_clicks() {
        let mut clicks = ClickState::default();
        let t0 = Instant::now();
        let p = Point::new(10.0, 10.0);
        assert!(!clicks.register(t0, p));
        assert!(!clicks.register(t0 + Duration::from_millis(400), p));
        assert!(!clicks.register(t0 + Duration::from_millis(500), Point::new(30.0, 10.0)));
        assert!(clicks.register(t0 + Duration::from_millis(600), Point::new(30.0, 12.0)));
    }

    #[test]
    fn title_reflects_call_state() {
        let mut call = CallState::new(Size::new(1280.0, 720.0), CallOptions::default());
        assert_eq!(window_title(&call, None, None), "Kai · NEUTRAL");

        let response = AiResponse {
            emotion: Some("happy".into()),
            audio_url: Some("/static/audio/a.mp3".into()),
        };
        call.handle_response(&response, Instant::now());
        call.toggle_layout();
        let title = window_title(&call, Some("no device"), Some("refused"));
        assert!(title.starts_with("Kai · HAPPY · speaking · you full-size"));
        assert!(title.contains("camera unavailable: no device"));
        assert!(title.ends_with("offline: refused"));
    }
}
