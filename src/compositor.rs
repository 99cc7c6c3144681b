use std::num::NonZeroU32;
use std::sync::Arc;

use winit::window::Window;

use crate::avatar::AvatarPose;
use crate::call::layout::{Layout, PaneId, Point, Rect, Size};
use crate::call::speech::EmotionTag;
use crate::media::Frame;

const REMOTE_BG: u32 = 0x1e1e2e;
const LOCAL_IDLE: u32 = 0x2a2a2a;
const FACE_IDLE: u32 = 0x44475a;
const MOUTH: u32 = 0x111111;
const PIP_BORDER: u32 = 0xffffff;
const PIP_BORDER_DRAGGING: u32 = 0xf1c40f;

const PIP_BORDER_WIDTH: i64 = 2;
const SPEAKING_BORDER_WIDTH: i64 = 4;
const TAG_MARGIN: f64 = 12.0;
const TAG_SIZE: Size = Size::new(120.0, 22.0);

/// Per-tick easing factor for pane positions.
const EASE: f64 = 0.25;
const SNAP_EPSILON: f64 = 0.5;

/// Everything drawn in one frame.
pub struct Scene<'a> {
    pub layout: &'a Layout,
    /// Drawn rects, indexed like `PaneId::ALL`.
    pub rects: [Rect; 2],
    pub camera: Option<&'a Frame>,
    pub camera_failed: bool,
    pub avatar: Option<AvatarPose>,
    pub speaking: bool,
    pub emotion: &'a EmotionTag,
    pub dragging: bool,
}

/// Eases drawn pane rects toward their layout rects.
///
/// A pane whose `transition_enabled` flag is cleared snaps, so a dragged PiP
/// tracks the pointer exactly.
#[derive(Debug, Default)]
pub struct PaneAnimator {
    drawn: [Option<Rect>; 2],
}

impl PaneAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one step. Returns true while any pane is still moving.
    pub fn step(&mut self, layout: &Layout) -> bool {
        let mut moving = false;
        for (i, id) in PaneId::ALL.into_iter().enumerate() {
            let target = layout.rect(id);
            let drawn = match self.drawn[i] {
                Some(cur) if layout.pane(id).transition_enabled => ease_rect(cur, target),
                _ => target,
            };
            moving |= drawn != target;
            self.drawn[i] = Some(drawn);
        }
        moving
    }

    pub fn rects(&self, layout: &Layout) -> [Rect; 2] {
        PaneId::ALL.map(|id| self.drawn[index(id)].unwrap_or_else(|| layout.rect(id)))
    }
}

fn index(id: PaneId) -> usize {
    match id {
        PaneId::Remote => 0,
        PaneId::Local => 1,
    }
}

fn ease(cur: f64, target: f64) -> f64 {
    let next = cur + (target - cur) * EASE;
    if (target - next).abs() < SNAP_EPSILON {
        target
    } else {
        next
    }
}

fn ease_rect(cur: Rect, target: Rect) -> Rect {
    Rect::new(
        Point::new(ease(cur.origin.x, target.origin.x), ease(cur.origin.y, target.origin.y)),
        Size::new(
            ease(cur.size.width, target.size.width),
            ease(cur.size.height, target.size.height),
        ),
    )
}

/// Draw `scene` into a `width`×`height` buffer of 0x00RRGGBB pixels.
pub fn compose(buf: &mut [u32], width: u32, height: u32, scene: &Scene) {
    let mut canvas = Canvas {
        buf,
        width: width as i64,
        height: height as i64,
    };
    canvas.buf.fill(0);

    let primary = scene.layout.primary();
    for id in [primary, primary.other()] {
        let rect = scene.rects[index(id)];
        match id {
            PaneId::Remote => draw_remote(&mut canvas, rect, scene),
            PaneId::Local => draw_local(&mut canvas, rect, scene),
        }
        if id != primary {
            let color = if scene.dragging {
                PIP_BORDER_DRAGGING
            } else {
                PIP_BORDER
            };
            canvas.stroke_rect(rect, PIP_BORDER_WIDTH, color);
        }
    }
}

fn draw_remote(canvas: &mut Canvas, rect: Rect, scene: &Scene) {
    canvas.fill_rect(rect, REMOTE_BG);

    let cx = rect.origin.x + rect.size.width / 2.0;
    let cy = rect.origin.y + rect.size.height / 2.0;
    let r = rect.size.width.min(rect.size.height) * 0.25;
    let (face, mouth_open) = match scene.avatar {
        Some(pose) => (rgb_to_u32(pose.color), pose.mouth_open as f64),
        None => (FACE_IDLE, 0.0),
    };
    canvas.fill_circle(cx, cy, r, face, rect);

    let mouth_w = r * 0.8;
    let mouth_h = (r * 0.05).max(1.0) + r * 0.4 * mouth_open;
    canvas.fill_rect_clipped(
        Rect::new(
            Point::new(cx - mouth_w / 2.0, cy + r * 0.35),
            Size::new(mouth_w, mouth_h),
        ),
        MOUTH,
        rect,
    );

    let tag = Rect::new(
        Point::new(rect.origin.x + TAG_MARGIN, rect.origin.y + TAG_MARGIN),
        TAG_SIZE,
    );
    canvas.fill_rect_clipped(tag, scene.emotion.color, rect);

    if scene.speaking {
        canvas.stroke_rect(rect, SPEAKING_BORDER_WIDTH, scene.emotion.color);
    }
}

fn draw_local(canvas: &mut Canvas, rect: Rect, scene: &Scene) {
    match scene.camera {
        Some(frame) if !scene.camera_failed => canvas.blit_frame(rect, frame),
        _ if scene.camera_failed => canvas.fill_rect(rect, dim(LOCAL_IDLE)),
        _ => canvas.fill_rect(rect, LOCAL_IDLE),
    }
}

fn rgb_to_u32(c: [f32; 3]) -> u32 {
    let ch = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (ch(c[0]) << 16) | (ch(c[1]) << 8) | ch(c[2])
}

fn dim(color: u32) -> u32 {
    let r = ((color >> 16) & 0xff) / 2;
    let g = ((color >> 8) & 0xff) / 2;
    let b = (color & 0xff) / 2;
    (r << 16) | (g << 8) | b
}

struct Canvas<'a> {
    buf: &'a mut [u32],
    width: i64,
    height: i64,
}

/// Integer pixel bounds `[x0, x1) × [y0, y1)` of `rect` clipped to `clip` and
/// the buffer.
fn pixel_bounds(rect: Rect, clip: Rect, width: i64, height: i64) -> (i64, i64, i64, i64) {
    let x0 = rect.origin.x.max(clip.origin.x).floor() as i64;
    let y0 = rect.origin.y.max(clip.origin.y).floor() as i64;
    let x1 = rect.right().min(clip.right()).ceil() as i64;
    let y1 = rect.bottom().min(clip.bottom()).ceil() as i64;
    (x0.max(0), y0.max(0), x1.min(width), y1.min(height))
}

impl Canvas<'_> {
    fn bounds(&self) -> Rect {
        Rect::new(
            Point::default(),
            Size::new(self.width as f64, self.height as f64),
        )
    }

    fn fill_rect(&mut self, rect: Rect, color: u32) {
        self.fill_rect_clipped(rect, color, self.bounds());
    }

    fn fill_rect_clipped(&mut self, rect: Rect, color: u32, clip: Rect) {
        let (x0, y0, x1, y1) = pixel_bounds(rect, clip, self.width, self.height);
        for y in y0..y1 {
            let row = (y * self.width) as usize;
            for x in x0..x1 {
                self.buf[row + x as usize] = color;
            }
        }
    }

    fn stroke_rect(&mut self, rect: Rect, thickness: i64, color: u32) {
        let t = thickness as f64;
        let (x, y) = (rect.origin.x, rect.origin.y);
        let (w, h) = (rect.size.width, rect.size.height);
        for edge in [
            Rect::new(Point::new(x, y), Size::new(w, t)),
            Rect::new(Point::new(x, y + h - t), Size::new(w, t)),
            Rect::new(Point::new(x, y), Size::new(t, h)),
            Rect::new(Point::new(x + w - t, y), Size::new(t, h)),
        ] {
            self.fill_rect_clipped(edge, color, rect);
        }
    }

    fn fill_circle(&mut self, cx: f64, cy: f64, r: f64, color: u32, clip: Rect) {
        let bbox = Rect::new(Point::new(cx - r, cy - r), Size::new(r * 2.0, r * 2.0));
        let (x0, y0, x1, y1) = pixel_bounds(bbox, clip, self.width, self.height);
        let r2 = r * r;
        for y in y0..y1 {
            let dy = y as f64 + 0.5 - cy;
            let row = (y * self.width) as usize;
            for x in x0..x1 {
                let dx = x as f64 + 0.5 - cx;
                if dx * dx + dy * dy <= r2 {
                    self.buf[row + x as usize] = color;
                }
            }
        }
    }

    /// Nearest-neighbour scale of a camera frame into `rect`.
    fn blit_frame(&mut self, rect: Rect, frame: &Frame) {
        if frame.width == 0 || frame.height == 0 || rect.size.width <= 0.0 || rect.size.height <= 0.0 {
            self.fill_rect(rect, LOCAL_IDLE);
            return;
        }
        let (x0, y0, x1, y1) = pixel_bounds(rect, self.bounds(), self.width, self.height);
        let sx = frame.width as f64 / rect.size.width;
        let sy = frame.height as f64 / rect.size.height;
        for y in y0..y1 {
            let fy = (((y as f64 - rect.origin.y) * sy) as u32).min(frame.height - 1);
            let row = (y * self.width) as usize;
            for x in x0..x1 {
                let fx = (((x as f64 - rect.origin.x) * sx) as u32).min(frame.width - 1);
                self.buf[row + x as usize] = frame.pixel(fx, fy);
            }
        }
    }
}

/// Presents composed frames to the call window through softbuffer.
pub struct Compositor {
    _context: softbuffer::Context<Arc<Window>>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
    animator: PaneAnimator,
}

impl Compositor {
    pub fn new(window: Arc<Window>) -> Result<Self, String> {
        let context = softbuffer::Context::new(window.clone())
            .map_err(|e| format!("Failed to create softbuffer context: {}", e))?;
        let surface = softbuffer::Surface::new(&context, window)
            .map_err(|e| format!("Failed to create softbuffer surface: {}", e))?;
        Ok(Self {
            _context: context,
            surface,
            animator: PaneAnimator::new(),
        })
    }

    /// Advance pane easing. Returns true while another frame is needed.
    pub fn animate(&mut self, layout: &Layout) -> bool {
        self.animator.step(layout)
    }

    pub fn rects(&self, layout: &Layout) -> [Rect; 2] {
        self.animator.rects(layout)
    }

    pub fn render(&mut self, width: u32, height: u32, scene: &Scene) {
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return;
        };
        if let Err(e) = self.surface.resize(w, h) {
            log::warn!("Surface resize failed: {}", e);
            return;
        }
        match self.surface.buffer_mut() {
            Ok(mut buffer) => {
                compose(&mut buffer, width, height, scene);
                // Opaque window: force alpha
                for px in buffer.iter_mut() {
                    *px |= 0xff00_0000;
                }
                if let Err(e) = buffer.present() {
                    log::warn!("Present failed: {}", e);
                }
            }
            Err(e) => log::warn!("Surface buffer unavailable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::layout::LayoutMetrics;
    use crate::call::speech::Emotion;

    const W: u32 = 400;
    const H: u32 = 300;

    fn layout() -> Layout {
        Layout::new(Size::new(W as f64, H as f64), LayoutMetrics::default())
    }

    fn render(scene: &Scene) -> Vec<u32> {
        let mut buf = vec![0u32; (W * H) as usize];
        compose(&mut buf, W, H, scene);
        buf
    }

    fn at(buf: &[u32], x: u32, y: u32) -> u32 {
        buf[(y * W + x) as usize]
    }

    fn scene<'a>(layout: &'a Layout, tag: &'a EmotionTag) -> Scene<'a> {
        Scene {
            layout,
            rects: PaneId::ALL.map(|id| layout.rect(id)),
            camera: None,
            camera_failed: false,
            avatar: None,
            speaking: false,
            emotion: tag,
            dragging: false,
        }
    }

    // Default metrics in a 400x300 viewport dock the PiP at (50, 20).

    #[test]
    fn pip_is_drawn_over_primary() {
        let layout = layout();
        let tag = EmotionTag::default();
        let buf = render(&scene(&layout, &tag));
        assert_eq!(at(&buf, 5, 290), REMOTE_BG);
        assert_eq!(at(&buf, 100, 100), LOCAL_IDLE);
        assert_eq!(at(&buf, 50, 20), PIP_BORDER);
        assert_eq!(at(&buf, 369, 199), PIP_BORDER);
    }

    #[test]
    fn speaking_border_uses_emotion_color() {
        let layout = layout();
        let tag = EmotionTag::from_raw(Some("happy"));
        let mut s = scene(&layout, &tag);
        assert_eq!(at(&render(&s), 1, 1), REMOTE_BG);
        s.speaking = true;
        let buf = render(&s);
        assert_eq!(at(&buf, 1, 1), Emotion::Happy.color());
        assert_eq!(at(&buf, 398, 298), Emotion::Happy.color());
    }

    #[test]
    fn emotion_tag_sits_in_remote_pane() {
        let layout = layout();
        let tag = EmotionTag::from_raw(Some("angry"));
        let buf = render(&scene(&layout, &tag));
        assert_eq!(at(&buf, 15, 15), Emotion::Angry.color());
    }

    #[test]
    fn camera_frame_fills_local_pane() {
        let layout = layout();
        let tag = EmotionTag::default();
        let mut rgb = vec![0u8; 12];
        rgb[0..3].copy_from_slice(&[0xff, 0x00, 0x00]);
        rgb[9..12].copy_from_slice(&[0x00, 0x00, 0xff]);
        let frame = Frame::new(2, 2, rgb).unwrap();

        let mut s = scene(&layout, &tag);
        s.camera = Some(&frame);
        let buf = render(&s);
        assert_eq!(at(&buf, 60, 30), 0xff0000);
        assert_eq!(at(&buf, 360, 190), 0x0000ff);
    }

    #[test]
    fn failed_camera_is_dimmed() {
        let layout = layout();
        let tag = EmotionTag::default();
        let frame = Frame::new(1, 1, vec![0xff; 3]).unwrap();
        let mut s = scene(&layout, &tag);
        s.camera = Some(&frame);
        s.camera_failed = true;
        assert_eq!(at(&render(&s), 100, 100), dim(LOCAL_IDLE));
    }

    #[test]
    fn toggled_layout_puts_remote_in_pip() {
        let mut layout = layout();
        layout.toggle();
        let tag = EmotionTag::from_raw(Some("sad"));
        let buf = render(&scene(&layout, &tag));
        assert_eq!(at(&buf, 5, 290), LOCAL_IDLE);
        // Tag follows the remote pane into the PiP
        assert_eq!(at(&buf, 65, 35), Emotion::Sad.color());
    }

    #[test]
    fn animator_eases_then_settles() {
        let mut layout = layout();
        let mut anim = PaneAnimator::new();
        assert!(!anim.step(&layout));

        layout.toggle();
        assert!(anim.step(&layout));
        let mid = anim.rects(&layout)[index(PaneId::Remote)];
        assert!(mid.size.width < W as f64 && mid.size.width > 320.0);

        let mut steps = 0;
        while anim.step(&layout) {
            steps += 1;
            assert!(steps < 100);
        }
        assert_eq!(anim.rects(&layout), PaneId::ALL.map(|id| layout.rect(id)));
    }

    #[test]
    fn animator_snaps_without_transition() {
        let mut layout = layout();
        let mut anim = PaneAnimator::new();
        anim.step(&layout);
        layout.pane_mut(PaneId::Local).transition_enabled = false;
        layout.place(PaneId::Local, Point::new(0.0, 0.0));
        assert!(!anim.step(&layout));
        assert_eq!(anim.rects(&layout)[index(PaneId::Local)].origin, Point::new(0.0, 0.0));
    }

    #[test]
    fn mood_color_converts() {
        assert_eq!(rgb_to_u32([1.0, 0.0, 0.5]), 0xff0080);
    }
}
