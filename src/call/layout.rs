use std::ops::{Add, Sub};

/// One of the two on-screen panes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneId {
    Remote, // Kai / avatar feed
    Local,  // user's camera
}

impl PaneId {
    pub const ALL: [PaneId; 2] = [PaneId::Remote, PaneId::Local];

    pub fn other(self) -> Self {
        match self {
            PaneId::Remote => PaneId::Local,
            PaneId::Local => PaneId::Remote,
        }
    }

    fn index(self) -> usize {
        match self {
            PaneId::Remote => 0,
            PaneId::Local => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    SecondaryPip,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn right(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn bottom(&self) -> f64 {
        self.origin.y + self.size.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.origin.x && p.x < self.right() && p.y >= self.origin.y && p.y < self.bottom()
    }
}

/// Where a pane sits when it is the PiP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanePosition {
    /// Fixed offset from the viewport's bottom-right corner.
    Docked,
    /// Absolute top-left set by a drag.
    Explicit { left: f64, top: f64 },
}

/// PiP size and dock offsets, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    pub pip_size: Size,
    pub dock_right: f64,
    pub dock_bottom: f64,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            pip_size: Size::new(320.0, 180.0),
            dock_right: 30.0,
            dock_bottom: 100.0,
        }
    }
}

impl LayoutMetrics {
    /// Convert logical metrics to physical pixels for the given scale factor.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            pip_size: Size::new(self.pip_size.width * factor, self.pip_size.height * factor),
            dock_right: self.dock_right * factor,
            dock_bottom: self.dock_bottom * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pane {
    pub id: PaneId,
    pub role: Role,
    pub position: PanePosition,
    /// Position easing; off while the pane follows the pointer.
    pub transition_enabled: bool,
}

impl Pane {
    fn new(id: PaneId, role: Role) -> Self {
        Self {
            id,
            role,
            position: PanePosition::Docked,
            transition_enabled: true,
        }
    }
}

/// Role and position records for the Remote and Local panes.
///
/// Exactly one pane is `Primary` at all times. Only the layout toggle and the
/// drag controller mutate this; everything else reads it.
#[derive(Debug, Clone)]
pub struct Layout {
    panes: [Pane; 2],
    viewport: Size,
    metrics: LayoutMetrics,
}

impl Layout {
    /// Remote starts full-size, the camera starts as the PiP.
    pub fn new(viewport: Size, metrics: LayoutMetrics) -> Self {
        Self {
            panes: [
                Pane::new(PaneId::Remote, Role::Primary),
                Pane::new(PaneId::Local, Role::SecondaryPip),
            ],
            viewport,
            metrics,
        }
    }

    pub fn pane(&self, id: PaneId) -> &Pane {
        &self.panes[id.index()]
    }

    pub(crate) fn pane_mut(&mut self, id: PaneId) -> &mut Pane {
        &mut self.panes[id.index()]
    }

    pub fn primary(&self) -> PaneId {
        if self.panes[0].role == Role::Primary {
            PaneId::Remote
        } else {
            PaneId::Local
        }
    }

    pub fn secondary(&self) -> PaneId {
        self.primary().other()
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn metrics(&self) -> LayoutMetrics {
        self.metrics
    }

    /// Window resized. Dragged positions are pulled back inside the new bounds.
    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
        self.reclamp();
    }

    /// Window moved to a display with a different scale factor.
    pub fn set_metrics(&mut self, metrics: LayoutMetrics) {
        self.metrics = metrics;
        self.reclamp();
    }

    fn reclamp(&mut self) {
        let size = self.metrics.pip_size;
        for id in PaneId::ALL {
            if let PanePosition::Explicit { left, top } = self.pane(id).position {
                let clamped = self.clamp_origin(Point::new(left, top), size);
                self.pane_mut(id).position = PanePosition::Explicit {
                    left: clamped.x,
                    top: clamped.y,
                };
            }
        }
    }

    /// Swap Primary and SecondaryPip and re-dock both panes.
    pub fn toggle(&mut self) {
        let new_primary = self.secondary();
        for pane in &mut self.panes {
            pane.role = if pane.id == new_primary {
                Role::Primary
            } else {
                Role::SecondaryPip
            };
            pane.position = PanePosition::Docked;
        }
        log::debug!("Layout: {:?} is now primary", new_primary);
        self.check_roles();
    }

    /// Top-left of a docked PiP.
    pub fn docked_origin(&self) -> Point {
        let size = self.metrics.pip_size;
        Point::new(
            (self.viewport.width - self.metrics.dock_right - size.width).max(0.0),
            (self.viewport.height - self.metrics.dock_bottom - size.height).max(0.0),
        )
    }

    /// Current on-screen rect of a pane.
    pub fn rect(&self, id: PaneId) -> Rect {
        let pane = self.pane(id);
        match pane.role {
            Role::Primary => Rect::new(Point::default(), self.viewport),
            Role::SecondaryPip => {
                let origin = match pane.position {
                    PanePosition::Docked => self.docked_origin(),
                    PanePosition::Explicit { left, top } => Point::new(left, top),
                };
                Rect::new(origin, self.metrics.pip_size)
            }
        }
    }

    /// The PiP is drawn on top, so it wins when both contain the point.
    pub fn hit_test(&self, p: Point) -> Option<PaneId> {
        let secondary = self.secondary();
        if self.rect(secondary).contains(p) {
            return Some(secondary);
        }
        let primary = self.primary();
        self.rect(primary).contains(p).then_some(primary)
    }

    /// Keep a box of `size` fully inside the viewport. A box larger than the
    /// viewport is pinned to the top-left edge.
    pub fn clamp_origin(&self, origin: Point, size: Size) -> Point {
        let max_left = self.viewport.width - size.width;
        let max_top = self.viewport.height - size.height;
        Point::new(origin.x.min(max_left).max(0.0), origin.y.min(max_top).max(0.0))
    }

    /// Move a pane to an absolute, clamped position.
    pub(crate) fn place(&mut self, id: PaneId, origin: Point) -> Point {
        let clamped = self.clamp_origin(origin, self.metrics.pip_size);
        self.pane_mut(id).position = PanePosition::Explicit {
            left: clamped.x,
            top: clamped.y,
        };
        clamped
    }

    /// Complement invariant: the two roles always differ.
    pub fn check_roles(&self) -> bool {
        let ok = self.panes[0].role != self.panes[1].role;
        if !ok {
            log::error!("Layout role invariant broken: {:?}", self.panes);
        }
        debug_assert!(ok, "both panes share a role");
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layout() -> Layout {
        Layout::new(Size::new(1280.0, 720.0), LayoutMetrics::default())
    }

    #[test]
    fn starts_with_remote_primary_and_docked_pip() {
        let l = layout();
        assert_eq!(l.primary(), PaneId::Remote);
        assert_eq!(l.secondary(), PaneId::Local);
        assert_eq!(l.pane(PaneId::Local).position, PanePosition::Docked);
        assert_eq!(l.rect(PaneId::Local).origin, Point::new(930.0, 440.0));
        assert_eq!(l.rect(PaneId::Remote), Rect::new(Point::default(), Size::new(1280.0, 720.0)));
    }

    #[test]
    fn toggle_swaps_roles_and_redocks() {
        let mut l = layout();
        l.place(PaneId::Local, Point::new(10.0, 10.0));
        l.toggle();
        assert_eq!(l.primary(), PaneId::Local);
        assert_eq!(l.pane(PaneId::Remote).role, Role::SecondaryPip);
        for id in PaneId::ALL {
            assert_eq!(l.pane(id).position, PanePosition::Docked);
        }
    }

    #[test]
    fn double_toggle_restores_initial_roles() {
        let mut l = layout();
        l.place(PaneId::Local, Point::new(50.0, 60.0));
        l.toggle();
        l.toggle();
        assert_eq!(l.primary(), PaneId::Remote);
        assert_eq!(l.pane(PaneId::Local).position, PanePosition::Docked);
        assert_eq!(l.pane(PaneId::Remote).position, PanePosition::Docked);
    }

    #[test]
    fn hit_test_prefers_pip() {
        let l = layout();
        assert_eq!(l.hit_test(Point::new(1000.0, 500.0)), Some(PaneId::Local));
        assert_eq!(l.hit_test(Point::new(5.0, 5.0)), Some(PaneId::Remote));
        assert_eq!(l.hit_test(Point::new(-1.0, 5.0)), None);
    }

    #[test]
    fn shrinking_viewport_reclamps_dragged_pip() {
        let mut l = layout();
        l.place(PaneId::Local, Point::new(900.0, 500.0));
        l.set_viewport(Size::new(800.0, 600.0));
        assert_eq!(
            l.pane(PaneId::Local).position,
            PanePosition::Explicit { left: 480.0, top: 420.0 }
        );
    }

    #[test]
    fn docked_origin_never_negative_in_tiny_viewport() {
        let l = Layout::new(Size::new(100.0, 100.0), LayoutMetrics::default());
        assert_eq!(l.docked_origin(), Point::new(0.0, 0.0));
    }

    #[test]
    fn rescaled_metrics_resize_and_reclamp_pip() {
        let mut l = layout();
        l.place(PaneId::Local, Point::new(900.0, 500.0));
        l.set_metrics(LayoutMetrics::default().scaled(2.0));
        assert_eq!(l.metrics().pip_size, Size::new(640.0, 360.0));
        assert_eq!(
            l.pane(PaneId::Local).position,
            PanePosition::Explicit { left: 640.0, top: 360.0 }
        );

        let mut docked = layout();
        docked.set_metrics(LayoutMetrics::default().scaled(2.0));
        assert_eq!(docked.rect(PaneId::Local).origin, Point::new(580.0, 160.0));
    }

    #[test]
    fn metrics_scale_with_dpi() {
        let m = LayoutMetrics::default().scaled(2.0);
        assert_eq!(m.pip_size, Size::new(640.0, 360.0));
        assert_eq!(m.dock_right, 60.0);
        assert_eq!(m.dock_bottom, 200.0);
    }

    proptest! {
        #[test]
        fn exactly_one_primary_after_any_toggles(n in 0usize..20) {
            let mut l = layout();
            for _ in 0..n {
                l.toggle();
            }
            prop_assert!(l.check_roles());
            let expected = if n % 2 == 0 { PaneId::Remote } else { PaneId::Local };
            prop_assert_eq!(l.primary(), expected);
        }
    }
}
