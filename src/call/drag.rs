use super::layout::{Layout, PaneId, Point, Role};

/// An in-progress pointer drag of the PiP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub target: PaneId,
    /// Pointer position minus pane top-left, fixed at drag start.
    pub pointer_offset: Point,
}

/// Turns pointer events into clamped absolute positions for the PiP.
///
/// At most one session exists. Draggability is checked when the drag starts;
/// a role change mid-drag is not expected, but the coordinator closes the
/// session before toggling anyway.
#[derive(Debug, Default)]
pub struct DragController {
    session: Option<DragSession>,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Open a session on `pane` if it is the PiP and nothing is speaking.
    /// Returns false (and does nothing) otherwise.
    pub fn pointer_down(
        &mut self,
        layout: &mut Layout,
        pane: PaneId,
        pointer: Point,
        speaking: bool,
    ) -> bool {
        if self.session.is_some() {
            return false;
        }
        if layout.pane(pane).role != Role::SecondaryPip || speaking {
            return false;
        }

        let origin = layout.rect(pane).origin;
        let pointer_offset = pointer - origin;

        // Switch from the docked corner offset to absolute positioning
        layout.place(pane, origin);
        layout.pane_mut(pane).transition_enabled = false;

        log::debug!(
            "Drag start: {:?} offset=({:.0},{:.0})",
            pane,
            pointer_offset.x,
            pointer_offset.y
        );
        self.session = Some(DragSession {
            target: pane,
            pointer_offset,
        });
        true
    }

    /// Follow the pointer. Returns the applied (clamped) top-left, or `None`
    /// when no drag is open.
    pub fn pointer_move(&mut self, layout: &mut Layout, pointer: Point) -> Option<Point> {
        let session = self.session?;
        let wanted = pointer - session.pointer_offset;
        Some(layout.place(session.target, wanted))
    }

    /// Close the session and re-enable position easing.
    pub fn pointer_up(&mut self, layout: &mut Layout) -> Option<PaneId> {
        let session = self.session.take()?;
        layout.pane_mut(session.target).transition_enabled = true;
        log::debug!("Drag end: {:?} at {:?}", session.target, layout.pane(session.target).position);
        Some(session.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::layout::{LayoutMetrics, PanePosition, Size};
    use proptest::prelude::*;

    fn layout() -> Layout {
        Layout::new(Size::new(1280.0, 720.0), LayoutMetrics::default())
    }

    fn layout_with_pip_at(left: f64, top: f64) -> Layout {
        let mut l = layout();
        l.place(PaneId::Local, Point::new(left, top));
        l
    }

    #[test]
    fn records_offset_and_follows_pointer() {
        let mut l = layout_with_pip_at(100.0, 60.0);
        let mut drag = DragController::new();

        assert!(drag.pointer_down(&mut l, PaneId::Local, Point::new(120.0, 80.0), false));
        assert_eq!(drag.session().unwrap().pointer_offset, Point::new(20.0, 20.0));

        let applied = drag.pointer_move(&mut l, Point::new(300.0, 90.0));
        assert_eq!(applied, Some(Point::new(280.0, 70.0)));
        assert_eq!(
            l.pane(PaneId::Local).position,
            PanePosition::Explicit { left: 280.0, top: 70.0 }
        );
    }

    #[test]
    fn primary_pane_is_never_dragged() {
        let mut l = layout();
        let mut drag = DragController::new();
        assert!(!drag.pointer_down(&mut l, PaneId::Remote, Point::new(10.0, 10.0), false));
        assert!(!drag.is_active());
        assert_eq!(drag.pointer_move(&mut l, Point::new(50.0, 50.0)), None);
        assert_eq!(l.pane(PaneId::Remote).position, PanePosition::Docked);
    }

    #[test]
    fn no_drag_while_speaking() {
        let mut l = layout();
        let mut drag = DragController::new();
        assert!(!drag.pointer_down(&mut l, PaneId::Local, Point::new(1000.0, 500.0), true));
        assert!(!drag.is_active());
    }

    #[test]
    fn second_pointer_down_is_ignored() {
        let mut l = layout();
        let mut drag = DragController::new();
        assert!(drag.pointer_down(&mut l, PaneId::Local, Point::new(1000.0, 500.0), false));
        assert!(!drag.pointer_down(&mut l, PaneId::Local, Point::new(940.0, 450.0), false));
        assert_eq!(drag.session().unwrap().pointer_offset, Point::new(70.0, 60.0));
    }

    #[test]
    fn drag_start_pins_docked_pane_and_suspends_easing() {
        let mut l = layout();
        let mut drag = DragController::new();
        drag.pointer_down(&mut l, PaneId::Local, Point::new(1000.0, 500.0), false);
        assert_eq!(
            l.pane(PaneId::Local).position,
            PanePosition::Explicit { left: 930.0, top: 440.0 }
        );
        assert!(!l.pane(PaneId::Local).transition_enabled);

        assert_eq!(drag.pointer_up(&mut l), Some(PaneId::Local));
        assert!(l.pane(PaneId::Local).transition_enabled);
        assert!(!drag.is_active());
        assert_eq!(drag.pointer_up(&mut l), None);
    }

    #[test]
    fn clamps_past_every_edge() {
        let mut l = layout_with_pip_at(100.0, 100.0);
        let mut drag = DragController::new();
        drag.pointer_down(&mut l, PaneId::Local, Point::new(110.0, 110.0), false);

        assert_eq!(drag.pointer_move(&mut l, Point::new(-500.0, -500.0)), Some(Point::new(0.0, 0.0)));
        assert_eq!(
            drag.pointer_move(&mut l, Point::new(5000.0, 5000.0)),
            Some(Point::new(960.0, 540.0))
        );
    }

    proptest! {
        #[test]
        fn dragged_pip_stays_inside_viewport(
            vw in 400.0f64..3000.0,
            vh in 300.0f64..2000.0,
            px in -5000.0f64..5000.0,
            py in -5000.0f64..5000.0,
        ) {
            let mut l = Layout::new(Size::new(vw, vh), LayoutMetrics::default());
            let mut drag = DragController::new();
            let start = l.rect(PaneId::Local).origin;
            prop_assert!(drag.pointer_down(&mut l, PaneId::Local, Point::new(start.x + 1.0, start.y + 1.0), false));
            drag.pointer_move(&mut l, Point::new(px, py));

            let r = l.rect(PaneId::Local);
            prop_assert!(r.origin.x >= 0.0 && r.origin.y >= 0.0);
            prop_assert!(r.right() <= vw + 1e-9);
            prop_assert!(r.bottom() <= vh + 1e-9);
        }
    }
}
