//! Event dispatch and the per-morph drag state machine
//!
//! Dispatch is iterative pre-order traversal with an explicit handled
//! flag. Drag follows a two-state machine per morph:
//!
//! ```text
//! Idle     --mousedown in bounds--> Dragging  (record grab offset)
//! Dragging --mousemove-----------> Dragging  (update position, silent)
//! Dragging --mouseup-------------> Idle      (final position persists)
//! ```
//!
//! The final-position persistence is the caller's job: this module reports
//! the completed drag and [`crate::core::TelosCore`] emits the `SET`.

use super::{MorphId, World};
use serde::{Deserialize, Serialize};

/// Input event kinds the world understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    MouseDown,
    MouseMove,
    MouseUp,
    Click,
}

/// A pointer event in world coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub x: f64,
    pub y: f64,
}

impl Event {
    pub fn new(kind: EventKind, x: f64, y: f64) -> Self {
        Self { kind, x, y }
    }
}

/// What dispatch did with an event
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Whether any morph consumed the event
    pub handled: bool,
    /// A drag that ended with this event; the final position should be
    /// persisted by the caller
    pub completed_drag: Option<MorphId>,
}

impl World {
    /// Dispatch a pointer event into the world.
    ///
    /// A `mousedown` grabs the topmost morph under the point; `mousemove`
    /// moves a grabbed morph without persisting; `mouseup` releases it and
    /// reports the completed drag; `click` is consumed by the topmost
    /// morph under the point.
    pub fn dispatch_event(&mut self, event: &Event) -> DispatchOutcome {
        match event.kind {
            EventKind::MouseDown => {
                let Some(top) = self.hit_test(event.x, event.y).pop() else {
                    return DispatchOutcome::default();
                };
                let Some(morph) = self.get_mut(&top) else {
                    return DispatchOutcome::default();
                };
                morph.dragging = true;
                morph.drag_dx = event.x - morph.x;
                morph.drag_dy = event.y - morph.y;
                DispatchOutcome {
                    handled: true,
                    completed_drag: None,
                }
            }
            EventKind::MouseMove => {
                let Some(id) = self.dragging_morph() else {
                    return DispatchOutcome::default();
                };
                let Some(morph) = self.get_mut(&id) else {
                    return DispatchOutcome::default();
                };
                morph.x = event.x - morph.drag_dx;
                morph.y = event.y - morph.drag_dy;
                DispatchOutcome {
                    handled: true,
                    completed_drag: None,
                }
            }
            EventKind::MouseUp => {
                let Some(id) = self.dragging_morph() else {
                    return DispatchOutcome::default();
                };
                if let Some(morph) = self.get_mut(&id) {
                    morph.dragging = false;
                }
                DispatchOutcome {
                    handled: true,
                    completed_drag: Some(id),
                }
            }
            EventKind::Click => {
                let handled = !self.hit_test(event.x, event.y).is_empty();
                DispatchOutcome {
                    handled,
                    completed_drag: None,
                }
            }
        }
    }

    /// The morph currently in a drag, if any. At most one morph drags at a
    /// time under the single-agent model; pre-order pick keeps this
    /// deterministic regardless.
    fn dragging_morph(&self) -> Option<MorphId> {
        let mut found = None;
        let mut stack = vec![self.root_id().clone()];
        while let Some(id) = stack.pop() {
            if let Some(morph) = self.get(&id) {
                if morph.dragging && found.is_none() {
                    found = Some(id.clone());
                }
                for child in morph.children.iter().rev() {
                    stack.push(child.clone());
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_rect(x: f64, y: f64, w: f64, h: f64) -> (World, MorphId) {
        let mut world = World::new();
        let id = world.create_morph("RectangleMorph");
        let morph = world.get_mut(&id).unwrap();
        morph.x = x;
        morph.y = y;
        morph.width = w;
        morph.height = h;
        (world, id)
    }

    #[test]
    fn test_mousedown_outside_bounds_is_unhandled() {
        let (mut world, id) = world_with_rect(10.0, 10.0, 20.0, 20.0);
        let outcome = world.dispatch_event(&Event::new(EventKind::MouseDown, 100.0, 100.0));
        assert!(!outcome.handled);
        assert!(!world.get(&id).unwrap().dragging);
    }

    #[test]
    fn test_drag_cycle_moves_and_reports() {
        let (mut world, id) = world_with_rect(10.0, 10.0, 20.0, 20.0);

        // Grab at (15, 15): offset (5, 5)
        let down = world.dispatch_event(&Event::new(EventKind::MouseDown, 15.0, 15.0));
        assert!(down.handled);
        assert!(world.get(&id).unwrap().dragging);

        // Move to (40, 40): morph lands at (35, 35), still silent
        let moved = world.dispatch_event(&Event::new(EventKind::MouseMove, 40.0, 40.0));
        assert!(moved.handled);
        assert!(moved.completed_drag.is_none());
        let morph = world.get(&id).unwrap();
        assert_eq!((morph.x, morph.y), (35.0, 35.0));

        // Release: drag completes, morph stays put
        let up = world.dispatch_event(&Event::new(EventKind::MouseUp, 40.0, 40.0));
        assert!(up.handled);
        assert_eq!(up.completed_drag.as_deref(), Some(id.as_str()));
        assert!(!world.get(&id).unwrap().dragging);
    }

    #[test]
    fn test_mousemove_without_drag_is_unhandled() {
        let (mut world, _) = world_with_rect(10.0, 10.0, 20.0, 20.0);
        let outcome = world.dispatch_event(&Event::new(EventKind::MouseMove, 15.0, 15.0));
        assert!(!outcome.handled);
    }

    #[test]
    fn test_mousedown_grabs_topmost_overlapping() {
        let mut world = World::new();
        let bottom = world.create_morph("RectangleMorph");
        let top = world.create_morph("RectangleMorph");
        for id in [&bottom, &top] {
            let m = world.get_mut(id).unwrap();
            m.x = 0.0;
            m.y = 0.0;
            m.width = 50.0;
            m.height = 50.0;
        }
        world.dispatch_event(&Event::new(EventKind::MouseDown, 25.0, 25.0));
        assert!(world.get(&top).unwrap().dragging);
        assert!(!world.get(&bottom).unwrap().dragging);
    }

    #[test]
    fn test_click_consumed_in_bounds() {
        let (mut world, _) = world_with_rect(0.0, 0.0, 10.0, 10.0);
        assert!(world.dispatch_event(&Event::new(EventKind::Click, 5.0, 5.0)).handled);
        assert!(!world.dispatch_event(&Event::new(EventKind::Click, 50.0, 50.0)).handled);
    }
}
