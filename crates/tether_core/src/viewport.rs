//! Viewport registry
//!
//! Viewports are owned by the host's render engine. The registry only keeps
//! weak references, so a viewport dropped by its owner disappears on the
//! next prune without an explicit unregister.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tether_interop::convert::CameraView;

/// A host viewport displaying the engine's output
pub trait Viewport {
    /// Unique viewport ID
    fn id(&self) -> i32;

    /// Tag the viewport for a redraw
    fn on_update(&self);

    /// Current camera, if the viewport renders from one
    fn camera(&self) -> Option<CameraView> {
        None
    }
}

#[derive(Default)]
pub struct ViewportRegistry {
    viewports: BTreeMap<i32, Weak<dyn Viewport>>,
}

impl ViewportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a viewport, replacing any previous one with the same ID
    pub fn insert(&mut self, viewport: &Arc<dyn Viewport>) -> i32 {
        let id = viewport.id();
        self.viewports.insert(id, Arc::downgrade(viewport));
        id
    }

    pub fn remove(&mut self, id: i32) -> bool {
        self.viewports.remove(&id).is_some()
    }

    pub fn get(&self, id: i32) -> Option<Arc<dyn Viewport>> {
        self.viewports.get(&id).and_then(Weak::upgrade)
    }

    /// Drop entries whose viewport is gone, returning their IDs
    pub fn prune(&mut self) -> Vec<i32> {
        let dead: Vec<i32> = self
            .viewports
            .iter()
            .filter(|(_, weak)| weak.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            self.viewports.remove(id);
        }
        dead
    }

    /// Live viewports in ID order
    pub fn live(&self) -> Vec<Arc<dyn Viewport>> {
        self.viewports.values().filter_map(Weak::upgrade).collect()
    }

    pub fn ids(&self) -> Vec<i32> {
        self.viewports.keys().copied().collect()
    }

    pub fn tag_redraw(&self) {
        for viewport in self.live() {
            viewport.on_update();
        }
    }

    pub fn len(&self) -> usize {
        self.viewports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        id: i32,
        redraws: AtomicUsize,
    }

    impl Viewport for Counting {
        fn id(&self) -> i32 {
            self.id
        }

        fn on_update(&self) {
            self.redraws.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn viewport(id: i32) -> Arc<Counting> {
        Arc::new(Counting {
            id,
            redraws: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_dropped_viewports_are_pruned() {
        let mut registry = ViewportRegistry::new();
        let kept = viewport(1);
        let dropped = viewport(2);
        registry.insert(&(kept.clone() as Arc<dyn Viewport>));
        registry.insert(&(dropped.clone() as Arc<dyn Viewport>));
        drop(dropped);

        assert_eq!(registry.live().len(), 1);
        assert_eq!(registry.prune(), vec![2]);
        assert_eq!(registry.ids(), vec![1]);
    }

    #[test]
    fn test_tag_redraw() {
        let mut registry = ViewportRegistry::new();
        let a = viewport(1);
        registry.insert(&(a.clone() as Arc<dyn Viewport>));
        registry.tag_redraw();
        registry.tag_redraw();
        assert_eq!(a.redraws.load(Ordering::SeqCst), 2);
        assert!(registry.remove(1));
        assert!(registry.is_empty());
    }
}
