//! Window Registry - owns every window of an application
//!
//! Handles are slotmap keys, so a handle to a destroyed window is detected
//! instead of aliasing a newer one. Iteration follows creation order.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

use super::window::Window;
use crate::error::{Error, Result};

new_key_type! {
    /// Handle to a window, stable for the window's lifetime
    pub struct WindowId;
}

/// Identity of one application instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(u64);

impl AppId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Capacity of the first allocation of the order list
const INITIAL_CAPACITY: usize = 4;

/// Registry that owns the windows of one application
#[derive(Debug)]
pub struct WindowRegistry {
    app: AppId,
    windows: SlotMap<WindowId, Window>,
    /// Creation order
    order: Vec<WindowId>,
}

impl WindowRegistry {
    pub fn new(app: AppId) -> Self {
        Self {
            app,
            windows: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub fn app(&self) -> AppId {
        self.app
    }

    /// Make room for one more window, doubling the capacity when full
    ///
    /// On failure nothing changes.
    fn grow(&mut self) -> Result<()> {
        if self.order.len() < self.order.capacity() {
            return Ok(());
        }
        let target = (self.order.capacity() * 2).max(INITIAL_CAPACITY);
        self.order
            .try_reserve_exact(target - self.order.len())
            .map_err(|_| Error::ResourceExhausted)
    }

    /// Register a window built by `build` from its freshly assigned id
    pub fn insert_with(&mut self, build: impl FnOnce(WindowId) -> Window) -> Result<WindowId> {
        self.grow()?;
        let id = self.windows.insert_with_key(build);
        self.order.push(id);
        Ok(id)
    }

    pub fn remove(&mut self, id: WindowId) -> Option<Window> {
        let window = self.windows.remove(id)?;
        self.order.retain(|&other| other != id);
        Some(window)
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(id)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains_key(id)
    }

    /// Window ids in creation order
    pub fn ids(&self) -> &[WindowId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.order.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::geometry::Size;

    fn add(registry: &mut WindowRegistry, title: &str) -> WindowId {
        let app = registry.app();
        registry
            .insert_with(|id| Window::new(id, app, title, Size::new(640, 480), &Config::default()))
            .unwrap()
    }

    #[test]
    fn ids_keep_creation_order() {
        let mut registry = WindowRegistry::new(AppId::next());
        let a = add(&mut registry, "a");
        let b = add(&mut registry, "b");
        let c = add(&mut registry, "c");
        registry.remove(b);
        assert_eq!(registry.ids(), &[a, c]);
        assert_eq!(registry.get(c).unwrap().title, "c");
    }

    #[test]
    fn capacity_doubles_from_four() {
        let mut registry = WindowRegistry::new(AppId::next());
        assert_eq!(registry.capacity(), 0);
        add(&mut registry, "w0");
        assert_eq!(registry.capacity(), 4);
        for i in 1..5 {
            add(&mut registry, &format!("w{i}"));
        }
        assert_eq!(registry.capacity(), 8);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn stale_handles_are_detected() {
        let mut registry = WindowRegistry::new(AppId::next());
        let a = add(&mut registry, "a");
        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        let b = add(&mut registry, "b");
        assert_ne!(a, b);
        assert!(registry.get(a).is_none());
    }

    #[test]
    fn windows_know_their_application() {
        let app = AppId::next();
        let mut registry = WindowRegistry::new(app);
        let id = add(&mut registry, "a");
        assert_eq!(registry.get(id).unwrap().app, app);
        assert_eq!(registry.get(id).unwrap().id, id);
    }
}
