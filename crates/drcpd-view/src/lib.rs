//! View manager (C10): registry of per-source views, activation and
//! deactivation, and routing of inbound UI events to whichever view is
//! currently active. Individual views (the per-source presentation logic
//! that actually drives C6 through C4) live outside this crate — only the
//! contract they present here is in scope.

use std::collections::HashMap;
use std::sync::Arc;

use drcpd_dcp::UiEvent;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("no view registered under {0:?}")]
    UnknownView(String),
    #[error("view {0:?} already registered")]
    AlreadyRegistered(String),
}

/// The abstract contract a per-source view presents to the manager. Views
/// are otherwise opaque: the manager never reaches into their internals,
/// only activates, deactivates, and forwards events to them.
pub trait View: Send + Sync {
    fn name(&self) -> &str;

    /// Called once when the view becomes active. Default no-op.
    fn on_activate(&self) {}

    /// Called once when the view stops being active. Default no-op.
    fn on_deactivate(&self) {}

    /// Handle a routed UI event; returns `true` if this view consumed it.
    fn handle_event(&self, event: &UiEvent) -> bool;
}

/// Registry of views plus the single currently-active one. Routing is the
/// only path from C9's event queue into view-specific behaviour.
pub struct ViewManager {
    views: Mutex<HashMap<String, Arc<dyn View>>>,
    active: Mutex<Option<String>>,
}

impl ViewManager {
    pub fn new() -> Self {
        ViewManager { views: Mutex::new(HashMap::new()), active: Mutex::new(None) }
    }

    pub fn register(&self, view: Arc<dyn View>) -> Result<(), ViewError> {
        let name = view.name().to_string();
        let mut views = self.views.lock();
        if views.contains_key(&name) {
            return Err(ViewError::AlreadyRegistered(name));
        }
        views.insert(name, view);
        Ok(())
    }

    pub fn unregister(&self, name: &str) {
        self.views.lock().remove(name);
        let mut active = self.active.lock();
        if active.as_deref() == Some(name) {
            *active = None;
        }
    }

    pub fn active_view_name(&self) -> Option<String> {
        self.active.lock().clone()
    }

    /// Deactivate whatever view is currently active (if any) and activate
    /// `name`. A no-op if `name` is already active.
    pub fn activate(&self, name: &str) -> Result<(), ViewError> {
        let views = self.views.lock();
        let target = views.get(name).cloned().ok_or_else(|| ViewError::UnknownView(name.to_string()))?;
        drop(views);

        let mut active = self.active.lock();
        if active.as_deref() == Some(name) {
            return Ok(());
        }
        if let Some(current_name) = active.take() {
            if let Some(current) = self.views.lock().get(&current_name).cloned() {
                current.on_deactivate();
            }
        }
        target.on_activate();
        *active = Some(name.to_string());
        Ok(())
    }

    /// Route an event to the active view. Returns `false` if there is no
    /// active view or it declined to handle the event.
    pub fn dispatch(&self, event: &UiEvent) -> bool {
        let active_name = self.active.lock().clone();
        let Some(name) = active_name else {
            tracing::debug!("dropping UI event, no active view");
            return false;
        };
        let Some(view) = self.views.lock().get(&name).cloned() else {
            return false;
        };
        view.handle_event(event)
    }
}

impl Default for ViewManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingView {
        name: &'static str,
        activations: AtomicUsize,
        deactivations: AtomicUsize,
        handled: AtomicUsize,
    }

    impl RecordingView {
        fn new(name: &'static str) -> Self {
            RecordingView { name, activations: AtomicUsize::new(0), deactivations: AtomicUsize::new(0), handled: AtomicUsize::new(0) }
        }
    }

    impl View for RecordingView {
        fn name(&self) -> &str {
            self.name
        }

        fn on_activate(&self) {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }

        fn on_deactivate(&self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }

        fn handle_event(&self, _event: &UiEvent) -> bool {
            self.handled.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn activating_a_second_view_deactivates_the_first() {
        let manager = ViewManager::new();
        let a = Arc::new(RecordingView::new("a"));
        let b = Arc::new(RecordingView::new("b"));
        manager.register(a.clone()).unwrap();
        manager.register(b.clone()).unwrap();

        manager.activate("a").unwrap();
        assert_eq!(a.activations.load(Ordering::SeqCst), 1);

        manager.activate("b").unwrap();
        assert_eq!(a.deactivations.load(Ordering::SeqCst), 1);
        assert_eq!(b.activations.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_view_name().as_deref(), Some("b"));
    }

    #[test]
    fn dispatch_routes_only_to_the_active_view() {
        let manager = ViewManager::new();
        let a = Arc::new(RecordingView::new("a"));
        let b = Arc::new(RecordingView::new("b"));
        manager.register(a.clone()).unwrap();
        manager.register(b.clone()).unwrap();
        manager.activate("a").unwrap();

        assert!(manager.dispatch(&UiEvent::Next));
        assert_eq!(a.handled.load(Ordering::SeqCst), 1);
        assert_eq!(b.handled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn activating_unknown_view_is_an_error() {
        let manager = ViewManager::new();
        assert_eq!(manager.activate("ghost"), Err(ViewError::UnknownView("ghost".to_string())));
    }
}
