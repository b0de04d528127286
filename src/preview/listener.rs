//! Preview-loaded notifications

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::types::PreviewInfo;

/// Receives a [`PreviewInfo`] once per successfully loaded session
///
/// Called on the session's worker thread. Implemented for any
/// `Fn(&PreviewInfo) + Send + Sync` closure.
pub trait PreviewListener: Send + Sync {
    fn on_preview_loaded(&self, info: &PreviewInfo);
}

impl<F> PreviewListener for F
where
    F: Fn(&PreviewInfo) + Send + Sync,
{
    fn on_preview_loaded(&self, info: &PreviewInfo) {
        self(info);
    }
}

/// Handle for removing a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct Listeners {
    next: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<dyn PreviewListener>)>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn PreviewListener>) -> ListenerId {
        let id = ListenerId(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    /// Notify every listener; the lock is not held during callbacks
    pub(crate) fn emit(&self, info: &PreviewInfo) {
        let listeners: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener.on_preview_loaded(info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InterfaceKind;
    use crate::preview::PreviewRequest;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_closures_are_listeners_and_can_be_removed() {
        let listeners = Listeners::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = listeners.add(Arc::new(move |_: &PreviewInfo| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let info = PreviewInfo::new(
            &PreviewRequest::new("a.txt"),
            InterfaceKind::PreviewHandler,
            None,
            None,
        );
        listeners.emit(&info);
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.emit(&info);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
