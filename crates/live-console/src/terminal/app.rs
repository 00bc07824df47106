use std::sync::{Arc, Mutex, Weak};

use live_console_common::mutex_lock_or_recover;

use super::Size;

/// An interactive application drawing on a session's terminal.
pub trait Application: Send + Sync {
    /// Called after the viewport changed; the application re-lays itself out.
    fn on_resize(&self, size: Size);
}

/// Tracks which application, if any, is bound to a session's input/output.
#[derive(Default)]
pub struct AppSession {
    current: Mutex<Option<Arc<dyn Application>>>,
}

impl AppSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn app(&self) -> Option<Arc<dyn Application>> {
        mutex_lock_or_recover(&self.current).clone()
    }

    /// Binds `app` until the returned binding is dropped.
    pub fn bind(self: &Arc<Self>, app: Arc<dyn Application>) -> AppBinding {
        *mutex_lock_or_recover(&self.current) = Some(Arc::clone(&app));
        AppBinding {
            session: Arc::downgrade(self),
            app,
        }
    }
}

/// Keeps an application bound; unbinds it on drop.
pub struct AppBinding {
    session: Weak<AppSession>,
    app: Arc<dyn Application>,
}

impl Drop for AppBinding {
    fn drop(&mut self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let mut current = mutex_lock_or_recover(&session.current);
        if current
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, &self.app))
        {
            *current = None;
        }
    }
}
