// ============================================================================
// File: src/death.rs
// ----------------------------------------------------------------------------
// Daemon death detection plumbing.
//
// Every time a backend links up it mints a fresh DeathCookie and wraps the
// caller's handler in a DeathWatch. The watch guarantees the handler fires
// at most once, asynchronously, and never after an explicit unlink.
// ============================================================================

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use uuid::Uuid;

use crate::event::EventContext;

/// Opaque identity of one link to the daemon.
///
/// A new cookie is minted each time a backend connects. Handlers receive the
/// cookie they were registered under, so a notification from a previous link
/// can be recognized as stale and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeathCookie(Uuid);

impl DeathCookie {
    pub(crate) fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DeathCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback invoked when the daemon behind the active backend dies.
pub trait DeathHandler: Send + Sync {
    fn on_death(&self, cookie: DeathCookie);
}

impl<F> DeathHandler for F
where
    F: Fn(DeathCookie) + Send + Sync,
{
    fn on_death(&self, cookie: DeathCookie) {
        self(cookie)
    }
}

enum WatchState {
    Linked { handler: Arc<dyn DeathHandler> },
    Died,
    Unlinked,
}

impl WatchState {
    fn name(&self) -> &'static str {
        match self {
            WatchState::Linked { .. } => "linked",
            WatchState::Died => "died",
            WatchState::Unlinked => "unlinked",
        }
    }
}

/// One-shot latch tying a daemon link to its death handler.
///
/// Backends hold an `Arc<DeathWatch>` and call [`DeathWatch::notify_died`]
/// from whatever task notices the channel break. Duplicate notifications and
/// notifications after [`DeathWatch::unlink`] are ignored.
pub struct DeathWatch {
    cookie: DeathCookie,
    state: Mutex<WatchState>,
    events: EventContext,
}

impl DeathWatch {
    /// Mint a cookie and arm the watch with `handler`.
    pub fn link(handler: Arc<dyn DeathHandler>, events: EventContext) -> Arc<Self> {
        Arc::new(Self {
            cookie: DeathCookie::mint(),
            state: Mutex::new(WatchState::Linked { handler }),
            events,
        })
    }

    /// Cookie minted for this link.
    pub fn cookie(&self) -> DeathCookie {
        self.cookie
    }

    /// Report that the linked daemon died.
    ///
    /// The first call moves the watch to `Died` and queues the handler on the
    /// event context with this watch's cookie. Every later call is a no-op.
    pub fn notify_died(&self) {
        let handler = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *state, WatchState::Died) {
                WatchState::Linked { handler } => handler,
                prev => {
                    // Keep the terminal state we were already in.
                    *state = prev;
                    debug!(
                        "ignoring death notification in state {} (cookie {})",
                        state.name(),
                        self.cookie
                    );
                    return;
                }
            }
        };
        let cookie = self.cookie;
        debug!("daemon link died, dispatching handler (cookie {cookie})");
        self.events.post(move || handler.on_death(cookie));
    }

    /// Disarm the watch without firing the handler.
    ///
    /// Used on orderly teardown. A death noticed after unlink is silent.
    pub fn unlink(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let WatchState::Linked { .. } = *state {
            debug!("unlinking death watch (cookie {})", self.cookie);
            *state = WatchState::Unlinked;
        }
    }

    /// True while the watch is armed.
    pub fn is_linked(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            WatchState::Linked { .. }
        )
    }
}

impl fmt::Debug for DeathWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("DeathWatch")
            .field("cookie", &self.cookie)
            .field("state", &state.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    struct SendingHandler(mpsc::Sender<DeathCookie>);

    impl DeathHandler for SendingHandler {
        fn on_death(&self, cookie: DeathCookie) {
            self.0.send(cookie).expect("test receiver alive");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fires_once_with_minted_cookie() {
        let events = EventContext::current();
        let (tx, rx) = mpsc::channel();
        let watch = DeathWatch::link(Arc::new(SendingHandler(tx)), events.clone());
        let cookie = watch.cookie();

        watch.notify_died();
        watch.notify_died();
        watch.notify_died();

        let got = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("handler fired");
        assert_eq!(got, cookie);

        // The queue is ordered, so a marker arriving proves no second
        // handler invocation is still in flight.
        let (mtx, mrx) = mpsc::channel();
        events.post(move || mtx.send(()).expect("marker receiver alive"));
        mrx.recv_timeout(Duration::from_secs(5)).expect("marker");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unlink_suppresses_handler() {
        let events = EventContext::current();
        let (tx, rx) = mpsc::channel();
        let watch = DeathWatch::link(Arc::new(SendingHandler(tx)), events.clone());

        watch.unlink();
        assert!(!watch.is_linked());
        watch.notify_died();

        let (mtx, mrx) = mpsc::channel();
        events.post(move || mtx.send(()).expect("marker receiver alive"));
        mrx.recv_timeout(Duration::from_secs(5)).expect("marker");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closure_handlers_work() {
        let events = EventContext::current();
        let (tx, rx) = mpsc::channel();
        let handler = Arc::new(move |cookie: DeathCookie| {
            tx.send(cookie).expect("test receiver alive");
        });
        let watch = DeathWatch::link(handler, events);
        watch.notify_died();
        rx.recv_timeout(Duration::from_secs(5)).expect("fired");
    }
}
