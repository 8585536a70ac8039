//! Single-shot host signals: first user interaction and teardown.
//!
//! The host UI or runtime holds a clone and fires the signal; the SDK
//! awaits it. Only the first fire is recorded, and waiters stop
//! listening once it has happened.

use std::sync::Arc;

use tokio::sync::watch;

/// A value that is set at most once and can be awaited by any number of tasks.
#[derive(Debug)]
struct Latch<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Copy> Latch<T> {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    fn fire(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(value);
            true
        })
    }

    fn get(&self) -> Option<T> {
        *self.tx.borrow()
    }

    async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = *rx.borrow_and_update() {
                return value;
            }
            // The sender lives as long as `self`, so this only fails if
            // the latch is being dropped underneath us.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Kind of user interaction that opened the low-priority gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Click,
    KeyPress,
    Touch,
}

/// Fires once, on the first click, key press or touch.
///
/// # Example
///
/// ```rust
/// use vitals_sdk::{InteractionKind, InteractionSignal};
///
/// let signal = InteractionSignal::new();
/// assert!(signal.notify(InteractionKind::Click));
/// assert!(!signal.notify(InteractionKind::Touch)); // already fired
/// assert_eq!(signal.fired(), Some(InteractionKind::Click));
/// ```
#[derive(Debug, Clone)]
pub struct InteractionSignal {
    latch: Arc<Latch<InteractionKind>>,
}

impl InteractionSignal {
    pub fn new() -> Self {
        Self {
            latch: Arc::new(Latch::new()),
        }
    }

    /// Report an interaction. Returns `true` only for the first one.
    pub fn notify(&self, kind: InteractionKind) -> bool {
        self.latch.fire(kind)
    }

    /// The first interaction, if one has happened.
    pub fn fired(&self) -> Option<InteractionKind> {
        self.latch.get()
    }

    /// Wait for the first interaction.
    pub async fn first(&self) -> InteractionKind {
        self.latch.wait().await
    }
}

impl Default for InteractionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the host is going away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownReason {
    /// The host became invisible and may never return.
    Hidden,
    /// The host is unloading.
    Unload,
    /// Explicit shutdown of the session.
    Shutdown,
}

/// Fires once, when the host is about to become invisible or exit.
#[derive(Debug, Clone)]
pub struct TeardownSignal {
    latch: Arc<Latch<TeardownReason>>,
}

impl TeardownSignal {
    pub fn new() -> Self {
        Self {
            latch: Arc::new(Latch::new()),
        }
    }

    /// Signal teardown. Returns `true` only for the first call.
    pub fn fire(&self, reason: TeardownReason) -> bool {
        self.latch.fire(reason)
    }

    pub fn fired(&self) -> Option<TeardownReason> {
        self.latch.get()
    }

    /// Wait until teardown is signalled.
    pub async fn wait(&self) -> TeardownReason {
        self.latch.wait().await
    }
}

impl Default for TeardownSignal {
    fn default() -> Self {
        Self::new()
    }
}
