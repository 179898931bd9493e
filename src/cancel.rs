//! Cancellation of blocked waits

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared cancellation signal.
///
/// Cancelling drops the only sender of an internal zero-capacity channel, so
/// every wait selecting on [`CancelToken::receiver`] wakes at once.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::CancelToken;
///
/// let token = CancelToken::new();
/// let clone = token.clone();
/// clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                sender: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// Signal cancellation. Calling this again does nothing.
    pub fn cancel(&self) {
        self.inner.sender.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.sender.lock().is_none()
    }

    /// Becomes ready (disconnected) once the token is cancelled
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.inner.receiver
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
