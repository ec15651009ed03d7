use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::AbortHandle,
    time::{sleep_until, Instant},
};

/// Notification that the timer `id` started for `key` has elapsed.
#[derive(Debug)]
pub(crate) struct Fired<K> {
    pub key: K,
    pub id: u64,
}

/// A running timer.
///
/// Dropping the timer cancels it. A timer whose task already completed may still have a
/// [Fired] notification in flight; receivers compare the notification id with the id of the
/// timer they currently hold and discard stale notifications.
#[derive(Debug)]
pub(crate) struct Timer {
    id: u64,
    handle: AbortHandle,
}

impl Timer {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) struct TimerSender<K> {
    tx: UnboundedSender<Fired<K>>,
    next_id: Arc<AtomicU64>,
}

impl<K> Clone for TimerSender<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<K: Send + 'static> TimerSender<K> {
    /// Start a timer that delivers `key` after `after` has elapsed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, key: K, after: Duration) -> Timer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + after;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            _ = tx.send(Fired { key, id });
        })
        .abort_handle();
        Timer { id, handle }
    }
}

pub(crate) fn timer_channel<K>() -> (TimerSender<K>, UnboundedReceiver<Fired<K>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        TimerSender {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        },
        rx,
    )
}
