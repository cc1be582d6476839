//! Cancellation bundle for the background tasks owned by one resource.
//!
//! A discovery interface owns an announcer, a listener and a data receiver;
//! the node owns the table sweep. Each owner holds one [`ShutdownToken`]:
//! tasks subscribe to its stop signal, the owner registers their handles, and
//! [`ShutdownToken::shutdown`] signals and then awaits them all so that no
//! task outlives the resource it serves.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct ShutdownToken {
    stop_tx: watch::Sender<bool>,
    online: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownToken {
    /// A fresh token: not stopped, not online, no tasks.
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            online: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// A receiver for the stop signal, for use in a `tokio::select!` branch.
    ///
    /// ```ignore
    /// tokio::select! {
    ///     res = socket.recv_from(&mut buf) => { /* handle */ }
    ///     _ = stop_rx.changed() => break,
    /// }
    /// ```
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    pub fn set_online(&self) {
        self.online.store(true, Ordering::SeqCst);
    }

    pub fn set_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Register a spawned task so that [`shutdown`](Self::shutdown) awaits it.
    pub async fn add_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Number of registered tasks that are still running.
    pub async fn running_tasks(&self) -> usize {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Send the stop signal and mark offline. Idempotent.
    pub fn signal_stop(&self) {
        self.stop_tx.send_replace(true);
        self.set_offline();
    }

    /// Signal stop, then await every registered task.
    ///
    /// Join errors (panicked or aborted tasks) are ignored; the handle list
    /// is drained either way.
    pub async fn shutdown(&self) {
        self.signal_stop();
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once `rx` observes the stop signal, or its sender is gone.
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
