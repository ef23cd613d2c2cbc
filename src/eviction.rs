//! Idle-resource eviction: lifecycle metadata and the background sweeper

use crossbeam::channel::{self, Sender, select};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Metadata for tracking a resource's lifecycle
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceMetadata {
    pub created_at: Instant,
    pub last_returned: Instant,
}

impl ResourceMetadata {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            last_returned: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_returned = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_returned.elapsed()
    }

    pub fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        self.idle_for() > idle_timeout
    }
}

/// Periodic background task running on its own thread.
///
/// The task closure returns `false` to end the loop on its own (the pool
/// it sweeps is gone). [`Sweeper::stop`] ends it from outside and waits
/// for any tick in progress to finish.
pub(crate) struct Sweeper {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn start<F>(name: String, period: Duration, mut task: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(period);

        let handle = thread::Builder::new().name(name).spawn(move || {
            loop {
                select! {
                    recv(ticker) -> _ => {
                        if !task() {
                            break;
                        }
                    }
                    recv(stop_rx) -> _ => break,
                }
            }
        })?;

        debug!(?period, "sweeper started");
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Signal the task to stop and join its thread
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sweeper thread panicked");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
