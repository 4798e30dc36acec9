//! Background speech notifications.
//!
//! Spawns a thread that owns the `Notifier`, fed by a bounded channel so the
//! control loop never blocks on the output channel. Consecutive identical
//! sayings inside the dedupe window are dropped, and delivery failures are
//! logged and swallowed; speech must never affect steering.
//!
//! Safety: each `Speaker` spawns exactly one thread that is shut down when
//! the `Speaker` is dropped, preventing thread leaks.

use crossbeam_channel as xch;
use racer_traits::clock::Clock;
use racer_traits::{Notifier, Saying};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::SpeechCfg;
use crate::util::MILLIS_PER_SEC;

pub struct Speaker {
    tx: xch::Sender<Saying>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Speaker {
    pub fn spawn<N, C>(mut notifier: N, cfg: SpeechCfg, clock: C) -> Self
    where
        N: Notifier + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let (tx, rx) = xch::bounded::<Saying>(cfg.queue_len.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let dedupe_ms = cfg.dedupe_secs.saturating_mul(MILLIS_PER_SEC);
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            let mut last_said: Option<(String, u64)> = None;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("speaker thread received shutdown signal");
                    break;
                }

                // Bounded wait so the shutdown flag is observed promptly.
                let saying = match rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(s) => s,
                    Err(xch::RecvTimeoutError::Timeout) => continue,
                    Err(xch::RecvTimeoutError::Disconnected) => {
                        tracing::debug!("speaker producer disconnected, exiting thread");
                        break;
                    }
                };

                match saying {
                    Saying::Text(text) => {
                        let now = clock.ms_since(epoch);
                        if let Some((prev, at)) = &last_said
                            && *prev == text
                            && now.saturating_sub(*at) <= dedupe_ms
                        {
                            tracing::trace!(%text, "duplicate saying dropped");
                            continue;
                        }
                        if let Err(e) = notifier.notify(&Saying::Text(text.clone())) {
                            tracing::warn!(error = %e, %text, "speech delivery failed, dropped");
                        }
                        last_said = Some((text, now));
                    }
                    Saying::Pause(secs) => {
                        // Pauses delay anything queued behind them.
                        clock.sleep(Duration::from_secs(u64::from(secs)));
                    }
                }
            }
            tracing::trace!("speaker thread exiting cleanly");
        });

        Self {
            tx,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Queue a saying without blocking. Dropped with a log line when the
    /// queue is full or the worker is gone.
    pub fn say(&self, text: impl Into<String>) {
        let text = text.into();
        if let Err(e) = self.tx.try_send(Saying::Text(text)) {
            tracing::debug!(error = %e, "speech queue full or closed, saying dropped");
        }
    }

    /// Queue a pause directive behind anything already queued.
    pub fn pause(&self, secs: u32) {
        if let Err(e) = self.tx.try_send(Saying::Pause(secs)) {
            tracing::debug!(error = %e, "speech queue full or closed, pause dropped");
        }
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("speaker thread joined successfully");
                }
                Err(e) => {
                    // Thread panicked; log but don't propagate (we're in Drop)
                    tracing::warn!(?e, "speaker thread panicked during shutdown");
                }
            }
        }
    }
}
