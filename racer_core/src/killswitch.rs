//! Kill-switch side channel listener.
//!
//! Owns the serial collaborator on a background thread and publishes a
//! single lock-free flag the control loop polls every tick. Depending on
//! policy, any received token kills, or only configured codes kill and
//! revive codes clear a kill that has not yet been observed by the loop.
//!
//! Safety: each listener spawns exactly one thread that is shut down when
//! the listener is dropped.

use racer_traits::KillSwitch;
use racer_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::{KillCfg, KillPolicy};

pub struct KillSwitchListener {
    flag: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl KillSwitchListener {
    pub fn spawn<K, C>(mut switch: K, cfg: KillCfg, clock: C) -> Self
    where
        K: KillSwitch + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let poll = Duration::from_millis(cfg.poll_ms.max(1));

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("kill listener received shutdown signal");
                    break;
                }

                match switch.poll() {
                    Ok(Some(token)) => apply_token(&cfg, &token, &flag_clone),
                    Ok(None) => {}
                    Err(e) => {
                        // A broken side channel must not stop the vehicle.
                        tracing::warn!(error = %e, "kill switch poll failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(poll);
            }
            tracing::trace!("kill listener thread exiting cleanly");
        });

        Self {
            flag,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Current kill state. The control loop latches the first `true` it
    /// observes, so a later revive only matters if it lands first.
    pub fn killed(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Shared flag handle for wiring a kill check into the pilot.
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }
}

fn apply_token(cfg: &KillCfg, token: &str, flag: &AtomicBool) {
    let token = token.trim();
    if token.is_empty() {
        return;
    }
    match cfg.policy {
        KillPolicy::Any => {
            tracing::info!(%token, "kill token received");
            flag.store(true, Ordering::Relaxed);
        }
        KillPolicy::Codes => {
            if cfg.kill_codes.iter().any(|c| c == token) {
                tracing::info!(%token, "kill code received");
                flag.store(true, Ordering::Relaxed);
            } else if cfg.revive_codes.iter().any(|c| c == token) {
                tracing::info!(%token, "revive code received");
                flag.store(false, Ordering::Relaxed);
            } else {
                tracing::debug!(%token, "unrecognized code ignored");
            }
        }
    }
}

impl Drop for KillSwitchListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("kill listener thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(?e, "kill listener thread panicked during shutdown");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::apply_token;
    use crate::config::{KillCfg, KillPolicy};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn codes_cfg() -> KillCfg {
        KillCfg {
            policy: KillPolicy::Codes,
            kill_codes: vec!["58391E4E".into(), "9DF14DB3".into()],
            revive_codes: vec!["E4F74E5A".into()],
            poll_ms: 20,
        }
    }

    #[test]
    fn any_policy_kills_on_any_token() {
        let flag = AtomicBool::new(false);
        apply_token(&KillCfg::default(), "whatever", &flag);
        assert!(flag.load(Ordering::Relaxed));
    }

    #[test]
    fn blank_tokens_are_ignored() {
        let flag = AtomicBool::new(false);
        apply_token(&KillCfg::default(), "   ", &flag);
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[test]
    fn codes_policy_matches_configured_codes_only() {
        let cfg = codes_cfg();
        let flag = AtomicBool::new(false);
        apply_token(&cfg, "not-a-code", &flag);
        assert!(!flag.load(Ordering::Relaxed));
        apply_token(&cfg, "9DF14DB3", &flag);
        assert!(flag.load(Ordering::Relaxed));
    }

    #[test]
    fn revive_code_clears_pending_kill() {
        let cfg = codes_cfg();
        let flag = AtomicBool::new(false);
        apply_token(&cfg, "58391E4E", &flag);
        assert!(flag.load(Ordering::Relaxed));
        apply_token(&cfg, "E4F74E5A", &flag);
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[test]
    fn tokens_are_trimmed_before_matching() {
        let cfg = codes_cfg();
        let flag = AtomicBool::new(false);
        apply_token(&cfg, " 58391E4E\r", &flag);
        assert!(flag.load(Ordering::Relaxed));
    }
}
