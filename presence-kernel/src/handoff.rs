//! Cooperative hand-off of the sensor link between the ingestion loop and the
//! command channel.
//!
//! `Running -> PauseRequested -> Paused -> Running`. The command side calls
//! `request_pause` then `wait_paused`; the loop calls `checkpoint` at the top
//! of every iteration, which parks it until `resume`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Running,
    PauseRequested,
    Paused,
}

#[derive(Debug, thiserror::Error)]
#[error("ingestion loop did not pause within {0:?}")]
pub struct PauseTimeout(pub Duration);

#[derive(Debug, Clone)]
pub struct Handoff {
    tx: Arc<watch::Sender<LinkPhase>>,
    /// Set while an ingestion loop is serving checkpoints.
    attached: Arc<AtomicBool>,
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Handoff {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LinkPhase::Running);
        Self {
            tx: Arc::new(tx),
            attached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn phase(&self) -> LinkPhase {
        *self.tx.borrow()
    }

    /// Marks a loop as present; from now on pauses must be acknowledged.
    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    /// Called when the loop exits. Acknowledges any outstanding request.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.acknowledge_if_requested();
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Asks the loop to stop at its next checkpoint. No-op unless running.
    /// With no loop attached the link is free and the pause is immediate.
    pub fn request_pause(&self) {
        let attached = self.is_attached();
        self.tx.send_if_modified(|phase| {
            if *phase == LinkPhase::Running {
                *phase = if attached {
                    LinkPhase::PauseRequested
                } else {
                    LinkPhase::Paused
                };
                true
            } else {
                false
            }
        });
    }

    /// Waits until the loop acknowledges the pause.
    pub async fn wait_paused(&self, timeout: Duration) -> Result<(), PauseTimeout> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|p| *p == LinkPhase::Paused)).await;
        match waited {
            Ok(Ok(_)) => Ok(()),
            // The sender lives in `self`, so the channel cannot close here.
            Ok(Err(_)) | Err(_) => Err(PauseTimeout(timeout)),
        }
    }

    /// Releases the loop. Also withdraws a request the loop never saw.
    pub fn resume(&self) {
        self.tx.send_if_modified(|phase| {
            if *phase == LinkPhase::Running {
                false
            } else {
                *phase = LinkPhase::Running;
                true
            }
        });
    }

    /// Loop side: if a pause was requested, acknowledge it and wait for
    /// `resume`. Returns true if the loop was parked.
    pub async fn checkpoint(&self) -> bool {
        let acknowledged = self.tx.send_if_modified(|phase| {
            if *phase == LinkPhase::PauseRequested {
                *phase = LinkPhase::Paused;
                true
            } else {
                false
            }
        });
        if !acknowledged {
            return false;
        }
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|p| *p == LinkPhase::Running).await;
        true
    }

    fn acknowledge_if_requested(&self) {
        self.tx.send_if_modified(|phase| {
            if *phase == LinkPhase::PauseRequested {
                *phase = LinkPhase::Paused;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_cycle_without_io() {
        let h = Handoff::new();
        h.attach();
        assert_eq!(h.phase(), LinkPhase::Running);
        assert!(!h.checkpoint().await);

        h.request_pause();
        assert_eq!(h.phase(), LinkPhase::PauseRequested);

        let loop_side = h.clone();
        let parked = tokio::spawn(async move { loop_side.checkpoint().await });

        h.wait_paused(Duration::from_secs(1)).await.unwrap();
        assert_eq!(h.phase(), LinkPhase::Paused);
        assert!(!parked.is_finished());

        h.resume();
        assert!(parked.await.unwrap());
        assert_eq!(h.phase(), LinkPhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_paused_times_out_when_loop_never_checks_in() {
        let h = Handoff::new();
        h.attach();
        h.request_pause();
        let err = h.wait_paused(Duration::from_millis(500)).await.unwrap_err();
        assert_eq!(err.0, Duration::from_millis(500));

        h.resume();
        assert_eq!(h.phase(), LinkPhase::Running);
    }

    #[tokio::test]
    async fn pause_is_immediate_without_loop() {
        let h = Handoff::new();
        h.request_pause();
        assert_eq!(h.phase(), LinkPhase::Paused);
        h.wait_paused(Duration::from_millis(10)).await.unwrap();
        h.resume();
        assert_eq!(h.phase(), LinkPhase::Running);
    }

    #[tokio::test]
    async fn detach_acknowledges_outstanding_request() {
        let h = Handoff::new();
        h.attach();
        h.request_pause();
        assert_eq!(h.phase(), LinkPhase::PauseRequested);
        h.detach();
        h.wait_paused(Duration::from_millis(10)).await.unwrap();
    }

    #[test]
    fn request_pause_only_from_running() {
        let h = Handoff::new();
        h.request_pause();
        h.request_pause();
        assert_eq!(h.phase(), LinkPhase::Paused);
        h.resume();
        h.resume();
        assert_eq!(h.phase(), LinkPhase::Running);
    }
}
