//! Alarm timer
//!
//! Scheduled events live in the persisted record, sorted by timestamp. Only
//! the earliest one is armed: the instance publishes the next wake-up through
//! a watch channel and a single task sleeps until it, then calls back into
//! the instance.

use std::future::Future;
use std::sync::Weak;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;
use types::common::clock::until;
use types::Timestamp;

/// Handle used to move the next wake-up
#[derive(Debug, Clone)]
pub struct AlarmTimer {
    next: watch::Sender<Option<Timestamp>>,
}

impl AlarmTimer {
    pub fn new() -> (Self, watch::Receiver<Option<Timestamp>>) {
        let (next, rx) = watch::channel(None);
        (Self { next }, rx)
    }

    /// Arm the timer for `next`, or disarm it with `None`
    pub fn arm(&self, next: Option<Timestamp>) {
        self.next.send_replace(next);
    }

    pub fn armed_at(&self) -> Option<Timestamp> {
        *self.next.borrow()
    }
}

/// Spawn the alarm loop for `target`
///
/// The loop ends when `target` is dropped or every [`AlarmTimer`] is gone.
pub(crate) fn spawn_alarm_task<T, F, Fut>(
    target: Weak<T>,
    mut next: watch::Receiver<Option<Timestamp>>,
    fire: F,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: Fn(std::sync::Arc<T>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        loop {
            let armed = *next.borrow_and_update();
            match armed {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep(until(deadline)) => {
                            let Some(target) = target.upgrade() else { break };
                            trace!(deadline, "Alarm fired");
                            fire(target).await;
                        }
                        changed = next.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                None => {
                    if next.changed().await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
