//! Debounced inactivity deadline.
//!
//! A single deadline slot lives in a `watch` channel. Re-arming replaces the
//! slot and bumps its generation; the timer task sleeps until the current
//! deadline and reports a [`TimerFired`] carrying the generation it slept on.
//! Consumers compare that generation with [`InactivityTimer::is_current`] so a
//! firing that raced with a re-arm is ignored.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Report that a deadline elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    /// Generation of the deadline that elapsed.
    pub generation: u64,
}

/// Channel for receiving timer firings.
pub type TimerFiredReceiver = mpsc::Receiver<TimerFired>;

#[derive(Debug, Clone, Copy)]
struct Deadline {
    generation: u64,
    at: Option<Instant>,
}

/// Resettable single-shot inactivity timer.
pub struct InactivityTimer {
    period: Duration,
    deadline: watch::Sender<Deadline>,
    task: JoinHandle<()>,
}

impl InactivityTimer {
    /// Spawn the timer task. The timer starts disarmed.
    ///
    /// Returns the timer and a receiver for its firings.
    pub fn spawn(period: Duration) -> (Self, TimerFiredReceiver) {
        let (fire_tx, fire_rx) = mpsc::channel(8);
        let (deadline_tx, deadline_rx) = watch::channel(Deadline {
            generation: 0,
            at: None,
        });
        let task = tokio::spawn(run_timer(deadline_rx, fire_tx));

        (
            Self {
                period,
                deadline: deadline_tx,
                task,
            },
            fire_rx,
        )
    }

    /// Replace the pending deadline with one a full period from now.
    ///
    /// Returns the generation of the new deadline.
    pub fn rearm(&self) -> u64 {
        let at = Instant::now() + self.period;
        self.replace(Some(at))
    }

    /// Drop the pending deadline without scheduling another.
    pub fn cancel(&self) -> u64 {
        self.replace(None)
    }

    /// Whether a firing belongs to the deadline that is still pending.
    pub fn is_current(&self, fired: &TimerFired) -> bool {
        let deadline = self.deadline.borrow();
        deadline.at.is_some() && deadline.generation == fired.generation
    }

    /// Whether a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.deadline.borrow().at.is_some()
    }

    /// Length of the quiet period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the timer task.
    pub fn shutdown(&self) {
        self.cancel();
        self.task.abort();
    }

    fn replace(&self, at: Option<Instant>) -> u64 {
        let mut generation = 0;
        self.deadline.send_modify(|deadline| {
            deadline.generation += 1;
            deadline.at = at;
            generation = deadline.generation;
        });
        generation
    }
}

impl Drop for InactivityTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_timer(mut deadline_rx: watch::Receiver<Deadline>, fire_tx: mpsc::Sender<TimerFired>) {
    loop {
        let deadline = *deadline_rx.borrow_and_update();

        let Some(at) = deadline.at else {
            if deadline_rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(at) => {
                let fired = TimerFired { generation: deadline.generation };
                if fire_tx.send(fired).await.is_err() {
                    return;
                }
                // One firing per generation
                if deadline_rx.changed().await.is_err() {
                    return;
                }
            }
            changed = deadline_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_period() {
        let (timer, mut fired_rx) = InactivityTimer::spawn(PERIOD);
        let generation = timer.rearm();

        tokio::time::sleep(PERIOD - Duration::from_secs(1)).await;
        assert!(fired_rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let fired = fired_rx.recv().await.unwrap();
        assert_eq!(fired.generation, generation);
        assert!(timer.is_current(&fired));

        tokio::time::sleep(PERIOD * 3).await;
        assert!(fired_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_postpones() {
        let (timer, mut fired_rx) = InactivityTimer::spawn(PERIOD);
        timer.rearm();

        tokio::time::sleep(PERIOD - Duration::from_secs(1)).await;
        let second = timer.rearm();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired_rx.try_recv().is_err());

        tokio::time::sleep(PERIOD).await;
        let fired = fired_rx.recv().await.unwrap();
        assert_eq!(fired.generation, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let (timer, mut fired_rx) = InactivityTimer::spawn(PERIOD);
        timer.rearm();
        timer.cancel();
        assert!(!timer.is_armed());

        tokio::time::sleep(PERIOD * 2).await;
        assert!(fired_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_firing_detected() {
        let (timer, _fired_rx) = InactivityTimer::spawn(PERIOD);
        let first = timer.rearm();
        let stale = TimerFired { generation: first };
        timer.rearm();

        assert!(!timer.is_current(&stale));
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_disarmed() {
        let (timer, mut fired_rx) = InactivityTimer::spawn(PERIOD);
        assert!(!timer.is_armed());

        tokio::time::sleep(PERIOD * 2).await;
        assert!(fired_rx.try_recv().is_err());
    }
}
