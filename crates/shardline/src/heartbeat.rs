//! Heartbeat watchdog.
//!
//! One watchdog runs per connection attempt, started once hello has told us
//! the interval. Every tick it checks that the previous heartbeat was
//! acknowledged and sends the next one; a missed acknowledgement closes the
//! connection.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ShardError;

/// What the watchdog drives on each tick.
pub(crate) trait Pulse: Send + Sync + 'static {
    /// Send one heartbeat.
    fn beat(&self) -> impl Future<Output = Result<(), ShardError>> + Send;

    /// Close the connection because a heartbeat went unanswered.
    fn flatline(&self) -> impl Future<Output = ()> + Send;
}

/// Spawn the watchdog.
///
/// `acks` carries heartbeat acknowledgements from the read loop. The task
/// ends when `stop` is cancelled, when a heartbeat goes unacknowledged, or
/// when a heartbeat cannot be sent.
pub(crate) fn spawn_watchdog<P: Pulse>(
    pulse: P,
    interval: Duration,
    acks: mpsc::Receiver<()>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_watchdog(pulse, interval, acks, stop))
}

async fn run_watchdog<P: Pulse>(
    pulse: P,
    interval: Duration,
    mut acks: mpsc::Receiver<()>,
    stop: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut acknowledged = true;

    info!(interval_ms = interval.as_millis() as u64, "starting heartbeat");
    loop {
        tokio::select! {
            biased;

            () = stop.cancelled() => {
                debug!("heartbeat stopped");
                return;
            }

            Some(()) = acks.recv() => {
                acknowledged = true;
            }

            _ = ticker.tick() => {
                if !acknowledged {
                    warn!("previous heartbeat was not acknowledged");
                    pulse.flatline().await;
                    return;
                }

                if let Err(e) = pulse.beat().await {
                    error!(error = %e, "error sending automatic heartbeat");
                    return;
                }
                acknowledged = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Clone, Default)]
    struct Recorder {
        beats: Arc<AtomicU32>,
        flatlined: Arc<AtomicBool>,
        fail_beats: bool,
        /// Plays the gateway: acknowledges every beat.
        acks: Option<mpsc::Sender<()>>,
    }

    impl Pulse for Recorder {
        async fn beat(&self) -> Result<(), ShardError> {
            if self.fail_beats {
                return Err(ShardError::NotConnected);
            }
            self.beats.fetch_add(1, Ordering::SeqCst);
            if let Some(acks) = &self.acks {
                let _ = acks.try_send(());
            }
            Ok(())
        }

        async fn flatline(&self) {
            self.flatlined.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn acknowledged_heartbeats_keep_running() {
        let (ack_tx, ack_rx) = mpsc::channel(1);
        let pulse = Recorder {
            acks: Some(ack_tx),
            ..Recorder::default()
        };
        let stop = CancellationToken::new();

        let handle = spawn_watchdog(pulse.clone(), Duration::from_millis(10), ack_rx, stop.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(pulse.beats.load(Ordering::SeqCst) >= 3);
        assert!(!pulse.flatlined.load(Ordering::SeqCst));

        stop.cancel();
        handle.await.expect("watchdog task");
    }

    #[tokio::test]
    async fn missing_ack_flatlines_before_next_beat() {
        let pulse = Recorder::default();
        let (_ack_tx, ack_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        let handle = spawn_watchdog(pulse.clone(), Duration::from_millis(10), ack_rx, stop);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watchdog should exit on its own")
            .expect("watchdog task");

        assert_eq!(pulse.beats.load(Ordering::SeqCst), 1);
        assert!(pulse.flatlined.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_ends_task_without_action() {
        let pulse = Recorder::default();
        let (_ack_tx, ack_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        let handle = spawn_watchdog(pulse.clone(), Duration::from_secs(60), ack_rx, stop.clone());
        stop.cancel();

        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("watchdog should stop promptly")
            .expect("watchdog task");

        assert_eq!(pulse.beats.load(Ordering::SeqCst), 0);
        assert!(!pulse.flatlined.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_beat_ends_task() {
        let pulse = Recorder {
            fail_beats: true,
            ..Recorder::default()
        };
        let (_ack_tx, ack_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        let handle = spawn_watchdog(pulse.clone(), Duration::from_millis(10), ack_rx, stop);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watchdog should exit on its own")
            .expect("watchdog task");

        assert!(!pulse.flatlined.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn extra_acks_are_absorbed() {
        let pulse = Recorder::default();
        let (ack_tx, ack_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        // Acks before any heartbeat was sent just leave the flag set.
        let _ = ack_tx.try_send(());
        let _ = ack_tx.try_send(());

        let handle = spawn_watchdog(pulse.clone(), Duration::from_millis(40), ack_rx, stop.clone());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(pulse.beats.load(Ordering::SeqCst), 1);
        assert!(!pulse.flatlined.load(Ordering::SeqCst));

        stop.cancel();
        handle.await.expect("watchdog task");
    }
}
