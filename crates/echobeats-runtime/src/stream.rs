//! Snapshot subscription
//!
//! A bounded broadcast per scheduler. A subscriber that falls behind skips
//! straight to the newest retained snapshot and learns how many it missed.

use echobeats_core::ReconciledSnapshot;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// One snapshot handed to a subscriber
#[derive(Clone, Debug)]
pub struct Delivery {
    pub snapshot: Arc<ReconciledSnapshot>,
    /// Snapshots skipped since the previous delivery
    pub dropped: u64,
}

pub struct SnapshotStream {
    rx: broadcast::Receiver<Arc<ReconciledSnapshot>>,
}

impl SnapshotStream {
    pub(crate) fn new(rx: broadcast::Receiver<Arc<ReconciledSnapshot>>) -> Self {
        Self { rx }
    }

    /// Next snapshot in step order. `None` once the scheduler has stopped
    /// and everything buffered has been delivered.
    pub async fn recv(&mut self) -> Option<Delivery> {
        let mut dropped = 0;
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(Delivery { snapshot, dropped }),
                Err(RecvError::Lagged(n)) => {
                    dropped += n;
                    if let Some(delivery) = self.skip_to_latest(dropped) {
                        return Some(delivery);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Drain everything buffered, keeping only the newest snapshot.
    fn skip_to_latest(&mut self, mut dropped: u64) -> Option<Delivery> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => {
                    if latest.is_some() {
                        dropped += 1;
                    }
                    latest = Some(snapshot);
                }
                Err(TryRecvError::Lagged(n)) => dropped += n,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        latest.map(|snapshot| Delivery { snapshot, dropped })
    }

    /// Collect up to `n` deliveries, stopping early if the stream closes.
    pub async fn take(&mut self, n: usize) -> Vec<Delivery> {
        let mut out = Vec::new();
        while out.len() < n {
            match self.recv().await {
                Some(delivery) => out.push(delivery),
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echobeats_core::Step;
    use crate::integrator::GlobalIntegrator;

    fn snapshot(step: u64) -> Arc<ReconciledSnapshot> {
        let step = Step(step);
        let events = std::array::from_fn(|i| {
            Some(echobeats_core::Event::noop(echobeats_core::LaneId::ALL[i], step))
        });
        Arc::new(GlobalIntegrator::reconcile(step, events))
    }

    #[tokio::test]
    async fn in_order_delivery_reports_no_drops() {
        let (tx, rx) = broadcast::channel(8);
        let mut stream = SnapshotStream::new(rx);
        for s in 0..3 {
            tx.send(snapshot(s)).unwrap();
        }
        drop(tx);
        let steps: Vec<(u64, u64)> = stream
            .take(10)
            .await
            .into_iter()
            .map(|d| (d.snapshot.step.value(), d.dropped))
            .collect();
        assert_eq!(steps, vec![(0, 0), (1, 0), (2, 0)]);
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_latest_with_drop_count() {
        let (tx, rx) = broadcast::channel(4);
        let mut stream = SnapshotStream::new(rx);
        for s in 0..10 {
            tx.send(snapshot(s)).unwrap();
        }
        let delivery = stream.recv().await.unwrap();
        assert_eq!(delivery.snapshot.step, Step(9));
        assert_eq!(delivery.dropped, 9);
    }
}
