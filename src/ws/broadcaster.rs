//! Fan-out of dashboard frames to every connected WebSocket client.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::ingest::aggregate::DashboardSnapshot;

/// Slow consumers lag and drop frames rather than stalling ingestion.
const CHANNEL_CAPACITY: usize = 256;

/// Server-pushed frames. The `type` tag is the client's dispatch key.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardFrame {
    /// Full dashboard state after an inbound message was processed.
    DashboardUpdate { message: DashboardSnapshot },
    /// Signal that new chart data exists; carries no payload. Clients in
    /// live mode respond by requesting the window they are showing.
    PlotDataPoint,
}

/// Shared broadcast channel plus a cache of the last snapshot, so a client
/// connecting between updates still gets an immediate first paint.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<DashboardFrame>,
    latest: Arc<RwLock<Option<DashboardSnapshot>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardFrame> {
        self.tx.subscribe()
    }

    /// Cache and broadcast a fresh snapshot. Send errors mean no client is
    /// connected, which is fine.
    pub async fn publish_snapshot(&self, snapshot: DashboardSnapshot) {
        *self.latest.write().await = Some(snapshot.clone());
        let _ = self.tx.send(DashboardFrame::DashboardUpdate { message: snapshot });
    }

    /// Announce that a new live or twin sample landed.
    pub fn publish_point(&self) {
        let _ = self.tx.send(DashboardFrame::PlotDataPoint);
    }

    pub async fn latest_snapshot(&self) -> Option<DashboardSnapshot> {
        self.latest.read().await.clone()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::aggregate::{build_snapshot, AnomalyStatus};
    use crate::repo::memory::MemoryRepository;

    async fn snapshot() -> DashboardSnapshot {
        let repo = MemoryRepository::new();
        let status = AnomalyStatus {
            detected: false,
            message: "Motor operating normally.".to_owned(),
        };
        build_snapshot(&repo, status).await.unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_published_snapshots() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish_snapshot(snapshot().await).await;

        match rx.recv().await.unwrap() {
            DashboardFrame::DashboardUpdate { message } => {
                assert_eq!(message.anomaly_status.message, "Motor operating normally.");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_does_not_fail() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish_snapshot(snapshot().await).await;
        broadcaster.publish_point();
    }

    #[tokio::test]
    async fn late_subscriber_gets_the_cached_snapshot() {
        let broadcaster = Broadcaster::new();
        assert!(broadcaster.latest_snapshot().await.is_none());

        broadcaster.publish_snapshot(snapshot().await).await;

        // Subscribing after the fact misses the broadcast but not the cache.
        let cached = broadcaster.latest_snapshot().await.unwrap();
        assert!(!cached.anomaly_status.detected);
    }

    #[tokio::test]
    async fn point_frames_serialize_as_tagged_signal() {
        let json = serde_json::to_value(DashboardFrame::PlotDataPoint).unwrap();
        assert_eq!(json["type"], "plot_data_point");
    }
}
