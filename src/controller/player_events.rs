//! Listener for snapshots pushed by the remote player

use std::sync::atomic::Ordering;
use std::sync::Arc;
use futures::StreamExt;

use crate::model::Subscription;
use super::PlaybackCoordinator;

impl PlaybackCoordinator {
    /// Open the push channel and forward every snapshot onto the main loop.
    pub(crate) fn start_player_event_listener(&self) -> Subscription {
        let player = self.inner.player.clone();
        let executor = self.inner.executor.clone();
        let weak = Arc::downgrade(&self.inner);
        tracing::info!("Starting playback snapshot listener");

        Subscription::new(tokio::spawn(async move {
            let mut snapshots = match player.subscribe_playback_snapshot().await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to subscribe to playback snapshots");
                    return;
                }
            };

            while let Some(snapshot) = snapshots.next().await {
                tracing::trace!(
                    track_id = %snapshot.track.id,
                    is_paused = snapshot.is_paused,
                    "Snapshot pushed"
                );

                let weak = weak.clone();
                let delivered = executor.dispatch(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.pushes.fetch_add(1, Ordering::SeqCst);
                        inner.snapshot.set(snapshot);
                    }
                });
                if !delivered {
                    tracing::debug!("Snapshot listener shutting down");
                    break;
                }
            }

            tracing::debug!("Playback snapshot stream ended");
        }))
    }
}
