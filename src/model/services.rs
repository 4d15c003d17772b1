//! Boundaries to the remote player and catalog services
//!
//! Both are injected into the coordinator so tests can substitute fakes.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;

use super::playback::{ArtworkImage, PlaybackSnapshot, TrackRef};
use super::types::PlayerCommand;

/// Push-delivered snapshots from the remote player
pub type SnapshotStream = BoxStream<'static, PlaybackSnapshot>;

#[async_trait]
pub trait RemotePlayer: Send + Sync {
    /// Pull the current state; `None` when nothing is playing.
    async fn fetch_playback_snapshot(&self) -> Result<Option<PlaybackSnapshot>>;

    /// Open the push channel of snapshots.
    async fn subscribe_playback_snapshot(&self) -> Result<SnapshotStream>;

    async fn send_command(&self, command: PlayerCommand) -> Result<()>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_artwork(&self, track: &TrackRef) -> Result<Option<ArtworkImage>>;

    async fn fetch_library_status(&self, track_id: &str) -> Result<bool>;

    async fn add_to_library(&self, track_id: &str) -> Result<()>;

    async fn remove_from_library(&self, track_id: &str) -> Result<()>;
}

/// An open push subscription. Cancelled when dropped.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Playback subscription cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
