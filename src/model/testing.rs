//! In-memory fakes of the external services

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use futures::channel::mpsc;

use super::executor::MainLoop;
use super::playback::{ArtworkImage, PlaybackSnapshot, TrackRef};
use super::services::{Catalog, RemotePlayer, SnapshotStream};
use super::types::{PlayerCommand, RepeatState};

/// Run the main loop, letting background tasks progress, until `done` holds.
pub async fn drain_until(main_loop: &mut MainLoop, mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        main_loop.run_pending();
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

pub fn track(id: &str, duration_ms: u32) -> TrackRef {
    TrackRef {
        id: id.to_string(),
        name: format!("Track {}", id),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        duration_ms,
        image_id: format!("image-{}", id),
    }
}

pub fn snapshot(id: &str, duration_ms: u32, is_paused: bool) -> PlaybackSnapshot {
    PlaybackSnapshot {
        track: track(id, duration_ms),
        is_paused,
        position_ms: 0,
        shuffle: false,
        repeat: RepeatState::Off,
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    favorites: Mutex<HashMap<String, bool>>,
    status_fetches: AtomicUsize,
    artwork_fetches: AtomicUsize,
    failing: AtomicBool,
    no_artwork: AtomicBool,
}

impl FakeCatalog {
    pub fn set_favorite(&self, track_id: &str, favorite: bool) {
        self.favorites.lock().insert(track_id.to_string(), favorite);
    }

    pub fn is_favorite(&self, track_id: &str) -> bool {
        self.favorites.lock().get(track_id).copied().unwrap_or(false)
    }

    pub fn status_fetches(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    pub fn artwork_fetches(&self) -> usize {
        self.artwork_fetches.load(Ordering::SeqCst)
    }

    pub fn fail_requests(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn hide_artwork(&self, hidden: bool) {
        self.no_artwork.store(hidden, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("service unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn fetch_artwork(&self, track: &TrackRef) -> Result<Option<ArtworkImage>> {
        self.artwork_fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.no_artwork.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(ArtworkImage {
            url: format!("https://images.test/{}", track.artwork_key()),
            width: Some(640),
            height: Some(640),
        }))
    }

    async fn fetch_library_status(&self, track_id: &str) -> Result<bool> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.is_favorite(track_id))
    }

    async fn add_to_library(&self, track_id: &str) -> Result<()> {
        self.check()?;
        self.set_favorite(track_id, true);
        Ok(())
    }

    async fn remove_from_library(&self, track_id: &str) -> Result<()> {
        self.check()?;
        self.set_favorite(track_id, false);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePlayer {
    current: Mutex<Option<PlaybackSnapshot>>,
    commands: Mutex<Vec<PlayerCommand>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PlaybackSnapshot>>>,
    pulls: AtomicUsize,
    subscriptions: AtomicUsize,
    refusing_subscriptions: AtomicBool,
    rejecting_commands: AtomicBool,
}

impl FakePlayer {
    pub fn with_current(snapshot: PlaybackSnapshot) -> Self {
        let player = Self::default();
        *player.current.lock() = Some(snapshot);
        player
    }

    pub fn set_current(&self, snapshot: Option<PlaybackSnapshot>) {
        *self.current.lock() = snapshot;
    }

    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refusing_subscriptions.store(refuse, Ordering::SeqCst);
    }

    /// Commands are still recorded but answered with an error.
    pub fn reject_commands(&self, reject: bool) {
        self.rejecting_commands.store(reject, Ordering::SeqCst);
    }

    /// Deliver a snapshot to every open subscription.
    pub fn push(&self, snapshot: PlaybackSnapshot) {
        *self.current.lock() = Some(snapshot.clone());
        self.subscribers
            .lock()
            .retain(|tx| tx.unbounded_send(snapshot.clone()).is_ok());
    }

    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.commands.lock().clone()
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Subscriptions whose receiving side is still alive.
    pub fn open_subscriptions(&self) -> usize {
        self.subscribers.lock().iter().filter(|tx| !tx.is_closed()).count()
    }
}

#[async_trait]
impl RemotePlayer for FakePlayer {
    async fn fetch_playback_snapshot(&self) -> Result<Option<PlaybackSnapshot>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().clone())
    }

    async fn subscribe_playback_snapshot(&self) -> Result<SnapshotStream> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.refusing_subscriptions.load(Ordering::SeqCst) {
            anyhow::bail!("push channel unavailable");
        }
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.lock().push(tx);
        Ok(Box::pin(rx))
    }

    async fn send_command(&self, command: PlayerCommand) -> Result<()> {
        self.commands.lock().push(command);
        if self.rejecting_commands.load(Ordering::SeqCst) {
            anyhow::bail!("http error: status code 403 Forbidden");
        }
        Ok(())
    }
}
