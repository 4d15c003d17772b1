//! Controller module - Playback coordination
//!
//! This module contains the coordinator that keeps one playback screen in sync
//! with the remote player: it owns the bind/unbind lifecycle of every
//! observable the screen depends on, and reconciles pushed and pulled
//! snapshots with the local playback clock.
//! It is organized into submodules by responsibility:
//!
//! - `input`: Line command parsing
//! - `playback`: Playback control methods
//! - `player_events`: Push subscription listener

mod input;
mod playback;
mod player_events;

pub use input::InputCommand;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

use crate::config::Config;
use tokio::sync::mpsc;

use crate::model::{
    ArtworkCache, ArtworkImage, Catalog, Cell, ClockReading, LibraryStatusCache, MainExecutor,
    PlaybackClock, PlaybackSnapshot, PlayerCommand, RemotePlayer, RepeatState, RequestOutcome,
    Subscription, TrackRef,
};
use crate::view::PlaybackPresenter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PlaybackSettings {
    pub shuffle: bool,
    pub repeat: RepeatState,
}

pub(crate) struct CoordinatorInner {
    pub(crate) player: Arc<dyn RemotePlayer>,
    pub(crate) presenter: Arc<dyn PlaybackPresenter>,
    pub(crate) executor: MainExecutor,
    pub(crate) library: LibraryStatusCache,
    pub(crate) artwork: ArtworkCache,
    pub(crate) clock: PlaybackClock,
    pub(crate) snapshot: Cell<PlaybackSnapshot>,
    pub(crate) artwork_image: Cell<ArtworkImage>,
    /// Track the clock last switched to; stale results are checked against it
    pub(crate) current_track: Mutex<Option<TrackRef>>,
    pub(crate) settings: Mutex<Option<PlaybackSettings>>,
    /// Library status last handed to the presenter
    pub(crate) shown_status: Mutex<Option<(String, bool)>>,
    pub(crate) subscription: Mutex<Option<Subscription>>,
    /// Feeds the task that sends commands to the remote player one at a time
    pub(crate) commands: Mutex<Option<mpsc::UnboundedSender<PlayerCommand>>>,
    /// Pushes applied so far; a pull issued before the latest push is stale
    pub(crate) pushes: AtomicU64,
}

/// Keeps one playback screen in sync with the remote player.
///
/// Cheap to clone; all clones drive the same screen. Every method is meant to
/// be called on the main loop.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    pub(crate) inner: Arc<CoordinatorInner>,
}

impl PlaybackCoordinator {
    pub fn new(
        executor: &MainExecutor,
        player: Arc<dyn RemotePlayer>,
        catalog: Arc<dyn Catalog>,
        presenter: Arc<dyn PlaybackPresenter>,
        config: &Config,
    ) -> Self {
        let library = LibraryStatusCache::new(executor, catalog.clone());
        let artwork = ArtworkCache::new(executor, catalog);
        Self::with_caches(executor, player, library, artwork, presenter, config)
    }

    /// Build a coordinator over caches shared with other screens.
    ///
    /// Each coordinator listens through its own view of the caches, so
    /// binding or unbinding one screen never affects another.
    pub fn with_caches(
        executor: &MainExecutor,
        player: Arc<dyn RemotePlayer>,
        library: LibraryStatusCache,
        artwork: ArtworkCache,
        presenter: Arc<dyn PlaybackPresenter>,
        config: &Config,
    ) -> Self {
        let inner = Arc::new(CoordinatorInner {
            player,
            presenter,
            executor: executor.clone(),
            library: library.view(),
            artwork: artwork.view(),
            clock: PlaybackClock::new(executor, config.tick_period),
            snapshot: Cell::new(executor),
            artwork_image: Cell::new(executor),
            current_track: Mutex::new(None),
            settings: Mutex::new(None),
            shown_status: Mutex::new(None),
            subscription: Mutex::new(None),
            commands: Mutex::new(None),
            pushes: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&inner);
        inner.clock.on_track_change(move |track| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_track_change(track);
            }
        });

        Self { inner }
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.inner.clock
    }

    pub fn library(&self) -> &LibraryStatusCache {
        &self.inner.library
    }

    pub fn snapshot(&self) -> Option<PlaybackSnapshot> {
        self.inner.snapshot.get()
    }

    pub fn artwork(&self) -> Option<ArtworkImage> {
        self.inner.artwork_image.get()
    }

    /// Whether the push subscription is open and still delivering.
    pub fn is_active(&self) -> bool {
        self.inner
            .subscription
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Start observing: bind every listener, pull the current state once and
    /// open the push subscription. Calling it again while active does nothing;
    /// calling it after the push channel failed or ended opens a new one.
    pub fn activate(&self) {
        {
            let mut subscription = self.inner.subscription.lock();
            match subscription.as_ref() {
                Some(current) if current.is_active() => {
                    tracing::debug!("Coordinator already active");
                    return;
                }
                Some(_) => tracing::info!("Push subscription ended, reopening"),
                None => tracing::info!("Activating playback coordinator"),
            }
            *subscription = Some(self.start_player_event_listener());
        }

        self.bind_listeners();
        self.pull_snapshot();
    }

    /// Stop observing and release the subscription. Values already cached
    /// stay, so a later `activate` starts from them.
    pub fn deactivate(&self) {
        let Some(mut subscription) = self.inner.subscription.lock().take() else {
            return;
        };
        tracing::info!("Deactivating playback coordinator");
        subscription.cancel();

        self.inner.snapshot.unbind();
        self.inner.artwork_image.unbind();
        self.inner.clock.positions().unbind();
        self.inner.library.unbind();
        self.inner.artwork.store().unbind();
        self.inner.clock.stop();

        // Forget what was shown so the next activation renders it again
        *self.inner.settings.lock() = None;
        *self.inner.shown_status.lock() = None;
    }

    fn bind_listeners(&self) {
        let inner = &self.inner;

        inner.clock.positions().bind(weak_listener(inner, |inner, reading: Option<ClockReading>| {
            if let Some(reading) = reading {
                inner.presenter.render_position(&reading);
            }
        }));

        inner.artwork_image.bind(weak_listener(inner, |inner, image: Option<ArtworkImage>| {
            inner.presenter.render_artwork(image.as_ref());
        }));

        inner.library.bind(weak_listener(inner, |inner, statuses: Arc<HashMap<String, bool>>| {
            inner.on_library_update(&statuses);
        }));

        inner.artwork.store().bind(weak_listener(
            inner,
            |inner, images: Arc<HashMap<String, ArtworkImage>>| inner.on_artwork_update(&images),
        ));

        // Last, so the replayed snapshot finds everything else bound
        inner.snapshot.bind(weak_listener(inner, |inner, snapshot: Option<PlaybackSnapshot>| {
            if let Some(snapshot) = snapshot {
                inner.handle_snapshot(&snapshot);
            }
        }));
    }

    fn pull_snapshot(&self) {
        let inner = &self.inner;
        let pushes_at_pull = inner.pushes.load(Ordering::SeqCst);
        let player = inner.player.clone();
        let weak = Arc::downgrade(inner);

        tracing::debug!("Pulling current playback state");
        inner.executor.spawn_then(
            async move {
                crate::log_api_request!("fetch_playback_snapshot", pushes_at_pull);
                let result = player.fetch_playback_snapshot().await;
                crate::log_api_result!("fetch_playback_snapshot", result);
                result
            },
            move |result| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.subscription.lock().is_none() {
                    tracing::debug!("Coordinator inactive, dropping pulled snapshot");
                    return;
                }
                if inner.pushes.load(Ordering::SeqCst) != pushes_at_pull {
                    tracing::debug!("Pushed snapshot arrived first, dropping pulled snapshot");
                    return;
                }
                match result {
                    Ok(Some(snapshot)) => inner.snapshot.set(snapshot),
                    Ok(None) => tracing::debug!("Nothing playing on the remote player"),
                    Err(_) => {}
                }
            },
        );
    }
}

impl CoordinatorInner {
    fn handle_snapshot(&self, snapshot: &PlaybackSnapshot) {
        tracing::trace!(
            track_id = %snapshot.track.id,
            is_paused = snapshot.is_paused,
            position_ms = snapshot.position_ms,
            "Applying snapshot"
        );
        self.clock.on_snapshot(snapshot);

        let settings = PlaybackSettings {
            shuffle: snapshot.shuffle,
            repeat: snapshot.repeat,
        };
        self.apply_settings(settings);
        self.presenter.render_snapshot(snapshot);
    }

    pub(crate) fn apply_settings(&self, settings: PlaybackSettings) {
        let changed = {
            let mut current = self.settings.lock();
            let changed = *current != Some(settings);
            *current = Some(settings);
            changed
        };
        if changed {
            self.presenter.render_settings(settings.shuffle, settings.repeat);
        }
    }

    fn handle_track_change(&self, track: &TrackRef) {
        *self.current_track.lock() = Some(track.clone());

        // Old artwork must not linger on the new track
        self.artwork_image.clear();
        if let RequestOutcome::Cached(image) = self.artwork.request(track) {
            self.artwork_image.set(image);
        }

        if let RequestOutcome::Cached(favorite) = self.library.observe(&track.id) {
            self.show_library_status(&track.id, favorite);
        }
    }

    fn on_library_update(&self, statuses: &HashMap<String, bool>) {
        let Some(track_id) = self.current_track_id() else {
            return;
        };

        match statuses.get(&track_id) {
            Some(&favorite) => self.show_library_status(&track_id, favorite),
            // Invalidated after a change; look it up again
            None if !self.library.is_in_flight(&track_id) => {
                self.library.observe(&track_id);
            }
            None => {}
        }
    }

    fn on_artwork_update(&self, images: &HashMap<String, ArtworkImage>) {
        let Some(key) = self
            .current_track
            .lock()
            .as_ref()
            .map(|track| track.artwork_key().to_string())
        else {
            return;
        };

        // Results for tracks we already moved past are ignored
        let Some(image) = images.get(&key) else {
            return;
        };
        if self.artwork_image.get().as_ref() != Some(image) {
            self.artwork_image.set(image.clone());
        }
    }

    pub(crate) fn show_library_status(&self, track_id: &str, favorite: bool) {
        {
            let mut shown = self.shown_status.lock();
            if shown.as_ref().is_some_and(|(id, status)| id == track_id && *status == favorite) {
                return;
            }
            *shown = Some((track_id.to_string(), favorite));
        }
        self.presenter.render_library_status(track_id, favorite);
    }

    pub(crate) fn current_track_id(&self) -> Option<String> {
        self.current_track.lock().as_ref().map(|track| track.id.clone())
    }
}

/// Wrap a handler so the listener does not keep the coordinator alive.
fn weak_listener<T, F>(inner: &Arc<CoordinatorInner>, handler: F) -> impl Fn(T) + Send + Sync + 'static
where
    F: Fn(&CoordinatorInner, T) + Send + Sync + 'static,
{
    let weak = Arc::downgrade(inner);
    move |value| {
        if let Some(inner) = weak.upgrade() {
            handler(&inner, value);
        }
    }
}
