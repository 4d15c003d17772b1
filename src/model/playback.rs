//! Playback snapshot types and the locally interpolated playback clock

use std::sync::{Arc, Weak};
use std::time::Duration;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::executor::MainExecutor;
use super::observable::Cell;
use super::types::RepeatState;

/// The track a snapshot refers to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackRef {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u32,
    /// Stable identifier of the track's artwork, shared by tracks of one album
    pub image_id: String,
}

impl TrackRef {
    /// Key used for artwork lookups; falls back to the track id.
    pub fn artwork_key(&self) -> &str {
        if self.image_id.is_empty() {
            &self.id
        } else {
            &self.image_id
        }
    }
}

/// Authoritative remote playback state at one point in time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub track: TrackRef,
    pub is_paused: bool,
    pub position_ms: u32,
    pub shuffle: bool,
    pub repeat: RepeatState,
}

/// Resolved artwork reference; decoding is left to the presentation layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtworkImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClockState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// What the clock currently shows
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClockReading {
    pub track_id: Option<String>,
    pub elapsed_secs: u32,
    pub duration_secs: u32,
    pub state: ClockState,
}

impl ClockReading {
    pub fn progress_ratio(&self) -> f64 {
        if self.duration_secs > 0 {
            (self.elapsed_secs as f64 / self.duration_secs as f64).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

pub type TrackChangeHook = Arc<dyn Fn(&TrackRef) + Send + Sync + 'static>;

struct ClockInner {
    elapsed_secs: u32,
    duration_secs: u32,
    state: ClockState,
    last_track_id: Option<String>,
    ticker: Option<JoinHandle<()>>,
    /// Bumped on every ticker start so ticks queued by an older ticker are ignored
    generation: u64,
}

impl ClockInner {
    fn reading(&self) -> ClockReading {
        ClockReading {
            track_id: self.last_track_id.clone(),
            elapsed_secs: self.elapsed_secs,
            duration_secs: self.duration_secs,
            state: self.state,
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(task) = self.ticker.take() {
            task.abort();
            tracing::trace!(generation = self.generation, "Ticker stopped");
        }
    }
}

impl Drop for ClockInner {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

struct ClockShared {
    inner: Mutex<ClockInner>,
    executor: MainExecutor,
    positions: Cell<ClockReading>,
    tick_period: Duration,
    on_track_change: Mutex<Option<TrackChangeHook>>,
}

/// Interpolates elapsed playback time between authoritative snapshots.
///
/// The clock only ever moves through three inputs: snapshot arrival, the
/// periodic tick, and explicit local adjustments (seek and skip). Each change
/// is published as a [`ClockReading`] on [`PlaybackClock::positions`].
///
/// There is no guaranteed "track finished" push, so when the tick reaches the
/// track duration the clock stops ticking and shows zero until the next
/// snapshot arrives. This can drift from the true remote position.
#[derive(Clone)]
pub struct PlaybackClock {
    shared: Arc<ClockShared>,
}

impl PlaybackClock {
    pub fn new(executor: &MainExecutor, tick_period: Duration) -> Self {
        Self {
            shared: Arc::new(ClockShared {
                inner: Mutex::new(ClockInner {
                    elapsed_secs: 0,
                    duration_secs: 0,
                    state: ClockState::Stopped,
                    last_track_id: None,
                    ticker: None,
                    generation: 0,
                }),
                executor: executor.clone(),
                positions: Cell::with_value(executor, ClockReading::default()),
                tick_period,
                on_track_change: Mutex::new(None),
            }),
        }
    }

    /// Called with the new track whenever the known track changes.
    pub fn on_track_change<F>(&self, hook: F)
    where
        F: Fn(&TrackRef) + Send + Sync + 'static,
    {
        *self.shared.on_track_change.lock() = Some(Arc::new(hook));
    }

    pub fn positions(&self) -> &Cell<ClockReading> {
        &self.shared.positions
    }

    pub fn reading(&self) -> ClockReading {
        self.shared.inner.lock().reading()
    }

    pub fn current_track_id(&self) -> Option<String> {
        self.shared.inner.lock().last_track_id.clone()
    }

    pub fn is_ticking(&self) -> bool {
        self.shared.inner.lock().ticker.is_some()
    }

    /// Reconcile with an authoritative snapshot. Returns whether the track changed.
    pub fn on_snapshot(&self, snapshot: &PlaybackSnapshot) -> bool {
        let (track_changed, before, after) = {
            let mut inner = self.shared.inner.lock();
            let before = inner.reading();

            let track_changed = inner.last_track_id.as_deref() != Some(snapshot.track.id.as_str());
            if track_changed {
                inner.last_track_id = Some(snapshot.track.id.clone());
                inner.duration_secs = snapshot.track.duration_ms / 1000;
                inner.elapsed_secs = 0;
            }

            if snapshot.is_paused {
                inner.state = ClockState::Paused;
                inner.stop_ticker();
            } else {
                inner.state = ClockState::Playing;
                self.start_ticker(&mut inner);
            }

            (track_changed, before, inner.reading())
        };

        if before != after {
            self.shared.positions.set(after);
        }

        if track_changed {
            tracing::info!(
                track = %snapshot.track.name,
                artist = %snapshot.track.artist,
                track_id = %snapshot.track.id,
                duration_ms = snapshot.track.duration_ms,
                "Track changed"
            );
            let hook = self.shared.on_track_change.lock().clone();
            if let Some(hook) = hook {
                hook(&snapshot.track);
            }
        }

        track_changed
    }

    /// Advance by one tick. Does nothing unless the ticker is running.
    pub fn tick(&self) {
        let reading = {
            let mut inner = self.shared.inner.lock();
            if inner.ticker.is_none() || inner.state != ClockState::Playing {
                return;
            }

            inner.elapsed_secs += 1;
            if inner.elapsed_secs >= inner.duration_secs {
                tracing::debug!(
                    duration_secs = inner.duration_secs,
                    "Reached track end locally, waiting for next snapshot"
                );
                inner.stop_ticker();
                inner.elapsed_secs = 0;
            }
            inner.reading()
        };
        self.shared.positions.set(reading);
    }

    /// Move the displayed position right away, before the remote confirms.
    pub fn seek(&self, seconds: u32) {
        let reading = {
            let mut inner = self.shared.inner.lock();
            inner.elapsed_secs = if inner.duration_secs > 0 {
                seconds.min(inner.duration_secs)
            } else {
                seconds
            };
            inner.reading()
        };
        tracing::debug!(elapsed_secs = reading.elapsed_secs, "Local seek");
        self.shared.positions.set(reading);
    }

    /// Pause or resume right away, before the remote confirms. Ignored until
    /// a track is known.
    pub fn set_paused(&self, paused: bool) {
        let reading = {
            let mut inner = self.shared.inner.lock();
            if inner.last_track_id.is_none() {
                return;
            }
            if paused {
                inner.state = ClockState::Paused;
                inner.stop_ticker();
            } else {
                inner.state = ClockState::Playing;
                self.start_ticker(&mut inner);
            }
            inner.reading()
        };
        tracing::debug!(paused, "Local play state change");
        self.shared.positions.set(reading);
    }

    /// Show zero right away for next/previous, before the new snapshot lands.
    pub fn reset_position(&self) {
        let reading = {
            let mut inner = self.shared.inner.lock();
            inner.elapsed_secs = 0;
            inner.reading()
        };
        self.shared.positions.set(reading);
    }

    /// Stop ticking without touching the position.
    pub fn stop(&self) {
        self.shared.inner.lock().stop_ticker();
    }

    fn start_ticker(&self, inner: &mut ClockInner) {
        if inner.ticker.is_some() {
            return;
        }

        inner.generation += 1;
        let generation = inner.generation;
        let period = self.shared.tick_period;
        let executor = self.shared.executor.clone();
        let weak: Weak<ClockShared> = Arc::downgrade(&self.shared);

        tracing::trace!(generation, "Ticker started");
        inner.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let weak = weak.clone();
                let delivered = executor.dispatch(move || {
                    if let Some(shared) = weak.upgrade() {
                        PlaybackClock { shared }.tick_from(generation);
                    }
                });
                if !delivered {
                    break;
                }
            }
        }));
    }

    fn tick_from(&self, generation: u64) {
        if self.shared.inner.lock().generation != generation {
            tracing::trace!(generation, "Dropping tick from stopped ticker");
            return;
        }
        self.tick();
    }
}
