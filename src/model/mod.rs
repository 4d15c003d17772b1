//! Model module - Reactive state and playback reconciliation
//!
//! This module contains the state containers and the logic that keeps local
//! playback state consistent with the remote player.
//! It is organized into submodules by responsibility:
//!
//! - `executor`: The main loop all state changes are serialized onto
//! - `observable`: Single-value and keyed-map observable containers
//! - `coalescer`: Fetch-if-absent cache that suppresses duplicate fetches
//! - `cache`: Library status and artwork caches
//! - `playback`: Snapshot types and the interpolating playback clock
//! - `types`: Core type definitions (repeat mode, player commands)
//! - `services`: Remote player and catalog service boundaries
//! - `spotify_client`: Spotify Web API implementation of the services

mod executor;
mod observable;
mod coalescer;
mod cache;
mod playback;
mod types;
mod services;
mod spotify_client;

#[cfg(test)]
pub(crate) mod testing;

// Re-export all public types for convenient access
pub use executor::{MainExecutor, MainLoop};

pub use observable::{Cell, KeyedStore};

pub use coalescer::{RequestCoalescer, RequestOutcome};

pub use cache::{ArtworkCache, LibraryStatusCache};

pub use playback::{
    ArtworkImage, ClockReading, ClockState, PlaybackClock, PlaybackSnapshot, TrackRef,
};

pub use types::{PlayerCommand, RepeatState};

pub use services::{Catalog, RemotePlayer, SnapshotStream, Subscription};

pub use spotify_client::SpotifyClient;
