//! Per-track caches backed by the catalog service

use std::collections::HashMap;
use std::sync::Arc;

use super::coalescer::{RequestCoalescer, RequestOutcome};
use super::executor::MainExecutor;
use super::observable::KeyedStore;
use super::playback::{ArtworkImage, TrackRef};
use super::services::Catalog;

/// Favorite status per track id.
///
/// Adding or removing a track invalidates its entry right away instead of
/// trusting a cached answer from before the change. The mutation itself is
/// fire-and-forget and may not have reached the service yet.
#[derive(Clone)]
pub struct LibraryStatusCache {
    statuses: RequestCoalescer<String, bool>,
    catalog: Arc<dyn Catalog>,
}

impl LibraryStatusCache {
    pub fn new(executor: &MainExecutor, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            statuses: RequestCoalescer::new(executor),
            catalog,
        }
    }

    /// Share fetches and answers with this cache but keep a separate listener.
    pub fn view(&self) -> Self {
        Self {
            statuses: self.statuses.view(),
            catalog: self.catalog.clone(),
        }
    }

    /// Make sure a status for `track_id` is cached or on its way.
    pub fn observe(&self, track_id: &str) -> RequestOutcome<bool> {
        let catalog = self.catalog.clone();
        let id = track_id.to_string();
        self.statuses.request(track_id.to_string(), move || async move {
            crate::log_api_request!("fetch_library_status", track_id = %id);
            let result = catalog.fetch_library_status(&id).await;
            crate::log_api_result!("fetch_library_status", result);
            result
        })
    }

    pub fn status(&self, track_id: &str) -> Option<bool> {
        self.statuses.get(&track_id.to_string())
    }

    pub fn is_in_flight(&self, track_id: &str) -> bool {
        self.statuses.is_in_flight(&track_id.to_string())
    }

    pub fn add(&self, track_id: &str) {
        tracing::debug!(track_id, "Adding track to library");
        let catalog = self.catalog.clone();
        let id = track_id.to_string();
        tokio::spawn(async move {
            let result = catalog.add_to_library(&id).await;
            crate::log_api_result!("add_to_library", result);
        });
        self.statuses.invalidate(&track_id.to_string());
    }

    pub fn remove(&self, track_id: &str) {
        tracing::debug!(track_id, "Removing track from library");
        let catalog = self.catalog.clone();
        let id = track_id.to_string();
        tokio::spawn(async move {
            let result = catalog.remove_from_library(&id).await;
            crate::log_api_result!("remove_from_library", result);
        });
        self.statuses.invalidate(&track_id.to_string());
    }

    /// Flip the favorite status based on the last known answer.
    ///
    /// Returns the status the track is expected to have afterwards, or `None`
    /// when nothing is known yet (a lookup is started instead).
    pub fn toggle(&self, track_id: &str) -> Option<bool> {
        match self.status(track_id) {
            Some(true) => {
                self.remove(track_id);
                Some(false)
            }
            Some(false) => {
                self.add(track_id);
                Some(true)
            }
            None => {
                tracing::debug!(track_id, "Favorite status unknown, looking it up before toggling");
                self.observe(track_id);
                None
            }
        }
    }

    pub fn bind<F>(&self, listener: F)
    where
        F: Fn(Arc<HashMap<String, bool>>) + Send + Sync + 'static,
    {
        self.statuses.store().bind(listener);
    }

    pub fn unbind(&self) {
        self.statuses.store().unbind();
    }
}

/// Artwork per image identifier; tracks of one album share an entry
#[derive(Clone)]
pub struct ArtworkCache {
    images: RequestCoalescer<String, ArtworkImage>,
    catalog: Arc<dyn Catalog>,
}

impl ArtworkCache {
    pub fn new(executor: &MainExecutor, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            images: RequestCoalescer::new(executor),
            catalog,
        }
    }

    pub fn view(&self) -> Self {
        Self {
            images: self.images.view(),
            catalog: self.catalog.clone(),
        }
    }

    pub fn request(&self, track: &TrackRef) -> RequestOutcome<ArtworkImage> {
        let catalog = self.catalog.clone();
        let track = track.clone();
        let key = track.artwork_key().to_string();
        self.images.request(key, move || async move {
            crate::log_api_request!("fetch_artwork", track_id = %track.id);
            let result = catalog.fetch_artwork(&track).await;
            crate::log_api_result!("fetch_artwork", result);
            match result {
                Ok(Some(image)) => Ok(image),
                // A missing image is retried on the next request, like any other miss.
                Ok(None) => Err(anyhow::anyhow!("no artwork for track {}", track.id)),
                Err(e) => Err(e),
            }
        })
    }

    pub fn get(&self, key: &str) -> Option<ArtworkImage> {
        self.images.get(&key.to_string())
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.images.is_in_flight(&key.to_string())
    }

    pub fn store(&self) -> &KeyedStore<String, ArtworkImage> {
        self.images.store()
    }
}
