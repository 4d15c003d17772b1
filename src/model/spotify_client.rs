//! Spotify Web API implementation of the remote player and catalog services

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use rspotify::{
    model::{CurrentPlaybackContext, PlayableItem, TrackId},
    prelude::*,
    AuthCodeSpotify, Config, Token,
};
use tokio::time::MissedTickBehavior;

use super::playback::{ArtworkImage, PlaybackSnapshot, TrackRef};
use super::services::{Catalog, RemotePlayer, SnapshotStream};
use super::types::{PlayerCommand, RepeatState};

/// Position drift beyond which a polled snapshot counts as an external seek
const SEEK_DETECTION_THRESHOLD_MS: i64 = 2000;

/// Spotify API client driving whichever device is active
#[derive(Clone)]
pub struct SpotifyClient {
    client: Arc<AuthCodeSpotify>,
    preferred_device: Option<String>,
    poll_interval: Duration,
}

impl SpotifyClient {
    pub async fn from_token(
        token: Token,
        preferred_device: Option<String>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let spotify = AuthCodeSpotify::with_config(
            Default::default(),
            Default::default(),
            Config {
                token_cached: false,
                token_refreshing: false,
                ..Default::default()
            },
        );

        *spotify
            .token
            .lock()
            .await
            .map_err(|_| anyhow::anyhow!("token lock poisoned"))? = Some(token);
        tracing::debug!("rspotify token set");

        Ok(Self {
            client: Arc::new(spotify),
            preferred_device,
            poll_interval,
        })
    }

    /// Check the token by asking who we are.
    pub async fn verify(&self) -> Result<String> {
        let user = self.client.me().await?;
        tracing::info!(user_id = %user.id, "rspotify authorized successfully");
        Ok(user.id.to_string())
    }

    async fn get_device_id(&self) -> Option<String> {
        if let Ok(devices) = self.client.device().await {
            // First, try to find the active device
            if let Some(device) = devices.iter().find(|d| d.is_active) {
                tracing::trace!(device_name = %device.name, device_id = ?device.id, "Found active device");
                return device.id.clone();
            }

            // No active device - fall back to the configured one
            if let Some(name) = &self.preferred_device {
                if let Some(device) = devices.iter().find(|d| &d.name == name) {
                    tracing::debug!(device_name = %device.name, device_id = ?device.id, "No active device, using preferred device");
                    return device.id.clone();
                }
            }

            tracing::debug!(available_devices = devices.len(), "No active device found");
            None
        } else {
            tracing::debug!("Failed to get devices list");
            None
        }
    }
}

fn track_ref_from_playback(playback: &CurrentPlaybackContext) -> Option<TrackRef> {
    match playback.item.as_ref()? {
        PlayableItem::Track(track) => Some(TrackRef {
            id: track.id.as_ref().map(|id| id.id().to_string()).unwrap_or_default(),
            name: track.name.clone(),
            artist: track
                .artists
                .first()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            album: track.album.name.clone(),
            duration_ms: track.duration.num_milliseconds() as u32,
            image_id: track
                .album
                .id
                .as_ref()
                .map(|id| id.id().to_string())
                .unwrap_or_default(),
        }),
        PlayableItem::Episode(episode) => Some(TrackRef {
            id: episode.id.id().to_string(),
            name: episode.name.clone(),
            artist: episode.show.name.clone(),
            album: "Podcast".to_string(),
            duration_ms: episode.duration.num_milliseconds() as u32,
            image_id: episode.show.id.id().to_string(),
        }),
        PlayableItem::Unknown(_) => None,
    }
}

fn snapshot_from_playback(playback: &CurrentPlaybackContext) -> Option<PlaybackSnapshot> {
    let track = track_ref_from_playback(playback)?;
    if track.id.is_empty() {
        return None;
    }

    Some(PlaybackSnapshot {
        track,
        is_paused: !playback.is_playing,
        position_ms: playback
            .progress
            .map(|d| d.num_milliseconds() as u32)
            .unwrap_or(0),
        shuffle: playback.shuffle_state,
        repeat: match playback.repeat_state {
            rspotify::model::RepeatState::Off => RepeatState::Off,
            rspotify::model::RepeatState::Track => RepeatState::One,
            rspotify::model::RepeatState::Context => RepeatState::All,
        },
    })
}

/// Whether a polled snapshot tells the subscriber anything new.
///
/// Polling sees the same state over and over; only changes count, plus
/// position jumps that the local clock could not have predicted. The clock
/// does not take its position from snapshots, so a forwarded jump only
/// restarts a ticker that stopped at the end of a track (repeat-one replays
/// the same track id). It does not move the displayed position.
fn is_news(previous: Option<&PlaybackSnapshot>, current: &PlaybackSnapshot, poll_interval: Duration) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    if previous.track.id != current.track.id
        || previous.is_paused != current.is_paused
        || previous.shuffle != current.shuffle
        || previous.repeat != current.repeat
    {
        return true;
    }

    let expected = if current.is_paused {
        previous.position_ms as i64
    } else {
        previous.position_ms as i64 + poll_interval.as_millis() as i64
    };
    (current.position_ms as i64 - expected).abs() > SEEK_DETECTION_THRESHOLD_MS
}

#[async_trait]
impl RemotePlayer for SpotifyClient {
    async fn fetch_playback_snapshot(&self) -> Result<Option<PlaybackSnapshot>> {
        tracing::trace!("Fetching current playback state");
        let result = self.client.current_playback(None, None::<Vec<_>>).await?;
        if let Some(ref playback) = result {
            tracing::trace!(
                is_playing = playback.is_playing,
                device = ?playback.device.name,
                "Got playback state"
            );
        }
        Ok(result.as_ref().and_then(snapshot_from_playback))
    }

    async fn subscribe_playback_snapshot(&self) -> Result<SnapshotStream> {
        // The Web API has no push channel; poll and forward what changed.
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let poll_interval = self.poll_interval;
        let client = self.clone();
        tracing::debug!(poll_ms = poll_interval.as_millis() as u64, "Starting playback polling");

        let stream = futures::stream::unfold(
            (client, None::<PlaybackSnapshot>, ticker),
            move |(client, mut last, mut ticker)| async move {
                loop {
                    ticker.tick().await;
                    match client.fetch_playback_snapshot().await {
                        Ok(Some(snapshot)) => {
                            let news = is_news(last.as_ref(), &snapshot, poll_interval);
                            last = Some(snapshot.clone());
                            if news {
                                return Some((snapshot, (client, last, ticker)));
                            }
                        }
                        Ok(None) => last = None,
                        Err(e) => tracing::warn!(error = %e, "Polling playback state failed"),
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn send_command(&self, command: PlayerCommand) -> Result<()> {
        let device_id = self.get_device_id().await;
        tracing::debug!(command = %command, device_id = ?device_id, "API: send_command");
        let device = device_id.as_deref();

        match command {
            PlayerCommand::Play => self.client.resume_playback(device, None).await?,
            PlayerCommand::Pause => self.client.pause_playback(device).await?,
            PlayerCommand::Seek { seconds } => {
                let position = chrono::Duration::seconds(i64::from(seconds));
                self.client.seek_track(position, device).await?
            }
            PlayerCommand::Next => self.client.next_track(device).await?,
            PlayerCommand::Previous => self.client.previous_track(device).await?,
            PlayerCommand::Shuffle(state) => self.client.shuffle(state, device).await?,
            PlayerCommand::Repeat(state) => {
                let repeat_state = match state {
                    RepeatState::Off => rspotify::model::RepeatState::Off,
                    RepeatState::All => rspotify::model::RepeatState::Context,
                    RepeatState::One => rspotify::model::RepeatState::Track,
                };
                self.client.repeat(repeat_state, device).await?
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for SpotifyClient {
    async fn fetch_artwork(&self, track: &TrackRef) -> Result<Option<ArtworkImage>> {
        let id = TrackId::from_id(track.id.as_str())?;
        let full = self.client.track(id, None).await?;

        // Spotify lists the largest image first
        Ok(full.album.images.into_iter().next().map(|image| ArtworkImage {
            url: image.url,
            width: image.width,
            height: image.height,
        }))
    }

    async fn fetch_library_status(&self, track_id: &str) -> Result<bool> {
        if track_id.is_empty() {
            return Err(anyhow::anyhow!("Track ID is empty"));
        }
        let id = TrackId::from_id(track_id)?;
        let contains = self.client.current_user_saved_tracks_contains([id]).await?;
        Ok(contains.first().copied().unwrap_or(false))
    }

    async fn add_to_library(&self, track_id: &str) -> Result<()> {
        if track_id.is_empty() {
            return Err(anyhow::anyhow!("Track ID is empty"));
        }

        tracing::debug!(track_id, "Adding track to liked songs");
        let id = TrackId::from_id(track_id)?;
        self.client.current_user_saved_tracks_add([id]).await?;
        tracing::info!(track_id, "Added track to liked songs");
        Ok(())
    }

    async fn remove_from_library(&self, track_id: &str) -> Result<()> {
        if track_id.is_empty() {
            return Err(anyhow::anyhow!("Track ID is empty"));
        }

        tracing::debug!(track_id, "Removing track from liked songs");
        let id = TrackId::from_id(track_id)?;
        self.client.current_user_saved_tracks_delete([id]).await?;
        tracing::info!(track_id, "Removed track from liked songs");
        Ok(())
    }
}
