//! Playback control methods
//!
//! Commands are fire-and-forget: the remote player confirms them by pushing a
//! new snapshot. Play, pause, seek, skip and favorite update local state first
//! so the screen does not show stale values during the round trip.
//!
//! Commands reach the player one at a time in the order they were issued. A
//! rejected command triggers a fresh pull so optimistic state is corrected.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::model::{ClockState, PlayerCommand, RepeatState};

use super::{PlaybackCoordinator, PlaybackSettings};

impl PlaybackCoordinator {
    pub fn play(&self) {
        self.inner.clock.set_paused(false);
        self.send_command(PlayerCommand::Play);
    }

    pub fn pause(&self) {
        self.inner.clock.set_paused(true);
        self.send_command(PlayerCommand::Pause);
    }

    pub fn toggle_playback(&self) {
        let is_playing = self.inner.clock.reading().state == ClockState::Playing;
        tracing::debug!(is_playing, "Toggling playback");
        if is_playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn seek(&self, seconds: u32) {
        self.inner.clock.seek(seconds);
        let seconds = self.inner.clock.reading().elapsed_secs;
        self.send_command(PlayerCommand::Seek { seconds });
    }

    pub fn next_track(&self) {
        tracing::debug!("Skipping to next track");
        self.inner.clock.reset_position();
        self.send_command(PlayerCommand::Next);
    }

    pub fn previous_track(&self) {
        tracing::debug!("Skipping to previous track");
        self.inner.clock.reset_position();
        self.send_command(PlayerCommand::Previous);
    }

    pub fn set_shuffle(&self, shuffle: bool) {
        let settings = self.current_settings();
        self.inner.apply_settings(PlaybackSettings { shuffle, ..settings });
        self.send_command(PlayerCommand::Shuffle(shuffle));
    }

    pub fn toggle_shuffle(&self) {
        let shuffle = !self.current_settings().shuffle;
        self.set_shuffle(shuffle);
    }

    pub fn set_repeat(&self, repeat: RepeatState) {
        let settings = self.current_settings();
        self.inner.apply_settings(PlaybackSettings { repeat, ..settings });
        self.send_command(PlayerCommand::Repeat(repeat));
    }

    pub fn cycle_repeat(&self) {
        let repeat = self.current_settings().repeat.cycle();
        self.set_repeat(repeat);
    }

    /// Flip the library status of the current track.
    ///
    /// Does nothing but start a lookup while the status is still unknown.
    pub fn toggle_favorite(&self) {
        let Some(track_id) = self.inner.current_track_id() else {
            tracing::warn!("Cannot toggle liked status: no current track");
            return;
        };
        if track_id.is_empty() {
            tracing::warn!("Cannot toggle liked status: track ID is empty");
            return;
        }

        match self.inner.library.toggle(&track_id) {
            Some(favorite) => {
                let status = if favorite { "added to" } else { "removed from" };
                tracing::info!(track_id = %track_id, status, "Track liked status toggled");
                self.inner.show_library_status(&track_id, favorite);
            }
            None => tracing::debug!(track_id = %track_id, "Liked status not known yet"),
        }
    }

    fn current_settings(&self) -> PlaybackSettings {
        self.inner.settings.lock().unwrap_or_default()
    }

    fn send_command(&self, command: PlayerCommand) {
        tracing::debug!(command = %command, "Queueing player command");
        let mut queue = self.inner.commands.lock();
        if queue.as_ref().map_or(true, |sender| sender.is_closed()) {
            *queue = Some(self.start_command_sender());
        }
        let Some(sender) = queue.as_ref() else {
            return;
        };
        if let Err(e) = sender.send(command) {
            tracing::warn!(command = %e.0, "Player command queue closed, dropping command");
        }
    }

    fn start_command_sender(&self) -> mpsc::UnboundedSender<PlayerCommand> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PlayerCommand>();
        let player = self.inner.player.clone();
        let executor = self.inner.executor.clone();
        let weak = Arc::downgrade(&self.inner);
        tracing::debug!("Starting player command sender");

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match player.send_command(command.clone()).await {
                    Ok(()) => tracing::info!(command = %command, "Player command sent"),
                    Err(e) => {
                        tracing::warn!(
                            command = %command,
                            error = %e,
                            hint = %format_error(&e),
                            "Player command failed"
                        );
                        let weak = weak.clone();
                        executor.dispatch(move || {
                            if let Some(inner) = weak.upgrade() {
                                PlaybackCoordinator { inner }.pull_snapshot();
                            }
                        });
                    }
                }
            }
            tracing::debug!("Player command sender stopped");
        });
        tx
    }
}

/// Translate common Web API failures into something a user can act on.
pub(crate) fn format_error(error: &anyhow::Error) -> String {
    let error_str = error.to_string();

    if error_str.contains("404") {
        "No active device found. Start playing on Spotify and try again.".to_string()
    } else if error_str.contains("403") {
        "Action forbidden. Check your Spotify Premium status.".to_string()
    } else if error_str.contains("401") {
        "Authentication expired. Please restart the app.".to_string()
    } else if error_str.contains("429") {
        "Rate limited. Please wait a moment.".to_string()
    } else {
        format!("Error: {}", error_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::harness;
    use crate::model::testing::{FakePlayer, drain_until, snapshot};

    #[tokio::test(start_paused = true)]
    async fn seek_moves_clock_before_command_is_confirmed() {
        let mut h = harness(FakePlayer::with_current(snapshot("A", 180_000, false)));
        h.coordinator.activate();
        let clock = h.coordinator.clock().clone();
        drain_until(&mut h.main_loop, || clock.current_track_id().is_some()).await;

        h.coordinator.seek(42);

        assert_eq!(clock.reading().elapsed_secs, 42);
        let player = h.player.clone();
        drain_until(&mut h.main_loop, || !player.commands().is_empty()).await;
        assert_eq!(h.player.commands(), vec![PlayerCommand::Seek { seconds: 42 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_past_the_end_sends_the_clamped_position() {
        let mut h = harness(FakePlayer::with_current(snapshot("A", 60_000, true)));
        h.coordinator.activate();
        let clock = h.coordinator.clock().clone();
        drain_until(&mut h.main_loop, || clock.current_track_id().is_some()).await;

        h.coordinator.seek(600);

        let player = h.player.clone();
        drain_until(&mut h.main_loop, || !player.commands().is_empty()).await;
        assert_eq!(h.player.commands(), vec![PlayerCommand::Seek { seconds: 60 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_resets_position_right_away() {
        let mut h = harness(FakePlayer::with_current(snapshot("A", 180_000, false)));
        h.coordinator.activate();
        let clock = h.coordinator.clock().clone();
        drain_until(&mut h.main_loop, || clock.current_track_id().is_some()).await;
        h.coordinator.seek(90);

        h.coordinator.next_track();
        assert_eq!(clock.reading().elapsed_secs, 0);

        h.coordinator.seek(30);
        h.coordinator.previous_track();
        assert_eq!(clock.reading().elapsed_secs, 0);

        let player = h.player.clone();
        drain_until(&mut h.main_loop, || player.commands().len() == 4).await;
        assert_eq!(
            h.player.commands(),
            vec![
                PlayerCommand::Seek { seconds: 90 },
                PlayerCommand::Next,
                PlayerCommand::Seek { seconds: 30 },
                PlayerCommand::Previous,
            ]
        );
    }

    #[tokio::test]
    async fn toggle_playback_follows_clock_state() {
        let mut h = harness(FakePlayer::with_current(snapshot("A", 180_000, true)));
        h.coordinator.activate();
        let clock = h.coordinator.clock().clone();
        drain_until(&mut h.main_loop, || clock.current_track_id().is_some()).await;

        h.coordinator.toggle_playback();
        assert_eq!(clock.reading().state, ClockState::Playing);
        assert!(clock.is_ticking());

        h.coordinator.toggle_playback();
        assert_eq!(clock.reading().state, ClockState::Paused);
        assert!(!clock.is_ticking());

        let player = h.player.clone();
        drain_until(&mut h.main_loop, || player.commands().len() == 2).await;
        assert_eq!(h.player.commands(), vec![PlayerCommand::Play, PlayerCommand::Pause]);
    }

    #[tokio::test]
    async fn rejected_command_pulls_the_real_state() {
        let mut h = harness(FakePlayer::with_current(snapshot("A", 180_000, true)));
        h.coordinator.activate();
        let clock = h.coordinator.clock().clone();
        drain_until(&mut h.main_loop, || clock.current_track_id().is_some()).await;
        h.player.reject_commands(true);

        h.coordinator.play();
        assert_eq!(clock.reading().state, ClockState::Playing);

        let player = h.player.clone();
        drain_until(&mut h.main_loop, || player.pulls() == 2).await;
        drain_until(&mut h.main_loop, || clock.reading().state == ClockState::Paused).await;
        assert!(!clock.is_ticking());
    }

    #[tokio::test]
    async fn shuffle_and_repeat_toggle_from_last_known_settings() {
        let mut h = harness(FakePlayer::default());
        h.coordinator.activate();
        let mut current = snapshot("A", 180_000, false);
        current.repeat = RepeatState::All;
        h.coordinator.inner.snapshot.set(current);
        h.main_loop.run_pending();

        h.coordinator.toggle_shuffle();
        h.coordinator.cycle_repeat();

        let player = h.player.clone();
        drain_until(&mut h.main_loop, || player.commands().len() == 2).await;
        let commands = h.player.commands();
        assert!(commands.contains(&PlayerCommand::Shuffle(true)));
        assert!(commands.contains(&PlayerCommand::Repeat(RepeatState::One)));
        assert_eq!(
            h.presenter.settings.lock().last().copied(),
            Some((true, RepeatState::One))
        );
    }

    #[tokio::test]
    async fn toggle_favorite_shows_expected_status_and_refetches() {
        let mut h = harness(FakePlayer::with_current(snapshot("A", 180_000, false)));
        h.catalog.set_favorite("A", false);
        h.coordinator.activate();
        let presenter = h.presenter.clone();
        drain_until(&mut h.main_loop, || !presenter.statuses.lock().is_empty()).await;

        h.coordinator.toggle_favorite();

        assert_eq!(
            h.presenter.statuses.lock().last().cloned(),
            Some(("A".to_string(), true))
        );
        assert_eq!(h.coordinator.library().status("A"), None);
        let catalog = h.catalog.clone();
        drain_until(&mut h.main_loop, || catalog.is_favorite("A")).await;
        let catalog = h.catalog.clone();
        drain_until(&mut h.main_loop, || catalog.status_fetches() >= 2).await;
    }

    #[tokio::test]
    async fn toggle_favorite_without_track_does_nothing() {
        let h = harness(FakePlayer::default());

        h.coordinator.toggle_favorite();

        assert!(h.presenter.statuses.lock().is_empty());
        assert_eq!(h.catalog.status_fetches(), 0);
    }

    #[test]
    fn errors_are_translated_for_users() {
        let error = anyhow::anyhow!("http error: status code 404 Not Found");
        assert!(format_error(&error).starts_with("No active device"));

        let error = anyhow::anyhow!("something else");
        assert_eq!(format_error(&error), "Error: something else");
    }
}
