//! View module - Presentation of playback state
//!
//! The coordinator pushes every change through [`PlaybackPresenter`]; how it
//! is shown is up to the implementation. `StdoutPresenter` prints plain status
//! lines for the command-line binary.

use std::io::Write;
use parking_lot::Mutex;

use crate::model::{ArtworkImage, ClockReading, ClockState, PlaybackSnapshot, RepeatState};

/// Receives presentation updates, always on the main loop.
pub trait PlaybackPresenter: Send + Sync {
    fn render_snapshot(&self, _snapshot: &PlaybackSnapshot) {}

    fn render_position(&self, _reading: &ClockReading) {}

    /// `None` while the artwork of a new track is still being resolved
    fn render_artwork(&self, _artwork: Option<&ArtworkImage>) {}

    fn render_library_status(&self, _track_id: &str, _favorite: bool) {}

    fn render_settings(&self, _shuffle: bool, _repeat: RepeatState) {}
}

pub fn format_duration(secs: u32) -> String {
    let minutes = secs / 60;
    let seconds = secs % 60;
    format!("{}:{:02}", minutes, seconds)
}

pub fn status_line(snapshot: &PlaybackSnapshot) -> String {
    let marker = if snapshot.is_paused { "⏸ " } else { "▶" };
    format!(
        "{} {} | {} ({})",
        marker, snapshot.track.name, snapshot.track.artist, snapshot.track.album
    )
}

pub fn settings_line(shuffle: bool, repeat: RepeatState) -> String {
    let shuffle_text = if shuffle { "Shuffle: On" } else { "Shuffle: Off" };
    let repeat_text = match repeat {
        RepeatState::Off => "Repeat: Off",
        RepeatState::All => "Repeat: All",
        RepeatState::One => "Repeat: One",
    };
    format!("{} | {}", shuffle_text, repeat_text)
}

pub fn position_line(reading: &ClockReading) -> String {
    let state = match reading.state {
        ClockState::Playing => "playing",
        ClockState::Paused => "paused",
        ClockState::Stopped => "stopped",
    };
    format!(
        "{} / {} [{:>3}%] {}",
        format_duration(reading.elapsed_secs),
        format_duration(reading.duration_secs),
        (reading.progress_ratio() * 100.0).round() as u32,
        state
    )
}

/// Prints status changes as lines and keeps the position on a single
/// rewritten line.
#[derive(Default)]
pub struct StdoutPresenter {
    last_position: Mutex<Option<String>>,
}

impl StdoutPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn print_line(&self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        // End the position line first so status lines don't overwrite it
        if self.last_position.lock().take().is_some() {
            let _ = writeln!(stdout);
        }
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }
}

impl PlaybackPresenter for StdoutPresenter {
    fn render_snapshot(&self, snapshot: &PlaybackSnapshot) {
        self.print_line(&status_line(snapshot));
    }

    fn render_position(&self, reading: &ClockReading) {
        let line = position_line(reading);
        let mut last = self.last_position.lock();
        if last.as_deref() == Some(line.as_str()) {
            return;
        }

        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r{}", line);
        let _ = stdout.flush();
        *last = Some(line);
    }

    fn render_artwork(&self, artwork: Option<&ArtworkImage>) {
        if let Some(image) = artwork {
            match (image.width, image.height) {
                (Some(width), Some(height)) => {
                    self.print_line(&format!("Artwork: {} ({}x{})", image.url, width, height))
                }
                _ => self.print_line(&format!("Artwork: {}", image.url)),
            }
        }
    }

    fn render_library_status(&self, _track_id: &str, favorite: bool) {
        self.print_line(if favorite { "💚 In your library" } else { "Not in your library" });
    }

    fn render_settings(&self, shuffle: bool, repeat: RepeatState) {
        self.print_line(&settings_line(shuffle, repeat));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackRef;

    fn playing(name: &str) -> PlaybackSnapshot {
        PlaybackSnapshot {
            track: TrackRef {
                id: "id".to_string(),
                name: name.to_string(),
                artist: "Artist".to_string(),
                album: "Album".to_string(),
                duration_ms: 200_000,
                image_id: String::new(),
            },
            is_paused: false,
            position_ms: 0,
            shuffle: false,
            repeat: RepeatState::Off,
        }
    }

    #[test]
    fn formats_minutes_and_padded_seconds() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3_600), "60:00");
    }

    #[test]
    fn status_line_shows_pause_marker() {
        let mut snapshot = playing("Song");
        assert_eq!(status_line(&snapshot), "▶ Song | Artist (Album)");

        snapshot.is_paused = true;
        assert!(status_line(&snapshot).starts_with("⏸"));
    }

    #[test]
    fn position_line_includes_progress() {
        let reading = ClockReading {
            track_id: Some("id".to_string()),
            elapsed_secs: 50,
            duration_secs: 200,
            state: ClockState::Playing,
        };
        assert_eq!(position_line(&reading), "0:50 / 3:20 [ 25%] playing");
    }

    #[test]
    fn settings_line_names_repeat_mode() {
        assert_eq!(settings_line(true, RepeatState::One), "Shuffle: On | Repeat: One");
        assert_eq!(settings_line(false, RepeatState::All), "Shuffle: Off | Repeat: All");
    }
}
