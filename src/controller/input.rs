//! Line command handling

use super::PlaybackCoordinator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputCommand {
    TogglePlayback,
    Next,
    Previous,
    ToggleShuffle,
    CycleRepeat,
    ToggleFavorite,
    Seek(u32),
    Quit,
}

impl InputCommand {
    pub const HELP: &'static str =
        "p: play/pause | n: next | b: previous | s: shuffle | r: repeat | l: like | <seconds>: seek | q: quit";

    /// Parse one line of input. Blank or unknown lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        match line {
            "p" | "P" => Some(Self::TogglePlayback),
            "n" | "N" => Some(Self::Next),
            "b" | "B" => Some(Self::Previous),
            "s" | "S" => Some(Self::ToggleShuffle),
            "r" | "R" => Some(Self::CycleRepeat),
            "l" | "L" => Some(Self::ToggleFavorite),
            "q" | "Q" => Some(Self::Quit),
            _ => parse_position(line).map(Self::Seek),
        }
    }
}

/// Accepts plain seconds (`95`) or minutes and seconds (`1:35`).
fn parse_position(text: &str) -> Option<u32> {
    match text.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u32 = minutes.parse().ok()?;
            let seconds: u32 = seconds.parse().ok()?;
            if seconds >= 60 {
                return None;
            }
            minutes.checked_mul(60)?.checked_add(seconds)
        }
        None => text.parse().ok(),
    }
}

impl PlaybackCoordinator {
    /// Apply a parsed command. Returns `false` when the user asked to quit.
    pub fn handle_input(&self, command: InputCommand) -> bool {
        tracing::debug!(?command, "Handling input command");
        match command {
            InputCommand::TogglePlayback => self.toggle_playback(),
            InputCommand::Next => self.next_track(),
            InputCommand::Previous => self.previous_track(),
            InputCommand::ToggleShuffle => self.toggle_shuffle(),
            InputCommand::CycleRepeat => self.cycle_repeat(),
            InputCommand::ToggleFavorite => self.toggle_favorite(),
            InputCommand::Seek(seconds) => self.seek(seconds),
            InputCommand::Quit => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::harness;
    use crate::model::PlayerCommand;
    use crate::model::testing::{FakePlayer, drain_until};

    #[test]
    fn parses_single_letter_commands() {
        assert_eq!(InputCommand::parse("p"), Some(InputCommand::TogglePlayback));
        assert_eq!(InputCommand::parse(" N \n"), Some(InputCommand::Next));
        assert_eq!(InputCommand::parse("b"), Some(InputCommand::Previous));
        assert_eq!(InputCommand::parse("s"), Some(InputCommand::ToggleShuffle));
        assert_eq!(InputCommand::parse("r"), Some(InputCommand::CycleRepeat));
        assert_eq!(InputCommand::parse("l"), Some(InputCommand::ToggleFavorite));
        assert_eq!(InputCommand::parse("q"), Some(InputCommand::Quit));
    }

    #[test]
    fn parses_seek_positions() {
        assert_eq!(InputCommand::parse("95"), Some(InputCommand::Seek(95)));
        assert_eq!(InputCommand::parse("1:35"), Some(InputCommand::Seek(95)));
        assert_eq!(InputCommand::parse("0"), Some(InputCommand::Seek(0)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(InputCommand::parse(""), None);
        assert_eq!(InputCommand::parse("play"), None);
        assert_eq!(InputCommand::parse("-5"), None);
        assert_eq!(InputCommand::parse("1:75"), None);
    }

    #[tokio::test]
    async fn quit_stops_and_other_commands_reach_the_player() {
        let mut h = harness(FakePlayer::default());

        assert!(h.coordinator.handle_input(InputCommand::Next));
        assert!(!h.coordinator.handle_input(InputCommand::Quit));

        let player = h.player.clone();
        drain_until(&mut h.main_loop, || !player.commands().is_empty()).await;
        assert_eq!(h.player.commands(), vec![PlayerCommand::Next]);
    }
}
