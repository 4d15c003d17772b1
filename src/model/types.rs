//! Core type definitions shared by the model and controller

use std::fmt;

/// Repeat mode state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepeatState {
    #[default]
    Off,
    All,
    One,
}

impl RepeatState {
    /// Next mode when the user taps repeat: Off -> All -> One -> Off
    pub fn cycle(self) -> Self {
        match self {
            RepeatState::Off => RepeatState::All,
            RepeatState::All => RepeatState::One,
            RepeatState::One => RepeatState::Off,
        }
    }
}

/// Commands accepted by the remote player; all of them are fire-and-forget
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Seek { seconds: u32 },
    Next,
    Previous,
    Shuffle(bool),
    Repeat(RepeatState),
}

impl fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerCommand::Play => write!(f, "play"),
            PlayerCommand::Pause => write!(f, "pause"),
            PlayerCommand::Seek { seconds } => write!(f, "seek to {}s", seconds),
            PlayerCommand::Next => write!(f, "next"),
            PlayerCommand::Previous => write!(f, "previous"),
            PlayerCommand::Shuffle(on) => write!(f, "shuffle {}", if *on { "on" } else { "off" }),
            PlayerCommand::Repeat(state) => write!(f, "repeat {:?}", state),
        }
    }
}
