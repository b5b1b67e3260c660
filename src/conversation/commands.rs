//! Command dispatch for users who finished onboarding.
//!
//! New commands are added as a variant plus a row in [`COMMANDS`].

use super::profile::Profile;
use super::prompts;

/// A fixed command recognized in the completed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Help,
    Profile,
}

/// Command keywords, matched case-insensitively against the trimmed input.
const COMMANDS: &[(&str, Command)] = &[
    ("ping", Command::Ping),
    ("help", Command::Help),
    ("profile", Command::Profile),
];

impl Command {
    /// Recognize a command. Returns `None` for anything that is not an exact
    /// keyword match.
    pub fn parse(input: &str) -> Option<Command> {
        let input = input.trim();
        COMMANDS
            .iter()
            .find(|(keyword, _)| input.eq_ignore_ascii_case(keyword))
            .map(|(_, command)| *command)
    }

    fn reply(&self, profile: &Profile) -> String {
        match self {
            Self::Ping => prompts::PONG.to_string(),
            Self::Help => prompts::help(),
            Self::Profile => prompts::profile_summary(profile),
        }
    }
}

/// Produce the reply for input received in the completed state.
pub fn dispatch(input: &str, profile: &Profile) -> String {
    match Command::parse(input) {
        Some(command) => command.reply(profile),
        None => prompts::HOW_CAN_I_HELP.to_string(),
    }
}
