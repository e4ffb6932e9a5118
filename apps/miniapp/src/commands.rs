use shared::domain::{HorseId, StatKind};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Show,
    Stat { kind: StatKind, horse_id: HorseId },
    Delete(HorseId),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help' for the list")]
    Unknown(String),
    #[error("'{0}' needs a horse id")]
    MissingHorseId(&'static str),
    #[error("'{0}' is not a horse id")]
    InvalidHorseId(String),
    #[error("'{0}' takes a single horse id")]
    TrailingInput(&'static str),
}

/// Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_lowercase().as_str() {
        "refresh" | "r" => Command::Refresh,
        "show" | "ls" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "feed" => stat_command(StatKind::Feed, "feed", &mut words)?,
        "water" => stat_command(StatKind::Water, "water", &mut words)?,
        "flower" | "flowers" => stat_command(StatKind::Flowers, "flower", &mut words)?,
        "delete" | "rm" => Command::Delete(horse_id_arg("delete", &mut words)?),
        _ => return Err(CommandError::Unknown(verb.to_string())),
    };

    Ok(Some(command))
}

fn stat_command<'a>(
    kind: StatKind,
    verb: &'static str,
    words: &mut impl Iterator<Item = &'a str>,
) -> Result<Command, CommandError> {
    Ok(Command::Stat {
        kind,
        horse_id: horse_id_arg(verb, words)?,
    })
}

fn horse_id_arg<'a>(
    verb: &'static str,
    words: &mut impl Iterator<Item = &'a str>,
) -> Result<HorseId, CommandError> {
    let raw = words.next().ok_or(CommandError::MissingHorseId(verb))?;
    if words.next().is_some() {
        return Err(CommandError::TrailingInput(verb));
    }
    raw.parse::<i64>()
        .map(HorseId)
        .map_err(|_| CommandError::InvalidHorseId(raw.to_string()))
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
