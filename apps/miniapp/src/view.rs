use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use client_core::{ControllerMode, SessionSnapshot};
use shared::{
    domain::{Horse, StatKind, UserProfile},
    error::UserFacingError,
};

const BAR_WIDTH: usize = 20;

pub const HELP: &str = "\
commands:
  refresh          ask the bot for fresh data
  show             print the current data again
  feed <id>        feed a horse (+10)
  water <id>       water a horse (+10)
  flower <id>      water the horse's flowers (+5)
  delete <id>      delete a horse (asks first)
  help             this list
  quit             save and leave";

pub const EMPTY_STABLE_HINT: &str =
    "You have no horses yet. Add your first horse through the bot menu.";

pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut out = render_user(&snapshot.user);
    out.push('\n');

    if snapshot.horses.is_empty() {
        out.push_str(EMPTY_STABLE_HINT);
        return out;
    }

    for horse in &snapshot.horses {
        out.push('\n');
        out.push_str(&render_horse(horse));
    }
    out
}

pub fn render_user(user: &UserProfile) -> String {
    format!(
        "{} | gender: {} | chibik: {}",
        user.username.as_deref().unwrap_or("(no username)"),
        user.gender.label(),
        user.chibik_name
    )
}

pub fn render_horse(horse: &Horse) -> String {
    let mut out = format!("#{} {}", horse.id, horse.name);
    if let Some(number) = &horse.number {
        let _ = write!(out, " (no. {number})");
    }
    let _ = writeln!(out, " updated {}", format_last_updated(horse.last_updated));
    for kind in StatKind::ALL {
        let percent = horse.display_percent(kind);
        let _ = writeln!(out, "  {:<8}{} {:>3}%", kind.label(), stat_bar(percent), percent);
    }
    out
}

pub fn stat_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

pub fn format_last_updated(last_updated: Option<i64>) -> String {
    last_updated
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

pub fn render_mode(mode: ControllerMode) -> Option<&'static str> {
    match mode {
        ControllerMode::Loading => Some("loading data from the bot..."),
        ControllerMode::Idle | ControllerMode::Ready | ControllerMode::Error => None,
    }
}

pub fn render_error(error: &UserFacingError) -> String {
    if error.detail.is_empty() {
        format!("error: {}", error.message)
    } else {
        format!("error: {} ({})", error.message, error.detail)
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
