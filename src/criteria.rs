//! Acceptance rules for candidates and general-purpose player checks.
//!
//! Everything here works on an already-fetched [`Player`] and never touches the network.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::client::Player;

/// What to conclude when `lastSeen` is present but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnparsableTimestamp {
    #[default]
    AssumeActive,
    AssumeInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub min_exp_level: u32,
    pub min_town_hall: u32,
    pub activity_window: chrono::Duration,
    pub unparsable_last_seen: UnparsableTimestamp,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_exp_level: 50,
            min_town_hall: 8,
            activity_window: chrono::Duration::days(30),
            unparsable_last_seen: UnparsableTimestamp::AssumeActive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerValidation {
    pub has_clan: bool,
    pub meets_level_requirements: bool,
    pub meets_townhall_requirements: bool,
    pub is_active: bool,
}

pub fn has_clan(player: &Player) -> bool {
    player.clan.is_some()
}

pub fn meets_level(player: &Player, min: u32) -> bool {
    player.exp_level >= min
}

pub fn meets_town_hall(player: &Player, min: u32) -> bool {
    player.town_hall_level.is_some_and(|th| th >= min)
}

/// Whether the player was seen within `window` of `now`. A missing timestamp is inactive.
pub fn is_active(
    player: &Player,
    now: DateTime<Utc>,
    window: chrono::Duration,
    unparsable: UnparsableTimestamp,
) -> bool {
    let Some(raw) = player.last_seen.as_deref() else {
        return false;
    };
    match parse_timestamp(raw) {
        Some(seen) => now - seen <= window,
        None => {
            tracing::debug!("unparsable lastSeen {raw:?} for {}, applying {unparsable:?}", player.tag);
            unparsable == UnparsableTimestamp::AssumeActive
        }
    }
}

pub fn validate_player(
    player: &Player,
    policy: &ValidationPolicy,
    now: DateTime<Utc>,
) -> PlayerValidation {
    PlayerValidation {
        has_clan: has_clan(player),
        meets_level_requirements: meets_level(player, policy.min_exp_level),
        meets_townhall_requirements: meets_town_hall(player, policy.min_town_hall),
        is_active: is_active(
            player,
            now,
            policy.activity_window,
            policy.unparsable_last_seen,
        ),
    }
}

/// Accepts RFC 3339 and the API's compact `20240131T101500.000Z` form.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S%.fZ")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Minimum experience level for a town hall tier, or `None` when the tier is never invited.
pub fn min_level_for_town_hall(town_hall: u32) -> Option<u32> {
    match town_hall {
        8 => Some(65),
        9 => Some(75),
        10 => Some(85),
        11 => Some(100),
        th if th > 11 => Some(120),
        _ => None,
    }
}

/// No clan, or a clan with a single-character name (usually a placeholder).
pub fn passes_clan_filter(player: &Player) -> bool {
    match &player.clan {
        None => true,
        Some(clan) => clan.name.chars().count() <= 1,
    }
}

pub fn passes_level_filter(player: &Player) -> bool {
    player
        .town_hall_level
        .and_then(min_level_for_town_hall)
        .is_some_and(|min| player.exp_level >= min)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    InClan { clan: String },
    LevelTooLow { town_hall: u32, level: u32, required: u32 },
    TownHallNotRecruited { town_hall: Option<u32> },
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accept => f.write_str("accepted"),
            Verdict::InClan { clan } => write!(f, "already in clan {clan:?}"),
            Verdict::LevelTooLow {
                town_hall,
                level,
                required,
            } => write!(f, "TH{town_hall} level {level} below {required}"),
            Verdict::TownHallNotRecruited { town_hall: Some(th) } => {
                write!(f, "TH{th} is not recruited")
            }
            Verdict::TownHallNotRecruited { town_hall: None } => {
                f.write_str("town hall level unknown")
            }
        }
    }
}

/// Clan filter first, then the town-hall-tiered level filter.
pub fn evaluate(player: &Player) -> Verdict {
    if !passes_clan_filter(player) {
        let clan = player.clan.as_ref().map(|c| c.name.clone()).unwrap_or_default();
        return Verdict::InClan { clan };
    }

    let Some(town_hall) = player.town_hall_level else {
        return Verdict::TownHallNotRecruited { town_hall: None };
    };
    match min_level_for_town_hall(town_hall) {
        None => Verdict::TownHallNotRecruited {
            town_hall: Some(town_hall),
        },
        Some(required) if player.exp_level < required => Verdict::LevelTooLow {
            town_hall,
            level: player.exp_level,
            required,
        },
        Some(_) => Verdict::Accept,
    }
}
