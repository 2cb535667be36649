//! The invitation loop.
//!
//! Filters are visited round-robin (war, league, trophy). For each filter the search screen is
//! opened and up to `max_pages` pages of five candidates are reviewed: open the profile, copy
//! the player tag, look the player up, invite if the rules accept them, go back. After every
//! page the list is dragged up by one page.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;

use crate::actuator::{ActuationError, LocateOptions, UiActuator};
use crate::client::AccountSource;
use crate::criteria::{self, Verdict};
use crate::detector::ImageTarget;
use crate::layout::{Element, Point, SLOT_COUNT};
use crate::state::{InvitationSession, Outcome, RunReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    War,
    League,
    Trophy,
}

impl FilterKind {
    /// Visit order. Trophy wraps back to war on the next cycle.
    pub const ALL: [FilterKind; 3] = [FilterKind::War, FilterKind::League, FilterKind::Trophy];

    pub fn element(self) -> Element {
        match self {
            FilterKind::War => Element::FilterWars,
            FilterKind::League => Element::FilterLeague,
            FilterKind::Trophy => Element::FilterTrophy,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterKind::War => "war",
            FilterKind::League => "league",
            FilterKind::Trophy => "trophy",
        })
    }
}

/// Pauses that let the game finish its animations.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// After every click or key press.
    pub action: Duration,
    /// After tapping the player code, before the copy button shows up.
    pub player_code: Duration,
    /// After opening a profile.
    pub profile_open: Duration,
    /// Before and after the scroll drag.
    pub scroll_settle: Duration,
    pub drag: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            action: Duration::from_secs(1),
            player_code: Duration::from_millis(700),
            profile_open: Duration::from_millis(3500),
            scroll_settle: Duration::from_millis(1500),
            drag: Duration::from_secs(2),
        }
    }
}

impl Timings {
    pub fn none() -> Self {
        Self {
            action: Duration::ZERO,
            player_code: Duration::ZERO,
            profile_open: Duration::ZERO,
            scroll_settle: Duration::ZERO,
            drag: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub max_cycles: u32,
    pub max_pages: u32,
    pub timings: Timings,
    pub locate: LocateOptions,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_cycles: 100,
            max_pages: 12,
            timings: Timings::default(),
            locate: LocateOptions::default(),
        }
    }
}

/// Where the list is dragged to from the last slot to reveal the next page.
pub fn scroll_target(last_slot: Point) -> Point {
    let x = (last_slot.x as f64 * 247.0 / 250.0).round() as i32;
    let y = (last_slot.y as f64 * 480.0 / 1002.0).round() as i32;
    Point::new(x, y)
}

pub struct Orchestrator<A, S> {
    ui: A,
    source: S,
    settings: LoopSettings,
    cancel: Arc<AtomicBool>,
    cycles: u32,
    candidates_seen: u32,
}

impl<A: UiActuator, S: AccountSource> Orchestrator<A, S> {
    pub fn new(ui: A, source: S, settings: LoopSettings, cancel: Arc<AtomicBool>) -> Self {
        Self {
            ui,
            source,
            settings,
            cancel,
            cycles: 0,
            candidates_seen: 0,
        }
    }

    /// Invite up to `target` players. Only an unusable actuator is an error; every other
    /// failure skips the affected filter, page or candidate.
    pub async fn run(&mut self, target: u32) -> Result<RunReport> {
        let size = self
            .ui
            .screen_size()
            .context("input backend is not responding")?;
        tracing::info!("screen {size}, target {target} invitation(s)");

        self.cycles = 0;
        self.candidates_seen = 0;
        let mut session = InvitationSession::new(target);
        let outcome = self.cycle(&mut session).await;

        tracing::info!("stopping ({outcome}), closing search screen");
        if let Err(e) = self.ui.click_image(ImageTarget::Exit, &self.settings.locate) {
            tracing::debug!("could not close search screen: {e}");
        }

        Ok(RunReport {
            outcome,
            session,
            cycles: self.cycles,
            candidates_seen: self.candidates_seen,
        })
    }

    async fn cycle(&mut self, session: &mut InvitationSession) -> Outcome {
        for cycle in 1..=self.settings.max_cycles {
            self.cycles = cycle;
            for filter in FilterKind::ALL {
                if let Some(outcome) = self.stop_reason(session) {
                    return outcome;
                }

                tracing::info!(
                    "cycle {cycle}/{}: {filter} filter ({} to go)",
                    self.settings.max_cycles,
                    session.remaining()
                );
                if let Err(e) = self.navigate(filter).await {
                    tracing::warn!("could not open {filter} search: {e}, skipping filter");
                    continue;
                }
                if let Some(outcome) = self.paginate(session).await {
                    return outcome;
                }
            }
        }

        if session.is_complete() {
            Outcome::Completed
        } else {
            tracing::warn!(
                "giving up after {} cycle(s) with {} invitation(s) left",
                self.settings.max_cycles,
                session.remaining()
            );
            Outcome::Exhausted
        }
    }

    fn stop_reason(&self, session: &InvitationSession) -> Option<Outcome> {
        if session.is_complete() {
            tracing::info!("target of {} reached", session.target);
            Some(Outcome::Completed)
        } else if self.cancel.load(Ordering::Relaxed) {
            tracing::info!("cancelled with {} invitation(s) sent", session.invited);
            Some(Outcome::Cancelled)
        } else {
            None
        }
    }

    async fn navigate(&mut self, filter: FilterKind) -> Result<(), ActuationError> {
        let pause = self.settings.timings.action;

        self.ui.click(Element::GameArea)?;
        sleep(pause).await;
        self.ui.press_key("g")?;
        sleep(pause).await;
        for element in [
            Element::MyClan,
            Element::FindNewMembers,
            filter.element(),
            Element::SearchSuggested,
        ] {
            self.ui.click(element)?;
            sleep(pause).await;
        }
        Ok(())
    }

    async fn paginate(&mut self, session: &mut InvitationSession) -> Option<Outcome> {
        for page in 1..=self.settings.max_pages {
            tracing::debug!("page {page}/{}", self.settings.max_pages);
            for slot in 1..=SLOT_COUNT {
                if let Some(outcome) = self.stop_reason(session) {
                    return Some(outcome);
                }
                self.review(slot, session).await;
            }

            if let Some(outcome) = self.stop_reason(session) {
                return Some(outcome);
            }
            if let Err(e) = self.scroll().await {
                tracing::warn!("scroll after page {page} failed: {e}, leaving filter");
                break;
            }
        }
        None
    }

    async fn review(&mut self, slot: usize, session: &mut InvitationSession) {
        if let Err(e) = self.ui.click_slot(slot) {
            tracing::warn!("slot {slot}: {e}");
            return;
        }
        sleep(self.settings.timings.profile_open).await;

        match self.extract_tag().await {
            Ok(tag) => {
                self.candidates_seen += 1;
                self.consider(&tag, session).await;
            }
            Err(e) => tracing::warn!("slot {slot}: {e}"),
        }

        if let Err(e) = self.ui.click_image(ImageTarget::Back, &self.settings.locate) {
            tracing::warn!("slot {slot}: could not go back: {e}");
        }
        sleep(self.settings.timings.action).await;
    }

    async fn extract_tag(&mut self) -> Result<String, ActuationError> {
        self.ui.click(Element::PlayerCode)?;
        sleep(self.settings.timings.player_code).await;
        self.ui.click(Element::Copy)?;
        sleep(self.settings.timings.action).await;

        let text = self.ui.read_clipboard()?;
        let tag = text.trim();
        if tag.chars().count() < 2 {
            return Err(ActuationError::EmptyClipboard(text));
        }
        Ok(tag.to_string())
    }

    async fn consider(&mut self, tag: &str, session: &mut InvitationSession) {
        let player = match self.source.fetch_account(tag).await {
            Ok(player) => player,
            Err(e) => {
                tracing::warn!("{tag}: {e}, skipping");
                return;
            }
        };

        match criteria::evaluate(&player) {
            Verdict::Accept => self.invite(&player.name, tag, session),
            verdict => tracing::info!("[skip] {} ({tag}): {verdict}", player.name),
        }
    }

    fn invite(&mut self, name: &str, tag: &str, session: &mut InvitationSession) {
        match self.ui.click_image(ImageTarget::Invite, &self.settings.locate) {
            Ok(_) => {
                session.record(name, tag);
                tracing::info!(
                    "[invited] {}/{} {name} ({tag})",
                    session.invited,
                    session.target
                );
            }
            Err(e) => tracing::warn!("could not invite {name} ({tag}): {e}"),
        }
    }

    async fn scroll(&mut self) -> Result<(), ActuationError> {
        let from = self.ui.layout().last_slot();
        self.ui.move_to(from)?;
        sleep(self.settings.timings.scroll_settle).await;
        self.ui
            .drag_to(scroll_target(from), self.settings.timings.drag)?;
        sleep(self.settings.timings.scroll_settle).await;
        Ok(())
    }
}
