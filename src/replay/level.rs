//! Per-level state machine.
//!
//! Every slide a participant can see (circuit levels, info screens,
//! tutorials, external tasks) is tracked by a [`LevelStats`]. Events drive
//! the status through `NotStarted → Loaded → InProgress` into one of the
//! terminal states; [`LevelStats::post`] folds transient states into the
//! final vocabulary and is safe to call multiple times.

use chrono::{DateTime, Utc};

use crate::error::ReplayError;
use crate::parser::EventRecord;
use crate::parser::record::{duration_seconds, keys, parse_flag};

/// Slide types as written in the level list configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    /// A circuit puzzle, the core task of the study
    Level,
    /// An info/text slide
    Info,
    /// A guided circuit used in the introduction
    Tutorial,
    /// External task opened in a new tab
    Url,
    /// External task embedded in an iframe
    Iframe,
    /// Special slides (think-aloud prompts etc.)
    Special,
    /// A level shipped with the client
    LocalLevel,
}

impl LevelKind {
    /// Parses a config-side type name. `text` is a legacy alias for `info`.
    ///
    /// # Errors
    ///
    /// Returns a syntax error for unknown type names.
    pub fn from_config(raw: &str) -> Result<Self, ReplayError> {
        match raw {
            "level" => Ok(Self::Level),
            "info" | "text" => Ok(Self::Info),
            "tutorial" => Ok(Self::Tutorial),
            "url" => Ok(Self::Url),
            "iframe" => Ok(Self::Iframe),
            "special" => Ok(Self::Special),
            "localLevel" => Ok(Self::LocalLevel),
            other => Err(ReplayError::syntax(format!("unknown level type: {other}"))),
        }
    }

    /// The type name used on the wire (`new <wire name>`, `Loaded` Type).
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Level => "Level",
            Self::Info => "Info",
            Self::Tutorial => "Tutorial",
            // Both external task variants log as AltTask
            Self::Url | Self::Iframe => "AltTask",
            Self::Special => "Special",
            Self::LocalLevel => "LocalLevel",
        }
    }

    /// True for slides that count as tasks (circuits and external tasks).
    #[must_use]
    pub const fn is_task(self) -> bool {
        matches!(self, Self::Level | Self::Url | Self::Iframe)
    }

    /// True for slides that contain a circuit with switches.
    #[must_use]
    pub const fn has_switches(self) -> bool {
        matches!(self, Self::Level | Self::Tutorial)
    }
}

/// Level lifecycle states, including the final CSV vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelStatus {
    /// Initial state, the level was never delivered
    NotStarted,
    /// Delivered to the client but not yet shown
    Loaded,
    /// Currently being solved
    InProgress,
    /// Solved correctly
    Solved,
    /// Skipped via the skip-level button
    Skipped,
    /// Participant was thrown back to the qualification
    Failed,
    /// Participant quit while the level was in progress
    Aborted,
    /// Aborted due to a page reload
    Reloaded,
    /// Never delivered because the participant quit earlier
    NotReached,
}

impl LevelStatus {
    /// Legacy CSV spelling of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Loaded => "Loaded",
            Self::InProgress => "In Progress",
            Self::Solved => "Solved",
            Self::Skipped => "Skipped",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
            Self::Reloaded => "Aborted RL",
            Self::NotReached => "Never reached",
        }
    }
}

/// Replay state and statistics of a single slide.
#[derive(Debug, Clone)]
pub struct LevelStats {
    pub kind: LevelKind,
    /// Level file name, e.g. `medium/and4`
    pub name: String,
    /// Position among the tasks of the phase; differs per participant
    /// when shuffling is enabled
    pub position: Option<usize>,
    pub status: LevelStatus,
    pub switch_clicks: u32,
    pub confirm_clicks: u32,
    /// Client-computed optimum, read from the feedback dialogue
    pub min_switch_clicks: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    /// Time of the first confirm click (or of the solve, whichever first)
    pub first_try_time: Option<DateTime<Utc>>,
    pub last_interaction: Option<DateTime<Utc>>,
    /// End time provided by `post` when no explicit end was seen
    pub unload_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// True once the feedback dialogue was shown (not on the confirm click)
    pub feedback: bool,
    pub skipped: bool,
    /// Number of drawing tool interactions
    pub drawn: u32,
    reload_flag: bool,
}

impl LevelStats {
    /// Creates a level in its initial state from a config entry.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the config type name is unknown.
    pub fn new(config_type: &str, name: impl Into<String>) -> Result<Self, ReplayError> {
        Ok(Self {
            kind: LevelKind::from_config(config_type)?,
            name: name.into(),
            position: None,
            status: LevelStatus::NotStarted,
            switch_clicks: 0,
            confirm_clicks: 0,
            min_switch_clicks: None,
            start_time: None,
            first_try_time: None,
            last_interaction: None,
            unload_time: None,
            end_time: None,
            feedback: false,
            skipped: false,
            drawn: 0,
            reload_flag: false,
        })
    }

    /// True for circuits and external tasks.
    #[must_use]
    pub fn is_task(&self) -> bool {
        self.kind.is_task()
    }

    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.status == LevelStatus::Solved
    }

    /// The level was delivered to the client, the first of the two
    /// delivery events.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the level was already loaded.
    pub fn on_load(&mut self, position: usize) -> Result<(), ReplayError> {
        if self.status != LevelStatus::NotStarted {
            return Err(ReplayError::syntax(format!(
                "invalid level status on load: {} for level {}",
                self.status.as_str(),
                self.name
            )));
        }
        self.position = Some(position);
        self.status = LevelStatus::Loaded;
        Ok(())
    }

    /// The level is now shown to the player, the second delivery event.
    ///
    /// Starts the level timer on the first delivery. After a page reload
    /// the same level is re-delivered; the `Loaded` precondition is waived
    /// and the running timer keeps its value.
    ///
    /// # Errors
    ///
    /// Returns a syntax error on a wire type mismatch or an illegal state.
    pub fn on_start(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if event.require(keys::TYPE)? != self.kind.wire_name() {
            return Err(ReplayError::syntax("type mismatch when starting level"));
        }

        if !self.reload_flag && self.status != LevelStatus::Loaded {
            return Err(ReplayError::syntax(format!(
                "invalid level status on start: {} for level {}",
                self.status.as_str(),
                self.name
            )));
        }

        // Can only differ from Loaded after a page reload
        if self.status == LevelStatus::Loaded {
            self.start_time = Some(event.time);
            self.first_try_time = Some(event.time);
            self.status = LevelStatus::InProgress;
        }

        self.reload_flag = false;
        Ok(())
    }

    /// A switch in the circuit was toggled.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if this slide has no circuit or the level
    /// is not in a state that allows interaction.
    pub fn on_switch_click(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if !self.kind.has_switches() {
            return Err(ReplayError::syntax(
                "switch click in a level without a circuit",
            ));
        }
        self.on_interaction(event, true)?;
        self.switch_clicks += 1;
        Ok(())
    }

    /// The confirm button was pressed. The client reports whether the
    /// circuit was in the solving state; the confirm counter increments
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns a syntax error outside circuit levels, on an illegal state
    /// or an unreadable `Level Solved` flag.
    pub fn on_confirm_click(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if self.kind != LevelKind::Level {
            return Err(ReplayError::syntax(
                "confirm click in a level without a circuit",
            ));
        }

        self.on_interaction(event, true)?;
        let solved = parse_flag(event.require("Level Solved")?)
            .map_err(|e| e.with_line(event.origin_line))?;

        // Stop the first try timer on the first confirm
        if self.confirm_clicks < 1 {
            self.first_try_time = Some(event.time);
        }
        self.confirm_clicks += 1;

        if solved {
            self.status = LevelStatus::Solved;
        }
        Ok(())
    }

    /// The click-feedback dialogue was shown. Cross-checks the client
    /// counters against the replayed ones and reads the client-computed
    /// optimum switch count.
    ///
    /// # Errors
    ///
    /// Returns a syntax error on a counter discrepancy, a switch count
    /// below the reported optimum, or broken timestamps.
    pub fn on_level_solved_dialogue(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if self.kind != LevelKind::Level {
            return Err(ReplayError::syntax(
                "level solved dialogue in a level without a circuit",
            ));
        }

        self.feedback = true;
        self.min_switch_clicks = Some(event.require_u32("Optimum Switch Clicks")?);
        self.end_time = Some(event.time);

        if let Some(start) = self.start_time {
            if event.time < start {
                return Err(ReplayError::syntax(format!(
                    "level start time {start} should be before end time {}",
                    event.time
                )));
            }
        }

        let client_switches = event.require_u32("Nmbr Switch Clicks")?;
        if self.switch_clicks != client_switches {
            return Err(ReplayError::syntax(format!(
                "discrepancy in switch clicks: replay counted {}, client sent {client_switches}",
                self.switch_clicks
            )));
        }

        let client_confirms = event.require_u32("Nmbr Confirm Clicks")?;
        if self.confirm_clicks != client_confirms {
            return Err(ReplayError::syntax(format!(
                "discrepancy in confirm clicks: replay counted {}, client sent {client_confirms}",
                self.confirm_clicks
            )));
        }

        if let Some(min) = self.min_switch_clicks {
            if self.switch_clicks < min && !self.skipped && self.status != LevelStatus::Failed {
                return Err(ReplayError::syntax(
                    "somehow the user managed to click fewer switches than required",
                ));
            }
        }

        Ok(())
    }

    /// The skip-level button was used.
    ///
    /// # Errors
    ///
    /// Returns a syntax error on an illegal state or broken timestamps.
    pub fn on_skip(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        self.on_interaction(event, true)?;

        self.status = LevelStatus::Skipped;
        self.skipped = true;
        self.end_time = Some(event.time);

        if let Some(start) = self.start_time {
            if event.time < start {
                return Err(ReplayError::syntax(format!(
                    "level start time {start} should be before end time {}",
                    event.time
                )));
            }
        }
        Ok(())
    }

    /// The participant failed the qualification while this level was
    /// active.
    ///
    /// # Errors
    ///
    /// Returns a syntax error unless the level is in progress or solved.
    pub fn on_fail(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if !matches!(self.status, LevelStatus::InProgress | LevelStatus::Solved) {
            return Err(ReplayError::syntax(format!(
                "failed quali but level is in wrong state: {}",
                self.status.as_str()
            )));
        }

        self.end_time = Some(event.time);
        self.status = LevelStatus::Failed;

        if let Some(start) = self.start_time {
            if event.time < start {
                return Err(ReplayError::syntax(format!(
                    "level start time {start} should be before end time {}",
                    event.time
                )));
            }
        }
        Ok(())
    }

    /// Any player interaction bumps the end-of-activity timer.
    ///
    /// With `check` the level must be in progress (or failed, interactions
    /// still arrive while the fail dialogue is up).
    fn on_interaction(&mut self, event: &EventRecord, check: bool) -> Result<(), ReplayError> {
        if check && !matches!(self.status, LevelStatus::InProgress | LevelStatus::Failed) {
            return Err(ReplayError::syntax(format!(
                "interaction on unloaded/finished level: {}",
                self.status.as_str()
            )));
        }

        self.last_interaction = Some(event.time);
        if let Some(start) = self.start_time {
            if event.time < start {
                return Err(ReplayError::syntax(format!(
                    "level start time {start} should be before last interaction {}",
                    event.time
                )));
            }
        }
        Ok(())
    }

    /// A drawing tool was used. The player can release a drawing after
    /// the confirm click, so the state precondition is skipped.
    ///
    /// # Errors
    ///
    /// Returns a syntax error on broken timestamps.
    pub fn on_interaction_drawing(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        self.on_interaction(event, false)?;
        self.drawn += 1;
        Ok(())
    }

    /// The page was reloaded; the server will re-deliver this level.
    pub fn on_page_reload(&mut self) {
        self.reload_flag = true;
    }

    /// Folds transient states into the final CSV vocabulary.
    ///
    /// Slides without a task have no confirm click that would mark them
    /// solved, so any delivered non-task slide counts as solved. Calling
    /// `post` multiple times is harmless.
    pub fn post(&mut self, event: Option<&EventRecord>) {
        if !self.is_task() {
            self.status = LevelStatus::Solved;
        }

        match self.status {
            LevelStatus::InProgress => self.status = LevelStatus::Aborted,
            LevelStatus::NotStarted | LevelStatus::Loaded => {
                self.status = LevelStatus::NotReached;
            }
            _ => {}
        }

        if let Some(event) = event {
            self.unload_time = Some(event.time);
        }
    }

    /// Seconds the participant spent on this level, `None` if it was
    /// never started. With `first_try` the timer stops at the first
    /// confirm click instead of the level end.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the level claims to be started but
    /// carries no usable timestamps. Only possible on an engine defect.
    pub fn duration(&self, first_try: bool) -> Result<Option<f64>, ReplayError> {
        if matches!(self.status, LevelStatus::NotReached | LevelStatus::NotStarted) {
            return Ok(None);
        }

        let end = if first_try {
            self.first_try_time
        } else {
            // If the player stopped playing, fall back to the unload time
            self.end_time.or(self.unload_time)
        };

        let (Some(start), Some(end)) = (self.start_time, end) else {
            return Err(ReplayError::internal(format!(
                "level {} is {} but has no timestamps",
                self.name,
                self.status.as_str()
            )));
        };

        duration_seconds(start, end).map(Some)
    }

    /// Inverse efficiency score, `None` unless the level was solved.
    ///
    /// With `first_try` the duration until the first confirm click is
    /// used instead of the full solve time.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the solved level violates the score
    /// preconditions (no confirm clicks, non-positive duration, fewer
    /// switch clicks than the optimum).
    pub fn ies(&self, first_try: bool) -> Result<Option<f64>, ReplayError> {
        if !self.is_solved() {
            return Ok(None);
        }
        let Some(duration) = self.duration(first_try)? else {
            return Ok(None);
        };

        let min = self.min_switch_clicks.unwrap_or(0);
        inverse_efficiency(self.switch_clicks, min, self.confirm_clicks, duration).map(Some)
    }
}

/// Inverse efficiency score: duration divided by the accuracy fraction
/// `(1/(1+w)) * (1/(1+d))` where `w` is the number of wasted switch
/// clicks and `d` the number of failed confirm attempts.
///
/// # Errors
///
/// Returns an internal error when called with arguments outside the
/// domain of the formula.
pub fn inverse_efficiency(
    switch_clicks: u32,
    min_switch_clicks: u32,
    confirm_clicks: u32,
    duration_secs: f64,
) -> Result<f64, ReplayError> {
    if confirm_clicks == 0 {
        return Err(ReplayError::internal(
            "inverse efficiency needs at least one confirm click",
        ));
    }
    if duration_secs <= 0.0 {
        return Err(ReplayError::internal(format!(
            "the time it took to solve the level must be greater than zero: {duration_secs}"
        )));
    }
    if switch_clicks < min_switch_clicks {
        return Err(ReplayError::internal(format!(
            "switch clicks must be >= the optimum: {switch_clicks}/{min_switch_clicks}"
        )));
    }

    let w = f64::from(switch_clicks - min_switch_clicks);
    let d = f64::from(confirm_clicks - 1);
    let pc = (1.0 / (1.0 + w)) * (1.0 / (1.0 + d));
    Ok(duration_secs / pc)
}
