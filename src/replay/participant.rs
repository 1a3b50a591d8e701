//! Participant-level replay state.
//!
//! A [`Participant`] owns the outline of phases built from the study
//! configuration and routes classified events to the active phase and
//! level. The outline can grow while replaying: a failed qualification
//! splices a fresh element introduction and qualification in, and a
//! second group assignment appends that group's phases.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::StudyConfig;
use crate::error::ReplayError;
use crate::parser::EventRecord;
use crate::parser::record::duration_seconds;
use crate::replay::level::LevelStats;
use crate::replay::phase::{GAME_INTRO_PHASES, PhaseStats};
use crate::replay::signature::{self, EventKind};

const PHASE_QUALI: &str = "Quali";
const PHASE_ELEMENT_INTRO: &str = "IntroduceElements";

/// Debug groups carry this prefix in front of the real group name.
const DEBUG_GROUP_PREFIX: &str = "debug";

/// Full replay state of one participant log.
#[derive(Debug)]
pub struct Participant {
    config: Arc<StudyConfig>,
    pub pseudonym: String,
    /// Groups in assignment order; the skill assessment may move a
    /// participant into a second group
    pub groups: Vec<String>,
    /// True if any assigned group carried the debug prefix
    pub is_debug: bool,
    /// Phase outline, including dynamic insertions
    pub phases: Vec<PhaseStats>,
    current: Option<usize>,
    /// Player positions at every page (re)load, `Start` for the initial one
    pub reconnects: Vec<String>,
    /// Display names of the phases actually entered, in order
    pub phases_started: Vec<String>,
    /// True after any mid-game page reload
    pub reloaded: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Number of parsed records in the log
    pub num_events: usize,
    /// Critical client/server drifts in seconds, from the sequencer
    pub critical_time_drifts: Vec<f64>,
}

impl Participant {
    #[must_use]
    pub fn new(config: Arc<StudyConfig>, pseudonym: impl Into<String>) -> Self {
        Self {
            config,
            pseudonym: pseudonym.into(),
            groups: Vec::new(),
            is_debug: false,
            phases: Vec::new(),
            current: None,
            reconnects: Vec::new(),
            phases_started: Vec::new(),
            reloaded: false,
            start_time: None,
            end_time: None,
            num_events: 0,
            critical_time_drifts: Vec::new(),
        }
    }

    /// Routes one record to the responsible handler.
    ///
    /// The qualification pass/fail events carry the level ordinal in the
    /// event name itself and are matched structurally before the
    /// signature table; unmatched events are ignored.
    ///
    /// # Errors
    ///
    /// Propagates every state machine violation as a syntax error.
    pub fn handle_event(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        let name = event.event();

        if name.starts_with("Failing") && name.ends_with("Quali Level") {
            return self.on_fail_quali(event);
        }
        // Passing the quali needs no state change, the scene change that
        // follows carries the progress
        if name.starts_with("Passing") && name.ends_with("Quali Level") {
            return Ok(());
        }
        if name.starts_with("new ") && event.get("Filename").is_some() {
            return self.current_phase_mut()?.on_level_requested(event);
        }

        match signature::classify(event) {
            Some(EventKind::GameLoaded) => self.on_game_loaded(event),
            Some(EventKind::GroupAssignment) => self.on_group_assignment(event),
            Some(EventKind::SceneChanged) => self.on_scene_changed(event),
            Some(EventKind::SkillAssessment) => {
                self.current_phase_mut()?.on_skill_assessment(event)
            }
            Some(EventKind::IntroArrow) => self.current_phase_mut()?.on_intro_arrow(),
            Some(EventKind::SkipLevel) => self.current_level_mut()?.on_skip(event),
            Some(EventKind::LevelStarted) => self.current_level_mut()?.on_start(event),
            Some(EventKind::SwitchClick) => self.current_phase_mut()?.on_switch_click(event),
            Some(EventKind::ConfirmClick) => self.current_phase_mut()?.on_confirm_click(event),
            Some(EventKind::FeedbackDialogue) => {
                self.current_level_mut()?.on_level_solved_dialogue(event)
            }
            Some(
                EventKind::PenDraw | EventKind::EraserDraw | EventKind::DeleteDraw,
            ) => self.current_phase_mut()?.on_interaction_drawing(event),
            // TimeSync is consumed by the sequencer, the rest are no-ops
            Some(EventKind::TimeSync | EventKind::Redirect | EventKind::ClickNext) | None => {
                Ok(())
            }
        }
    }

    /// The client loaded the preload scene: first page load or a reload.
    ///
    /// # Errors
    ///
    /// Propagates level lookup errors while recording the reload position.
    fn on_game_loaded(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if self.start_time.is_none() {
            self.start_time = Some(event.time);
        }

        let position = match self.current {
            None => "Start".to_string(),
            Some(idx) => {
                let mut position = format!("{}({idx})", self.phases[idx].name);
                self.reloaded = true;
                self.phases[idx].on_page_reload();

                if self.phases[idx].has_levels() {
                    if let Ok(level) = self.phases[idx].current_level() {
                        position.push('@');
                        position.push_str(&level.name);
                    }
                }
                position
            }
        };
        self.reconnects.push(position);
        Ok(())
    }

    /// The server assigned a group; loads that group's phase outline.
    ///
    /// # Errors
    ///
    /// Returns a syntax error for unknown groups or broken pool
    /// references.
    fn on_group_assignment(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        let group = event.require("Group")?.to_string();
        self.set_group(&group)
    }

    /// Registers a group and appends its phases to the outline.
    ///
    /// A leading `debug` prefix marks the participant as debug and is
    /// stripped to find the underlying group (unless the group is
    /// literally named `debug`).
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the group is not configured.
    pub fn set_group(&mut self, group: &str) -> Result<(), ReplayError> {
        let mut group = group.to_lowercase();

        if group.starts_with(DEBUG_GROUP_PREFIX) && group != DEBUG_GROUP_PREFIX {
            self.is_debug = true;
            group = group[DEBUG_GROUP_PREFIX.len()..].to_string();
        }

        let Some(conf) = self.config.group(&group) else {
            return Err(ReplayError::syntax(format!(
                "the group {group} does not exist"
            )));
        };
        let conf = conf.clone();

        for phase_name in &conf.phases {
            self.phases
                .push(PhaseStats::new(phase_name, &self.config, &conf, false)?);
        }
        self.groups.push(group);
        Ok(())
    }

    /// A non-preload scene change: finalizes the active phase and starts
    /// the next expected one.
    ///
    /// # Errors
    ///
    /// Returns a syntax error when the scene does not match the outline.
    fn on_scene_changed(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        let new_phase = event.require("Scene")?.to_string();

        if let Some(idx) = self.current {
            self.phases[idx].post(event)?;
        }

        let next = self.current.map_or(0, |idx| idx + 1);
        if next >= self.phases.len() {
            return Err(ReplayError::syntax(format!(
                "scene {new_phase} requested after the end of the outline"
            )));
        }

        if self.phases[next].name != new_phase {
            return Err(ReplayError::syntax(format!(
                "expected phase {}, got {new_phase}",
                self.phases[next].name
            )));
        }

        self.current = Some(next);
        self.phases[next].on_start(event)?;
        let display = self.phases[next].display_name().to_string();
        self.phases_started.push(display);
        Ok(())
    }

    /// The participant failed the qualification: the current phase is
    /// finalized and a fresh element introduction plus qualification are
    /// spliced in after it.
    ///
    /// # Errors
    ///
    /// Returns a syntax error outside the qualification phase.
    fn on_fail_quali(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        let idx = self.current_phase_index()?;
        self.phases[idx].on_fail_quali(event)?;

        let Some(group) = self.groups.last() else {
            return Err(ReplayError::syntax(
                "failed quali before any group assignment",
            ));
        };
        let conf = self
            .config
            .group(group)
            .ok_or_else(|| ReplayError::internal(format!("group {group} vanished")))?
            .clone();

        let intro = PhaseStats::new(PHASE_ELEMENT_INTRO, &self.config, &conf, true)?;
        let quali = PhaseStats::new(PHASE_QUALI, &self.config, &conf, true)?;
        self.phases.insert(idx + 1, intro);
        self.phases.insert(idx + 2, quali);
        Ok(())
    }

    /// Finalizes the replay with the last relevant record of the log.
    ///
    /// Intro phases have no closing scene change; if the log ends inside
    /// one, its phase is left untouched. All phases the participant never
    /// reached are finalized as such.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the game was never loaded or the
    /// participant timestamps are inverted.
    pub fn post(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        self.end_time = Some(event.time);

        let Some(start) = self.start_time else {
            return Err(ReplayError::syntax(
                "the participant start time was never set (the game was never loaded)",
            ));
        };
        if event.time < start {
            return Err(ReplayError::syntax(format!(
                "participant start time {start} should be before end time {}",
                event.time
            )));
        }

        match self.phases_started.last() {
            Some(last) if !GAME_INTRO_PHASES.contains(&last.as_str()) => {
                let idx = self.current_phase_index()?;
                self.phases[idx].post(event)?;
            }
            _ => {}
        }

        let first_unstarted = self.current.map_or(0, |idx| idx + 1);
        for phase in self.phases.iter_mut().skip(first_unstarted) {
            phase.post(event)?;
        }
        Ok(())
    }

    /// The active phase.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if no phase is active.
    pub fn current_phase(&self) -> Result<&PhaseStats, ReplayError> {
        let idx = self.current_phase_index()?;
        Ok(&self.phases[idx])
    }

    /// Mutable access to the active phase.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if no phase is active.
    pub fn current_phase_mut(&mut self) -> Result<&mut PhaseStats, ReplayError> {
        let idx = self.current_phase_index()?;
        Ok(&mut self.phases[idx])
    }

    fn current_phase_index(&self) -> Result<usize, ReplayError> {
        if self.phases.is_empty() {
            return Err(ReplayError::syntax("no phases loaded"));
        }
        let idx = self.current.ok_or_else(|| {
            ReplayError::syntax("some phases are loaded, but none of them is active")
        })?;
        if idx >= self.phases.len() {
            return Err(ReplayError::syntax("invalid phase requested"));
        }
        Ok(idx)
    }

    /// Mutable access to the active level of the active phase.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if no phase or level is active.
    pub fn current_level_mut(&mut self) -> Result<&mut LevelStats, ReplayError> {
        self.current_phase_mut()?.current_level_mut()
    }

    /// Total seconds between game load and the last event, `None` before
    /// the replay is finalized.
    ///
    /// # Errors
    ///
    /// Returns a syntax error on inverted timestamps.
    pub fn duration(&self) -> Result<Option<f64>, ReplayError> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => duration_seconds(start, end).map(Some),
            _ => Ok(None),
        }
    }

    /// How often the qualification phase was entered; at least 2 after a
    /// failed qualification.
    #[must_use]
    pub fn quali_iterations(&self) -> usize {
        self.phases_started
            .iter()
            .filter(|name| name.as_str() == PHASE_QUALI)
            .count()
    }

    /// The last occurrence of the named phase (e.g. the final quali run),
    /// matched case-insensitively.
    #[must_use]
    pub fn phase_by_name(&self, name: &str) -> Option<&PhaseStats> {
        self.phases
            .iter()
            .rev()
            .find(|phase| phase.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use indexmap::IndexMap;

    fn record(pairs: &[(&str, &str)], millis: i64) -> EventRecord {
        let fields: IndexMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EventRecord::new(fields, Utc.timestamp_millis_opt(millis).unwrap(), None, 1).unwrap()
    }

    fn test_config() -> Arc<StudyConfig> {
        let yaml = r#"
groups:
  alpha:
    phases: [GameIntro, IntroduceElements, Quali, FinalScene]
    Quali:
      pools: quali
levelLists:
  quali:
    levels:
      - { type: level, name: easy/and1 }
"#;
        Arc::new(serde_yaml::from_str(yaml).unwrap())
    }

    fn assigned() -> Participant {
        let mut participant = Participant::new(test_config(), "cafebabe");
        participant
            .handle_event(&record(
                &[("Event", "Group Assignment"), ("Group", "alpha")],
                500,
            ))
            .unwrap();
        participant
    }

    #[test]
    fn test_group_assignment_builds_outline() {
        let participant = assigned();
        assert_eq!(participant.groups, vec!["alpha"]);
        assert_eq!(participant.phases.len(), 4);
        assert_eq!(participant.phases[2].levels.len(), 1);
        assert!(!participant.is_debug);
    }

    #[test]
    fn test_debug_prefix_is_stripped() {
        let mut participant = Participant::new(test_config(), "p");
        participant.set_group("DebugAlpha").unwrap();
        assert!(participant.is_debug);
        assert_eq!(participant.groups, vec!["alpha"]);
    }

    #[test]
    fn test_unknown_group_is_fatal() {
        let mut participant = Participant::new(test_config(), "p");
        assert!(participant.set_group("gamma").is_err());
    }

    #[test]
    fn test_scene_outline_is_enforced() {
        let mut participant = assigned();
        participant
            .handle_event(&record(
                &[("Event", "change in Scene"), ("Scene", "PreloadScene")],
                1000,
            ))
            .unwrap();

        let err = participant.handle_event(&record(
            &[("Event", "change in Scene"), ("Scene", "Quali")],
            2000,
        ));
        assert!(err.is_err(), "GameIntro must come first");
    }

    #[test]
    fn test_reconnect_positions() {
        let mut participant = assigned();
        let preload = |millis| {
            record(
                &[("Event", "change in Scene"), ("Scene", "PreloadScene")],
                millis,
            )
        };

        participant.handle_event(&preload(1000)).unwrap();
        assert_eq!(participant.reconnects, vec!["Start"]);
        assert_eq!(participant.start_time.unwrap().timestamp_millis(), 1000);

        participant
            .handle_event(&record(
                &[("Event", "change in Scene"), ("Scene", "GameIntro")],
                2000,
            ))
            .unwrap();
        participant.handle_event(&preload(3000)).unwrap();
        assert_eq!(participant.reconnects, vec!["Start", "GameIntro(0)"]);
        assert!(participant.reloaded);
        // The start time keeps its first value
        assert_eq!(participant.start_time.unwrap().timestamp_millis(), 1000);
    }

    #[test]
    fn test_fail_quali_splices_new_phases() {
        let mut participant = assigned();
        participant
            .handle_event(&record(
                &[("Event", "change in Scene"), ("Scene", "PreloadScene")],
                1000,
            ))
            .unwrap();
        for (scene, millis) in [("GameIntro", 2000), ("IntroduceElements", 3000), ("Quali", 4000)]
        {
            participant
                .handle_event(&record(
                    &[("Event", "change in Scene"), ("Scene", scene)],
                    millis,
                ))
                .unwrap();
        }
        participant
            .handle_event(&record(&[("Event", "new Level"), ("Filename", "easy/and1")], 5000))
            .unwrap();
        participant
            .handle_event(&record(&[("Event", "Loaded"), ("Type", "Level")], 6000))
            .unwrap();

        participant
            .handle_event(&record(&[("Event", "Failing first Quali Level")], 7000))
            .unwrap();

        let names: Vec<&str> = participant.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "GameIntro",
                "IntroduceElements",
                "Quali",
                "IntroduceElements",
                "Quali",
                "FinalScene"
            ]
        );
        assert!(participant.phases[3].dynamic);

        // The second quali run can now be entered
        participant
            .handle_event(&record(
                &[("Event", "change in Scene"), ("Scene", "IntroduceElements")],
                8000,
            ))
            .unwrap();
        participant
            .handle_event(&record(
                &[("Event", "change in Scene"), ("Scene", "Quali")],
                9000,
            ))
            .unwrap();
        assert_eq!(participant.quali_iterations(), 2);
    }

    #[test]
    fn test_passing_quali_is_a_nop() {
        let mut participant = assigned();
        participant
            .handle_event(&record(&[("Event", "Passing first Quali Level")], 1000))
            .unwrap();
    }

    #[test]
    fn test_post_requires_game_load() {
        let mut participant = assigned();
        assert!(participant.post(&record(&[("Event", "Redirect")], 1000)).is_err());
    }

    #[test]
    fn test_post_skips_intro_phase_but_finalizes_rest() {
        let mut participant = assigned();
        participant
            .handle_event(&record(
                &[("Event", "change in Scene"), ("Scene", "PreloadScene")],
                1000,
            ))
            .unwrap();
        participant
            .handle_event(&record(
                &[("Event", "change in Scene"), ("Scene", "GameIntro")],
                2000,
            ))
            .unwrap();

        participant.post(&record(&[("Event", "Redirect")], 9000)).unwrap();

        // The log ended inside the intro: its phase stays in progress,
        // everything after is never reached
        assert_eq!(
            participant.phases[0].status,
            crate::replay::phase::PhaseStatus::InProgress
        );
        assert_eq!(
            participant.phases[2].status,
            crate::replay::phase::PhaseStatus::NotReached
        );
        assert_eq!(participant.duration().unwrap(), Some(8.0));
    }
}
