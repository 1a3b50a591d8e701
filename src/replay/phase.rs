//! Per-phase state machine.
//!
//! A phase owns the expected list of levels built from the study
//! configuration and advances through it as the log delivers slides.
//! Tutorials and special slides can be spliced in dynamically, info
//! slides may be skipped ahead over (level pools can hold more slides
//! than a participant sees), and circuit levels are matched by name
//! because their order is randomized per participant.

use chrono::{DateTime, Utc};

use crate::config::{GroupConfig, StudyConfig};
use crate::error::ReplayError;
use crate::parser::EventRecord;
use crate::parser::record::{duration_seconds, events, keys};
use crate::replay::level::{LevelStats, LevelStatus};

/// Phases that carry a level list.
pub const PHASES_WITH_LEVELS: &[&str] = &["Quali", "Competition", "Skill"];

/// Intro phases whose end is not marked by a scene change; the final
/// `post` skips them.
pub const GAME_INTRO_PHASES: &[&str] = &["GameIntro", "GameIntroND"];

const PHASE_QUALI: &str = "Quali";
const PHASE_SKILL: &str = "Skill";
const PHASE_ELEMENT_INTRO: &str = "IntroduceElements";
const PHASE_DRAW_TOOLS: &str = "IntroduceDrawingTools";
const PHASE_FINAL_SCENE: &str = "FinalScene";

/// Difficulty folder weights for the skill score.
const SKILL_POINTS: &[(&str, u32)] = &[("low", 1), ("medium", 4), ("high", 8), ("guru", 12)];

/// Phase lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    NotStarted,
    InProgress,
    Solved,
    Aborted,
    Failed,
    NotReached,
}

impl PhaseStatus {
    /// Legacy CSV spelling of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::InProgress => "In Progress",
            Self::Solved => "Solved",
            Self::Aborted => "Aborted",
            Self::Failed => "Failed",
            Self::NotReached => "Never reached",
        }
    }
}

/// Replay state and statistics of a single phase.
#[derive(Debug, Clone)]
pub struct PhaseStats {
    /// Scene name as it appears in the log (`GameIntroND`, not the
    /// display name)
    pub name: String,
    pub status: PhaseStatus,
    /// Expected slides, in config order, plus dynamic insertions
    pub levels: Vec<LevelStats>,
    /// Index of the active level
    current: Option<usize>,
    /// Next slot in the expected level list
    level_counter: usize,
    /// Position counter for tasks only (order is randomized per player)
    level_pos: usize,
    /// True if this phase was spliced in by an event instead of being
    /// part of the configured outline
    pub dynamic: bool,
    pub switch_clicks: u32,
    pub confirm_clicks: u32,
    pub drawn: u32,
    /// Server-computed skill score, only on the skill phase
    pub skill: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl PhaseStats {
    /// Creates a phase, building the expected level list from the group
    /// configuration when the phase carries levels.
    ///
    /// # Errors
    ///
    /// Returns a syntax error when the configured level pools cannot be
    /// resolved.
    pub fn new(
        name: &str,
        config: &StudyConfig,
        group: &GroupConfig,
        dynamic: bool,
    ) -> Result<Self, ReplayError> {
        let mut levels = Vec::new();
        if PHASES_WITH_LEVELS.contains(&name) {
            for (kind, level_name) in config.possible_levels(group, name)? {
                levels.push(LevelStats::new(&kind, level_name)?);
            }
        }

        Ok(Self {
            name: name.to_string(),
            status: PhaseStatus::NotStarted,
            levels,
            current: None,
            level_counter: 0,
            level_pos: 0,
            dynamic,
            switch_clicks: 0,
            confirm_clicks: 0,
            drawn: 0,
            skill: None,
            start_time: None,
            end_time: None,
        })
    }

    #[must_use]
    pub fn has_levels(&self) -> bool {
        PHASES_WITH_LEVELS.contains(&self.name.as_str())
    }

    /// True once the phase was entered.
    #[must_use]
    pub fn started(&self) -> bool {
        !matches!(self.status, PhaseStatus::NotStarted | PhaseStatus::NotReached)
    }

    /// Display name for the CSV; the no-drawing and NPS scene variants
    /// fold into their base names.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self.name.as_str() {
            "GameIntroND" => "GameIntro",
            "FinalSceneNPS" => PHASE_FINAL_SCENE,
            other => other,
        }
    }

    /// The currently active level.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if this phase has no levels or none is
    /// active yet.
    pub fn current_level(&self) -> Result<&LevelStats, ReplayError> {
        let idx = self.current_index()?;
        Ok(&self.levels[idx])
    }

    /// Mutable access to the currently active level.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::current_level`].
    pub fn current_level_mut(&mut self) -> Result<&mut LevelStats, ReplayError> {
        let idx = self.current_index()?;
        Ok(&mut self.levels[idx])
    }

    fn current_index(&self) -> Result<usize, ReplayError> {
        if !self.has_levels() {
            return Err(ReplayError::syntax(format!(
                "the phase {} has no levels by design",
                self.name
            )));
        }
        if self.levels.is_empty() {
            return Err(ReplayError::syntax(format!(
                "no levels were loaded for {}",
                self.name
            )));
        }
        self.current.ok_or_else(|| {
            ReplayError::syntax(format!("no level is active in phase {}", self.name))
        })
    }

    /// The scene for this phase was entered.
    ///
    /// # Errors
    ///
    /// Returns an internal error on a scene name mismatch; the caller
    /// validates the name before starting the phase.
    pub fn on_start(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        let scene = event.require("Scene")?;
        if scene != self.name {
            return Err(ReplayError::internal(format!(
                "started the wrong scene, expected {}, got {scene}",
                self.name
            )));
        }

        self.status = PhaseStatus::InProgress;
        self.start_time = Some(event.time);
        Ok(())
    }

    /// A `new <Type>` event delivered the next slide.
    ///
    /// Resolution order: dynamic tutorial/special splice when the type
    /// does not match the expected slot, forward scan for info slides
    /// (pools may hold more than is shown), name search for circuit
    /// levels, positional name check otherwise.
    ///
    /// # Errors
    ///
    /// Returns a syntax error when the slide cannot be matched against
    /// the expected list.
    pub fn on_level_requested(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        let filename = event.require(keys::FILENAME)?.to_string();
        let requested = event
            .event()
            .strip_prefix(events::LEVEL_REQUESTED_PREFIX)
            .unwrap_or_default()
            .trim()
            .to_string();

        if self.level_counter >= self.levels.len() {
            return Err(ReplayError::syntax(format!(
                "reached end of phase, but another level was requested: {filename}"
            )));
        }

        let expected = self.levels[self.level_counter].kind.wire_name();
        if requested != expected {
            match requested.as_str() {
                // Tutorials and special slides get inserted dynamically
                "Tutorial" => {
                    let slide = LevelStats::new("tutorial", &filename)?;
                    self.levels.insert(self.level_counter, slide);
                }
                "Special" => {
                    let slide = LevelStats::new("special", &filename)?;
                    self.levels.insert(self.level_counter, slide);
                }
                // The pool may hold more slides than the participant
                // sees; skip ahead to the next info slide
                "Info" => loop {
                    if self.levels[self.level_counter].kind.wire_name() == requested {
                        break;
                    }
                    self.level_counter += 1;
                    if self.level_counter >= self.levels.len() {
                        return Err(ReplayError::syntax(format!(
                            "unable to find a slide of type {requested} until the end of the phase"
                        )));
                    }
                },
                _ => {
                    return Err(ReplayError::syntax(format!(
                        "expected slide of type {expected}, got {requested} in {}",
                        self.name
                    )));
                }
            }
        }

        // Circuit order is randomized per participant, search by name;
        // everything else must sit at the expected position
        let next = if matches!(requested.as_str(), "Level" | "Tutorial") {
            self.levels
                .iter()
                .position(|level| level.name == filename)
                .ok_or_else(|| {
                    ReplayError::syntax(format!(
                        "could not find a level with the name {filename} in the expected level list"
                    ))
                })?
        } else {
            if self.levels[self.level_counter].name != filename {
                return Err(ReplayError::syntax(format!(
                    "level {filename} was not expected"
                )));
            }
            self.level_counter
        };

        self.next_level(event, next)
    }

    /// Finishes the active level and activates `next`.
    fn next_level(&mut self, event: &EventRecord, next: usize) -> Result<(), ReplayError> {
        if self.current.is_some() {
            self.current_level_mut()?.post(Some(event));
        }

        self.current = Some(next);
        let pos = self.level_pos;
        self.levels[next].on_load(pos)?;
        self.level_counter += 1;

        if self.levels[next].is_task() {
            self.level_pos += 1;
        }
        Ok(())
    }

    /// The participant failed the qualification; fails the active level
    /// and finalizes the phase.
    ///
    /// # Errors
    ///
    /// Returns a syntax error outside the qualification phase.
    pub fn on_fail_quali(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if self.name != PHASE_QUALI {
            return Err(ReplayError::syntax(format!(
                "failed quali found in log, but current scene is: {}",
                self.name
            )));
        }

        self.current_level_mut()?.on_fail(event)?;
        self.status = PhaseStatus::Failed;
        self.post(event)
    }

    /// A switch was toggled somewhere in this phase.
    ///
    /// The two intro phases show standalone circuits that do not belong
    /// to a level; their clicks only count at phase granularity.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if a level-circuit click shows up in an
    /// intro phase, or from the level state machine.
    pub fn on_switch_click(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        self.switch_clicks += 1;

        if matches!(self.name.as_str(), PHASE_DRAW_TOOLS | PHASE_ELEMENT_INTRO) {
            if event.get("Switch ID").is_some() {
                return Err(ReplayError::syntax(format!(
                    "missing attrib solvingState for non level switch click in phase {}",
                    self.name
                )));
            }
            Ok(())
        } else {
            self.current_level_mut()?.on_switch_click(event)
        }
    }

    /// The confirm button was pressed in the active level.
    ///
    /// # Errors
    ///
    /// Propagates the level state machine errors.
    pub fn on_confirm_click(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        self.confirm_clicks += 1;
        self.current_level_mut()?.on_confirm_click(event)
    }

    /// A drawing tool was used; the drawing intro has no active level.
    ///
    /// # Errors
    ///
    /// Propagates the level state machine errors.
    pub fn on_interaction_drawing(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        self.drawn += 1;

        if self.name == PHASE_DRAW_TOOLS {
            return Ok(());
        }
        self.current_level_mut()?.on_interaction_drawing(event)
    }

    /// The server announced the participant's skill score.
    ///
    /// # Errors
    ///
    /// Returns a syntax error outside the skill phase or on a broken
    /// score value.
    pub fn on_skill_assessment(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if self.name != PHASE_SKILL {
            return Err(ReplayError::syntax(format!(
                "expected phase SkillAssessment, got {}",
                self.name
            )));
        }

        let raw = event.require("Score")?;
        let score: i64 = raw.trim().parse().map_err(|_| {
            ReplayError::syntax(format!("'{raw}' is not a valid skill score"))
        })?;
        self.skill = Some(score);
        Ok(())
    }

    /// Navigation inside the element introduction.
    ///
    /// # Errors
    ///
    /// Returns a syntax error in any other phase.
    pub fn on_intro_arrow(&mut self) -> Result<(), ReplayError> {
        if self.name != PHASE_ELEMENT_INTRO {
            return Err(ReplayError::syntax(
                "intro navigation outside of IntroduceElements",
            ));
        }
        Ok(())
    }

    /// The page was reloaded while this phase was active.
    pub fn on_page_reload(&mut self) {
        if self.has_levels() {
            if let Some(idx) = self.current {
                self.levels[idx].on_page_reload();
            }
        }
    }

    /// Finalizes the phase: folds the status, terminates all levels and
    /// records the end time.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if a started level phase never loaded a
    /// level, or on inverted phase timestamps (tolerated on the final
    /// scene where redirect timing is imprecise).
    pub fn post(&mut self, event: &EventRecord) -> Result<(), ReplayError> {
        if self.status == PhaseStatus::NotStarted {
            self.status = PhaseStatus::NotReached;
        } else if self.status == PhaseStatus::InProgress {
            self.status = PhaseStatus::Solved;
            for level in &self.levels {
                if !matches!(level.status, LevelStatus::Solved | LevelStatus::Skipped) {
                    self.status = PhaseStatus::Aborted;
                    break;
                }
            }
        }

        if self.has_levels() {
            if self.current.is_none() && self.status != PhaseStatus::NotReached {
                return Err(ReplayError::syntax(format!(
                    "ending phase with levels, but no level was ever loaded {}",
                    self.name
                )));
            }

            // The active level gets the event so its unload time is set;
            // posting a level twice is harmless
            if self.current.is_some() {
                self.current_level_mut()?.post(Some(event));
            }
            for level in &mut self.levels {
                level.post(None);
            }
        }

        if self.status != PhaseStatus::NotReached {
            self.end_time = Some(event.time);

            if let Some(start) = self.start_time {
                // Redirect and game-over timing on the final scene is
                // imprecise, tolerate inverted timestamps there
                if event.time < start && self.display_name() != PHASE_FINAL_SCENE {
                    return Err(ReplayError::syntax(format!(
                        "phase start time {start} should be before {}",
                        event.time
                    )));
                }
            }
        }
        Ok(())
    }

    /// Seconds spent in this phase, `None` if it was never reached.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a finished phase lacks timestamps.
    pub fn duration(&self) -> Result<Option<f64>, ReplayError> {
        if matches!(self.status, PhaseStatus::NotReached | PhaseStatus::NotStarted) {
            return Ok(None);
        }
        let (Some(start), Some(end)) = (self.start_time, self.end_time) else {
            return Err(ReplayError::internal(format!(
                "phase {} is {} but has no timestamps",
                self.name,
                self.status.as_str()
            )));
        };
        if end < start {
            // Only possible on the final scene, where post tolerates it
            return Ok(Some(0.0));
        }
        duration_seconds(start, end).map(Some)
    }

    /// Difficulty-weighted points over time for first-attempt correct
    /// solutions: tasks solved with a single confirm click score
    /// `100 * weight / max(seconds, 1)`, where the weight comes from the
    /// difficulty folder of the level file. Unknown folders score zero.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a solved level lacks timestamps.
    pub fn calculate_score(&self) -> Result<i64, ReplayError> {
        let mut score = 0.0_f64;

        for level in &self.levels {
            if !(level.is_task() && level.confirm_clicks == 1 && level.is_solved()) {
                continue;
            }
            let Some(secs) = level.duration(false)? else {
                continue;
            };

            let folder = level.name.split('/').next().unwrap_or_default();
            let points = SKILL_POINTS
                .iter()
                .find(|(name, _)| *name == folder)
                .map_or(0, |(_, points)| *points);

            score += 100.0 * f64::from(points) / secs.max(1.0);
        }

        #[allow(clippy::cast_possible_truncation)]
        Ok(score.round() as i64)
    }

    /// Tasks of this phase, in expected-list order.
    pub fn tasks(&self) -> impl Iterator<Item = &LevelStats> {
        self.levels.iter().filter(|level| level.is_task())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StudyConfig;
    use chrono::TimeZone;
    use indexmap::IndexMap;

    fn record(pairs: &[(&str, &str)], millis: i64) -> EventRecord {
        let fields: IndexMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EventRecord::new(fields, Utc.timestamp_millis_opt(millis).unwrap(), None, 1).unwrap()
    }

    fn test_config() -> StudyConfig {
        let yaml = r#"
groups:
  alpha:
    phases: [IntroduceElements, Quali, Competition, FinalScene]
    Quali:
      pools: quali
    Competition:
      pools: [comp]
levelLists:
  quali:
    levels:
      - { type: info, name: welcome }
      - { type: level, name: easy/and1 }
      - { type: level, name: easy/or1 }
  comp:
    levels:
      - { type: level, name: medium/and4 }
      - { type: level, name: high/xor2 }
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    fn quali_phase() -> PhaseStats {
        let config = test_config();
        let group = config.group("alpha").unwrap().clone();
        PhaseStats::new("Quali", &config, &group, false).unwrap()
    }

    fn start(phase: &mut PhaseStats, millis: i64) {
        let scene = phase.name.clone();
        phase
            .on_start(&record(&[("Event", "change in Scene"), ("Scene", &scene)], millis))
            .unwrap();
    }

    #[test]
    fn test_levels_built_from_config() {
        let phase = quali_phase();
        assert_eq!(phase.levels.len(), 3);
        assert_eq!(phase.levels[0].name, "welcome");
        assert_eq!(phase.levels[1].name, "easy/and1");
    }

    #[test]
    fn test_display_name_remap() {
        let config = test_config();
        let group = config.group("alpha").unwrap().clone();
        let mut phase = PhaseStats::new("GameIntroND", &config, &group, false).unwrap();
        assert_eq!(phase.display_name(), "GameIntro");
        phase.name = "FinalSceneNPS".to_string();
        assert_eq!(phase.display_name(), "FinalScene");
    }

    #[test]
    fn test_level_requested_in_order() {
        let mut phase = quali_phase();
        start(&mut phase, 1000);

        phase
            .on_level_requested(&record(
                &[("Event", "new Info"), ("Filename", "welcome")],
                2000,
            ))
            .unwrap();
        assert_eq!(phase.current_level().unwrap().name, "welcome");

        phase
            .on_level_requested(&record(
                &[("Event", "new Level"), ("Filename", "easy/and1")],
                3000,
            ))
            .unwrap();
        assert_eq!(phase.current_level().unwrap().name, "easy/and1");
        // Tasks count positions separately from info slides
        assert_eq!(phase.current_level().unwrap().position, Some(0));
    }

    #[test]
    fn test_shuffled_levels_found_by_name() {
        let mut phase = quali_phase();
        start(&mut phase, 1000);
        phase
            .on_level_requested(&record(
                &[("Event", "new Info"), ("Filename", "welcome")],
                2000,
            ))
            .unwrap();

        // The second circuit arrives first: shuffle is on
        phase
            .on_level_requested(&record(
                &[("Event", "new Level"), ("Filename", "easy/or1")],
                3000,
            ))
            .unwrap();
        assert_eq!(phase.current_level().unwrap().name, "easy/or1");
    }

    #[test]
    fn test_dynamic_tutorial_splice() {
        let mut phase = quali_phase();
        start(&mut phase, 1000);
        phase
            .on_level_requested(&record(
                &[("Event", "new Info"), ("Filename", "welcome")],
                2000,
            ))
            .unwrap();

        phase
            .on_level_requested(&record(
                &[("Event", "new Tutorial"), ("Filename", "covert")],
                3000,
            ))
            .unwrap();
        assert_eq!(phase.levels.len(), 4);
        assert_eq!(phase.current_level().unwrap().name, "covert");
    }

    #[test]
    fn test_unexpected_slide_type_is_fatal() {
        let mut phase = quali_phase();
        start(&mut phase, 1000);
        let err = phase.on_level_requested(&record(
            &[("Event", "new AltTask"), ("Filename", "welcome")],
            2000,
        ));
        assert!(err.is_err());
    }

    #[test]
    fn test_request_past_end_of_phase_is_fatal() {
        let mut phase = quali_phase();
        start(&mut phase, 1000);
        phase.level_counter = phase.levels.len();
        let err = phase.on_level_requested(&record(
            &[("Event", "new Level"), ("Filename", "easy/and1")],
            2000,
        ));
        assert!(err.is_err());
    }

    #[test]
    fn test_intro_phase_switch_clicks_stay_on_phase() {
        let config = test_config();
        let group = config.group("alpha").unwrap().clone();
        let mut intro = PhaseStats::new(PHASE_ELEMENT_INTRO, &config, &group, false).unwrap();
        start(&mut intro, 1000);

        intro
            .on_switch_click(&record(&[("Event", "Click"), ("Object", "Switch")], 2000))
            .unwrap();
        assert_eq!(intro.switch_clicks, 1);

        // A level-circuit click payload inside the intro is fatal
        let err = intro.on_switch_click(&record(
            &[("Event", "Click"), ("Object", "Switch"), ("Switch ID", "2")],
            3000,
        ));
        assert!(err.is_err());
    }

    #[test]
    fn test_skill_assessment_only_in_skill_phase() {
        let mut phase = quali_phase();
        start(&mut phase, 1000);
        let err = phase.on_skill_assessment(&record(
            &[("Event", "SkillAssessment"), ("Score", "250")],
            2000,
        ));
        assert!(err.is_err());
    }

    #[test]
    fn test_post_folds_statuses() {
        let mut phase = quali_phase();
        let last = record(&[("Event", "Redirect")], 9000);

        // Never entered
        let mut unreached = phase.clone();
        unreached.post(&last).unwrap();
        assert_eq!(unreached.status, PhaseStatus::NotReached);
        assert!(unreached.end_time.is_none());

        // Entered but quit with an unfinished level
        start(&mut phase, 1000);
        phase
            .on_level_requested(&record(
                &[("Event", "new Info"), ("Filename", "welcome")],
                2000,
            ))
            .unwrap();
        phase.post(&last).unwrap();
        assert_eq!(phase.status, PhaseStatus::Aborted);
        assert_eq!(phase.levels[1].status, LevelStatus::NotReached);
    }

    #[test]
    fn test_post_started_without_level_is_fatal() {
        let mut phase = quali_phase();
        start(&mut phase, 1000);
        assert!(phase.post(&record(&[("Event", "Redirect")], 9000)).is_err());
    }

    #[test]
    fn test_fail_quali_outside_quali_is_fatal() {
        let config = test_config();
        let group = config.group("alpha").unwrap().clone();
        let mut comp = PhaseStats::new("Competition", &config, &group, false).unwrap();
        start(&mut comp, 1000);
        let err = comp.on_fail_quali(&record(&[("Event", "Failing first Quali Level")], 2000));
        assert!(err.is_err());
    }

    #[test]
    fn test_skill_score() {
        let config = test_config();
        let group = config.group("alpha").unwrap().clone();
        let mut phase = PhaseStats::new("Competition", &config, &group, false).unwrap();
        start(&mut phase, 0);

        // medium/and4 solved first try in 8s, high/xor2 in 4s:
        // 100*4/8 + 100*8/4 = 50 + 200 = 250
        for (idx, (start_ms, end_ms)) in
            [(1_000_i64, 9_000_i64), (10_000, 14_000)].iter().enumerate()
        {
            let level = &mut phase.levels[idx];
            level.on_load(idx).unwrap();
            level
                .on_start(&record(&[("Event", "Loaded"), ("Type", "Level")], *start_ms))
                .unwrap();
            level
                .on_confirm_click(&record(
                    &[("Event", "Click"), ("Object", "ConfirmButton"), ("Level Solved", "1")],
                    *end_ms,
                ))
                .unwrap();
            level.end_time = Some(Utc.timestamp_millis_opt(*end_ms).unwrap());
        }

        assert_eq!(phase.calculate_score().unwrap(), 250);
    }

    #[test]
    fn test_skill_score_unknown_folder_is_zero() {
        let config = test_config();
        let group = config.group("alpha").unwrap().clone();
        let mut phase = PhaseStats::new("Quali", &config, &group, false).unwrap();
        start(&mut phase, 0);

        let level = &mut phase.levels[1]; // easy/and1, unknown folder
        level.on_load(0).unwrap();
        level
            .on_start(&record(&[("Event", "Loaded"), ("Type", "Level")], 1000))
            .unwrap();
        level
            .on_confirm_click(&record(
                &[("Event", "Click"), ("Object", "ConfirmButton"), ("Level Solved", "1")],
                5000,
            ))
            .unwrap();
        level.end_time = Some(Utc.timestamp_millis_opt(5000).unwrap());

        assert_eq!(phase.calculate_score().unwrap(), 0);
    }

    #[test]
    fn test_final_scene_tolerates_inverted_times() {
        let config = test_config();
        let group = config.group("alpha").unwrap().clone();
        let mut scene = PhaseStats::new(PHASE_FINAL_SCENE, &config, &group, false).unwrap();
        start(&mut scene, 10_000);
        scene.post(&record(&[("Event", "Redirect")], 9000)).unwrap();
        assert_eq!(scene.duration().unwrap(), Some(0.0));
    }
}
