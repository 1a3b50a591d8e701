//! Event classification against an ordered signature table.
//!
//! A signature is a set of key/value pairs that must all be present on a
//! record. Signatures are evaluated in table order with first match wins,
//! so specific signatures (e.g. the preload scene) sit above the general
//! ones they would otherwise shadow.

use crate::parser::EventRecord;

/// Classified event handled by the replay engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `change in Scene` into the preload scene, i.e. a page (re)load
    GameLoaded,
    /// Server assigned the participant to a group
    GroupAssignment,
    /// Participant was redirected at the end of the study
    Redirect,
    /// A new phase scene was requested
    SceneChanged,
    /// Clock synchronisation sample (consumed by the sequencer)
    TimeSync,
    /// Continue button, a no-op in the statistics
    ClickNext,
    /// Server-computed skill score
    SkillAssessment,
    /// Navigation inside the element introduction
    IntroArrow,
    /// The skip-level button, including its consequence marker
    SkipLevel,
    /// The previously delivered level is now shown to the player
    LevelStarted,
    /// A switch in the circuit was toggled
    SwitchClick,
    /// The confirm button was pressed
    ConfirmClick,
    /// The click-feedback dialogue was shown
    FeedbackDialogue,
    /// Drawing overlay: pen stroke
    PenDraw,
    /// Drawing overlay: eraser
    EraserDraw,
    /// Drawing overlay: delete button
    DeleteDraw,
}

struct Signature {
    kind: EventKind,
    required: &'static [(&'static str, &'static str)],
}

/// Ordered signature table. `GameLoaded` must stay above `SceneChanged`
/// and the click variants must carry their discriminating `Object`.
static SIGNATURES: &[Signature] = &[
    Signature {
        kind: EventKind::GameLoaded,
        required: &[("Event", "change in Scene"), ("Scene", "PreloadScene")],
    },
    Signature {
        kind: EventKind::GroupAssignment,
        required: &[("Event", "Group Assignment")],
    },
    Signature {
        kind: EventKind::Redirect,
        required: &[("Event", "Redirect")],
    },
    Signature {
        kind: EventKind::SceneChanged,
        required: &[("Event", "change in Scene")],
    },
    Signature {
        kind: EventKind::TimeSync,
        required: &[("Event", "TimeSync")],
    },
    Signature {
        kind: EventKind::ClickNext,
        required: &[("Event", "Click"), ("Object", "Continue Button")],
    },
    Signature {
        kind: EventKind::SkillAssessment,
        required: &[("Event", "SkillAssessment")],
    },
    Signature {
        kind: EventKind::IntroArrow,
        required: &[("Event", "Click"), ("Object", "Arrow")],
    },
    Signature {
        kind: EventKind::SkipLevel,
        required: &[
            ("Event", "Click"),
            ("Object", "Skip-Level Button"),
            ("Consequence Event", "Current level is being skipped"),
        ],
    },
    Signature {
        kind: EventKind::LevelStarted,
        required: &[("Event", "Loaded")],
    },
    Signature {
        kind: EventKind::SwitchClick,
        required: &[("Event", "Click"), ("Object", "Switch")],
    },
    Signature {
        kind: EventKind::ConfirmClick,
        required: &[("Event", "Click"), ("Object", "ConfirmButton")],
    },
    Signature {
        kind: EventKind::FeedbackDialogue,
        required: &[("Event", "Pop-Up displayed"), ("Content", "Feedback about Clicks")],
    },
    Signature {
        kind: EventKind::PenDraw,
        required: &[("Event", "Used Pen")],
    },
    Signature {
        kind: EventKind::EraserDraw,
        required: &[("Event", "Used drawing tool"), ("Tool", "eraser")],
    },
    Signature {
        kind: EventKind::DeleteDraw,
        required: &[("Event", "Used drawing tool"), ("Tool", "delete button")],
    },
];

/// Matches a record against the signature table, first match wins.
///
/// Returns `None` for events the replay engine does not track (they are
/// silently ignored, unknown events are not an error).
#[must_use]
pub fn classify(record: &EventRecord) -> Option<EventKind> {
    SIGNATURES
        .iter()
        .find(|sig| {
            sig.required
                .iter()
                .all(|(key, value)| record.get(key) == Some(*value))
        })
        .map(|sig| sig.kind)
}
