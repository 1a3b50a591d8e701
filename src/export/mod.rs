//! Flattened per-participant CSV export.
//!
//! Every participant becomes one row; the column set is the union over
//! all rows (participants differ in phase outlines), missing cells stay
//! empty. Booleans render `Yes`/`No`, missing numerics `NaN`, statuses
//! use the legacy vocabulary.

use std::fs;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};

use crate::error::{ReplayError, StudylogError};
use crate::replay::{Participant, PhaseStats};

pub const TABLE_TRUE: &str = "Yes";
pub const TABLE_FALSE: &str = "No";
pub const TABLE_NAN: &str = "NaN";
pub const DELIMITER: char = ',';

/// Flattens one participant into an ordered column → value map.
///
/// Repeated phases (e.g. a second qualification run) are disambiguated
/// with an occurrence suffix, `Quali#2`.
///
/// # Errors
///
/// Propagates timestamp inversions and score calculation failures.
pub fn participant_row(
    participant: &Participant,
) -> Result<IndexMap<String, String>, ReplayError> {
    let mut row = IndexMap::new();

    row.insert("Pseudonym".to_string(), participant.pseudonym.clone());
    row.insert("Groups".to_string(), participant.groups.join("+"));
    row.insert("Debug".to_string(), render_flag(participant.is_debug));
    row.insert("Events".to_string(), participant.num_events.to_string());

    let reconnects = participant
        .reconnects
        .iter()
        .filter(|position| position.as_str() != "Start")
        .count();
    row.insert("Reconnects".to_string(), reconnects.to_string());

    row.insert(
        "Start".to_string(),
        participant
            .start_time
            .map_or_else(|| TABLE_NAN.to_string(), |t| t.to_rfc3339()),
    );
    row.insert(
        "End".to_string(),
        participant
            .end_time
            .map_or_else(|| TABLE_NAN.to_string(), |t| t.to_rfc3339()),
    );
    row.insert(
        "Duration [s]".to_string(),
        render_seconds(participant.duration()?),
    );
    row.insert(
        "Quali Iterations".to_string(),
        participant.quali_iterations().to_string(),
    );

    let mut seen: IndexMap<&str, usize> = IndexMap::new();
    for phase in &participant.phases {
        let occurrence = seen.entry(phase.name.as_str()).or_insert(0);
        *occurrence += 1;
        let label = if *occurrence > 1 {
            format!("{}#{occurrence}", phase.display_name())
        } else {
            phase.display_name().to_string()
        };
        phase_columns(&mut row, &label, phase)?;
    }

    Ok(row)
}

fn phase_columns(
    row: &mut IndexMap<String, String>,
    label: &str,
    phase: &PhaseStats,
) -> Result<(), ReplayError> {
    row.insert(format!("{label} Status"), phase.status.as_str().to_string());
    row.insert(
        format!("{label} Duration [s]"),
        render_seconds(phase.duration()?),
    );

    if phase.name == "Skill" {
        row.insert(
            format!("{label} Score"),
            phase.calculate_score()?.to_string(),
        );
        row.insert(
            format!("{label} Self Assessment"),
            phase
                .skill
                .map_or_else(|| TABLE_NAN.to_string(), |score| score.to_string()),
        );
    }

    for level in phase.tasks() {
        let prefix = format!("{label}.{}", level.name);
        row.insert(
            format!("{prefix} Status"),
            level.status.as_str().to_string(),
        );
        row.insert(
            format!("{prefix} Position"),
            level
                .position
                .map_or_else(|| TABLE_NAN.to_string(), |p| p.to_string()),
        );
        row.insert(
            format!("{prefix} Switch Clicks"),
            level.switch_clicks.to_string(),
        );
        row.insert(
            format!("{prefix} Confirm Clicks"),
            level.confirm_clicks.to_string(),
        );
        row.insert(
            format!("{prefix} Min Switch Clicks"),
            level
                .min_switch_clicks
                .map_or_else(|| TABLE_NAN.to_string(), |m| m.to_string()),
        );
        row.insert(format!("{prefix} Drawn"), level.drawn.to_string());
        row.insert(
            format!("{prefix} Time [s]"),
            render_seconds(level.duration(false)?),
        );
        row.insert(
            format!("{prefix} First Try Time [s]"),
            render_seconds(level.duration(true)?),
        );
        row.insert(format!("{prefix} IES"), render_seconds(level.ies(false)?));
        row.insert(
            format!("{prefix} First Try IES"),
            render_seconds(level.ies(true)?),
        );
    }
    Ok(())
}

/// Renders all participants as one CSV document.
///
/// # Errors
///
/// Propagates row flattening failures.
pub fn render_csv(participants: &[Participant]) -> Result<String, ReplayError> {
    let rows: Vec<IndexMap<String, String>> = participants
        .iter()
        .map(participant_row)
        .collect::<Result<_, _>>()?;

    let mut columns: IndexSet<&str> = IndexSet::new();
    for row in &rows {
        for column in row.keys() {
            columns.insert(column.as_str());
        }
    }

    let mut out = String::new();
    append_record(&mut out, columns.iter().copied());
    for row in &rows {
        append_record(
            &mut out,
            columns
                .iter()
                .map(|column| row.get(*column).map_or("", String::as_str)),
        );
    }
    Ok(out)
}

/// Writes the CSV for a batch of participants to disk.
///
/// # Errors
///
/// Propagates flattening failures and I/O errors.
pub fn write_csv(path: &Path, participants: &[Participant]) -> Result<(), StudylogError> {
    let csv = render_csv(participants).map_err(StudylogError::Replay)?;
    fs::write(path, csv)?;
    Ok(())
}

fn append_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(DELIMITER);
        }
        first = false;
        push_escaped(out, field);
    }
    out.push('\n');
}

fn push_escaped(out: &mut String, field: &str) {
    if field.contains(DELIMITER) || field.contains('"') || field.contains('\n') {
        out.push('"');
        for c in field.chars() {
            if c == '"' {
                out.push('"');
            }
            out.push(c);
        }
        out.push('"');
    } else {
        out.push_str(field);
    }
}

fn render_flag(value: bool) -> String {
    if value { TABLE_TRUE } else { TABLE_FALSE }.to_string()
}

fn render_seconds(value: Option<f64>) -> String {
    value.map_or_else(|| TABLE_NAN.to_string(), |secs| format!("{secs:.3}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::StudyConfig;
    use crate::parser::parse_log;
    use crate::replay::replay;
    use crate::sequencer::Sequencer;

    fn solved_participant() -> Participant {
        let yaml = r#"
groups:
  alpha:
    phases: [GameIntro, Quali, FinalScene]
    Quali:
      pools: quali
levelLists:
  quali:
    levels:
      - { type: level, name: easy/and1 }
"#;
        let config: Arc<StudyConfig> = Arc::new(serde_yaml::from_str(yaml).unwrap());

        let log = "\
§Event: Created Logfile\n§Time: 1000\n§Pseudonym: cafebabe\n\n\
§Event: Group Assignment\n§Server: 1100\n§Group: alpha\n\n\
§Event: change in Scene\n§Time: 2000\n§Scene: PreloadScene\n\n\
§Event: change in Scene\n§Time: 3000\n§Scene: GameIntro\n\n\
§Event: change in Scene\n§Time: 4000\n§Scene: Quali\n\n\
§Event: new Level\n§Time: 5000\n§Filename: easy/and1\n\n\
§Event: Loaded\n§Time: 6000\n§Type: Level\n\n\
§Event: Click\n§Time: 7000\n§Object: Switch\n§Switch ID: 1\n\n\
§Event: Click\n§Time: 8000\n§Object: ConfirmButton\n§Level Solved: 1\n\n\
§Event: Pop-Up displayed\n§Time: 9000\n§Content: Feedback about Clicks\n§Nmbr Switch Clicks: 1\n§Optimum Switch Clicks: 1\n§Nmbr Confirm Clicks: 1\n\n\
§Event: change in Scene\n§Time: 10000\n§Scene: FinalScene\n\n\
§Event: Redirect\n§Server: 11000\n\n";

        let records = parse_log(log.lines()).unwrap();
        let sequenced = Sequencer::default().sequence(records, "cafebabe").unwrap();
        replay(config, sequenced.records, "cafebabe").unwrap()
    }

    #[test]
    fn test_row_content() {
        let participant = solved_participant();
        let row = participant_row(&participant).unwrap();

        assert_eq!(row["Pseudonym"], "cafebabe");
        assert_eq!(row["Groups"], "alpha");
        assert_eq!(row["Debug"], "No");
        assert_eq!(row["Reconnects"], "0");
        assert_eq!(row["Quali Iterations"], "1");
        assert_eq!(row["Quali Status"], "Solved");
        assert_eq!(row["Quali.easy/and1 Status"], "Solved");
        assert_eq!(row["Quali.easy/and1 Switch Clicks"], "1");
        assert_eq!(row["Quali.easy/and1 Min Switch Clicks"], "1");
        // 6s..9s, minimal clicks, one confirm: IES = 3 / (1/1) = 3
        assert_eq!(row["Quali.easy/and1 IES"], "3.000");
    }

    #[test]
    fn test_csv_union_of_columns() {
        let participant = solved_participant();
        let csv = render_csv(std::slice::from_ref(&participant)).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        let row = lines.next().unwrap();

        assert!(header.starts_with("Pseudonym,Groups,Debug"));
        assert!(header.contains("Quali.easy/and1 IES"));
        assert_eq!(
            header.split(DELIMITER).count(),
            row.split(DELIMITER).count()
        );
        assert!(row.contains("cafebabe"));
    }

    #[test]
    fn test_csv_escaping() {
        let mut out = String::new();
        push_escaped(&mut out, "a,b");
        assert_eq!(out, "\"a,b\"");

        let mut out = String::new();
        push_escaped(&mut out, "say \"hi\"");
        assert_eq!(out, "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_nan_rendering() {
        assert_eq!(render_seconds(None), "NaN");
        assert_eq!(render_seconds(Some(1.5)), "1.500");
    }
}
