//! Shared integration-test harness: on-disk study fixtures and helpers
//! for spawning the `studylog` binary.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Study configuration used by most scenarios: an intro, one
/// qualification circuit and the final scene.
pub const STUDY_CONFIG: &str = r#"
groups:
  alpha:
    phases: [GameIntro, Quali, FinalScene]
    Quali:
      pools: quali
  beta:
    phases: [GameIntro, FinalScene]
levelLists:
  quali:
    levels:
      - { type: level, name: easy/and1 }
"#;

/// A complete, valid session of a participant solving the single
/// qualification level.
pub const SOLVED_LOG: &str = "\
§Event: Created Logfile\n§Time: 1000\n§Version: 2.0.4\n§Pseudonym: cafebabe\n\n\
§Event: Group Assignment\n§Server: 1100\n§Group: alpha\n\n\
§Event: change in Scene\n§Time: 2000\n§Scene: PreloadScene\n\n\
§Event: change in Scene\n§Time: 3000\n§Scene: GameIntro\n\n\
§Event: change in Scene\n§Time: 4000\n§Scene: Quali\n\n\
§Event: new Level\n§Time: 5000\n§Filename: easy/and1.txt\n\n\
§Event: Loaded\n§Time: 6000\n§Type: Level\n\n\
§Event: Click\n§Time: 7000\n§Object: Switch\n§Switch ID: 1\n\n\
§Event: Click\n§Time: 8000\n§Object: ConfirmButton\n§Level Solved: 1\n\n\
§Event: Pop-Up displayed\n§Time: 9000\n§Content: Feedback about Clicks\n§Nmbr Switch Clicks: 1\n§Optimum Switch Clicks: 1\n§Nmbr Confirm Clicks: 1\n\n\
§Event: change in Scene\n§Time: 10000\n§Scene: FinalScene\n\n\
§Event: Redirect\n§Server: 11000\n\n";

/// An on-disk study fixture: a config file and a log directory.
pub struct StudyFixture {
    dir: TempDir,
}

impl StudyFixture {
    /// Creates a fresh fixture with the default study configuration.
    pub fn new() -> Self {
        Self::with_config(STUDY_CONFIG)
    }

    /// Creates a fresh fixture with a custom study configuration.
    pub fn with_config(config: &str) -> Self {
        let dir = TempDir::new().expect("failed to create fixture dir");
        fs::create_dir(dir.path().join("logs")).expect("failed to create log dir");
        fs::write(dir.path().join("study.yaml"), config).expect("failed to write config");
        Self { dir }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("study.yaml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join("out.csv")
    }

    /// Writes a participant log named `logFile_<pseudonym>.txt`.
    pub fn write_log(&self, pseudonym: &str, content: &str) -> PathBuf {
        let path = self.log_dir().join(format!("logFile_{pseudonym}.txt"));
        fs::write(&path, content).expect("failed to write log fixture");
        path
    }

    /// Writes an arbitrary file into the log directory.
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.log_dir().join(name);
        fs::write(&path, content).expect("failed to write fixture");
        path
    }
}

/// Runs the `studylog` binary with the given arguments.
pub fn spawn_command(args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_studylog");
    Command::new(bin)
        .args(args)
        .output()
        .expect("failed to spawn studylog")
}

/// Path helper for string arguments.
pub fn arg(path: &Path) -> &str {
    path.to_str().expect("non-UTF-8 fixture path")
}
