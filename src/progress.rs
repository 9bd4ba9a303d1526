//! Stage progress reporting.
//!
//! Reports observable progress while a run is working through its stages so
//! users see how much is left. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts. Reporting is purely advisory; no pipeline
//! behavior depends on it.

use std::io::Write;

/// A single progress event. Events fire when a stage starts (nothing
/// completed yet), after each completed unit, and when the stage finishes.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    StageStarted {
        stage: String,
        total: u64,
    },
    UnitCompleted {
        stage: String,
        completed: u64,
        total: u64,
    },
    StageFinished {
        stage: String,
        total: u64,
    },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "coding  3 / 9 documents".
pub struct HumanProgress;

impl ProgressReporter for HumanProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::StageStarted { stage, total } => {
                format!("{}  starting  {} units\n", stage, total)
            }
            ProgressEvent::UnitCompleted {
                stage,
                completed,
                total,
            } => {
                format!("{}  {} / {} units\n", stage, completed, total)
            }
            ProgressEvent::StageFinished { stage, total } => {
                format!("{}  done  {} units\n", stage, total)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::StageStarted { stage, total } => serde_json::json!({
                "event": "stage_started",
                "stage": stage,
                "completed": 0,
                "total": total
            }),
            ProgressEvent::UnitCompleted {
                stage,
                completed,
                total,
            } => serde_json::json!({
                "event": "unit_completed",
                "stage": stage,
                "completed": completed,
                "total": total
            }),
            ProgressEvent::StageFinished { stage, total } => serde_json::json!({
                "event": "stage_finished",
                "stage": stage,
                "completed": total,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(HumanProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
