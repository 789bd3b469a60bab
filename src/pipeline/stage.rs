//! Pipeline stages and their observability events.

use std::fmt;

use tokio::time::Instant;
use tracing::{error, info, warn};

/// One step of the scan pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Validating,
    CacheCheck,
    Staging,
    Analyzing,
    Synthesizing,
    Narrating,
    PersistingAssets,
    PersistingRecord,
    CacheUpdate,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::CacheCheck => "cache_check",
            Stage::Staging => "staging",
            Stage::Analyzing => "analyzing",
            Stage::Synthesizing => "synthesizing",
            Stage::Narrating => "narrating",
            Stage::PersistingAssets => "persisting_assets",
            Stage::PersistingRecord => "persisting_record",
            Stage::CacheUpdate => "cache_update",
            Stage::Completed => "completed",
        }
    }

    /// Whether a failure in this stage degrades the result instead of failing it.
    pub fn is_best_effort(&self) -> bool {
        matches!(
            self,
            Stage::Staging | Stage::Narrating | Stage::PersistingAssets
        )
    }

    /// Outcome reported when this stage does not succeed.
    pub fn failure_outcome(&self) -> Outcome {
        if self.is_best_effort() {
            Outcome::Degraded
        } else {
            Outcome::Failed
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Hit,
    Miss,
    Skipped,
    Degraded,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Hit => "hit",
            Outcome::Miss => "miss",
            Outcome::Skipped => "skipped",
            Outcome::Degraded => "degraded",
            Outcome::Failed => "failed",
        }
    }
}

/// Times one stage and emits its event.
pub(crate) struct StageTimer<'a> {
    stage: Stage,
    session_id: &'a str,
    started: Instant,
}

impl<'a> StageTimer<'a> {
    pub(crate) fn start(stage: Stage, session_id: &'a str) -> Self {
        Self {
            stage,
            session_id,
            started: Instant::now(),
        }
    }

    pub(crate) fn session_id(&self) -> &'a str {
        self.session_id
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Finish with the stage's failure outcome.
    pub(crate) fn fail(self) -> u64 {
        let outcome = self.stage.failure_outcome();
        self.finish(outcome)
    }

    /// Emit the stage event and return the elapsed milliseconds.
    pub(crate) fn finish(self, outcome: Outcome) -> u64 {
        let elapsed_ms = self.elapsed_ms();
        match outcome {
            Outcome::Degraded => warn!(
                stage = %self.stage,
                elapsed_ms,
                outcome = outcome.as_str(),
                session_id = self.session_id,
                "stage degraded"
            ),
            Outcome::Failed => error!(
                stage = %self.stage,
                elapsed_ms,
                outcome = outcome.as_str(),
                session_id = self.session_id,
                "stage failed"
            ),
            _ => info!(
                stage = %self.stage,
                elapsed_ms,
                outcome = outcome.as_str(),
                session_id = self.session_id,
                "stage finished"
            ),
        }
        elapsed_ms
    }
}
