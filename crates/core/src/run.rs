//! Backtest and replay run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Backtest,
    SpreadBacktest,
    WalkForward,
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub run_type: RunType,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub params: Value,
    /// Equity curve + trade log, or tick timeline. Only set on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure cause, e.g. `CANCELLED`.
    #[serde(default)]
    pub reason: Option<String>,
}

impl RunRecord {
    #[must_use]
    pub fn start(run_type: RunType, agent_id: Option<String>, params: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            run_type,
            agent_id,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            params,
            result: None,
            reason: None,
        }
    }

    /// # Errors
    ///
    /// Returns `CoreError::Invariant` if the run already finished.
    pub fn succeed(&mut self, result: Value) -> CoreResult<()> {
        self.finish(RunStatus::Success)?;
        self.result = Some(result);
        Ok(())
    }

    /// Marks the run failed. Any partial result is dropped.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Invariant` if the run already finished.
    pub fn fail(&mut self, reason: impl Into<String>) -> CoreResult<()> {
        self.finish(RunStatus::Failed)?;
        self.result = None;
        self.reason = Some(reason.into());
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::Invariant(format!(
                "run {} already {:?}",
                self.id, self.status
            )));
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}
