use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{DocumentId, IntegrityStatus, RunId, Timestamp, UnknownVariant};

/// Kind of integrity run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Documents created within the trailing window
    Incremental,
    /// Every document with stored content
    FullSweep,
    /// An explicit caller-supplied document set
    OnDemand,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Incremental => "incremental",
            RunMode::FullSweep => "full_sweep",
            RunMode::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(RunMode::Incremental),
            "full_sweep" => Ok(RunMode::FullSweep),
            "on_demand" => Ok(RunMode::OnDemand),
            other => Err(UnknownVariant::new("run_mode", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunState::Running),
            "completed" => Ok(RunState::Completed),
            "cancelled" => Ok(RunState::Cancelled),
            other => Err(UnknownVariant::new("run_state", other)),
        }
    }
}

/// Aggregate counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub total: u64,
    pub ok: u64,
    pub mismatch: u64,
    pub missing: u64,
    pub alerts_created: u64,
    /// Documents whose check could not be completed (retries exhausted, fatal errors)
    pub failed: u64,
}

impl RunCounts {
    pub fn record_status(&mut self, status: IntegrityStatus, alert_created: bool) {
        match status {
            IntegrityStatus::Ok => self.ok += 1,
            IntegrityStatus::Mismatch => self.mismatch += 1,
            IntegrityStatus::Missing => self.missing += 1,
        }
        if alert_created {
            self.alerts_created += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn issues(&self) -> u64 {
        self.mismatch + self.missing
    }

    /// Documents with a final outcome (checked or failed)
    pub fn processed(&self) -> u64 {
        self.ok + self.mismatch + self.missing + self.failed
    }
}

/// A document whose check did not complete during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub document_id: DocumentId,
    pub reason: String,
    pub attempts: u32,
}

/// Persisted record of one integrity run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub mode: RunMode,
    pub state: RunState,
    pub counts: RunCounts,
    pub failures: Vec<RunFailure>,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl RunSummary {
    pub fn started(id: RunId, mode: RunMode, started_at: Timestamp) -> Self {
        Self {
            id,
            mode,
            state: RunState::Running,
            counts: RunCounts::default(),
            failures: Vec::new(),
            started_at,
            finished_at: None,
        }
    }
}
