//! Per-worker action/observation histories.

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};
use crate::model::PomdpModel;

/// One step: the action taken and the observation it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Record {
    pub action: usize,
    pub observation: usize,
}

impl From<(usize, usize)> for Record {
    fn from((action, observation): (usize, usize)) -> Self {
        Self {
            action,
            observation,
        }
    }
}

impl From<Record> for (usize, usize) {
    fn from(record: Record) -> Self {
        (record.action, record.observation)
    }
}

/// Histories of independent workers, most recent worker last.
///
/// Serializes as a list of workers, each a list of `[action, observation]`
/// index pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    workers: Vec<Vec<Record>>,
}

impl History {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workers: Vec::new(),
        }
    }

    pub fn new_worker(&mut self) {
        self.workers.push(Vec::new());
    }

    /// Append to the current worker, starting one if there is none.
    pub fn record(&mut self, action: usize, observation: usize) {
        if self.workers.is_empty() {
            self.new_worker();
        }
        if let Some(current) = self.workers.last_mut() {
            current.push(Record {
                action,
                observation,
            });
        }
    }

    #[must_use]
    pub fn n_workers(&self) -> usize {
        self.workers.len()
    }

    /// Steps recorded for `worker`; zero for unknown workers.
    #[must_use]
    pub fn n_t(&self, worker: usize) -> usize {
        self.workers.get(worker).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.workers.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn workers(&self) -> &[Vec<Record>] {
        &self.workers
    }

    #[must_use]
    pub fn current(&self) -> &[Record] {
        self.workers.last().map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn last_action(&self) -> Option<usize> {
        self.current().last().map(|r| r.action)
    }

    /// Check every index against the model's spaces.
    pub fn validate(&self, model: &PomdpModel) -> Result<()> {
        for record in self.workers.iter().flatten() {
            model.spaces.action(record.action)?;
            model.spaces.observation(record.observation)?;
        }
        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(GateError::from)
    }
}

impl From<Vec<Vec<Record>>> for History {
    fn from(workers: Vec<Vec<Record>>) -> Self {
        Self { workers }
    }
}
