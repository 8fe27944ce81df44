//! Local progress tracking for parallel agent runs.
//!
//! Runs live only in memory. The board publishes an `Arc<Vec<AgentRun>>`
//! through a watch channel and every update swaps in a new vector, so
//! concurrent runs never overwrite each other's fields. Updates address a
//! run by id and are dropped once the run is gone (after `clear`).

use crate::Estimate;
use backing_store::GeneratedChange;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

/// Fixed progress points of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Queued,
    Analyzing,
    Planning,
    Generating,
    Completed,
}

impl Checkpoint {
    pub fn progress(&self) -> u8 {
        match self {
            Checkpoint::Queued => 0,
            Checkpoint::Analyzing => 20,
            Checkpoint::Planning => 40,
            Checkpoint::Generating => 60,
            Checkpoint::Completed => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Checkpoint::Queued => "Queued",
            Checkpoint::Analyzing => "Analyzing codebase",
            Checkpoint::Planning => "Planning changes",
            Checkpoint::Generating => "Generating code",
            Checkpoint::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRun {
    pub id: String,
    /// 1-based position within its batch.
    pub agent_index: usize,
    pub task_id: Option<String>,
    pub status: RunStatus,
    pub checkpoint: Checkpoint,
    pub progress: u8,
    pub current_step: String,
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub start_time: DateTime<Utc>,
    /// Seconds.
    pub estimated_time_remaining: u64,
    pub estimated_seconds: u64,
    pub estimated_cost: f64,
    pub actual_cost: Option<f64>,
    pub changes: Vec<GeneratedChange>,
    pub error: Option<String>,
}

impl AgentRun {
    pub fn new(agent_index: usize, estimate: &Estimate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_index,
            task_id: None,
            status: RunStatus::Running,
            checkpoint: Checkpoint::Queued,
            progress: Checkpoint::Queued.progress(),
            current_step: Checkpoint::Queued.label().to_string(),
            files_changed: 0,
            lines_added: 0,
            lines_removed: 0,
            start_time: Utc::now(),
            estimated_time_remaining: estimate.seconds,
            estimated_seconds: estimate.seconds,
            estimated_cost: estimate.cost,
            actual_cost: None,
            changes: Vec::new(),
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Actual cost when known, otherwise the estimate.
    pub fn cost(&self) -> f64 {
        self.actual_cost.unwrap_or(self.estimated_cost)
    }

    /// Moves forward to `checkpoint`. Backward or repeated moves and moves
    /// on a finished run are ignored.
    pub fn advance(&mut self, checkpoint: Checkpoint) -> bool {
        if self.is_finished() || checkpoint <= self.checkpoint {
            return false;
        }
        self.checkpoint = checkpoint;
        self.progress = checkpoint.progress();
        self.current_step = checkpoint.label().to_string();
        let remaining = 100 - u64::from(self.progress);
        self.estimated_time_remaining = (self.estimated_seconds * remaining).div_ceil(100);
        if checkpoint == Checkpoint::Completed {
            self.status = RunStatus::Completed;
        }
        true
    }

    /// Terminal failure. Progress stays where it stopped.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        self.status = RunStatus::Error;
        self.estimated_time_remaining = 0;
        self.current_step = "Failed".to_string();
        self.error = Some(message.into());
    }
}

/// Shared, copy-on-write list of agent runs.
#[derive(Debug, Clone)]
pub struct RunBoard {
    tx: Arc<watch::Sender<Arc<Vec<AgentRun>>>>,
}

impl RunBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Self { tx: Arc::new(tx) }
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Vec<AgentRun>>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Vec<AgentRun>> {
        self.tx.borrow().clone()
    }

    pub fn get(&self, run_id: &str) -> Option<AgentRun> {
        self.tx.borrow().iter().find(|run| run.id == run_id).cloned()
    }

    pub fn insert(&self, run: AgentRun) {
        self.tx.send_modify(|runs| {
            let mut next = runs.as_ref().clone();
            next.push(run);
            *runs = Arc::new(next);
        });
    }

    /// Applies `f` to the run with `run_id`. Returns false, changing nothing,
    /// if the run no longer exists.
    pub fn update(&self, run_id: &str, f: impl FnOnce(&mut AgentRun)) -> bool {
        let updated = self.tx.send_if_modified(|runs| {
            let Some(index) = runs.iter().position(|run| run.id == run_id) else {
                return false;
            };
            let mut next = runs.as_ref().clone();
            f(&mut next[index]);
            *runs = Arc::new(next);
            true
        });
        if !updated {
            debug!(run_id, "Dropping update for cleared run");
        }
        updated
    }

    /// Discards every run. Remote task rows are untouched.
    pub fn clear(&self) {
        self.tx.send_modify(|runs| *runs = Arc::new(Vec::new()));
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RunBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Estimator;

    fn run(index: usize) -> AgentRun {
        AgentRun::new(index, &Estimator::default().for_complexity(1.0))
    }

    #[test]
    fn advance_is_monotonic() {
        let mut run = run(1);
        assert!(run.advance(Checkpoint::Planning));
        assert!(!run.advance(Checkpoint::Analyzing));
        assert!(!run.advance(Checkpoint::Planning));
        assert_eq!(run.progress, 40);
        // 45s * 60% remaining
        assert_eq!(run.estimated_time_remaining, 27);

        assert!(run.advance(Checkpoint::Completed));
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.estimated_time_remaining, 0);
        assert!(!run.advance(Checkpoint::Completed));
    }

    #[test]
    fn fail_zeroes_eta_and_freezes_run() {
        let mut run = run(1);
        run.advance(Checkpoint::Analyzing);
        run.fail("boom");

        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.estimated_time_remaining, 0);
        assert_eq!(run.progress, 20);
        assert!(!run.advance(Checkpoint::Planning));
        assert_eq!(run.error.as_deref(), Some("boom"));
    }

    #[test]
    fn update_replaces_the_list_and_leaves_old_snapshots_alone() {
        let board = RunBoard::new();
        let first = run(1);
        let id = first.id.clone();
        board.insert(first);
        board.insert(run(2));

        let before = board.snapshot();
        assert!(board.update(&id, |run| {
            run.advance(Checkpoint::Analyzing);
        }));

        assert_eq!(before[0].progress, 0);
        assert_eq!(board.get(&id).unwrap().progress, 20);
        assert_eq!(board.snapshot()[1].progress, 0);
    }

    #[test]
    fn updates_after_clear_are_dropped() {
        let board = RunBoard::new();
        let run = run(1);
        let id = run.id.clone();
        board.insert(run);
        board.clear();

        assert!(!board.update(&id, |run| run.fail("late")));
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn watchers_see_every_replacement() {
        let board = RunBoard::new();
        let mut rx = board.watch();
        board.insert(run(1));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
