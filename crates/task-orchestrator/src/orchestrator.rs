use crate::options::validate_instruction;
use crate::{
    AgentRun, AuthContext, Checkpoint, CreateTaskOptions, Estimator, InvocationResult, NotificationLevel, Notifier,
    OrchestratorError, OrchestratorResult, RunBoard, RunStatus, TaskCache, TaskInvoker,
};
use backing_store::{
    decode_rows, BackingStore, Collection, RepositoryRef, StoreError, Task, TaskMetadata, TaskStatus,
};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MAX_PARALLEL_AGENTS: usize = 8;

/// Outcome of one `execute_parallel` batch.
#[derive(Debug, Clone, Serialize)]
pub struct ParallelSummary {
    /// Final state of the batch's runs that were not cleared meanwhile.
    pub runs: Vec<AgentRun>,
    pub completed: usize,
    pub failed: usize,
    /// Actual cost where reported, estimate otherwise.
    pub total_cost: f64,
}

struct RunSpec<'a> {
    run_id: &'a str,
    agent_index: usize,
    agent_count: usize,
    user_id: &'a str,
    instruction: &'a str,
    repository: Option<&'a RepositoryRef>,
    credential: Option<&'a str>,
}

/// Creates task rows, starts their remote processing, and runs batches of
/// parallel agents.
pub struct TaskOrchestrator {
    store: Arc<dyn BackingStore>,
    invoker: Arc<dyn TaskInvoker>,
    estimator: Estimator,
    cache: TaskCache,
    runs: RunBoard,
    notifier: Notifier,
}

impl TaskOrchestrator {
    pub fn new(store: Arc<dyn BackingStore>, invoker: Arc<dyn TaskInvoker>, estimator: Estimator) -> Self {
        Self {
            store,
            invoker,
            estimator,
            cache: TaskCache::new(),
            runs: RunBoard::new(),
            notifier: Notifier::new(),
        }
    }

    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    pub fn runs(&self) -> &RunBoard {
        &self.runs
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Creates a pending task and starts processing it.
    ///
    /// Fails before any network call without a signed-in user. A failed
    /// processing call only produces a warning notification: the task stays
    /// pending and its final state arrives through the change feed.
    pub async fn create_task(
        &self,
        auth: Option<&AuthContext>,
        instruction: &str,
        options: CreateTaskOptions,
    ) -> OrchestratorResult<Task> {
        let auth = require_auth(auth)?;
        let instruction = validate_instruction(instruction)?;
        let metadata = options.into_metadata()?;

        let task = match self.insert_task(&auth.user_id, instruction, &metadata).await {
            Ok(task) => task,
            Err(e) => {
                self.notifier.error("Task creation failed", e.to_string());
                return Err(e);
            }
        };
        info!(task_id = %task.id, user_id = %auth.user_id, "Task created");
        self.cache.prepend(task.clone());

        match self.invoker.invoke(&task.id, auth.credential.as_deref()).await {
            Ok(_) => self.notifier.success("Task started", format!("Task {} is processing", task.id)),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Task processing call failed; task stays pending");
                self.notifier.warning("Task processing delayed", e.to_string());
            }
        }
        Ok(task)
    }

    /// Runs `agent_count` agents on the same instruction concurrently and
    /// waits for all of them. One agent failing never affects the others.
    pub async fn execute_parallel(
        &self,
        auth: Option<&AuthContext>,
        instruction: &str,
        agent_count: usize,
        repository: Option<RepositoryRef>,
        token: Option<String>,
    ) -> OrchestratorResult<ParallelSummary> {
        let auth = require_auth(auth)?;
        let instruction = validate_instruction(instruction)?;
        if !(1..=MAX_PARALLEL_AGENTS).contains(&agent_count) {
            return Err(OrchestratorError::ValidationFailed(format!(
                "agent count must be between 1 and {}, got {}",
                MAX_PARALLEL_AGENTS, agent_count
            )));
        }
        let credential = token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| auth.credential.clone());

        let batch: Vec<AgentRun> = {
            let mut rng = rand::thread_rng();
            (1..=agent_count)
                .map(|index| AgentRun::new(index, &self.estimator.estimate(&mut rng)))
                .collect()
        };
        let run_ids: Vec<String> = batch.iter().map(|run| run.id.clone()).collect();
        let estimated_cost: f64 = batch.iter().map(|run| run.estimated_cost).sum();
        for run in batch {
            self.runs.insert(run);
        }
        info!(user_id = %auth.user_id, agent_count, estimated_cost, "Starting parallel agents");
        self.notifier.info(
            "Agents started",
            format!("{} agents, estimated ${:.4}", agent_count, estimated_cost),
        );

        join_all(run_ids.iter().enumerate().map(|(i, run_id)| {
            self.run_agent(RunSpec {
                run_id,
                agent_index: i + 1,
                agent_count,
                user_id: &auth.user_id,
                instruction,
                repository: repository.as_ref(),
                credential: credential.as_deref(),
            })
        }))
        .await;

        let snapshot = self.runs.snapshot();
        let runs: Vec<AgentRun> = snapshot
            .iter()
            .filter(|run| run_ids.contains(&run.id))
            .cloned()
            .collect();
        let completed = runs.iter().filter(|r| r.status == RunStatus::Completed).count();
        let failed = runs.iter().filter(|r| r.status == RunStatus::Error).count();
        let total_cost: f64 = runs.iter().map(AgentRun::cost).sum();

        info!(completed, failed, total_cost, "Parallel agents finished");
        let level = if failed > 0 {
            NotificationLevel::Warning
        } else {
            NotificationLevel::Success
        };
        self.notifier.notify(
            level,
            "Agents finished",
            format!("{} of {} agents completed", completed, agent_count),
        );
        Ok(ParallelSummary {
            runs,
            completed,
            failed,
            total_cost,
        })
    }

    /// Discards all local run state. Remote task rows are untouched.
    pub fn clear_runs(&self) {
        self.runs.clear();
    }

    async fn run_agent(&self, job: RunSpec<'_>) {
        if let Err(e) = self.drive_run(&job).await {
            warn!(run_id = job.run_id, agent = job.agent_index, error = %e, "Agent run failed");
            let message = e.to_string();
            self.runs.update(job.run_id, |run| run.fail(message.clone()));
            self.notifier
                .error(format!("Agent {} failed", job.agent_index), message);
        }
    }

    async fn drive_run(&self, job: &RunSpec<'_>) -> OrchestratorResult<()> {
        self.checkpoint(job.run_id, Checkpoint::Analyzing);
        let metadata = TaskMetadata {
            repository: job.repository.cloned(),
            ..TaskMetadata::default()
        };
        let instruction = format!("{} [agent {}/{}]", job.instruction, job.agent_index, job.agent_count);
        let task = self.insert_task(job.user_id, &instruction, &metadata).await?;
        let task_id = task.id.clone();
        self.runs.update(job.run_id, |run| run.task_id = Some(task_id));
        self.cache.prepend(task.clone());

        self.checkpoint(job.run_id, Checkpoint::Planning);
        let result = self.invoker.invoke(&task.id, job.credential).await?;

        self.checkpoint(job.run_id, Checkpoint::Generating);
        self.runs.update(job.run_id, |run| apply_usage(run, result));

        self.checkpoint(job.run_id, Checkpoint::Completed);
        Ok(())
    }

    fn checkpoint(&self, run_id: &str, checkpoint: Checkpoint) {
        debug!(run_id, step = checkpoint.label(), progress = checkpoint.progress(), "Agent checkpoint");
        self.runs.update(run_id, |run| {
            run.advance(checkpoint);
        });
    }

    async fn insert_task(
        &self,
        user_id: &str,
        instruction: &str,
        metadata: &TaskMetadata,
    ) -> OrchestratorResult<Task> {
        let row = json!({
            "user_id": user_id,
            "instruction": instruction,
            "status": TaskStatus::Pending,
            "metadata": serde_json::to_value(metadata)?,
        });
        let stored = self.store.insert(Collection::Tasks, row).await?;
        let task = decode_rows::<Task>(Collection::Tasks, vec![stored])?
            .pop()
            .ok_or_else(|| StoreError::InvalidRecord {
                table: Collection::Tasks.table().to_string(),
                message: "insert returned no row".to_string(),
            })?;
        Ok(task)
    }
}

fn require_auth(auth: Option<&AuthContext>) -> OrchestratorResult<&AuthContext> {
    auth.filter(|auth| !auth.user_id.trim().is_empty())
        .ok_or(OrchestratorError::AuthenticationRequired)
}

/// Reported usage replaces the estimate; without stats, counts come from
/// the changes list.
fn apply_usage(run: &mut AgentRun, result: InvocationResult) {
    match &result.stats {
        Some(stats) => {
            run.files_changed = stats.files_changed;
            run.lines_added = stats.lines_added;
            run.lines_removed = stats.lines_removed;
        }
        None => {
            run.files_changed = result.changes.len() as u64;
            run.lines_added = result.changes.iter().map(|c| c.lines_added).sum();
            run.lines_removed = result.changes.iter().map(|c| c.lines_removed).sum();
        }
    }
    run.actual_cost = result.cost;
    run.changes = result.changes;
}
