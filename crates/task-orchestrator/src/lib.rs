//! Task orchestration for the hub.
//!
//! Two paths share one [`TaskOrchestrator`]:
//!
//! - `create_task`: insert a pending task row, cache it, and start remote
//!   processing. The row's later states come from realtime sync.
//! - `execute_parallel`: run several agents on one instruction at once, each
//!   tracked as a local [`AgentRun`] on the [`RunBoard`] with advisory cost
//!   and time estimates.

mod cache;
mod error;
mod estimate;
mod invoker;
mod notify;
mod options;
mod orchestrator;
mod runs;

#[cfg(test)]
mod tests;

pub use cache::TaskCache;
pub use error::{OrchestratorError, OrchestratorResult};
pub use estimate::{Estimate, Estimator};
pub use invoker::{FunctionsInvoker, InvocationResult, TaskInvoker, CREDENTIAL_HEADER};
pub use notify::{Notification, NotificationLevel, Notifier};
pub use options::{AuthContext, CreateTaskOptions};
pub use orchestrator::{ParallelSummary, TaskOrchestrator, MAX_PARALLEL_AGENTS};
pub use runs::{AgentRun, Checkpoint, RunBoard, RunStatus};
