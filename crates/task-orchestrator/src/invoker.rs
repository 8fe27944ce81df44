use crate::{OrchestratorError, OrchestratorResult};
use async_trait::async_trait;
use backing_store::{GeneratedChange, SupabaseClient, TaskStats};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header that carries the forwarded provider credential.
pub const CREDENTIAL_HEADER: &str = "x-github-token";

/// Usage reported by the task-processing call.
///
/// Advisory: the task row's terminal state is what counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvocationResult {
    pub stats: Option<TaskStats>,
    pub cost: Option<f64>,
    pub changes: Vec<GeneratedChange>,
}

/// Starts remote processing of one task.
#[async_trait]
pub trait TaskInvoker: Send + Sync {
    async fn invoke(&self, task_id: &str, credential: Option<&str>) -> OrchestratorResult<InvocationResult>;
}

/// Invokes a Supabase edge function with `{ "taskId": .. }`.
pub struct FunctionsInvoker {
    client: Arc<SupabaseClient>,
    function: String,
}

impl FunctionsInvoker {
    pub fn new(client: Arc<SupabaseClient>, function: impl Into<String>) -> Self {
        Self {
            client,
            function: function.into(),
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

#[async_trait]
impl TaskInvoker for FunctionsInvoker {
    async fn invoke(&self, task_id: &str, credential: Option<&str>) -> OrchestratorResult<InvocationResult> {
        let headers: Vec<(&str, &str)> = credential
            .map(|token| vec![(CREDENTIAL_HEADER, token)])
            .unwrap_or_default();

        debug!(task_id, function = %self.function, has_credential = credential.is_some(), "Invoking task processor");
        let response = self
            .client
            .invoke_function(&self.function, &json!({ "taskId": task_id }), &headers)
            .await
            .map_err(|e| {
                warn!(task_id, error = %e, "Task processor call failed");
                OrchestratorError::RemoteInvocationFailed {
                    task_id: task_id.to_string(),
                    message: e.to_string(),
                }
            })?;

        if response.is_null() {
            return Ok(InvocationResult::default());
        }
        serde_json::from_value(response).map_err(|e| OrchestratorError::RemoteInvocationFailed {
            task_id: task_id.to_string(),
            message: format!("unexpected response: {}", e),
        })
    }
}
