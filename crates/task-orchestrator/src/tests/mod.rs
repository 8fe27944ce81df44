//! Orchestrator behavior suites.
//!
//! - `create.rs`   - single task creation, auth and validation gates
//! - `parallel.rs` - parallel agent batches, isolation, clearing runs

mod parallel;

use crate::{
    AuthContext, Estimator, InvocationResult, OrchestratorError, OrchestratorResult, TaskInvoker,
    TaskOrchestrator,
};
use async_trait::async_trait;
use backing_store::{Collection, MemoryBackingStore};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Invoker that fails for tasks whose instruction contains `fail_marker`
/// and records every call.
struct ScriptedInvoker {
    store: MemoryBackingStore,
    fail_marker: Option<String>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedInvoker {
    fn new(store: &MemoryBackingStore) -> Self {
        Self {
            store: store.clone(),
            fail_marker: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(store: &MemoryBackingStore, marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::new(store)
        }
    }

    fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    fn instruction_of(&self, task_id: &str) -> String {
        self.store
            .rows(Collection::Tasks)
            .into_iter()
            .find(|row| row["id"] == task_id)
            .and_then(|row| row["instruction"].as_str().map(str::to_string))
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskInvoker for ScriptedInvoker {
    async fn invoke(&self, task_id: &str, credential: Option<&str>) -> OrchestratorResult<InvocationResult> {
        self.calls
            .lock()
            .unwrap()
            .push((task_id.to_string(), credential.map(str::to_string)));
        tokio::task::yield_now().await;

        let instruction = self.instruction_of(task_id);
        if let Some(marker) = &self.fail_marker {
            if instruction.contains(marker.as_str()) {
                return Err(OrchestratorError::RemoteInvocationFailed {
                    task_id: task_id.to_string(),
                    message: "edge function returned 500".to_string(),
                });
            }
        }

        Ok(serde_json::from_value(json!({
            "stats": { "filesChanged": 1, "linesAdded": 10, "linesRemoved": 2, "tokensUsed": 5000 },
            "cost": 0.01,
            "changes": [{ "path": "src/lib.rs", "linesAdded": 10, "linesRemoved": 2 }]
        }))
        .unwrap())
    }
}

fn orchestrator(store: &MemoryBackingStore, invoker: Arc<ScriptedInvoker>) -> TaskOrchestrator {
    TaskOrchestrator::new(Arc::new(store.clone()), invoker, Estimator::default())
}

fn alice() -> AuthContext {
    AuthContext::new("alice", Some("ghp_alice".to_string()))
}
