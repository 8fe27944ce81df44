use crate::{OrchestratorError, OrchestratorResult};
use backing_store::{FileSnapshot, RepositoryRef, TaskMetadata};

/// The signed-in user and the credential forwarded to remote jobs.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub credential: Option<String>,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            credential: credential.filter(|c| !c.trim().is_empty()),
        }
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("user_id", &self.user_id)
            .field("has_credential", &self.credential.is_some())
            .finish()
    }
}

/// Optional inputs to a task. Only fields that are set reach the metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateTaskOptions {
    pub repository: Option<RepositoryRef>,
    pub files: Option<Vec<FileSnapshot>>,
    pub context: Option<String>,
    pub auto_apply: Option<bool>,
}

impl CreateTaskOptions {
    pub fn with_repository(mut self, repository: RepositoryRef) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_files(mut self, files: Vec<FileSnapshot>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = Some(auto_apply);
        self
    }

    pub(crate) fn into_metadata(self) -> OrchestratorResult<TaskMetadata> {
        if let Some(repository) = &self.repository {
            if repository.owner.trim().is_empty() || repository.name.trim().is_empty() {
                return Err(OrchestratorError::ValidationFailed(
                    "repository owner and name are required".to_string(),
                ));
            }
        }
        if let Some(files) = &self.files {
            if let Some(index) = files.iter().position(|f| f.path.trim().is_empty()) {
                return Err(OrchestratorError::ValidationFailed(format!(
                    "file {} has an empty path",
                    index
                )));
            }
        }

        Ok(TaskMetadata {
            repository: self.repository,
            files: self.files,
            context: self.context.filter(|c| !c.trim().is_empty()),
            auto_apply: self.auto_apply,
            ..TaskMetadata::default()
        })
    }
}

/// Trimmed, non-empty instruction.
pub(crate) fn validate_instruction(instruction: &str) -> OrchestratorResult<&str> {
    let trimmed = instruction.trim();
    if trimmed.is_empty() {
        return Err(OrchestratorError::ValidationFailed(
            "instruction must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
