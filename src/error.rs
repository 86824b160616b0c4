use uuid::Uuid;

/// Failure of a single read step. Never fatal on its own.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no teacher profile is linked to user {0}")]
    TeacherNotFound(Uuid),
}
