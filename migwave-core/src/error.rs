use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigwaveError {
    #[error("Invalid input for {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Scheduling error: {message}")]
    SchedulingError { message: String },

    #[error("Plan not found: {plan_id}")]
    PlanNotFound { plan_id: String },

    #[error("Plan {plan_id} is referenced by domino plan(s) {referenced_by:?} and cannot be deleted")]
    PlanInUse {
        plan_id: String,
        referenced_by: Vec<String>,
    },

    #[error("Version conflict on plan {plan_id}: expected {expected}, found {found}")]
    VersionConflict {
        plan_id: String,
        expected: u64,
        found: u64,
    },

    #[error("A planning operation is already active for project {project_id}")]
    PlanningInProgress { project_id: String },

    #[error("Storage operation '{operation}' failed")]
    Storage {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization operation '{operation}' failed")]
    Serialization {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MigwaveError {
    /// Helper for storage errors with operation context
    pub fn storage<E>(operation: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            operation: operation.into(),
            source: Box::new(error),
        }
    }

    /// Helper for serialization errors with operation context
    pub fn serialization<E>(operation: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Serialization {
            operation: operation.into(),
            source: Box::new(error),
        }
    }

    /// Helper for input validation errors
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type MigwaveResult<T> = Result<T, MigwaveError>;
