/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True when the error is a transient store failure rather than a
    /// caller mistake. Counting operations treat these as "not applied";
    /// callers may retry them.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Cache(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_not_transient() {
        let err = AppError::NotFound("item 42".to_string());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_cache_error_is_transient() {
        let err = AppError::Cache(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )));
        assert!(err.is_transient());
    }
}
