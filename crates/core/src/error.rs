use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid job transition from {from} to {to}")]
    InvalidJobTransition { from: String, to: String },

    #[error("Identifier must not be empty: {0}")]
    EmptyIdentifier(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::EmptyIdentifier("task id");
        assert!(error.to_string().contains("task id"));

        let error = CoreError::InvalidJobTransition {
            from: "succeeded".to_string(),
            to: "running".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid job transition from succeeded to running"
        );
    }
}
