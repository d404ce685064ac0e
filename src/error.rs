use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter for {estimator}: {message}")]
    InvalidParameter { estimator: String, message: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("No parameter grid for model: {0}")]
    MissingGrid(String),

    #[error("Model is not fitted")]
    NotFitted,

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("No best model found: {best_name} scored {best_score:.4}, below the {threshold} threshold")]
    NoSuitableModel {
        best_name: String,
        best_score: f64,
        threshold: f64,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<TrainerError>,
    },
}

impl TrainerError {
    /// Innermost error beneath any `Context` wrappers.
    pub fn root_cause(&self) -> &TrainerError {
        match self {
            TrainerError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn invalid_param(estimator: &str, message: impl Into<String>) -> Self {
        TrainerError::InvalidParameter {
            estimator: estimator.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;

/// Attach a human-readable context to a failing result.
pub trait ResultExt<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T>;

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T, E: Into<TrainerError>> ResultExt<T> for std::result::Result<T, E> {
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| TrainerError::Context {
            context: context.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| TrainerError::Context {
            context: f().into(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_context_chain() {
        let inner: Result<()> = Err(TrainerError::NotFitted);
        let wrapped = inner.context("predicting").context("running trainer");

        let err = wrapped.unwrap_err();
        assert!(matches!(err.root_cause(), TrainerError::NotFitted));
        assert_eq!(
            err.to_string(),
            "running trainer: predicting: Model is not fitted"
        );
    }

    #[test]
    fn test_io_error_converts_with_context() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = io.with_context(|| format!("opening {}", "model.bin")).unwrap_err();
        assert!(matches!(err.root_cause(), TrainerError::Io(_)));
        assert!(err.to_string().starts_with("opening model.bin"));
    }
}
