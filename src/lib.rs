pub mod cli;
pub mod data;
pub mod error;
pub mod estimators;
pub mod metrics;
pub mod persistence;
pub mod search;
pub mod trainer;

pub use error::{Result, TrainerError};
pub use estimators::{Model, Regressor};
pub use persistence::{load_object, save_object};
pub use trainer::{evaluate_models, ModelTrainer, ModelTrainerConfig};
