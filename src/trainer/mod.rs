mod candidates;
mod config;
mod evaluation;
mod model_trainer;
mod output;

pub use candidates::{default_models, default_param_grids, select_candidates, ModelCandidate};
pub use config::{ModelTrainerConfig, CV_FOLDS, DEFAULT_MODEL_PATH, MIN_ACCEPTABLE_SCORE, RANDOM_STATE};
pub use evaluation::{evaluate_models, ModelReport, ModelScore};
pub use model_trainer::{ModelTrainer, TrainingOutcome};
pub use output::{print_report, write_report_csv, write_summary_json};
