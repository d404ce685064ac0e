use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::trainer::{CV_FOLDS, DEFAULT_MODEL_PATH, MIN_ACCEPTABLE_SCORE, RANDOM_STATE};

/// model_trainer: tune a pool of regression models and keep the best one.
#[derive(Parser, Debug)]
#[command(name = "model_trainer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tune every candidate on the training CSV and save the best model.
    Train {
        /// Training matrix (target in the last column).
        #[arg(long)]
        train: PathBuf,

        /// Test matrix (target in the last column).
        #[arg(long)]
        test: PathBuf,

        /// Where to write the winning model (.json for JSON, otherwise binary).
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model_path: PathBuf,

        /// Minimum test R² the best model must reach.
        #[arg(long, default_value_t = MIN_ACCEPTABLE_SCORE)]
        min_score: f64,

        /// Cross-validation folds.
        #[arg(long, default_value_t = CV_FOLDS)]
        folds: usize,

        /// Worker threads (defaults to all cores).
        #[arg(long)]
        jobs: Option<usize>,

        /// Sample at most N parameter combinations per model instead of all.
        #[arg(long, value_name = "N")]
        random_iter: Option<usize>,

        /// Seed for --random-iter sampling.
        #[arg(long, default_value_t = RANDOM_STATE)]
        seed: u64,

        /// Only train these models (comma-separated names).
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,

        /// The CSV files have no header row.
        #[arg(long)]
        no_header: bool,

        /// Output CSV file for the per-model report.
        #[arg(long)]
        report_csv: Option<PathBuf>,

        /// Output JSON file for the run summary.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },

    /// Predict with a saved model.
    Predict {
        /// Saved model file.
        #[arg(long)]
        model: PathBuf,

        /// Feature matrix (no target column).
        #[arg(long)]
        input: PathBuf,

        /// The CSV file has no header row.
        #[arg(long)]
        no_header: bool,

        /// Write predictions to this CSV instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List the candidate models and their grid sizes.
    ListModels,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_defaults_follow_config() {
        let cli = Cli::try_parse_from(["model_trainer", "train", "--train", "a.csv", "--test", "b.csv"])
            .unwrap();
        match cli.command {
            Command::Train { model_path, min_score, folds, seed, models, .. } => {
                assert_eq!(model_path, PathBuf::from(DEFAULT_MODEL_PATH));
                assert_eq!(min_score, MIN_ACCEPTABLE_SCORE);
                assert_eq!(folds, CV_FOLDS);
                assert_eq!(seed, RANDOM_STATE);
                assert!(models.is_empty());
            }
            other => panic!("expected train, got {:?}", other),
        }
    }

    #[test]
    fn test_models_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "model_trainer", "train", "--train", "a.csv", "--test", "b.csv",
            "--models", "Linear Regression,Decision Tree",
        ])
        .unwrap();
        match cli.command {
            Command::Train { models, .. } => {
                assert_eq!(models, vec!["Linear Regression", "Decision Tree"]);
            }
            other => panic!("expected train, got {:?}", other),
        }
    }
}
