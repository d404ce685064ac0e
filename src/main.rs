use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use model_trainer_rs::cli::{Cli, Command};
use model_trainer_rs::data::{load_matrix, write_column};
use model_trainer_rs::error::{Result, ResultExt};
use model_trainer_rs::estimators::{Model, Regressor};
use model_trainer_rs::persistence::load_object;
use model_trainer_rs::search::SearchStrategy;
use model_trainer_rs::trainer::{
    default_models, default_param_grids, print_report, select_candidates, write_report_csv,
    write_summary_json, ModelTrainer, ModelTrainerConfig,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "model_trainer_rs=info".into()),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            train,
            test,
            model_path,
            min_score,
            folds,
            jobs,
            random_iter,
            seed,
            models,
            no_header,
            report_csv,
            summary_json,
        } => {
            let strategy = match random_iter {
                Some(n_iter) => SearchStrategy::Randomized { n_iter, seed },
                None => SearchStrategy::Exhaustive,
            };
            let config = ModelTrainerConfig {
                trained_model_file_path: model_path,
                min_score,
                cv_folds: folds,
                strategy,
                n_jobs: jobs,
            };
            let outputs = ReportOutputs {
                csv: report_csv,
                json: summary_json,
            };
            cmd_train(&train, &test, !no_header, config, &models, &outputs)
        }
        Command::Predict {
            model,
            input,
            no_header,
            output,
        } => cmd_predict(&model, &input, !no_header, output.as_deref()),
        Command::ListModels => cmd_list_models(),
    }
}

struct ReportOutputs {
    csv: Option<PathBuf>,
    json: Option<PathBuf>,
}

/// Tune the pool and save the best model.
fn cmd_train(
    train_path: &Path,
    test_path: &Path,
    has_headers: bool,
    config: ModelTrainerConfig,
    models: &[String],
    outputs: &ReportOutputs,
) -> Result<()> {
    let train = load_matrix(train_path, has_headers)?;
    let test = load_matrix(test_path, has_headers)?;
    info!(
        "Loaded {} training rows and {} test rows with {} columns",
        train.nrows(),
        test.nrows(),
        train.ncols()
    );

    let mut trainer = ModelTrainer::with_config(config);
    if !models.is_empty() {
        let selected = select_candidates(default_models(), models)?;
        trainer = trainer.with_candidates(selected, default_param_grids());
    }

    let outcome = trainer.train(&train, &test)?;
    print_report(&outcome.report);

    if let Some(path) = &outputs.csv {
        write_report_csv(&outcome.report, path)?;
        println!("Report written to {}", path.display());
    }
    if let Some(path) = &outputs.json {
        write_summary_json(&outcome, path)?;
        println!("Summary written to {}", path.display());
    }

    println!(
        "Best model: {} (test R² = {:.4}), saved to {}",
        outcome.best_model_name,
        outcome.test_score,
        outcome.model_path.display()
    );
    Ok(())
}

/// Predict with a saved model.
fn cmd_predict(model_path: &Path, input: &Path, has_headers: bool, output: Option<&Path>) -> Result<()> {
    let model: Model = load_object(model_path)
        .with_context(|| format!("loading model from {}", model_path.display()))?;
    let features = load_matrix(input, has_headers)?;
    let predictions = model.predict(&features)?;

    match output {
        Some(path) => {
            write_column(path, "prediction", &predictions)?;
            println!(
                "Wrote {} predictions from {} to {}",
                predictions.len(),
                model.name(),
                path.display()
            );
        }
        None => {
            for value in &predictions {
                println!("{}", value);
            }
        }
    }
    Ok(())
}

/// List the candidate pool.
fn cmd_list_models() -> Result<()> {
    let grids = default_param_grids();
    for candidate in default_models() {
        let n = grids.get(&candidate.name).map_or(0, |g| g.n_candidates());
        println!(
            "{:<24} {:<28} {} combinations",
            candidate.name,
            candidate.model.name(),
            n
        );
    }
    Ok(())
}
