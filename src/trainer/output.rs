use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, ResultExt};
use crate::estimators::display_params;
use crate::trainer::evaluation::ModelReport;
use crate::trainer::model_trainer::TrainingOutcome;

/// Round to n decimal places; NaN is kept as is.
fn truncate(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Print the per-model report to stdout, best model marked.
pub fn print_report(report: &ModelReport) {
    let best = report.best_entry().map(|(i, _)| i);

    println!("\n=== Model Report ({} models) ===\n", report.len());
    println!(
        "{:<24} {:>9} {:>9} {:>9}",
        "model", "cv_r2", "train_r2", "test_r2"
    );
    for (i, entry) in report.iter().enumerate() {
        let marker = if best == Some(i) { " ★" } else { "" };
        println!(
            "{:<24} {:>9.4} {:>9.4} {:>9.4}{}",
            entry.name, entry.cv_score, entry.train_score, entry.test_score, marker
        );
        println!("    {}", display_params(&entry.best_params));
    }
    println!();
}

/// Write one CSV row per model, in report order.
pub fn write_report_csv(report: &ModelReport, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

    wtr.write_record(["model", "cv_r2", "train_r2", "test_r2", "best_params"])?;
    for entry in report.iter() {
        wtr.write_record([
            entry.name.clone(),
            format!("{:.6}", entry.cv_score),
            format!("{:.6}", entry.train_score),
            format!("{:.6}", entry.test_score),
            display_params(&entry.best_params),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the winning model and every model's scores as JSON.
pub fn write_summary_json(outcome: &TrainingOutcome, path: &Path) -> Result<()> {
    let json = serde_json::json!({
        "best_model": outcome.best_model_name,
        "test_r2": truncate(outcome.test_score, 6),
        "model_path": outcome.model_path,
        "models": outcome.report.iter().map(|entry| {
            serde_json::json!({
                "name": entry.name,
                "best_params": entry.best_params,
                "cv_r2": truncate(entry.cv_score, 6),
                "train_r2": truncate(entry.train_score, 6),
                "test_r2": truncate(entry.test_score, 6),
            })
        }).collect::<Vec<_>>(),
    });

    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(serde_json::to_string_pretty(&json)?.as_bytes())?;
    Ok(())
}
