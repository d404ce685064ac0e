use std::collections::{HashMap, HashSet};

use ndarray::{Array1, Array2};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, ResultExt, TrainerError};
use crate::estimators::{display_params, Params, Regressor};
use crate::search::cv::best_index;
use crate::search::{ParamGrid, SearchCv};
use crate::trainer::candidates::ModelCandidate;

/// Outcome of tuning one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct ModelScore {
    pub name: String,
    pub best_params: Params,
    /// Mean cross-validated R² of the best parameters.
    pub cv_score: f64,
    pub train_score: f64,
    pub test_score: f64,
}

/// Test scores for every candidate, in candidate order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelReport {
    entries: Vec<ModelScore>,
}

impl ModelReport {
    pub fn from_entries(entries: Vec<ModelScore>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ModelScore> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelScore> {
        self.entries.iter()
    }

    /// Highest test score; the earliest entry wins ties and NaN never wins.
    pub fn best(&self) -> Option<&ModelScore> {
        self.best_entry().map(|(_, entry)| entry)
    }

    /// Like [`best`](Self::best), with the entry's position in candidate order.
    pub fn best_entry(&self) -> Option<(usize, &ModelScore)> {
        best_index(self.entries.iter().map(|e| e.test_score)).map(|i| (i, &self.entries[i]))
    }

    fn push(&mut self, entry: ModelScore) {
        self.entries.push(entry);
    }
}

/// Tune, refit and score every candidate in order.
///
/// Each candidate is left holding its best parameters, fitted on the whole
/// training split. Candidate names must be unique and every candidate must
/// have a grid; both are checked before any tuning starts.
pub fn evaluate_models(
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
    models: &mut [ModelCandidate],
    grids: &HashMap<String, ParamGrid>,
    search: &SearchCv,
) -> Result<ModelReport> {
    let mut seen = HashSet::new();
    if let Some(dup) = models.iter().find(|c| !seen.insert(c.name.as_str())) {
        return Err(TrainerError::InvalidInput(format!(
            "duplicate candidate name '{}'",
            dup.name
        )));
    }
    if let Some(missing) = models.iter().find(|c| !grids.contains_key(&c.name)) {
        return Err(TrainerError::MissingGrid(missing.name.clone()));
    }

    let total = models.len();
    info!("Starting hyperparameter tuning for {} models", total);

    let mut report = ModelReport::default();
    for (i, candidate) in models.iter_mut().enumerate() {
        let grid = &grids[&candidate.name];
        info!("[{}/{}] Tuning {}", i + 1, total, candidate.name);
        if grid.is_empty() {
            info!("  No hyperparameters to tune");
        } else {
            info!(
                "  Testing {} parameter combinations with {}-fold CV",
                search.n_candidates(grid),
                search.folds.n_splits
            );
        }

        let entry = tune_candidate(x_train, y_train, x_test, y_test, candidate, grid, search)
            .with_context(|| format!("evaluating {}", candidate.name))?;

        info!("  Best params: {}", display_params(&entry.best_params));
        info!("  Test R² score: {:.4}", entry.test_score);
        report.push(entry);
    }

    info!("Hyperparameter tuning completed");
    Ok(report)
}

fn tune_candidate(
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
    candidate: &mut ModelCandidate,
    grid: &ParamGrid,
    search: &SearchCv,
) -> Result<ModelScore> {
    let result = search.fit(&candidate.model, grid, x_train, y_train)?;

    candidate.model.set_params(&result.best_params)?;
    candidate.model.fit(x_train, y_train)?;

    Ok(ModelScore {
        name: candidate.name.clone(),
        best_params: result.best_params,
        cv_score: result.best_score,
        train_score: candidate.model.score(x_train, y_train)?,
        test_score: candidate.model.score(x_test, y_test)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{DecisionTreeRegressor, LinearRegression, Model};

    fn score(name: &str, test_score: f64) -> ModelScore {
        ModelScore {
            name: name.to_string(),
            best_params: Params::new(),
            cv_score: test_score,
            train_score: test_score,
            test_score,
        }
    }

    fn linear_split() -> (Array2<f64>, Array1<f64>, Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * (j + 2) * 5) % 17) as f64);
        let y: Array1<f64> = x.outer_iter().map(|r| r[0] - 2.0 * r[1]).collect();
        let x_test = Array2::from_shape_fn((6, 2), |(i, j)| (i + j) as f64);
        let y_test = x_test.outer_iter().map(|r| r[0] - 2.0 * r[1]).collect();
        (x, y, x_test, y_test)
    }

    #[test]
    fn test_best_prefers_first_and_skips_nan() {
        let mut report = ModelReport::default();
        report.push(score("a", f64::NAN));
        report.push(score("b", 0.8));
        report.push(score("c", 0.8));
        assert_eq!(report.best().unwrap().name, "b");
        assert_eq!(report.get("c").unwrap().test_score, 0.8);
    }

    #[test]
    fn test_missing_grid_fails_before_tuning() {
        let (x, y, x_test, y_test) = linear_split();
        let mut models = vec![
            ModelCandidate::new("Linear Regression", Model::LinearRegression(LinearRegression::new())),
            ModelCandidate::new("Decision Tree", Model::DecisionTree(DecisionTreeRegressor::new())),
        ];
        let mut grids = HashMap::new();
        grids.insert("Linear Regression".to_string(), ParamGrid::new());

        let err = evaluate_models(&x, &y, &x_test, &y_test, &mut models, &grids, &SearchCv::new(3))
            .unwrap_err();
        assert!(matches!(&err, TrainerError::MissingGrid(name) if name == "Decision Tree"));
        assert!(matches!(
            models[0].model.predict(&x_test),
            Err(TrainerError::NotFitted)
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (x, y, x_test, y_test) = linear_split();
        let mut models = vec![
            ModelCandidate::new("M", Model::DecisionTree(DecisionTreeRegressor::new())),
            ModelCandidate::new("M", Model::LinearRegression(LinearRegression::new())),
        ];
        let mut grids = HashMap::new();
        grids.insert("M".to_string(), ParamGrid::new());

        let err = evaluate_models(&x, &y, &x_test, &y_test, &mut models, &grids, &SearchCv::new(3))
            .unwrap_err();
        assert!(matches!(&err, TrainerError::InvalidInput(msg) if msg.contains("'M'")));
        assert!(matches!(
            models[0].model.predict(&x_test),
            Err(TrainerError::NotFitted)
        ));
    }

    #[test]
    fn test_best_entry_reports_position() {
        let mut report = ModelReport::default();
        report.push(score("a", 0.3));
        report.push(score("b", 0.9));
        report.push(score("a", 0.5));
        let (i, best) = report.best_entry().unwrap();
        assert_eq!(i, 1);
        assert_eq!(best.name, "b");
        assert!(ModelReport::default().best_entry().is_none());
    }

    #[test]
    fn test_report_follows_candidate_order() {
        let (x, y, x_test, y_test) = linear_split();
        let mut models = vec![
            ModelCandidate::new("Decision Tree", Model::DecisionTree(DecisionTreeRegressor::new())),
            ModelCandidate::new("Linear Regression", Model::LinearRegression(LinearRegression::new())),
        ];
        let mut grids = HashMap::new();
        grids.insert(
            "Decision Tree".to_string(),
            ParamGrid::new().with("max_depth", [Some(2), None]),
        );
        grids.insert("Linear Regression".to_string(), ParamGrid::new());

        let report = evaluate_models(&x, &y, &x_test, &y_test, &mut models, &grids, &SearchCv::new(3))
            .unwrap();
        let names: Vec<&str> = report.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Decision Tree", "Linear Regression"]);
        assert_eq!(report.best().unwrap().name, "Linear Regression");
        assert!((report.get("Linear Regression").unwrap().test_score - 1.0).abs() < 1e-9);

        // Candidates are left fitted.
        assert!(models[0].model.predict(&x_test).is_ok());
    }

    #[test]
    fn test_fit_errors_carry_model_name() {
        let (x, y, x_test, y_test) = linear_split();
        let mut models = vec![ModelCandidate::new(
            "Linear Regression",
            Model::LinearRegression(LinearRegression::new()),
        )];
        let mut grids = HashMap::new();
        grids.insert(
            "Linear Regression".to_string(),
            ParamGrid::new().with("depth", [3]),
        );

        let err = evaluate_models(&x, &y, &x_test, &y_test, &mut models, &grids, &SearchCv::new(3))
            .unwrap_err();
        assert!(err.to_string().starts_with("evaluating Linear Regression"));
        assert!(matches!(err.root_cause(), TrainerError::InvalidParameter { .. }));
    }
}
