pub mod adaboost;
pub mod catboost;
pub mod forest;
pub mod gradient_boosting;
pub mod linear;
pub mod params;
pub mod tree;
pub mod xgboost;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::metrics::r2_score;

pub use adaboost::{AdaBoostLoss, AdaBoostRegressor};
pub use catboost::CatBoostRegressor;
pub use forest::{ForestKind, ForestRegressor};
pub use gradient_boosting::GradientBoostingRegressor;
pub use linear::LinearRegression;
pub use params::{display_params, ParamValue, Params};
pub use tree::{Criterion, DecisionTreeRegressor, Splitter};
pub use xgboost::XGBRegressor;

/// A trainable regression model.
pub trait Regressor {
    /// Estimator type name, used in error messages.
    fn name(&self) -> &'static str;

    fn get_params(&self) -> Params;

    /// Apply hyperparameters. Unknown names and mistyped values are rejected.
    fn set_params(&mut self, params: &Params) -> Result<()>;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// R² of the model's predictions on `x` against `y`.
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        r2_score(y, &y_pred)
    }
}

/// Every estimator the trainer can select; this is the persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Model {
    RandomForest(ForestRegressor),
    ExtraTrees(ForestRegressor),
    DecisionTree(DecisionTreeRegressor),
    GradientBoosting(GradientBoostingRegressor),
    LinearRegression(LinearRegression),
    XGBoost(XGBRegressor),
    CatBoost(CatBoostRegressor),
    AdaBoost(AdaBoostRegressor),
}

macro_rules! dispatch {
    ($model:expr, $inner:ident => $body:expr) => {
        match $model {
            Model::RandomForest($inner) => $body,
            Model::ExtraTrees($inner) => $body,
            Model::DecisionTree($inner) => $body,
            Model::GradientBoosting($inner) => $body,
            Model::LinearRegression($inner) => $body,
            Model::XGBoost($inner) => $body,
            Model::CatBoost($inner) => $body,
            Model::AdaBoost($inner) => $body,
        }
    };
}

impl Regressor for Model {
    fn name(&self) -> &'static str {
        dispatch!(self, m => m.name())
    }

    fn get_params(&self) -> Params {
        dispatch!(self, m => m.get_params())
    }

    fn set_params(&mut self, params: &Params) -> Result<()> {
        dispatch!(self, m => m.set_params(params))
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        dispatch!(self, m => m.fit(x, y))
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        dispatch!(self, m => m.predict(x))
    }
}

/// Reject empty training sets and mismatched target lengths.
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(TrainerError::Shape {
            expected: format!("{} targets", x.nrows()),
            actual: format!("{} targets", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(TrainerError::InvalidInput(
            "cannot fit on an empty training set".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_predict_input(n_features: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != n_features {
        return Err(TrainerError::Shape {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
