use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::estimators::params::{param_bool, unknown_param, Params};
use crate::estimators::{check_fit_input, check_predict_input, Regressor};

/// Pivots below this fraction of their diagonal entry count as singular.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Relative diagonal jitter tried when the normal equations are singular.
const JITTER_STEPS: [f64; 3] = [1e-12, 1e-9, 1e-6];

/// Solve `a * w = b` for symmetric positive-definite `a` via Cholesky.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if !diag.is_finite() || diag <= PIVOT_TOLERANCE * a[[i, i]].abs() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L * z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * w = z
    let mut w = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * w[j]).sum();
        w[i] = (z[i] - sum) / l[[i, i]];
    }

    Some(w)
}

/// Normal-equation solve, retrying with growing diagonal jitter for
/// rank-deficient designs.
fn solve_least_squares(x: &Array2<f64>, y: &Array1<f64>) -> Option<Array1<f64>> {
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);

    if let Some(w) = cholesky_solve(&xtx, &xty) {
        return Some(w);
    }

    let n = xtx.nrows();
    let scale = (xtx.diag().sum() / n.max(1) as f64).abs().max(1.0);
    for step in JITTER_STEPS {
        let mut jittered = xtx.clone();
        for i in 0..n {
            jittered[[i, i]] += step * scale;
        }
        if let Some(w) = cholesky_solve(&jittered, &xty) {
            return Some(w);
        }
    }
    None
}

/// Ordinary least squares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub fit_intercept: bool,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            coefficients: None,
            intercept: 0.0,
        }
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegression {
    fn name(&self) -> &'static str {
        "LinearRegression"
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("fit_intercept".into(), self.fit_intercept.into());
        params
    }

    fn set_params(&mut self, params: &Params) -> Result<()> {
        let name = self.name();
        for (key, value) in params {
            match key.as_str() {
                "fit_intercept" => self.fit_intercept = param_bool(name, key, value)?,
                _ => return Err(unknown_param(name, key)),
            }
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;

        let (coefficients, intercept) = if self.fit_intercept {
            let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
            let y_mean = y.mean().unwrap_or(0.0);
            let x_centered = x - &x_mean.view().insert_axis(Axis(0));
            let y_centered = y - y_mean;

            let w = solve_least_squares(&x_centered, &y_centered).ok_or_else(|| {
                TrainerError::Computation("least squares system is singular".to_string())
            })?;
            let intercept = y_mean - w.dot(&x_mean);
            (w, intercept)
        } else {
            let w = solve_least_squares(x, y).ok_or_else(|| {
                TrainerError::Computation("least squares system is singular".to_string())
            })?;
            (w, 0.0)
        };

        self.coefficients = Some(coefficients);
        self.intercept = intercept;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(TrainerError::NotFitted)?;
        check_predict_input(coefficients.len(), x)?;
        Ok(x.dot(coefficients) + self.intercept)
    }
}
