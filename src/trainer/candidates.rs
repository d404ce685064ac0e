use std::collections::HashMap;

use strsim::jaro_winkler;

use crate::error::{Result, TrainerError};
use crate::estimators::{
    AdaBoostRegressor, CatBoostRegressor, DecisionTreeRegressor, ForestRegressor,
    GradientBoostingRegressor, LinearRegression, Model, XGBRegressor,
};
use crate::search::ParamGrid;
use crate::trainer::config::RANDOM_STATE;

/// Similarity above which an unknown name gets a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.7;

/// A named, untrained estimator.
#[derive(Debug, Clone)]
pub struct ModelCandidate {
    pub name: String,
    pub model: Model,
}

impl ModelCandidate {
    pub fn new(name: impl Into<String>, model: Model) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }
}

/// The candidate pool, in evaluation order.
pub fn default_models() -> Vec<ModelCandidate> {
    vec![
        ModelCandidate::new(
            "Random Forest",
            Model::RandomForest(ForestRegressor::random_forest().with_random_state(RANDOM_STATE)),
        ),
        ModelCandidate::new(
            "Extra Trees",
            Model::ExtraTrees(ForestRegressor::extra_trees().with_random_state(RANDOM_STATE)),
        ),
        ModelCandidate::new(
            "Decision Tree",
            Model::DecisionTree(DecisionTreeRegressor::new().with_random_state(RANDOM_STATE)),
        ),
        ModelCandidate::new(
            "Gradient Boosting",
            Model::GradientBoosting(GradientBoostingRegressor::new().with_random_state(RANDOM_STATE)),
        ),
        ModelCandidate::new("Linear Regression", Model::LinearRegression(LinearRegression::new())),
        ModelCandidate::new(
            "XGBRegressor",
            Model::XGBoost(XGBRegressor::new().with_random_state(RANDOM_STATE)),
        ),
        ModelCandidate::new(
            "CatBoosting Regressor",
            Model::CatBoost(CatBoostRegressor::new().with_random_seed(RANDOM_STATE)),
        ),
        ModelCandidate::new(
            "AdaBoost Regressor",
            Model::AdaBoost(AdaBoostRegressor::new().with_random_state(RANDOM_STATE)),
        ),
    ]
}

/// Search space for each pooled model, keyed by candidate name.
pub fn default_param_grids() -> HashMap<String, ParamGrid> {
    let learning_rates = [0.05, 0.1, 0.15];
    let mut grids = HashMap::new();

    grids.insert(
        "Random Forest".to_string(),
        ParamGrid::new()
            .with("n_estimators", [100, 200, 300])
            .with("max_depth", [Some(5), Some(10), None])
            .with("min_samples_split", [2, 5]),
    );
    grids.insert(
        "Extra Trees".to_string(),
        ParamGrid::new()
            .with("n_estimators", [100, 200])
            .with("max_depth", [Some(5), Some(10), None])
            .with("min_samples_split", [2, 5]),
    );
    grids.insert(
        "Decision Tree".to_string(),
        ParamGrid::new()
            .with("criterion", ["squared_error", "friedman_mse"])
            .with("max_depth", [Some(3), Some(5), Some(7), Some(10), None])
            .with("min_samples_split", [2, 5, 10]),
    );
    grids.insert(
        "Gradient Boosting".to_string(),
        ParamGrid::new()
            .with("n_estimators", [100, 200])
            .with("learning_rate", learning_rates)
            .with("max_depth", [3, 5, 7]),
    );
    grids.insert("Linear Regression".to_string(), ParamGrid::new());
    grids.insert(
        "XGBRegressor".to_string(),
        ParamGrid::new()
            .with("learning_rate", learning_rates)
            .with("n_estimators", [100, 200, 300])
            .with("max_depth", [3, 5, 7]),
    );
    grids.insert(
        "CatBoosting Regressor".to_string(),
        ParamGrid::new()
            .with("depth", [4, 6, 8])
            .with("learning_rate", learning_rates)
            .with("iterations", [100, 200, 300]),
    );
    grids.insert(
        "AdaBoost Regressor".to_string(),
        ParamGrid::new()
            .with("learning_rate", learning_rates)
            .with("n_estimators", [50, 100, 200]),
    );

    grids
}

/// Pick pooled candidates by name (case-insensitive), keeping pool order.
pub fn select_candidates(
    pool: Vec<ModelCandidate>,
    names: &[String],
) -> Result<Vec<ModelCandidate>> {
    // Every requested name must exist before anything is filtered
    for name in names {
        let wanted = name.trim().to_lowercase();
        if !pool.iter().any(|c| c.name.to_lowercase() == wanted) {
            return Err(TrainerError::UnknownModel(unknown_with_suggestion(&pool, name.trim())));
        }
    }

    Ok(pool
        .into_iter()
        .filter(|c| {
            let lower = c.name.to_lowercase();
            names.iter().any(|n| n.trim().to_lowercase() == lower)
        })
        .collect())
}

fn unknown_with_suggestion(pool: &[ModelCandidate], name: &str) -> String {
    let input = name.to_lowercase();
    // Try fuzzy matching
    let suggestion = pool
        .iter()
        .map(|c| (c, jaro_winkler(&c.name.to_lowercase(), &input)))
        .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1));

    match suggestion {
        Some((candidate, _)) => format!("'{}' (did you mean '{}'?)", name, candidate.name),
        None => format!("'{}'", name),
    }
}
