use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Parameter name to value, ordered by name.
pub type Params = BTreeMap<String, ParamValue>;

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::None => write!(f, "None"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::None, Into::into)
    }
}

/// Format params as `a=1, b=None` for display.
pub fn display_params(params: &Params) -> String {
    if params.is_empty() {
        return "{}".to_string();
    }
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn param_usize(estimator: &str, name: &str, value: &ParamValue) -> Result<usize> {
    match value {
        ParamValue::Int(i) if *i >= 0 => Ok(*i as usize),
        ParamValue::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Ok(*v as usize),
        other => Err(TrainerError::invalid_param(
            estimator,
            format!("'{}' expects a non-negative integer, got {}", name, other),
        )),
    }
}

pub(crate) fn param_opt_usize(
    estimator: &str,
    name: &str,
    value: &ParamValue,
) -> Result<Option<usize>> {
    match value {
        ParamValue::None => Ok(None),
        other => param_usize(estimator, name, other).map(Some),
    }
}

pub(crate) fn param_f64(estimator: &str, name: &str, value: &ParamValue) -> Result<f64> {
    match value {
        ParamValue::Float(v) => Ok(*v),
        ParamValue::Int(i) => Ok(*i as f64),
        other => Err(TrainerError::invalid_param(
            estimator,
            format!("'{}' expects a number, got {}", name, other),
        )),
    }
}

pub(crate) fn param_u64(estimator: &str, name: &str, value: &ParamValue) -> Result<Option<u64>> {
    match value {
        ParamValue::None => Ok(None),
        ParamValue::Int(i) if *i >= 0 => Ok(Some(*i as u64)),
        other => Err(TrainerError::invalid_param(
            estimator,
            format!("'{}' expects a seed or None, got {}", name, other),
        )),
    }
}

pub(crate) fn param_bool(estimator: &str, name: &str, value: &ParamValue) -> Result<bool> {
    match value {
        ParamValue::Bool(b) => Ok(*b),
        other => Err(TrainerError::invalid_param(
            estimator,
            format!("'{}' expects true or false, got {}", name, other),
        )),
    }
}

pub(crate) fn param_str<'a>(estimator: &str, name: &str, value: &'a ParamValue) -> Result<&'a str> {
    match value {
        ParamValue::Str(s) => Ok(s.as_str()),
        other => Err(TrainerError::invalid_param(
            estimator,
            format!("'{}' expects a string, got {}", name, other),
        )),
    }
}

pub(crate) fn unknown_param(estimator: &str, name: &str) -> TrainerError {
    TrainerError::invalid_param(estimator, format!("unknown parameter '{}'", name))
}
