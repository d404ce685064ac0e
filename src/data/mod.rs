mod matrix;

pub use matrix::{load_matrix, split_features_target, write_column};
