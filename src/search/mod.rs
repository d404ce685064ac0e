pub mod cv;
pub mod grid;
pub mod kfold;

pub use cv::{CandidateScore, SearchCv, SearchResult, SearchStrategy};
pub use grid::ParamGrid;
pub use kfold::{Fold, KFold};
