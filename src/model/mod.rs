//! Regression model: random forest and cross-validated grid search
//!
//! ```text
//! GridSearch ──< ForestParams (18 candidates × 5 folds, smartcore KFold)
//!     │
//!     └── RandomForestRegressor
//!           ├── bootstrap=true   smartcore RandomForestRegressor
//!           └── bootstrap=false  local DecisionTreeRegressor on all rows
//! ```
//!
//! All randomness is derived from a single seed so a search over the same
//! data always selects and refits the same forest.

mod forest;
mod matrix;
mod search;
mod tree;

pub use forest::{ForestParams, RandomForestRegressor};
pub use matrix::{model_value, FeatureMatrix};
pub use search::{kfold_indices, CandidateResult, GridSearch, ParamGrid, SearchOutcome};
pub use tree::{DecisionTreeRegressor, Node};
