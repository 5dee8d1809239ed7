//! # housing-value: Reproducible Housing-Price Batch Pipeline
//!
//! Trains a random forest regressor that predicts median house value per
//! census block group, then scores it on a held-out split.
//!
//! ```text
//! raw CSV ─► Stratifier ─► train.csv ─► FeaturePreparer.fit ─► GridSearch ─► pipe.json
//!                       └► test.csv  ─► PreparerState.transform ─► Scorer ─► output.csv
//! ```
//!
//! ## Design Principles
//!
//! - **Fit once, replay verbatim**: the preparer's learned state is
//!   persisted with the model and never re-fitted on evaluation data
//! - **Seeded determinism**: the same input and seed give the same split,
//!   the same forest and the same predictions
//! - **Fail fast**: every error aborts the current run; partial results
//!   are never salvaged
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use housing_value::config::PipelineConfig;
//! use housing_value::pipeline;
//!
//! let config = PipelineConfig::from_toml_file("housing.toml")?;
//! let summary = pipeline::run_all(&config)?;
//! println!("rmse = {:.2}", summary.score.report.rmse());
//! # Ok::<(), housing_value::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod config;
pub mod error;
pub mod experiment;
pub mod features;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod schema;
pub mod score;
pub mod storage;
pub mod stratify;
pub mod train;

pub use error::{Error, Result};
