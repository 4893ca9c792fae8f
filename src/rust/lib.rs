//! Multi-label classification of disaster-response messages.
//!
//! Messages are tokenized with a casual-text tokenizer, turned into
//! normalized unigram and bigram counts, and scored by one random forest per
//! category. The crate also carries the ETL that produces the training table
//! and a model store for fitted pipelines.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use disaster_response::{ForestConfig, Pipeline};
//! use ndarray::array;
//!
//! let mut pipeline = Pipeline::builder()
//!     .with_forest_config(ForestConfig { n_trees: 10, ..ForestConfig::default() })
//!     .with_seed(42)
//!     .build()?;
//!
//! let messages = ["Water is urgently needed", "send tents and food"];
//! let labels = array![[1u8, 0, 0], [0, 1, 1]];
//! let categories = vec!["water".to_string(), "shelter".to_string(), "food".to_string()];
//! pipeline.fit(&messages, labels.view(), &categories)?;
//!
//! let predicted = pipeline.predict_labels("we need water")?;
//! println!("Predicted categories: {:?}", predicted);
//! # Ok(())
//! # }
//! ```
//!
//! # Training from the cleaned database
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use disaster_response::{load_dataset, train_and_evaluate, ModelStore, TrainingConfig};
//!
//! let dataset = load_dataset("DisasterResponse.db").await?;
//! let (pipeline, report) = train_and_evaluate(&dataset, &TrainingConfig::from_env())?;
//! println!("{}", report);
//! ModelStore::save(&pipeline, "classifier.bin")?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod dataset;
pub mod evaluation;
pub mod model_store;
mod runtime;
pub mod trainer;

pub use classifier::{
    BinaryClassifier, CasualTokenizer, ClassifierError, FeatureMatrix, ForestConfig, Norm,
    Pipeline, PipelineBuilder, PipelineInfo, RandomForest, TokenizerConfig, VectorizerConfig,
    DEFAULT_SEED,
};
pub use dataset::{
    clean_data, load_data, load_dataset, save_data, Dataset, DatasetError, LabeledMessage,
};
pub use evaluation::{evaluate, EvaluationReport, LabelMetrics};
pub use model_store::{ModelError, ModelStore};
pub use runtime::{create_thread_pool, RuntimeConfig};
pub use trainer::{train_and_evaluate, train_test_split, DatasetSplit, TrainingConfig};

/// Initializes `env_logger` with `info` as the default level; `RUST_LOG`
/// overrides it.
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
