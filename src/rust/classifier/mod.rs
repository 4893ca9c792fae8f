mod error;
mod lemmatizer;
mod tokenizer;
mod utils;
mod features;
mod forest;
mod multilabel;
mod model;
pub mod builder;

pub use error::ClassifierError;
pub use lemmatizer::Lemmatizer;
pub use tokenizer::{CasualTokenizer, TokenSequence, TokenizerConfig};
pub use utils::Norm;
pub use features::{FeatureMatrix, FittedVectorizer, TermFrequencyVectorizer, VectorizerConfig, Vocabulary};
pub use forest::{DecisionTree, ForestConfig, RandomForest};
pub use multilabel::{BinaryClassifier, MultiLabelClassifier, TrainingMatrix};
pub use model::Pipeline;
pub use builder::{PipelineBuilder, DEFAULT_SEED};

pub(crate) use model::PipelineState;

/// Information about the fitted state and configuration of a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInfo {
    /// Number of categories the pipeline predicts
    pub num_labels: usize,
    /// Category names in label order
    pub category_names: Vec<String>,
    /// Number of n-grams in the fitted vocabulary
    pub vocabulary_size: usize,
    /// Trees per category forest
    pub n_trees: usize,
    pub tokenizer_config: TokenizerConfig,
    /// Categories that had a single class in the training data
    pub degenerate_labels: Vec<usize>,
}
