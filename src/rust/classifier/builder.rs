use log::info;

use super::error::ClassifierError;
use super::features::{TermFrequencyVectorizer, VectorizerConfig};
use super::forest::ForestConfig;
use super::model::Pipeline;
use super::tokenizer::{CasualTokenizer, TokenizerConfig};
use crate::runtime::RuntimeConfig;

/// Seed used when none is configured, so that unconfigured runs are
/// reproducible.
pub const DEFAULT_SEED: u64 = 42;

/// A builder for constructing an unfitted [`Pipeline`] with a fluent interface.
///
/// # Example
/// ```
/// use disaster_response::{Pipeline, ForestConfig};
///
/// let pipeline = Pipeline::builder()
///     .with_forest_config(ForestConfig { n_trees: 10, ..ForestConfig::default() })
///     .with_seed(7)
///     .build()
///     .unwrap();
/// assert!(!pipeline.is_fitted());
/// ```
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    tokenizer_config: TokenizerConfig,
    vectorizer_config: VectorizerConfig,
    forest_config: ForestConfig,
    runtime_config: RuntimeConfig,
    seed: u64,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates a builder with the default configuration: lemmatizing casual
    /// tokenizer, L2-normalized unigram and bigram counts, 100-tree forests.
    pub fn new() -> Self {
        Self {
            tokenizer_config: TokenizerConfig::default(),
            vectorizer_config: VectorizerConfig::default(),
            forest_config: ForestConfig::default(),
            runtime_config: RuntimeConfig::default(),
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_tokenizer_config(mut self, config: TokenizerConfig) -> Self {
        self.tokenizer_config = config;
        self
    }

    pub fn with_vectorizer_config(mut self, config: VectorizerConfig) -> Self {
        self.vectorizer_config = config;
        self
    }

    pub fn with_forest_config(mut self, config: ForestConfig) -> Self {
        self.forest_config = config;
        self
    }

    /// Sets the thread bound for per-label training
    ///
    /// # Example
    /// ```
    /// use disaster_response::{PipelineBuilder, RuntimeConfig};
    ///
    /// let builder = PipelineBuilder::new()
    ///     .with_runtime_config(RuntimeConfig::with_threads(4));
    /// ```
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Seeds every random stream of training: each label's forest derives
    /// its own stream from this value.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration and returns an unfitted pipeline.
    ///
    /// # Returns
    /// * `Result<Pipeline, ClassifierError>` - The pipeline, or an error if:
    ///   - The forest has no trees, `min_samples_split < 2`, or `max_features`/`max_depth` is 0
    ///   - The n-gram range is empty or starts at 0
    ///   - The tokenizer pattern fails to compile
    pub fn build(self) -> Result<Pipeline, ClassifierError> {
        self.forest_config.validate()?;
        info!(
            "Pipeline configured: {} trees per label, n-gram range {:?}, seed {}",
            self.forest_config.n_trees, self.vectorizer_config.ngram_range, self.seed
        );

        let tokenizer = CasualTokenizer::new(self.tokenizer_config)?;
        let vectorizer = TermFrequencyVectorizer::new(tokenizer, self.vectorizer_config)?;

        Ok(Pipeline::unfitted(
            vectorizer,
            self.forest_config,
            self.runtime_config,
            self.seed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::utils::Norm;

    #[test]
    fn test_default_build() {
        let pipeline = PipelineBuilder::new().build().unwrap();
        assert!(!pipeline.is_fitted());
        assert_eq!(pipeline.seed(), DEFAULT_SEED);
    }

    #[test]
    fn test_invalid_forest_config() {
        let result = PipelineBuilder::new()
            .with_forest_config(ForestConfig {
                n_trees: 0,
                ..ForestConfig::default()
            })
            .build();
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));

        let result = PipelineBuilder::new()
            .with_forest_config(ForestConfig {
                min_samples_split: 1,
                ..ForestConfig::default()
            })
            .build();
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_ngram_range() {
        let result = PipelineBuilder::new()
            .with_vectorizer_config(VectorizerConfig {
                ngram_range: (0, 2),
                norm: Norm::L2,
            })
            .build();
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }
}
