use log::{info, warn};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::builder::PipelineBuilder;
use super::error::ClassifierError;
use super::features::{
    FeatureMatrix, FittedVectorizer, NgramExtraction, TermFrequencyVectorizer, VectorizerConfig,
    Vocabulary,
};
use super::forest::{ForestConfig, RandomForest};
use super::multilabel::{MultiLabelClassifier, TrainingMatrix};
use super::tokenizer::{CasualTokenizer, TokenizerConfig};
use super::PipelineInfo;
use crate::runtime::{create_thread_pool, RuntimeConfig};

/// Text-to-labels pipeline: casual tokenizer, term-frequency features and one
/// random forest per category.
///
/// A pipeline starts unfitted; [`Pipeline::fit`] learns the vocabulary and
/// all classifiers, after which it only reads its state. Every field is
/// `Send + Sync`, so a fitted pipeline can be shared across threads behind an
/// `Arc`.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use disaster_response::{ForestConfig, Pipeline};
/// use ndarray::array;
///
/// let mut pipeline = Pipeline::builder()
///     .with_forest_config(ForestConfig { n_trees: 5, ..ForestConfig::default() })
///     .build()?;
///
/// let docs = ["we need water", "the bridge collapsed"];
/// let labels = array![[1u8, 0], [0, 1]];
/// let names = vec!["water".to_string(), "infrastructure".to_string()];
/// pipeline.fit(&docs, labels.view(), &names)?;
///
/// let predicted = pipeline.predict(&["need water"])?;
/// assert_eq!(predicted.dim(), (1, 2));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    vectorizer: TermFrequencyVectorizer,
    forest_config: ForestConfig,
    runtime_config: RuntimeConfig,
    seed: u64,
    fitted: Option<FittedState>,
}

#[derive(Debug, Clone)]
struct FittedState {
    vectorizer: FittedVectorizer,
    classifier: MultiLabelClassifier<RandomForest>,
    category_names: Vec<String>,
}

/// Everything needed to reconstruct a fitted pipeline. This is the payload
/// persisted by the model store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PipelineState {
    pub tokenizer_config: TokenizerConfig,
    pub vectorizer_config: VectorizerConfig,
    pub vocabulary: Vec<String>,
    pub forest_config: ForestConfig,
    pub runtime_config: RuntimeConfig,
    pub seed: u64,
    pub category_names: Vec<String>,
    pub classifier: MultiLabelClassifier<RandomForest>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Pipeline>();
    }
};

impl Pipeline {
    /// Creates a new PipelineBuilder for fluent construction
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn unfitted(
        vectorizer: TermFrequencyVectorizer,
        forest_config: ForestConfig,
        runtime_config: RuntimeConfig,
        seed: u64,
    ) -> Self {
        Self {
            vectorizer,
            forest_config,
            runtime_config,
            seed,
            fitted: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Learns the vocabulary from `documents` and fits one forest per column
    /// of `labels`.
    ///
    /// `labels` must be `documents.len() x category_names.len()` with 0/1
    /// entries. Fitting an already fitted pipeline discards the previous
    /// vocabulary and classifiers entirely, before any validation, so a
    /// failed refit leaves the pipeline unfitted.
    pub fn fit<S: AsRef<str> + Sync>(
        &mut self,
        documents: &[S],
        labels: ArrayView2<'_, u8>,
        category_names: &[String],
    ) -> Result<(), ClassifierError> {
        if self.fitted.take().is_some() {
            warn!("Refitting pipeline; previous vocabulary and classifiers are discarded");
        }
        if documents.is_empty() {
            return Err(ClassifierError::ValidationError(
                "Cannot fit on an empty set of documents".into(),
            ));
        }
        if labels.nrows() != documents.len() {
            return Err(ClassifierError::ValidationError(format!(
                "Got {} documents but {} label rows",
                documents.len(),
                labels.nrows()
            )));
        }
        if labels.ncols() != category_names.len() {
            return Err(ClassifierError::ValidationError(format!(
                "Label matrix has {} columns but {} category names were given",
                labels.ncols(),
                category_names.len()
            )));
        }

        let pool = create_thread_pool(&self.runtime_config)
            .map_err(|e| ClassifierError::BuildError(format!("Failed to create thread pool: {e}")))?;
        info!(
            "Training on {} documents, {} labels, {} worker threads",
            documents.len(),
            category_names.len(),
            pool.current_num_threads()
        );

        let (vectorizer, classifier) = pool.install(|| {
            let vectorizer = self.vectorizer.fit(documents)?;
            let x = TrainingMatrix::new(vectorizer.transform(documents)?);
            let classifier =
                MultiLabelClassifier::<RandomForest>::fit(&self.forest_config, &x, labels, self.seed)?;
            Ok::<_, ClassifierError>((vectorizer, classifier))
        })?;

        self.fitted = Some(FittedState {
            vectorizer,
            classifier,
            category_names: category_names.to_vec(),
        });
        Ok(())
    }

    /// Maps documents to the fitted feature space.
    pub fn transform<S: AsRef<str> + Sync>(
        &self,
        documents: &[S],
    ) -> Result<FeatureMatrix, ClassifierError> {
        self.state()?.vectorizer.transform(documents)
    }

    /// Predicts a `documents.len() x N` matrix of 0/1 labels, columns in
    /// category order.
    pub fn predict<S: AsRef<str> + Sync>(
        &self,
        documents: &[S],
    ) -> Result<Array2<u8>, ClassifierError> {
        let state = self.state()?;
        let x = state.vectorizer.transform(documents)?;
        state.classifier.predict(&x)
    }

    /// Predicts labels for an already transformed feature matrix.
    pub fn predict_features(&self, x: &FeatureMatrix) -> Result<Array2<u8>, ClassifierError> {
        self.state()?.classifier.predict(x)
    }

    /// Names of the categories predicted positive for a single message.
    pub fn predict_labels(&self, text: &str) -> Result<Vec<String>, ClassifierError> {
        let state = self.state()?;
        let predicted = self.predict(&[text])?;
        Ok(state
            .category_names
            .iter()
            .zip(predicted.row(0).iter())
            .filter(|(_, &value)| value == 1)
            .map(|(name, _)| name.clone())
            .collect())
    }

    pub fn category_names(&self) -> Result<&[String], ClassifierError> {
        Ok(&self.state()?.category_names)
    }

    /// Returns information about the pipeline's fitted state
    pub fn info(&self) -> Result<PipelineInfo, ClassifierError> {
        let state = self.state()?;
        Ok(PipelineInfo {
            num_labels: state.category_names.len(),
            category_names: state.category_names.clone(),
            vocabulary_size: state.vectorizer.vocabulary().len(),
            n_trees: self.forest_config.n_trees,
            tokenizer_config: self.vectorizer.tokenizer().config().clone(),
            degenerate_labels: state.classifier.degenerate_labels().to_vec(),
        })
    }

    fn state(&self) -> Result<&FittedState, ClassifierError> {
        self.fitted.as_ref().ok_or(ClassifierError::NotFitted)
    }

    pub(crate) fn to_state(&self) -> Result<PipelineState, ClassifierError> {
        let state = self.state()?;
        Ok(PipelineState {
            tokenizer_config: self.vectorizer.tokenizer().config().clone(),
            vectorizer_config: state.vectorizer.config().clone(),
            vocabulary: state.vectorizer.vocabulary().terms().to_vec(),
            forest_config: self.forest_config.clone(),
            runtime_config: self.runtime_config.clone(),
            seed: self.seed,
            category_names: state.category_names.clone(),
            classifier: state.classifier.clone(),
        })
    }

    pub(crate) fn from_state(state: PipelineState) -> Result<Self, ClassifierError> {
        let vocabulary = Vocabulary::from_terms(state.vocabulary)?;
        if state.classifier.n_labels() != state.category_names.len() {
            return Err(ClassifierError::BuildError(format!(
                "Stored pipeline has {} classifiers but {} category names",
                state.classifier.n_labels(),
                state.category_names.len()
            )));
        }
        if let Some(forest) = state
            .classifier
            .classifiers()
            .iter()
            .find(|forest| forest.n_features() != vocabulary.len())
        {
            return Err(ClassifierError::BuildError(format!(
                "Stored forest expects {} features but the vocabulary has {}",
                forest.n_features(),
                vocabulary.len()
            )));
        }
        for forest in state.classifier.classifiers() {
            forest.check_structure()?;
        }

        let tokenizer = CasualTokenizer::new(state.tokenizer_config)?;
        let vectorizer = TermFrequencyVectorizer::new(tokenizer.clone(), state.vectorizer_config.clone())?;
        let fitted = FittedVectorizer::from_parts(tokenizer, state.vectorizer_config, vocabulary);

        Ok(Self {
            vectorizer,
            forest_config: state.forest_config,
            runtime_config: state.runtime_config,
            seed: state.seed,
            fitted: Some(FittedState {
                vectorizer: fitted,
                classifier: state.classifier,
                category_names: state.category_names,
            }),
        })
    }
}
