use std::env;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::classifier::{
    ClassifierError, ForestConfig, Pipeline, PipelineBuilder, TokenizerConfig, VectorizerConfig,
    DEFAULT_SEED,
};
use crate::dataset::Dataset;
use crate::evaluation::{evaluate, EvaluationReport};
use crate::runtime::RuntimeConfig;

/// Environment variable overriding [`TrainingConfig::seed`] when no seed is
/// given explicitly.
pub const SEED_ENV_VAR: &str = "DISASTER_RESPONSE_SEED";

pub const DEFAULT_TEST_RATIO: f64 = 0.2;

/// Settings of one training run: the held-out fraction, the seed shared by
/// the split and every forest, and the pipeline knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub test_ratio: f64,
    pub seed: u64,
    pub tokenizer: TokenizerConfig,
    pub vectorizer: VectorizerConfig,
    pub forest: ForestConfig,
    pub runtime: RuntimeConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_ratio: DEFAULT_TEST_RATIO,
            seed: DEFAULT_SEED,
            tokenizer: TokenizerConfig::default(),
            vectorizer: VectorizerConfig::default(),
            forest: ForestConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Default configuration with the seed taken from `DISASTER_RESPONSE_SEED`
    /// when it is set to a valid integer.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var(SEED_ENV_VAR) {
            match value.trim().parse::<u64>() {
                Ok(seed) => config.seed = seed,
                Err(_) => warn!("Ignoring {SEED_ENV_VAR}={value:?}: not an unsigned integer"),
            }
        }
        config
    }

    pub fn pipeline_builder(&self) -> PipelineBuilder {
        PipelineBuilder::new()
            .with_tokenizer_config(self.tokenizer.clone())
            .with_vectorizer_config(self.vectorizer.clone())
            .with_forest_config(self.forest.clone())
            .with_runtime_config(self.runtime.clone())
            .with_seed(self.seed)
    }
}

/// Disjoint row indices covering a dataset exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Randomly assigns `n_rows` rows to a train and a test partition.
///
/// The test partition holds `ceil(test_ratio * n_rows)` rows, clamped so
/// that both partitions are non-empty.
pub fn train_test_split(
    n_rows: usize,
    test_ratio: f64,
    seed: u64,
) -> Result<DatasetSplit, ClassifierError> {
    if n_rows < 2 {
        return Err(ClassifierError::ValidationError(format!(
            "Need at least 2 rows to split, got {n_rows}"
        )));
    }
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(ClassifierError::ValidationError(format!(
            "Test ratio must be in (0, 1), got {test_ratio}"
        )));
    }

    let n_test = ((test_ratio * n_rows as f64).ceil() as usize).clamp(1, n_rows - 1);
    let mut rows: Vec<usize> = (0..n_rows).collect();
    rows.shuffle(&mut StdRng::seed_from_u64(seed));

    let train = rows.split_off(n_test);
    Ok(DatasetSplit { train, test: rows })
}

/// Fits `pipeline` on the given rows of `dataset`.
pub fn fit_rows(
    pipeline: &mut Pipeline,
    dataset: &Dataset,
    rows: &[usize],
) -> Result<(), ClassifierError> {
    let messages = dataset.messages_at(rows);
    let labels = dataset.labels_at(rows);
    pipeline.fit(&messages, labels.view(), dataset.category_names())
}

/// Scores `pipeline` on the given rows of `dataset`.
pub fn evaluate_rows(
    pipeline: &Pipeline,
    dataset: &Dataset,
    rows: &[usize],
) -> Result<EvaluationReport, ClassifierError> {
    let messages = dataset.messages_at(rows);
    let predicted = pipeline.predict(&messages)?;
    let report = evaluate(
        dataset.labels_at(rows).view(),
        predicted.view(),
        dataset.category_names(),
    )?;

    let undefined = report.undefined_labels();
    if undefined > 0 {
        warn!(
            "{} of {} labels have undefined precision or recall on the test split",
            undefined,
            report.labels.len()
        );
    }
    Ok(report)
}

/// Splits `dataset`, fits a pipeline on the train rows and scores it on the
/// test rows.
pub fn train_and_evaluate(
    dataset: &Dataset,
    config: &TrainingConfig,
) -> Result<(Pipeline, EvaluationReport), ClassifierError> {
    let split = train_test_split(dataset.len(), config.test_ratio, config.seed)?;
    info!(
        "Split {} rows into {} train / {} test",
        dataset.len(),
        split.train.len(),
        split.test.len()
    );

    let mut pipeline = config.pipeline_builder().build()?;
    fit_rows(&mut pipeline, dataset, &split.train)?;
    let report = evaluate_rows(&pipeline, dataset, &split.test)?;
    info!("Exact-match accuracy on the test split: {:.4}", report.accuracy);
    Ok((pipeline, report))
}
