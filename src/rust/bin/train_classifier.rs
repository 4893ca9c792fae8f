use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use disaster_response::trainer::{evaluate_rows, fit_rows, DEFAULT_TEST_RATIO};
use disaster_response::{
    init_logger, load_dataset, train_test_split, ModelStore, RuntimeConfig, TrainingConfig,
};
use log::info;

const USAGE: &str = "Please provide the filepath of the disaster messages database \
as the first argument and the filepath of the model file to save the model to as \
the second argument. \n\nExample: train_classifier ../data/DisasterResponse.db classifier.bin";

/// Train the per-category message classifier and report its test-split scores
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DATABASE_PATH MODEL_OUTPUT_PATH
    paths: Vec<PathBuf>,

    /// Seed for the train/test split and every forest [default: $DISASTER_RESPONSE_SEED or 42]
    #[arg(long)]
    seed: Option<u64>,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = DEFAULT_TEST_RATIO)]
    test_ratio: f64,

    /// Trees per category forest
    #[arg(long, default_value_t = 100)]
    trees: usize,

    /// Maximum tree depth; unlimited when absent
    #[arg(long)]
    max_depth: Option<usize>,

    /// Worker threads for training; 0 uses every available core
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Keep tokens as written instead of reducing them to their lemma
    #[arg(long)]
    no_lemmatize: bool,
}

impl Args {
    fn training_config(&self) -> TrainingConfig {
        let mut config = TrainingConfig::from_env();
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.test_ratio = self.test_ratio;
        config.forest.n_trees = self.trees;
        config.forest.max_depth = self.max_depth;
        config.runtime = RuntimeConfig::with_threads(self.threads);
        config.tokenizer.lemmatize = !self.no_lemmatize;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    let [database_path, model_path] = args.paths.as_slice() else {
        println!("{USAGE}");
        return Ok(());
    };
    let config = args.training_config();
    let start_time = Instant::now();

    println!("Loading data...\n    DATABASE: {}", database_path.display());
    let dataset = load_dataset(database_path)
        .await
        .with_context(|| format!("failed to load dataset from {}", database_path.display()))?;
    let split = train_test_split(dataset.len(), config.test_ratio, config.seed)
        .context("failed to split dataset")?;
    info!(
        "Split {} rows into {} train / {} test (seed {})",
        dataset.len(),
        split.train.len(),
        split.test.len(),
        config.seed
    );

    println!("Building model...");
    let mut pipeline = config
        .pipeline_builder()
        .build()
        .context("invalid model configuration")?;

    println!("Training model...");
    let train_start = Instant::now();
    fit_rows(&mut pipeline, &dataset, &split.train).context("failed to train model")?;
    info!("Training took {:.2?}", train_start.elapsed());

    println!("Evaluating model...");
    let report = evaluate_rows(&pipeline, &dataset, &split.test).context("failed to evaluate model")?;
    println!("{report}");

    println!("Saving model...\n    MODEL: {}", model_path.display());
    ModelStore::save(&pipeline, model_path)
        .with_context(|| format!("failed to save model to {}", model_path.display()))?;

    println!("Trained model saved!");
    info!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}
