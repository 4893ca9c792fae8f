use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use disaster_response::{clean_data, init_logger, load_data, save_data, DatasetError};
use log::info;

const USAGE: &str = "Please provide the filepaths of the messages and categories \
datasets as the first and second argument respectively, as well as the filepath \
of the database to save the cleaned data to as the third argument. Pass \
--binarize-labels to map category values above 1 to 1. \n\n\
Example: process_data disaster_messages.csv disaster_categories.csv DisasterResponse.db";

/// Merge and clean the raw message and category CSV files into a SQLite table
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// MESSAGES_CSV CATEGORIES_CSV OUTPUT_DB
    paths: Vec<PathBuf>,

    /// Map any non-zero category value to 1 instead of rejecting it
    #[arg(long)]
    binarize_labels: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    let [messages_path, categories_path, database_path] = args.paths.as_slice() else {
        println!("{USAGE}");
        return Ok(());
    };
    let start_time = Instant::now();

    println!(
        "Loading data...\n    MESSAGES: {}\n    CATEGORIES: {}",
        messages_path.display(),
        categories_path.display()
    );
    let records = load_data(messages_path, categories_path).with_context(|| {
        format!(
            "failed to load {} and {}",
            messages_path.display(),
            categories_path.display()
        )
    })?;

    println!("Cleaning data...");
    let dataset = clean_data(records, args.binarize_labels).map_err(|e| {
        let message = match e {
            DatasetError::NonBinaryLabel { .. } => {
                "failed to clean category data; rerun with --binarize-labels to map non-zero values to 1"
            }
            _ => "failed to clean category data",
        };
        anyhow::Error::new(e).context(message)
    })?;

    println!("Saving data...\n    DATABASE: {}", database_path.display());
    save_data(&dataset, database_path)
        .await
        .with_context(|| format!("failed to save dataset to {}", database_path.display()))?;

    println!("Cleaned data saved to database!");
    info!("ETL finished in {:.2?}", start_time.elapsed());
    Ok(())
}
