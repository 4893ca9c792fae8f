use disaster_response::{ForestConfig, ModelError, ModelStore, Pipeline};
use ndarray::array;
use std::fs;
use tempfile::tempdir;

fn fitted_pipeline(seed: u64) -> Pipeline {
    let mut pipeline = Pipeline::builder()
        .with_forest_config(ForestConfig {
            n_trees: 12,
            ..ForestConfig::default()
        })
        .with_seed(seed)
        .build()
        .expect("Failed to build pipeline");
    let docs = [
        "Water is urgently needed",
        "send tents and food",
        "the bridge on route 5 collapsed",
        "we need water and food",
    ];
    let labels = array![[1u8, 0, 0], [0, 1, 0], [0, 0, 1], [1, 1, 0]];
    let names = vec!["water".to_string(), "aid".to_string(), "infrastructure".to_string()];
    pipeline
        .fit(&docs, labels.view(), &names)
        .expect("Failed to fit pipeline");
    pipeline
}

#[test]
fn test_round_trip_predictions_are_identical() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("classifier.bin");
    let pipeline = fitted_pipeline(42);

    ModelStore::save(&pipeline, &path)?;
    ModelStore::verify(&path)?;
    let loaded = ModelStore::load(&path)?;

    let batch = [
        "water",
        "tents for the families",
        "bridge collapsed near the water tower",
        "",
        "completely unrelated sentence",
    ];
    let x = pipeline.transform(&batch)?;
    assert_eq!(loaded.transform(&batch)?, x);
    assert_eq!(loaded.predict_features(&x)?, pipeline.predict_features(&x)?);
    assert_eq!(loaded.predict(&batch)?, pipeline.predict(&batch)?);
    assert_eq!(loaded.info()?, pipeline.info()?);
    Ok(())
}

#[test]
fn test_save_overwrites_existing_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("classifier.bin");
    fs::write(&path, b"stale contents")?;

    let pipeline = fitted_pipeline(7);
    ModelStore::save(&pipeline, &path)?;
    let loaded = ModelStore::load(&path)?;
    assert_eq!(loaded.seed(), 7);
    Ok(())
}

#[test]
fn test_corrupt_artifact_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("classifier.bin");
    ModelStore::save(&fitted_pipeline(42), &path)?;

    let mut bytes = fs::read(&path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, &bytes)?;

    assert!(matches!(ModelStore::verify(&path), Err(ModelError::HashMismatch { .. })));
    assert!(matches!(ModelStore::load(&path), Err(ModelError::HashMismatch { .. })));
    Ok(())
}

#[test]
fn test_garbage_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("classifier.bin");
    fs::write(&path, b"not a model")?;
    assert!(ModelStore::load(&path).is_err());
    Ok(())
}

#[test]
fn test_write_failure_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    // A directory cannot be overwritten by a file.
    let result = ModelStore::save(&fitted_pipeline(42), dir.path());
    assert!(matches!(result, Err(ModelError::Io(_))));
    Ok(())
}

#[test]
fn test_unfitted_pipeline_cannot_be_saved() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("classifier.bin");
    let result = ModelStore::save(&Pipeline::builder().build()?, &path);
    assert!(matches!(result, Err(ModelError::NotTrained)));
    assert!(!path.exists());
    Ok(())
}
