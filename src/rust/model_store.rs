use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use log;

use crate::classifier::{ClassifierError, Pipeline, PipelineState};

/// Version of the on-disk artifact layout written by [`ModelStore::save`].
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("Incompatible artifact version {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
    #[error("Pipeline has not been trained; nothing to save")]
    NotTrained,
    #[error("Stored pipeline is invalid: {0}")]
    InvalidPipeline(#[from] ClassifierError),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    checksum: String,
    payload: Vec<u8>,
}

/// Persists fitted pipelines as a single self-verifying file.
///
/// The file is a bincode envelope holding a format version, the SHA-256 of
/// the payload and the payload itself (the serialized pipeline state).
pub struct ModelStore;

impl ModelStore {
    /// Writes `pipeline` to `path`, replacing any existing file.
    pub fn save<P: AsRef<Path>>(pipeline: &Pipeline, path: P) -> Result<(), ModelError> {
        let path = path.as_ref();
        let state = pipeline.to_state().map_err(|e| match e {
            ClassifierError::NotFitted => ModelError::NotTrained,
            other => ModelError::InvalidPipeline(other),
        })?;

        let payload = bincode::serialize(&state)?;
        let checksum = sha256_hex(&payload);
        log::info!("Serialized pipeline: {} bytes, sha256 {}", payload.len(), checksum);

        let bytes = bincode::serialize(&Envelope {
            format_version: FORMAT_VERSION,
            checksum,
            payload,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        log::info!("Writing {} bytes to {:?}", bytes.len(), path);
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Reads a pipeline written by [`ModelStore::save`]. The result predicts
    /// exactly what the saved pipeline predicted.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Pipeline, ModelError> {
        let path = path.as_ref();
        let envelope = Self::read_verified(path)?;
        let state: PipelineState = bincode::deserialize(&envelope.payload)?;
        let pipeline = Pipeline::from_state(state)?;
        log::info!("Loaded pipeline from {:?}", path);
        Ok(pipeline)
    }

    /// Checks the version and checksum of an artifact without reconstructing
    /// the pipeline.
    pub fn verify<P: AsRef<Path>>(path: P) -> Result<(), ModelError> {
        Self::read_verified(path.as_ref()).map(|_| ())
    }

    fn read_verified(path: &Path) -> Result<Envelope, ModelError> {
        log::info!("Verifying artifact: {:?}", path);
        let bytes = fs::read(path)?;
        let envelope: Envelope = bincode::deserialize(&bytes)?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(ModelError::IncompatibleVersion {
                found: envelope.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let actual = sha256_hex(&envelope.payload);
        if actual != envelope.checksum {
            log::error!("Artifact hash mismatch: expected {}, got {}", envelope.checksum, actual);
            return Err(ModelError::HashMismatch {
                expected: envelope.checksum,
                actual,
            });
        }
        Ok(envelope)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ForestConfig;
    use ndarray::array;
    use tempfile::tempdir;

    fn write_state(path: &Path, state: &PipelineState) {
        let payload = bincode::serialize(state).unwrap();
        let bytes = bincode::serialize(&Envelope {
            format_version: FORMAT_VERSION,
            checksum: sha256_hex(&payload),
            payload,
        })
        .unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_unfitted_pipeline_is_not_saved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let pipeline = Pipeline::builder().build().unwrap();

        assert!(matches!(
            ModelStore::save(&pipeline, &path),
            Err(ModelError::NotTrained)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let payload = vec![1u8, 2, 3];
        let bytes = bincode::serialize(&Envelope {
            format_version: FORMAT_VERSION + 1,
            checksum: sha256_hex(&payload),
            payload,
        })
        .unwrap();
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            ModelStore::verify(&path),
            Err(ModelError::IncompatibleVersion { found, .. }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ModelStore::load(dir.path().join("absent.bin")),
            Err(ModelError::Io(_))
        ));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_inconsistent_payload_with_valid_checksum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let mut pipeline = Pipeline::builder()
            .with_forest_config(ForestConfig {
                n_trees: 5,
                ..ForestConfig::default()
            })
            .build()
            .unwrap();
        let labels = array![[1u8, 0], [0, 1]];
        let names = vec!["water".to_string(), "shelter".to_string()];
        pipeline
            .fit(&["need water", "need tents"], labels.view(), &names)
            .unwrap();

        let mut narrow = pipeline.to_state().unwrap();
        narrow.vocabulary.pop();
        write_state(&path, &narrow);
        assert!(ModelStore::verify(&path).is_ok());
        assert!(matches!(
            ModelStore::load(&path),
            Err(ModelError::InvalidPipeline(ClassifierError::BuildError(_)))
        ));

        let mut extra_category = pipeline.to_state().unwrap();
        extra_category.category_names.push("food".to_string());
        write_state(&path, &extra_category);
        assert!(matches!(
            ModelStore::load(&path),
            Err(ModelError::InvalidPipeline(_))
        ));

        write_state(&path, &pipeline.to_state().unwrap());
        assert!(ModelStore::load(&path).is_ok());
    }
}
