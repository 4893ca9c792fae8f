//! Typed records of the cleaned disaster-message dataset, and the ETL and
//! SQLite plumbing that produces and persists them.

use std::io;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

pub mod etl;
pub mod store;

pub use etl::{clean_data, load_data, RawRecord};
pub use store::{load_dataset, save_data, TABLE_NAME};

/// Columns of the `dataset` table that are not categories.
pub const METADATA_COLUMNS: [&str; 4] = ["id", "message", "original", "genre"];

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Malformed category '{value}' in row {row}")]
    MalformedCategory { row: usize, value: String },
    #[error("Category '{category}' has non-binary value {value} in row {row}")]
    NonBinaryLabel {
        row: usize,
        category: String,
        value: i64,
    },
    #[error("Inconsistent categories in row {row}: {detail}")]
    InconsistentCategories { row: usize, detail: String },
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Dataset is empty")]
    EmptyDataset,
}

/// One cleaned message with its binary category labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabeledMessage {
    pub id: i64,
    pub message: String,
    pub original: Option<String>,
    pub genre: String,
    /// One 0/1 value per category, in [`Dataset::category_names`] order.
    pub labels: Vec<u8>,
}

/// Cleaned messages sharing one ordered list of categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    category_names: Vec<String>,
    records: Vec<LabeledMessage>,
}

impl Dataset {
    /// Checks that every record carries one 0/1 label per category.
    pub fn new(
        category_names: Vec<String>,
        records: Vec<LabeledMessage>,
    ) -> Result<Self, DatasetError> {
        if records.is_empty() {
            return Err(DatasetError::EmptyDataset);
        }
        for (row, record) in records.iter().enumerate() {
            if record.labels.len() != category_names.len() {
                return Err(DatasetError::InconsistentCategories {
                    row,
                    detail: format!(
                        "expected {} labels, found {}",
                        category_names.len(),
                        record.labels.len()
                    ),
                });
            }
            if let Some((j, &value)) = record.labels.iter().enumerate().find(|(_, &v)| v > 1) {
                return Err(DatasetError::NonBinaryLabel {
                    row,
                    category: category_names[j].clone(),
                    value: value as i64,
                });
            }
        }
        Ok(Self {
            category_names,
            records,
        })
    }

    pub fn category_names(&self) -> &[String] {
        &self.category_names
    }

    pub fn records(&self) -> &[LabeledMessage] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.message.as_str()).collect()
    }

    /// `len() x category_names().len()` label matrix.
    pub fn labels(&self) -> Array2<u8> {
        Array2::from_shape_fn((self.records.len(), self.category_names.len()), |(i, j)| {
            self.records[i].labels[j]
        })
    }

    /// Messages of the given rows, in the order given.
    pub fn messages_at(&self, rows: &[usize]) -> Vec<&str> {
        rows.iter()
            .map(|&i| self.records[i].message.as_str())
            .collect()
    }

    /// Label rows of the given rows, in the order given.
    pub fn labels_at(&self, rows: &[usize]) -> Array2<u8> {
        self.labels().select(Axis(0), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, message: &str, labels: Vec<u8>) -> LabeledMessage {
        LabeledMessage {
            id,
            message: message.to_string(),
            original: None,
            genre: "direct".to_string(),
            labels,
        }
    }

    #[test]
    fn test_label_matrix() {
        let dataset = Dataset::new(
            vec!["water".into(), "food".into()],
            vec![record(1, "need water", vec![1, 0]), record(2, "hungry", vec![0, 1])],
        )
        .unwrap();
        assert_eq!(dataset.labels(), ndarray::array![[1u8, 0], [0, 1]]);
        assert_eq!(dataset.messages_at(&[1]), vec!["hungry"]);
        assert_eq!(dataset.labels_at(&[1, 0]), ndarray::array![[0u8, 1], [1, 0]]);
    }

    #[test]
    fn test_rejects_invalid_records() {
        let names = vec!["water".to_string()];
        assert!(matches!(
            Dataset::new(names.clone(), vec![]),
            Err(DatasetError::EmptyDataset)
        ));
        assert!(matches!(
            Dataset::new(names.clone(), vec![record(1, "a", vec![1, 0])]),
            Err(DatasetError::InconsistentCategories { row: 0, .. })
        ));
        assert!(matches!(
            Dataset::new(names, vec![record(1, "a", vec![0]), record(2, "b", vec![2])]),
            Err(DatasetError::NonBinaryLabel { row: 1, value: 2, .. })
        ));
    }
}
