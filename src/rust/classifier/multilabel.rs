use log::{info, warn};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::features::FeatureMatrix;
use super::utils::derive_seed;

/// Training features in both row-major and column-major layout. Split
/// search walks columns, prediction walks rows; both views are immutable
/// and shared by every per-label fit.
#[derive(Debug, Clone)]
pub struct TrainingMatrix {
    csr: FeatureMatrix,
    csc: FeatureMatrix,
}

impl TrainingMatrix {
    pub fn new(x: FeatureMatrix) -> Self {
        if x.is_csr() {
            let csc = x.to_other_storage();
            Self { csr: x, csc }
        } else {
            Self {
                csr: x.to_other_storage(),
                csc: x,
            }
        }
    }

    pub fn rows(&self) -> usize {
        self.csr.rows()
    }

    pub fn cols(&self) -> usize {
        self.csr.cols()
    }

    pub fn csr(&self) -> &FeatureMatrix {
        &self.csr
    }

    pub fn csc(&self) -> &FeatureMatrix {
        &self.csc
    }
}

/// A classifier that learns one 0/1 target from a feature matrix.
///
/// Implementations must be deterministic for a given `seed`: fitting twice
/// on the same data with the same seed yields identical predictions.
pub trait BinaryClassifier: Sized + Send + Sync {
    type Config: Clone + Send + Sync;

    fn fit(
        config: &Self::Config,
        x: &TrainingMatrix,
        y: ArrayView1<'_, u8>,
        seed: u64,
    ) -> Result<Self, ClassifierError>;

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<u8>, ClassifierError>;
}

/// One independent binary classifier per label column.
///
/// Labels are treated as independent: classifier `j` sees only column `j`
/// of the targets and its seed depends only on the base seed and `j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLabelClassifier<C> {
    classifiers: Vec<C>,
    degenerate_labels: Vec<usize>,
}

impl<C: BinaryClassifier> MultiLabelClassifier<C> {
    /// Fits one classifier per column of `y` in parallel on the current
    /// rayon pool. Results are collected in label order.
    pub fn fit(
        config: &C::Config,
        x: &TrainingMatrix,
        y: ArrayView2<'_, u8>,
        seed: u64,
    ) -> Result<Self, ClassifierError> {
        if y.nrows() != x.rows() {
            return Err(ClassifierError::ValidationError(format!(
                "Feature matrix has {} rows but label matrix has {}",
                x.rows(),
                y.nrows()
            )));
        }
        if y.nrows() == 0 || y.ncols() == 0 {
            return Err(ClassifierError::ValidationError(format!(
                "Label matrix must be non-empty, got {} x {}",
                y.nrows(),
                y.ncols()
            )));
        }

        let degenerate_labels: Vec<usize> = (0..y.ncols())
            .filter(|&j| {
                let column = y.column(j);
                column.iter().all(|&v| v == column[0])
            })
            .collect();
        for &j in &degenerate_labels {
            warn!(
                "Label {} has a single class in the training data; its classifier will predict a constant",
                j
            );
        }

        info!(
            "Fitting {} per-label classifiers on {} rows x {} features",
            y.ncols(),
            x.rows(),
            x.cols()
        );
        let classifiers = (0..y.ncols())
            .into_par_iter()
            .map(|j| C::fit(config, x, y.column(j), derive_seed(seed, j as u64)))
            .collect::<Result<Vec<C>, ClassifierError>>()?;

        Ok(Self {
            classifiers,
            degenerate_labels,
        })
    }

    /// Predicts every label independently and stacks the results column-wise
    /// in label order.
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Array2<u8>, ClassifierError> {
        let columns = self
            .classifiers
            .par_iter()
            .map(|classifier| classifier.predict(x))
            .collect::<Result<Vec<Vec<u8>>, ClassifierError>>()?;

        if let Some(bad) = columns.iter().find(|c| c.len() != x.rows()) {
            return Err(ClassifierError::PredictionError(format!(
                "Classifier returned {} predictions for {} rows",
                bad.len(),
                x.rows()
            )));
        }
        Ok(Array2::from_shape_fn((x.rows(), columns.len()), |(i, j)| {
            columns[j][i]
        }))
    }

    pub fn n_labels(&self) -> usize {
        self.classifiers.len()
    }

    pub fn classifiers(&self) -> &[C] {
        &self.classifiers
    }

    /// Label indices whose training column contained a single class.
    pub fn degenerate_labels(&self) -> &[usize] {
        &self.degenerate_labels
    }

    #[cfg(test)]
    pub(crate) fn classifiers_mut(&mut self) -> &mut [C] {
        &mut self.classifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::forest::{ForestConfig, RandomForest};
    use ndarray::array;
    use sprs::TriMat;

    fn features() -> FeatureMatrix {
        let mut tri = TriMat::new((4, 3));
        tri.add_triplet(0, 0, 1.0f32);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(2, 1, 1.0);
        tri.add_triplet(3, 1, 1.0);
        tri.to_csr()
    }

    fn config() -> ForestConfig {
        ForestConfig {
            n_trees: 15,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_training_matrix_layouts() {
        let x = TrainingMatrix::new(features());
        assert!(x.csr().is_csr());
        assert!(x.csc().is_csc());
        assert_eq!((x.rows(), x.cols()), (4, 3));
        assert_eq!(x.csc().get(2, 1), Some(&1.0));
        assert_eq!(x.csc().get(2, 2), None);
    }

    #[test]
    fn test_predictions_keep_label_order() {
        let x = features();
        let y = array![[1u8, 0, 0], [1, 0, 0], [0, 1, 0], [0, 1, 0]];
        let model =
            MultiLabelClassifier::<RandomForest>::fit(&config(), &TrainingMatrix::new(x.clone()), y.view(), 42)
                .unwrap();
        assert_eq!(model.n_labels(), 3);
        assert_eq!(model.degenerate_labels(), &[2usize]);

        let predicted = model.predict(&x).unwrap();
        assert_eq!(predicted.dim(), (4, 3));
        assert_eq!(predicted.column(2).to_vec(), vec![0, 0, 0, 0]);
        assert_eq!(predicted.column(0).to_vec(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_labels_are_independent() {
        let x = TrainingMatrix::new(features());
        let y_a = array![[1u8, 0], [1, 0], [0, 1], [0, 1]];
        let y_b = array![[1u8, 1], [1, 1], [0, 0], [0, 1]];
        let a = MultiLabelClassifier::<RandomForest>::fit(&config(), &x, y_a.view(), 9).unwrap();
        let b = MultiLabelClassifier::<RandomForest>::fit(&config(), &x, y_b.view(), 9).unwrap();
        assert_eq!(a.classifiers()[0], b.classifiers()[0]);
        assert_ne!(a.classifiers()[1], b.classifiers()[1]);
    }

    #[test]
    fn test_row_mismatch_is_rejected() {
        let x = TrainingMatrix::new(features());
        let y = array![[1u8], [0]];
        let result = MultiLabelClassifier::<RandomForest>::fit(&config(), &x, y.view(), 0);
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }
}
