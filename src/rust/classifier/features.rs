use std::collections::{BTreeSet, HashMap};

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use super::error::ClassifierError;
use super::tokenizer::CasualTokenizer;
use super::utils::{normalize_row, Norm};

/// Sparse document-term matrix: one row per document, one column per
/// vocabulary entry, non-negative normalized term weights.
pub type FeatureMatrix = CsMat<f32>;

/// Options of the term-frequency vectorizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Inclusive range of n-gram lengths to extract.
    pub ngram_range: (usize, usize),
    /// Row normalization applied after counting.
    pub norm: Norm,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            ngram_range: (1, 2),
            norm: Norm::L2,
        }
    }
}

/// Mapping from n-gram to a dense, 0-based column index.
///
/// Indices follow the lexicographic order of the n-grams, so the same corpus
/// always produces the same vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Rebuilds a vocabulary from its terms in column order.
    pub fn from_terms(terms: Vec<String>) -> Result<Self, ClassifierError> {
        let index: HashMap<String, usize> = terms
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();
        if index.len() != terms.len() {
            return Err(ClassifierError::FeatureError(
                "Vocabulary contains duplicate terms".into(),
            ));
        }
        Ok(Self { terms, index })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Terms in column order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

/// Shared n-gram extraction for the unfitted and fitted vectorizer.
pub(crate) trait NgramExtraction {
    fn tokenizer(&self) -> &CasualTokenizer;

    fn ngram_range(&self) -> (usize, usize);

    /// Contiguous n-grams of `text`, shortest first, each in document order.
    fn ngrams(&self, text: &str) -> Vec<String> {
        let tokens = self.tokenizer().tokenize(text).to_vec();
        let (min_n, max_n) = self.ngram_range();
        let mut grams = Vec::new();
        for n in min_n..=max_n {
            if n == 1 {
                grams.extend(tokens.iter().cloned());
            } else {
                grams.extend(tokens.windows(n).map(|window| window.join(" ")));
            }
        }
        grams
    }
}

/// Vectorizer that has not seen any data yet. The only way to obtain a
/// [`FittedVectorizer`] is [`TermFrequencyVectorizer::fit`].
#[derive(Debug, Clone)]
pub struct TermFrequencyVectorizer {
    tokenizer: CasualTokenizer,
    config: VectorizerConfig,
}

impl NgramExtraction for TermFrequencyVectorizer {
    fn tokenizer(&self) -> &CasualTokenizer {
        &self.tokenizer
    }

    fn ngram_range(&self) -> (usize, usize) {
        self.config.ngram_range
    }
}

impl TermFrequencyVectorizer {
    pub fn new(tokenizer: CasualTokenizer, config: VectorizerConfig) -> Result<Self, ClassifierError> {
        let (min_n, max_n) = config.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(ClassifierError::ValidationError(format!(
                "Invalid n-gram range ({min_n}, {max_n})"
            )));
        }
        Ok(Self { tokenizer, config })
    }

    /// Learns the vocabulary of `documents`. Each call yields a new, independent
    /// fitted vectorizer; nothing is carried over from earlier fits.
    pub fn fit<S: AsRef<str> + Sync>(
        &self,
        documents: &[S],
    ) -> Result<FittedVectorizer, ClassifierError> {
        let terms: BTreeSet<String> = documents
            .par_iter()
            .map(|doc| self.ngrams(doc.as_ref()).into_iter().collect::<BTreeSet<_>>())
            .reduce(BTreeSet::new, |mut acc, set| {
                acc.extend(set);
                acc
            });

        if terms.is_empty() {
            return Err(ClassifierError::FeatureError(
                "Empty vocabulary; the training documents contain no tokens".into(),
            ));
        }

        let vocabulary = Vocabulary::from_terms(terms.into_iter().collect())?;
        info!(
            "Fitted vocabulary of {} n-grams over {} documents",
            vocabulary.len(),
            documents.len()
        );

        Ok(FittedVectorizer {
            tokenizer: self.tokenizer.clone(),
            config: self.config.clone(),
            vocabulary,
        })
    }
}

/// Vectorizer with a fixed vocabulary. Transforming never changes it.
#[derive(Debug, Clone)]
pub struct FittedVectorizer {
    tokenizer: CasualTokenizer,
    config: VectorizerConfig,
    vocabulary: Vocabulary,
}

impl NgramExtraction for FittedVectorizer {
    fn tokenizer(&self) -> &CasualTokenizer {
        &self.tokenizer
    }

    fn ngram_range(&self) -> (usize, usize) {
        self.config.ngram_range
    }
}

impl FittedVectorizer {
    pub(crate) fn from_parts(
        tokenizer: CasualTokenizer,
        config: VectorizerConfig,
        vocabulary: Vocabulary,
    ) -> Self {
        Self {
            tokenizer,
            config,
            vocabulary,
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    /// Converts documents into an `M x V` matrix of normalized term
    /// frequencies. N-grams outside the vocabulary are dropped.
    pub fn transform<S: AsRef<str> + Sync>(
        &self,
        documents: &[S],
    ) -> Result<FeatureMatrix, ClassifierError> {
        let rows: Vec<(Vec<usize>, Vec<f32>)> = documents
            .par_iter()
            .map(|doc| self.row_weights(doc.as_ref()))
            .collect();

        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for (cols, weights) in rows {
            indices.extend(cols);
            data.extend(weights);
            indptr.push(indices.len());
        }
        debug!(
            "Transformed {} documents into {} non-zero weights",
            documents.len(),
            data.len()
        );

        CsMat::try_new((documents.len(), self.vocabulary.len()), indptr, indices, data)
            .map_err(|(_, _, _, e)| {
                ClassifierError::FeatureError(format!("Failed to assemble feature matrix: {e}"))
            })
    }

    fn row_weights(&self, text: &str) -> (Vec<usize>, Vec<f32>) {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for gram in self.ngrams(text) {
            if let Some(col) = self.vocabulary.index_of(&gram) {
                *counts.entry(col).or_insert(0.0) += 1.0;
            }
        }
        let mut entries: Vec<(usize, f32)> = counts.into_iter().collect();
        entries.sort_unstable_by_key(|&(col, _)| col);

        let (cols, mut weights): (Vec<usize>, Vec<f32>) = entries.into_iter().unzip();
        normalize_row(&mut weights, self.config.norm);
        (cols, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tokenizer::TokenizerConfig;

    fn vectorizer() -> TermFrequencyVectorizer {
        let tokenizer = CasualTokenizer::new(TokenizerConfig::default()).unwrap();
        TermFrequencyVectorizer::new(tokenizer, VectorizerConfig::default()).unwrap()
    }

    #[test]
    fn test_unigrams_and_bigrams() {
        let fitted = vectorizer().fit(&["need water now"]).unwrap();
        let terms = fitted.vocabulary().terms();
        assert_eq!(
            terms,
            &["need", "need water", "now", "water", "water now"]
        );
    }

    #[test]
    fn test_shape_and_normalization() {
        let fitted = vectorizer().fit(&["water water food", "tents"]).unwrap();
        let matrix = fitted
            .transform(&["water food", "unknown words only", "tents tents", ""])
            .unwrap();
        assert_eq!(matrix.shape(), (4, fitted.vocabulary().len()));

        let row = matrix.outer_view(0).unwrap();
        let norm: f32 = row.data().iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);

        assert_eq!(matrix.outer_view(1).unwrap().nnz(), 0);
        assert_eq!(matrix.outer_view(3).unwrap().nnz(), 0);

        let tents = fitted.vocabulary().index_of("tent").unwrap();
        assert_eq!(matrix.get(2, tents), Some(&1.0));
    }

    #[test]
    fn test_refit_replaces_vocabulary() {
        let vectorizer = vectorizer();
        let first = vectorizer.fit(&["earthquake"]).unwrap();
        let second = vectorizer.fit(&["flood"]).unwrap();
        assert!(first.vocabulary().index_of("earthquake").is_some());
        assert!(second.vocabulary().index_of("earthquake").is_none());
        assert_eq!(second.vocabulary().len(), 1);
    }

    #[test]
    fn test_empty_corpus_is_rejected() {
        let docs: Vec<String> = vec![];
        assert!(matches!(
            vectorizer().fit(&docs),
            Err(ClassifierError::FeatureError(_))
        ));
    }

    #[test]
    fn test_invalid_ngram_range() {
        let tokenizer = CasualTokenizer::new(TokenizerConfig::default()).unwrap();
        let config = VectorizerConfig {
            ngram_range: (2, 1),
            norm: Norm::L2,
        };
        assert!(TermFrequencyVectorizer::new(tokenizer, config).is_err());
    }
}
