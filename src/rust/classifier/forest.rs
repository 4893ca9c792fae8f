use log::debug;
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::features::FeatureMatrix;
use super::multilabel::{BinaryClassifier, TrainingMatrix};
use super::utils::derive_seed;

/// Hyperparameters of the bootstrap ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the ensemble.
    pub n_trees: usize,
    /// Maximum tree depth; `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Minimum number of distinct rows a node needs to be split.
    pub min_samples_split: usize,
    /// Features evaluated per split; `None` uses `sqrt(n_features)`.
    pub max_features: Option<usize>,
    /// Train each tree on a bootstrap resample instead of the full set.
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            bootstrap: true,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.n_trees == 0 {
            return Err(ClassifierError::ValidationError(
                "Forest must contain at least one tree".into(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ClassifierError::ValidationError(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.max_features == Some(0) {
            return Err(ClassifierError::ValidationError(
                "max_features must be at least 1".into(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(ClassifierError::ValidationError(
                "max_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn features_per_split(&self, n_features: usize) -> usize {
        self.max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        positive_fraction: f32,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// Binary decision tree stored as a flat node arena, root at index 0.
/// Rows with `x[feature] <= threshold` descend left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Fraction of positive training rows in the leaf `row` lands in.
    fn leaf_fraction(&self, x: &FeatureMatrix, row: usize) -> f32 {
        let Some(features) = x.outer_view(row) else {
            return 0.0;
        };
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { positive_fraction } => return *positive_fraction,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature).copied().unwrap_or(0.0);
                    at = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Checks the arena layout a grown tree always has: a root node, and
    /// split children stored after their parent and inside the arena.
    fn check_structure(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (at, node) in self.nodes.iter().enumerate() {
            if let Node::Split { left, right, .. } = node {
                for child in [*left, *right] {
                    if child <= at || child >= self.nodes.len() {
                        return Err(format!(
                            "node {at} points to child {child} in an arena of {} nodes",
                            self.nodes.len()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((at, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[at] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }
}

/// Row index paired with how many times the bootstrap drew it.
type Sample = (usize, u32);

struct PendingNode {
    samples: Vec<Sample>,
    depth: usize,
    slot: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f32,
    impurity: f64,
}

/// Grows one tree. Scratch buffers are sized to the training matrix and
/// reset after every node, so one builder serves every node of a tree.
struct TreeBuilder<'a> {
    x: &'a TrainingMatrix,
    y: &'a [u8],
    config: &'a ForestConfig,
    max_features: usize,
    node_weight: Vec<u32>,
    goes_right: Vec<bool>,
    feature_seen: Vec<bool>,
}

impl<'a> TreeBuilder<'a> {
    fn new(x: &'a TrainingMatrix, y: &'a [u8], config: &'a ForestConfig) -> Self {
        Self {
            x,
            y,
            config,
            max_features: config.features_per_split(x.cols()),
            node_weight: vec![0; x.rows()],
            goes_right: vec![false; x.rows()],
            feature_seen: vec![false; x.cols()],
        }
    }

    fn build(&mut self, rng: &mut StdRng) -> DecisionTree {
        let root = self.draw_samples(rng);
        let mut nodes = vec![Node::Leaf {
            positive_fraction: 0.0,
        }];
        let mut pending = vec![PendingNode {
            samples: root,
            depth: 0,
            slot: 0,
        }];

        while let Some(node) = pending.pop() {
            let (total, positive) = self.class_weights(&node.samples);
            let leaf = Node::Leaf {
                positive_fraction: if total > 0 {
                    positive as f32 / total as f32
                } else {
                    0.0
                },
            };

            let depth_reached = self.config.max_depth.is_some_and(|d| node.depth >= d);
            if positive == 0
                || positive == total
                || depth_reached
                || node.samples.len() < self.config.min_samples_split
            {
                nodes[node.slot] = leaf;
                continue;
            }

            let Some(split) = self.best_split(&node.samples, total, positive, rng) else {
                nodes[node.slot] = leaf;
                continue;
            };

            let (left, right) = self.partition(node.samples, split.feature, split.threshold);
            let left_slot = nodes.len();
            let right_slot = left_slot + 1;
            nodes.push(Node::Leaf {
                positive_fraction: 0.0,
            });
            nodes.push(Node::Leaf {
                positive_fraction: 0.0,
            });
            nodes[node.slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: left_slot,
                right: right_slot,
            };
            pending.push(PendingNode {
                samples: right,
                depth: node.depth + 1,
                slot: right_slot,
            });
            pending.push(PendingNode {
                samples: left,
                depth: node.depth + 1,
                slot: left_slot,
            });
        }

        DecisionTree { nodes }
    }

    fn draw_samples(&self, rng: &mut StdRng) -> Vec<Sample> {
        let n = self.x.rows();
        if !self.config.bootstrap {
            return (0..n).map(|row| (row, 1)).collect();
        }
        let mut counts = vec![0u32; n];
        for _ in 0..n {
            counts[rng.random_range(0..n)] += 1;
        }
        counts
            .into_iter()
            .enumerate()
            .filter(|&(_, w)| w > 0)
            .collect()
    }

    fn class_weights(&self, samples: &[Sample]) -> (u64, u64) {
        samples.iter().fold((0, 0), |(total, positive), &(row, w)| {
            let w = u64::from(w);
            (total + w, positive + if self.y[row] == 1 { w } else { 0 })
        })
    }

    fn best_split(
        &mut self,
        samples: &[Sample],
        total: u64,
        positive: u64,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        for &(row, w) in samples {
            self.node_weight[row] = w;
        }

        // Only features that are non-zero somewhere in the node can separate it.
        let mut pool = Vec::new();
        for &(row, _) in samples {
            if let Some(features) = self.x.csr().outer_view(row) {
                for &feature in features.indices() {
                    if !self.feature_seen[feature] {
                        self.feature_seen[feature] = true;
                        pool.push(feature);
                    }
                }
            }
        }
        for &feature in &pool {
            self.feature_seen[feature] = false;
        }

        let mut best: Option<SplitCandidate> = None;
        let mut evaluated = 0;
        let mut remaining = pool.len();
        while evaluated < self.max_features && remaining > 0 {
            let pick = rng.random_range(0..remaining);
            pool.swap(pick, remaining - 1);
            remaining -= 1;

            let Some(candidate) = self.evaluate_feature(pool[remaining], total, positive) else {
                continue;
            };
            evaluated += 1;
            if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                best = Some(candidate);
            }
        }

        for &(row, _) in samples {
            self.node_weight[row] = 0;
        }
        best
    }

    /// Best threshold on one feature, or `None` if the feature is constant
    /// within the node.
    fn evaluate_feature(&self, feature: usize, total: u64, positive: u64) -> Option<SplitCandidate> {
        let column = self.x.csc().outer_view(feature)?;
        let mut values: Vec<(f32, u64, bool)> = column
            .iter()
            .filter_map(|(row, &value)| {
                let w = self.node_weight[row];
                (w > 0).then(|| (value, u64::from(w), self.y[row] == 1))
            })
            .collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let nonzero_weight: u64 = values.iter().map(|v| v.1).sum();
        let nonzero_positive: u64 = values.iter().filter(|v| v.2).map(|v| v.1).sum();

        // Rows absent from the sparse column hold zeros and start on the left.
        let mut left_weight = total - nonzero_weight;
        let mut left_positive = positive - nonzero_positive;
        let mut previous = 0.0f32;
        let mut has_left = left_weight > 0;

        let mut best: Option<(f64, f32)> = None;
        let mut i = 0;
        while i < values.len() {
            let value = values[i].0;
            if has_left && value > previous {
                let impurity = split_impurity(
                    left_weight,
                    left_positive,
                    total - left_weight,
                    positive - left_positive,
                );
                if best.map_or(true, |(b, _)| impurity < b) {
                    best = Some((impurity, midpoint(previous, value)));
                }
            }
            while i < values.len() && values[i].0 == value {
                left_weight += values[i].1;
                if values[i].2 {
                    left_positive += values[i].1;
                }
                i += 1;
            }
            previous = value;
            has_left = true;
        }

        best.map(|(impurity, threshold)| SplitCandidate {
            feature,
            threshold,
            impurity,
        })
    }

    fn partition(
        &mut self,
        samples: Vec<Sample>,
        feature: usize,
        threshold: f32,
    ) -> (Vec<Sample>, Vec<Sample>) {
        let column = self.x.csc().outer_view(feature);
        if let Some(column) = &column {
            for (row, &value) in column.iter() {
                if value > threshold {
                    self.goes_right[row] = true;
                }
            }
        }
        let (right, left): (Vec<Sample>, Vec<Sample>) =
            samples.into_iter().partition(|&(row, _)| self.goes_right[row]);
        if let Some(column) = &column {
            for (row, _) in column.iter() {
                self.goes_right[row] = false;
            }
        }
        (left, right)
    }
}

/// Threshold strictly below `upper` and not below `lower`.
fn midpoint(lower: f32, upper: f32) -> f32 {
    let mid = lower / 2.0 + upper / 2.0;
    if mid >= upper {
        lower
    } else {
        mid
    }
}

/// Weighted Gini impurity of a two-way split.
fn split_impurity(left_w: u64, left_pos: u64, right_w: u64, right_pos: u64) -> f64 {
    fn weighted_gini(w: u64, pos: u64) -> f64 {
        if w == 0 {
            return 0.0;
        }
        let w = w as f64;
        let p = pos as f64;
        let n = w - p;
        w - (p * p + n * n) / w
    }
    (weighted_gini(left_w, left_pos) + weighted_gini(right_w, right_pos))
        / (left_w + right_w) as f64
}

/// Bagged ensemble of randomized decision trees with majority voting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Width of the feature matrix the forest was trained on.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Rejects forests that could not have come out of [`BinaryClassifier::fit`]:
    /// no trees, or a tree whose node links leave the arena or loop.
    pub(crate) fn check_structure(&self) -> Result<(), ClassifierError> {
        if self.trees.is_empty() {
            return Err(ClassifierError::BuildError(
                "Stored forest contains no trees".into(),
            ));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.check_structure()
                .map_err(|e| ClassifierError::BuildError(format!("Stored tree {t} is malformed: {e}")))?;
        }
        Ok(())
    }

    /// Mean positive-leaf fraction across trees, per row.
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f32>, ClassifierError> {
        self.check_width(x)?;
        let n_trees = self.trees.len() as f32;
        Ok((0..x.rows())
            .map(|row| {
                self.trees
                    .iter()
                    .map(|tree| tree.leaf_fraction(x, row))
                    .sum::<f32>()
                    / n_trees
            })
            .collect())
    }

    fn check_width(&self, x: &FeatureMatrix) -> Result<(), ClassifierError> {
        if x.cols() != self.n_features {
            return Err(ClassifierError::PredictionError(format!(
                "Feature matrix has {} columns, forest was trained on {}",
                x.cols(),
                self.n_features
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
impl RandomForest {
    /// Points the root of the first tree outside its arena.
    pub(crate) fn detach_first_root(&mut self) {
        self.trees[0].nodes = vec![Node::Split {
            feature: 0,
            threshold: 0.5,
            left: 1,
            right: 9,
        }];
    }
}

impl BinaryClassifier for RandomForest {
    type Config = ForestConfig;

    fn fit(
        config: &ForestConfig,
        x: &TrainingMatrix,
        y: ArrayView1<'_, u8>,
        seed: u64,
    ) -> Result<Self, ClassifierError> {
        config.validate()?;
        if x.rows() == 0 {
            return Err(ClassifierError::ValidationError(
                "Cannot fit a forest on zero rows".into(),
            ));
        }
        if x.rows() != y.len() {
            return Err(ClassifierError::ValidationError(format!(
                "Feature matrix has {} rows but target has {}",
                x.rows(),
                y.len()
            )));
        }
        if let Some(bad) = y.iter().find(|&&v| v > 1) {
            return Err(ClassifierError::ValidationError(format!(
                "Target values must be 0 or 1, found {bad}"
            )));
        }

        let y = y.to_vec();
        let mut builder = TreeBuilder::new(x, &y, config);
        let trees: Vec<DecisionTree> = (0..config.n_trees)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed, t as u64));
                builder.build(&mut rng)
            })
            .collect();
        debug!(
            "Fitted forest of {} trees ({} nodes total)",
            trees.len(),
            trees.iter().map(DecisionTree::node_count).sum::<usize>()
        );

        Ok(Self {
            trees,
            n_features: x.cols(),
        })
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<u8>, ClassifierError> {
        self.check_width(x)?;
        let n_trees = self.trees.len();
        Ok((0..x.rows())
            .map(|row| {
                let votes = self
                    .trees
                    .iter()
                    .filter(|tree| tree.leaf_fraction(x, row) > 0.5)
                    .count();
                u8::from(votes * 2 > n_trees)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use sprs::TriMat;

    fn matrix(rows: usize, cols: usize, entries: &[(usize, usize, f32)]) -> FeatureMatrix {
        let mut tri = TriMat::new((rows, cols));
        for &(r, c, v) in entries {
            tri.add_triplet(r, c, v);
        }
        tri.to_csr()
    }

    fn separable() -> (FeatureMatrix, Array1<u8>) {
        let x = matrix(4, 2, &[(0, 0, 1.0), (1, 0, 1.0), (2, 1, 1.0), (3, 1, 1.0)]);
        (x, Array1::from(vec![1, 1, 0, 0]))
    }

    #[test]
    fn test_fits_separable_data() {
        let (x, y) = separable();
        let config = ForestConfig {
            n_trees: 25,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&config, &TrainingMatrix::new(x.clone()), y.view(), 7).unwrap();
        assert_eq!(forest.n_trees(), 25);
        assert_eq!(forest.predict(&x).unwrap(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_single_tree_without_bootstrap_is_exact() {
        let (x, y) = separable();
        let config = ForestConfig {
            n_trees: 1,
            bootstrap: false,
            max_features: Some(2),
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&config, &TrainingMatrix::new(x.clone()), y.view(), 1).unwrap();
        assert_eq!(forest.predict(&x).unwrap(), vec![1, 1, 0, 0]);
        assert_eq!(forest.predict_proba(&x).unwrap(), vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_constant_target_gives_constant_prediction() {
        let (x, _) = separable();
        let y = Array1::from(vec![0u8, 0, 0, 0]);
        let forest =
            RandomForest::fit(&ForestConfig::default(), &TrainingMatrix::new(x.clone()), y.view(), 3)
                .unwrap();
        assert!(forest.trees().iter().all(|t| t.node_count() == 1));
        assert_eq!(forest.predict(&x).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = separable();
        let training = TrainingMatrix::new(x);
        let a = RandomForest::fit(&ForestConfig::default(), &training, y.view(), 11).unwrap();
        let b = RandomForest::fit(&ForestConfig::default(), &training, y.view(), 11).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let x = matrix(
            4,
            2,
            &[(0, 0, 1.0), (1, 1, 1.0), (2, 0, 1.0), (2, 1, 1.0)],
        );
        let y = Array1::from(vec![1u8, 1, 0, 0]);
        let config = ForestConfig {
            n_trees: 5,
            max_depth: Some(1),
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&config, &TrainingMatrix::new(x), y.view(), 5).unwrap();
        assert!(forest.trees().iter().all(|t| t.depth() <= 1));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let (x, _) = separable();
        let training = TrainingMatrix::new(x.clone());
        let short = Array1::from(vec![1u8, 0]);
        assert!(RandomForest::fit(&ForestConfig::default(), &training, short.view(), 0).is_err());

        let non_binary = Array1::from(vec![2u8, 0, 1, 0]);
        assert!(RandomForest::fit(&ForestConfig::default(), &training, non_binary.view(), 0).is_err());

        let bad_config = ForestConfig {
            n_trees: 0,
            ..ForestConfig::default()
        };
        let y = Array1::from(vec![1u8, 1, 0, 0]);
        assert!(RandomForest::fit(&bad_config, &training, y.view(), 0).is_err());

        let forest = RandomForest::fit(&ForestConfig::default(), &training, y.view(), 0).unwrap();
        let narrow = matrix(1, 1, &[(0, 0, 1.0)]);
        assert!(matches!(
            forest.predict(&narrow),
            Err(ClassifierError::PredictionError(_))
        ));
    }

    #[test]
    fn test_midpoint_stays_below_upper() {
        assert_eq!(midpoint(0.0, 1.0), 0.5);
        let upper = f32::from_bits(1.0f32.to_bits() + 1);
        assert!(midpoint(1.0, upper) < upper);
    }

    #[test]
    fn test_structure_check_rejects_broken_links() {
        let (x, y) = separable();
        let config = ForestConfig {
            n_trees: 3,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&config, &TrainingMatrix::new(x), y.view(), 2).unwrap();
        assert!(forest.check_structure().is_ok());

        let mut dangling = forest.clone();
        dangling.trees[0] = DecisionTree {
            nodes: vec![Node::Split {
                feature: 0,
                threshold: 0.5,
                left: 1,
                right: 7,
            }],
        };
        assert!(matches!(
            dangling.check_structure(),
            Err(ClassifierError::BuildError(_))
        ));

        let mut looping = forest.clone();
        looping.trees[1] = DecisionTree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::Split {
                    feature: 1,
                    threshold: 0.5,
                    left: 0,
                    right: 2,
                },
                Node::Leaf {
                    positive_fraction: 1.0,
                },
            ],
        };
        assert!(looping.check_structure().is_err());

        let mut empty_tree = forest.clone();
        empty_tree.trees[2] = DecisionTree { nodes: Vec::new() };
        assert!(empty_tree.check_structure().is_err());

        let mut no_trees = forest;
        no_trees.trees.clear();
        assert!(no_trees.check_structure().is_err());
    }
}
