//! Decision-tree ensemble over sparse TF-IDF features.
//!
//! CART trees with Gini impurity and balanced class weights. Each split
//! considers a seeded random subset of `sqrt(n_features)` features; when none
//! of them separates the node, every feature is tried. Trees are grown until
//! leaves are pure or the remaining samples are indistinguishable, so a
//! training document always lands in a leaf of its own label.
//!
//! Training draws from a seeded generator and inference is a pure tree walk,
//! so a fitted forest answers identically for identical input.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::text::SparseVector;

/// Hyperparameters for [`RandomForest::fit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub seed: u64,
    /// Depth limit; `None` grows trees to purity.
    pub max_depth: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    /// Samples with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single fitted tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Class distribution of the leaf `x` falls into.
    pub fn predict(&self, x: &SparseVector) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if x.get(*feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Ensemble of decision trees whose leaf distributions are averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest. `labels[i]` is the class index of `samples[i]`, below
    /// `n_classes`.
    pub fn fit(
        samples: &[SparseVector],
        labels: &[usize],
        n_classes: usize,
        n_features: usize,
        params: &ForestParams,
    ) -> Self {
        debug_assert_eq!(samples.len(), labels.len());
        let class_weights = balanced_weights(labels, n_classes);
        let max_features = ((n_features as f64).sqrt() as usize).clamp(1, n_features.max(1));

        let trees = (0..params.n_trees)
            .map(|t| {
                let mut builder = TreeBuilder {
                    samples,
                    labels,
                    class_weights: &class_weights,
                    n_classes,
                    n_features,
                    max_features,
                    max_depth: params.max_depth,
                    rng: StdRng::seed_from_u64(params.seed.wrapping_add(t as u64)),
                    nodes: Vec::new(),
                };
                builder.build((0..samples.len()).collect(), 0);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Self { n_classes, trees }
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of the tree leaf distributions; sums to one.
    pub fn predict_proba(&self, x: &SparseVector) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        if self.trees.is_empty() {
            return uniform(self.n_classes);
        }
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict(x)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        for p in &mut proba {
            *p /= n;
        }
        proba
    }
}

/// `n / (k * count_c)` for each class present, zero for absent classes.
fn balanced_weights(labels: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in labels {
        counts[label] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
    let n = labels.len() as f64;
    counts
        .iter()
        .map(|&c| if c > 0 { n / (present * c as f64) } else { 0.0 })
        .collect()
}

fn uniform(n_classes: usize) -> Vec<f64> {
    vec![1.0 / n_classes.max(1) as f64; n_classes]
}

fn normalized(mut weights: Vec<f64>) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return uniform(weights.len());
    }
    for w in &mut weights {
        *w /= total;
    }
    weights
}

fn gini(class_weights: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - class_weights
        .iter()
        .map(|w| {
            let p = w / total;
            p * p
        })
        .sum::<f64>()
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct TreeBuilder<'a> {
    samples: &'a [SparseVector],
    labels: &'a [usize],
    class_weights: &'a [f64],
    n_classes: usize,
    n_features: usize,
    max_features: usize,
    max_depth: Option<usize>,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn build(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        let distribution = self.class_totals(&idx);
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });

        let pure = distribution.iter().filter(|&&w| w > 0.0).count() <= 1;
        let depth_reached = self.max_depth.is_some_and(|max| depth >= max);
        let split = if pure || depth_reached {
            None
        } else {
            self.best_split(&idx)
        };

        match split {
            None => {
                self.nodes[node_id] = Node::Leaf {
                    distribution: normalized(distribution),
                };
            }
            Some(candidate) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
                    .into_iter()
                    .partition(|&i| self.samples[i].get(candidate.feature) <= candidate.threshold);
                let left = self.build(left_idx, depth + 1);
                let right = self.build(right_idx, depth + 1);
                self.nodes[node_id] = Node::Split {
                    feature: candidate.feature,
                    threshold: candidate.threshold,
                    left,
                    right,
                };
            }
        }
        node_id
    }

    fn class_totals(&self, idx: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_classes];
        for &i in idx {
            totals[self.labels[i]] += self.class_weights[self.labels[i]];
        }
        totals
    }

    fn best_split(&mut self, idx: &[usize]) -> Option<SplitCandidate> {
        if self.n_features == 0 {
            return None;
        }
        let sampled = index::sample(&mut self.rng, self.n_features, self.max_features).into_vec();
        self.best_among(idx, sampled.into_iter())
            .or_else(|| self.best_among(idx, 0..self.n_features))
    }

    fn best_among(
        &self,
        idx: &[usize],
        features: impl Iterator<Item = usize>,
    ) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        for feature in features {
            if let Some(candidate) = self.best_threshold(idx, feature)
                && best.as_ref().is_none_or(|b| candidate.impurity < b.impurity)
            {
                best = Some(candidate);
            }
        }
        best
    }

    /// Lowest weighted Gini split on one feature, `None` if the feature is
    /// constant over the node.
    fn best_threshold(&self, idx: &[usize], feature: usize) -> Option<SplitCandidate> {
        let mut values: Vec<(f64, usize)> = idx
            .iter()
            .map(|&i| (self.samples[i].get(feature), self.labels[i]))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let first = values.first()?.0;
        let last = values.last()?.0;
        if first == last {
            return None;
        }

        let mut right = vec![0.0; self.n_classes];
        for &(_, label) in &values {
            right[label] += self.class_weights[label];
        }
        let total: f64 = right.iter().sum();
        let mut left = vec![0.0; self.n_classes];
        let mut left_total = 0.0;

        let mut best: Option<SplitCandidate> = None;
        for pair in values.windows(2) {
            let (value, label) = pair[0];
            let weight = self.class_weights[label];
            left[label] += weight;
            right[label] -= weight;
            left_total += weight;

            let next = pair[1].0;
            if next == value {
                continue;
            }
            let right_total = total - left_total;
            let impurity = if total > 0.0 {
                (left_total * gini(&left, left_total) + right_total * gini(&right, right_total))
                    / total
            } else {
                0.0
            };
            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (value + next) / 2.0,
                    impurity,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TfidfVectorizer;

    fn toy() -> (TfidfVectorizer, Vec<SparseVector>, Vec<usize>) {
        let docs = [
            "hunt kill destroy",
            "kill the target",
            "lovely speech today",
            "great lovely interview",
            "free money click",
            "click here free gift",
        ];
        let labels = vec![0, 0, 1, 1, 2, 2];
        let v = TfidfVectorizer::fit(&docs, 100);
        let x = docs.iter().map(|d| v.transform(d)).collect();
        (v, x, labels)
    }

    #[test]
    fn training_documents_recovered() {
        let (v, x, labels) = toy();
        let forest = RandomForest::fit(&x, &labels, 3, v.n_features(), &ForestParams::default());
        for (sample, &label) in x.iter().zip(&labels) {
            let p = forest.predict_proba(sample);
            assert!((p[label] - 1.0).abs() < 1e-12, "label {label}: {p:?}");
        }
    }

    #[test]
    fn probabilities_sum_to_one() {
        let (v, x, labels) = toy();
        let forest = RandomForest::fit(&x, &labels, 3, v.n_features(), &ForestParams::default());
        for text in ["kill lovely", "nothing known here", "free kill speech click"] {
            let p = forest.predict_proba(&v.transform(text));
            let sum: f64 = p.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{text}: {p:?}");
            assert!(p.iter().all(|&q| (0.0..=1.0).contains(&q)));
        }
    }

    #[test]
    fn fitting_is_deterministic() {
        let (v, x, labels) = toy();
        let a = RandomForest::fit(&x, &labels, 3, v.n_features(), &ForestParams::default());
        let b = RandomForest::fit(&x, &labels, 3, v.n_features(), &ForestParams::default());
        assert_eq!(a, b);
    }

    #[test]
    fn depth_limit_yields_mixed_leaves() {
        let (v, x, labels) = toy();
        let params = ForestParams {
            n_trees: 5,
            max_depth: Some(0),
            ..Default::default()
        };
        let forest = RandomForest::fit(&x, &labels, 3, v.n_features(), &params);
        let p = forest.predict_proba(&x[0]);
        // Balanced weights over three equal classes: uniform root.
        for q in p {
            assert!((q - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn absent_classes_get_zero_probability() {
        let (v, x, labels) = toy();
        let forest = RandomForest::fit(&x, &labels, 5, v.n_features(), &ForestParams::default());
        let p = forest.predict_proba(&v.transform("anything"));
        assert_eq!(p.len(), 5);
        assert_eq!(p[3], 0.0);
        assert_eq!(p[4], 0.0);
    }

    #[test]
    fn balanced_weights_inverse_to_frequency() {
        let w = balanced_weights(&[0, 0, 0, 1], 3);
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
        assert_eq!(w[2], 0.0);
    }
}
