//! Threat category classifier.
//!
//! Maps text to a probability distribution over the six classifier
//! categories using TF-IDF features and a decision-tree ensemble. The
//! trained model is persisted as a single JSON artifact holding both the
//! vectorizer and the forest, so a loaded model answers exactly as the one
//! that was saved.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info, warn};
use vipwatch_core::ThreatCategory;

use crate::corpus::Corpus;
use crate::forest::{ForestParams, RandomForest};
use crate::text::TfidfVectorizer;

/// Bumped whenever the artifact layout changes.
pub const ARTIFACT_VERSION: u32 = 1;

const N_CLASSES: usize = ThreatCategory::CLASSES.len();

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("training corpus is empty")]
    EmptyCorpus,

    #[error("training corpus has no usable terms")]
    EmptyVocabulary,

    #[error("unknown training label: {0}")]
    UnknownLabel(String),

    #[error("corpus line {line}: {detail}")]
    CorpusLine { line: usize, detail: String },

    #[error("model artifact version {found} is not supported (expected {expected})")]
    ArtifactVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Probability per classifier category, in [`ThreatCategory::CLASSES`] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryProbabilities([f64; N_CLASSES]);

impl CategoryProbabilities {
    /// Wrap a distribution. Callers are expected to pass values summing to one.
    pub fn new(values: [f64; N_CLASSES]) -> Self {
        Self(values)
    }

    /// Probability of `category`; zero for `Unknown`.
    pub fn get(&self, category: ThreatCategory) -> f64 {
        category.class_index().map(|i| self.0[i]).unwrap_or(0.0)
    }

    pub fn as_array(&self) -> &[f64; N_CLASSES] {
        &self.0
    }

    /// Summed probability of the malicious categories.
    pub fn malicious_mass(&self) -> f64 {
        ThreatCategory::MALICIOUS.iter().map(|&c| self.get(c)).sum()
    }

    /// Most likely category and its probability. Ties go to the category
    /// listed first.
    pub fn argmax(&self) -> (ThreatCategory, f64) {
        let mut best = 0;
        for i in 1..N_CLASSES {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        (ThreatCategory::CLASSES[best], self.0[best])
    }
}

impl Serialize for CategoryProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(N_CLASSES))?;
        for (category, p) in ThreatCategory::CLASSES.iter().zip(self.0) {
            map.serialize_entry(category.as_str(), &p)?;
        }
        map.end()
    }
}

/// Classifier output for one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub category: ThreatCategory,
    pub confidence: f64,
    pub probabilities: CategoryProbabilities,
}

/// Training hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainParams {
    pub max_features: usize,
    pub forest: ForestParams,
    /// Fraction of each class held out to measure accuracy; `None` skips
    /// the measurement.
    pub holdout: Option<f64>,
    pub split_seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            max_features: 10_000,
            forest: ForestParams::default(),
            holdout: Some(0.2),
            split_seed: 42,
        }
    }
}

/// Summary of a training run.
///
/// The returned model is fitted on the whole corpus. `holdout` scores a
/// second model fitted without the held-out samples, so it reflects text
/// the model has not seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub vocabulary: usize,
    pub trees: usize,
    pub holdout: Option<Evaluation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassEvaluation {
    pub category: ThreatCategory,
    pub support: usize,
    pub correct: usize,
}

/// Accuracy of a model over a labelled corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub total: usize,
    pub correct: usize,
    pub per_class: Vec<ClassEvaluation>,
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Trained TF-IDF + forest model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatClassifier {
    format_version: u32,
    vectorizer: TfidfVectorizer,
    forest: RandomForest,
}

impl ThreatClassifier {
    pub fn train(corpus: &Corpus, params: &TrainParams) -> Result<(Self, TrainingReport), ClassifierError> {
        let holdout = params.holdout.and_then(|fraction| Self::holdout_evaluation(corpus, fraction, params));
        let model = Self::fit(corpus, params)?;
        let report = TrainingReport {
            samples: corpus.len(),
            vocabulary: model.vectorizer.n_features(),
            trees: model.forest.n_trees(),
            holdout,
        };

        match &report.holdout {
            Some(eval) => {
                info!(
                    samples = report.samples,
                    vocabulary = report.vocabulary,
                    trees = report.trees,
                    held_out = eval.total,
                    accuracy = format!("{:.3}", eval.accuracy()),
                    "classifier trained"
                );
                for class in eval.per_class.iter().filter(|c| c.support > 0) {
                    info!(
                        category = %class.category,
                        support = class.support,
                        correct = class.correct,
                        "held-out class accuracy"
                    );
                }
            }
            None => info!(
                samples = report.samples,
                vocabulary = report.vocabulary,
                trees = report.trees,
                "classifier trained without a held-out split"
            ),
        }
        Ok((model, report))
    }

    /// Fit on the stratified remainder and score the held-out part. `None`
    /// when the corpus is too small to split or the remainder cannot be fit.
    fn holdout_evaluation(corpus: &Corpus, fraction: f64, params: &TrainParams) -> Option<Evaluation> {
        let (fit_part, held_out) = corpus.stratified_split(fraction, params.split_seed);
        if held_out.is_empty() {
            debug!(samples = corpus.len(), "corpus too small for a held-out split");
            return None;
        }
        match Self::fit(&fit_part, params) {
            Ok(model) => Some(model.evaluate(&held_out)),
            Err(e) => {
                warn!(error = %e, "held-out evaluation skipped");
                None
            }
        }
    }

    fn fit(corpus: &Corpus, params: &TrainParams) -> Result<Self, ClassifierError> {
        if corpus.is_empty() {
            return Err(ClassifierError::EmptyCorpus);
        }

        let texts: Vec<&str> = corpus.samples().iter().map(|s| s.text.as_str()).collect();
        let labels = corpus
            .samples()
            .iter()
            .map(|s| {
                s.label
                    .class_index()
                    .ok_or_else(|| ClassifierError::UnknownLabel(s.label.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let vectorizer = TfidfVectorizer::fit(&texts, params.max_features);
        if vectorizer.n_features() == 0 {
            return Err(ClassifierError::EmptyVocabulary);
        }
        let x: Vec<_> = texts.iter().map(|t| vectorizer.transform(t)).collect();
        let forest = RandomForest::fit(&x, &labels, N_CLASSES, vectorizer.n_features(), &params.forest);

        Ok(Self {
            format_version: ARTIFACT_VERSION,
            vectorizer,
            forest,
        })
    }

    pub fn predict(&self, text: &str) -> Prediction {
        let x = self.vectorizer.transform(text);
        let proba = self.forest.predict_proba(&x);
        let mut values = [0.0; N_CLASSES];
        for (slot, p) in values.iter_mut().zip(proba) {
            *slot = p;
        }
        let probabilities = CategoryProbabilities(values);
        let (category, confidence) = probabilities.argmax();
        Prediction {
            category,
            confidence,
            probabilities,
        }
    }

    pub fn evaluate(&self, corpus: &Corpus) -> Evaluation {
        let mut per_class: Vec<ClassEvaluation> = ThreatCategory::CLASSES
            .iter()
            .map(|&category| ClassEvaluation {
                category,
                support: 0,
                correct: 0,
            })
            .collect();
        let mut correct = 0;
        for sample in corpus.samples() {
            let Some(i) = sample.label.class_index() else {
                continue;
            };
            per_class[i].support += 1;
            if self.predict(&sample.text).category == sample.label {
                per_class[i].correct += 1;
                correct += 1;
            }
        }
        Evaluation {
            total: corpus.len(),
            correct,
            per_class,
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vectorizer.n_features()
    }

    /// Write the artifact, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let reader = BufReader::new(File::open(path)?);
        let model: Self = serde_json::from_reader(reader)?;
        if model.format_version != ARTIFACT_VERSION {
            return Err(ClassifierError::ArtifactVersion {
                found: model.format_version,
                expected: ARTIFACT_VERSION,
            });
        }
        info!(path = %path.display(), vocabulary = model.vocabulary_size(), "model loaded");
        Ok(model)
    }

    /// Load the artifact at `path`, or train on `corpus` and save it there.
    ///
    /// An unreadable artifact is replaced. A failed save is logged and the
    /// freshly trained model is still returned.
    pub fn load_or_train(path: &Path, corpus: &Corpus) -> Result<Self, ClassifierError> {
        if path.exists() {
            match Self::load(path) {
                Ok(model) => return Ok(model),
                Err(e) => warn!(path = %path.display(), error = %e, "model artifact unusable, retraining"),
            }
        } else {
            info!(path = %path.display(), "no model artifact, training from corpus");
        }

        let (model, _) = Self::train(corpus, &TrainParams::default())?;
        if let Err(e) = model.save(path) {
            warn!(path = %path.display(), error = %e, "failed to save model artifact");
        }
        Ok(model)
    }
}
