//! Threat scoring: TF-IDF text features, a decision-tree ensemble
//! classifier, keyword co-occurrence rules, and severity bands.

mod adjust;
mod assess;
mod classifier;
mod corpus;
mod forest;
mod severity;
mod text;

pub use adjust::{Adjustment, ScoreAdjuster};
pub use assess::{ScoreError, ThreatAssessment, ThreatScorer};
pub use classifier::{
    ARTIFACT_VERSION, CategoryProbabilities, ClassEvaluation, ClassifierError, Evaluation,
    Prediction, ThreatClassifier, TrainParams, TrainingReport,
};
pub use corpus::{Corpus, LabeledText};
pub use forest::{DecisionTree, ForestParams, RandomForest};
pub use severity::{Decision, SeverityPolicy};
pub use text::{SparseVector, TfidfVectorizer, tokenize};
