//! End-to-end scoring of a single text.
//!
//! [`ThreatScorer`] chains the classifier, the score adjuster, and the
//! severity policy. The model is either handed in ready-made or loaded from
//! its artifact path on first use, training from the seed corpus if no
//! artifact exists yet. A failed load is not cached, so the next call
//! retries.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tracing::error;
use vipwatch_core::{Action, ScoringConfig, Severity, ThreatCategory};

use crate::adjust::ScoreAdjuster;
use crate::classifier::{CategoryProbabilities, ThreatClassifier};
use crate::corpus::Corpus;
use crate::severity::SeverityPolicy;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("content is empty")]
    EmptyContent,

    #[error("threat model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Full scoring result for one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatAssessment {
    pub threat_score: f64,
    pub base_score: f64,
    pub bonus: f64,
    pub confidence: f64,
    pub category: ThreatCategory,
    pub severity: Severity,
    pub recommended_action: Action,
    pub probabilities: CategoryProbabilities,
    pub vip_matches: Vec<String>,
    pub threat_matches: Vec<String>,
}

enum ModelSource {
    Ready(Arc<ThreatClassifier>),
    Lazy {
        path: PathBuf,
        fallback: Corpus,
        loaded: Mutex<Option<Arc<ThreatClassifier>>>,
    },
}

pub struct ThreatScorer {
    model: ModelSource,
    adjuster: ScoreAdjuster,
    policy: SeverityPolicy,
}

impl ThreatScorer {
    pub fn new(classifier: ThreatClassifier, config: &ScoringConfig) -> Self {
        Self::with_model(ModelSource::Ready(Arc::new(classifier)), config)
    }

    /// Defer loading the model at `path` until it is first needed.
    pub fn lazy(path: impl Into<PathBuf>, config: &ScoringConfig) -> Self {
        Self::lazy_with_corpus(path, Corpus::seed(), config)
    }

    /// Like [`lazy`](Self::lazy), training on `fallback` when no artifact exists.
    pub fn lazy_with_corpus(
        path: impl Into<PathBuf>,
        fallback: Corpus,
        config: &ScoringConfig,
    ) -> Self {
        Self::with_model(
            ModelSource::Lazy {
                path: path.into(),
                fallback,
                loaded: Mutex::new(None),
            },
            config,
        )
    }

    fn with_model(model: ModelSource, config: &ScoringConfig) -> Self {
        Self {
            model,
            adjuster: ScoreAdjuster::new(config),
            policy: SeverityPolicy::new(config.bands),
        }
    }

    /// The classifier, loading or training it on first use.
    pub fn classifier(&self) -> Result<Arc<ThreatClassifier>, ScoreError> {
        match &self.model {
            ModelSource::Ready(model) => Ok(Arc::clone(model)),
            ModelSource::Lazy {
                path,
                fallback,
                loaded,
            } => {
                let mut slot = loaded.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(model) = slot.as_ref() {
                    return Ok(Arc::clone(model));
                }
                let model = ThreatClassifier::load_or_train(path, fallback)
                    .map(Arc::new)
                    .map_err(|e| {
                        error!(path = %path.display(), error = %e, "threat model unavailable");
                        ScoreError::ModelUnavailable(e.to_string())
                    })?;
                *slot = Some(Arc::clone(&model));
                Ok(model)
            }
        }
    }

    pub fn assess(&self, content: &str) -> Result<ThreatAssessment, ScoreError> {
        if content.trim().is_empty() {
            return Err(ScoreError::EmptyContent);
        }
        let model = self.classifier()?;
        Ok(self.assess_probabilities(model.predict(content).probabilities, content))
    }

    /// Apply the keyword rules and severity policy to a known distribution.
    pub fn assess_probabilities(
        &self,
        probabilities: CategoryProbabilities,
        content: &str,
    ) -> ThreatAssessment {
        let adjustment = self.adjuster.adjust(&probabilities, content);
        let decision = self.policy.decide(adjustment.final_score);
        let (category, confidence) = probabilities.argmax();
        ThreatAssessment {
            threat_score: adjustment.final_score,
            base_score: adjustment.base,
            bonus: adjustment.bonus,
            confidence,
            category,
            severity: decision.severity,
            recommended_action: decision.action,
            probabilities,
            vip_matches: adjustment.vip_matches,
            threat_matches: adjustment.threat_matches,
        }
    }
}
