//! Labelled training text.
//!
//! The bundled seed corpus is a small synthetic set used to bootstrap a
//! model when no trained artifact exists. Operators can train on their own
//! data by supplying a JSON-lines file of `{"text": .., "label": ..}`.

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use vipwatch_core::ThreatCategory;

use crate::classifier::ClassifierError;

/// One labelled training document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledText {
    pub text: String,
    pub label: ThreatCategory,
}

impl LabeledText {
    pub fn new(text: impl Into<String>, label: ThreatCategory) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CorpusLine {
    text: String,
    label: String,
}

/// A set of labelled documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    samples: Vec<LabeledText>,
}

const SEED_THREAT: &[&str] = &[
    "This politician should be eliminated permanently",
    "Someone needs to take out this corrupt leader",
    "The president deserves to die for what they've done",
    "I'm going to hunt down this celebrity",
    "Time to bomb the senator's office",
    "This minister should be shot in the head",
    "Going to assassinate this corrupt official",
    "The mayor needs to be destroyed completely",
];

const SEED_HARASSMENT: &[&str] = &[
    "This celebrity is absolutely disgusting and worthless",
    "The politician is a complete idiot and moron",
    "This leader is trash and should disappear",
    "I hate this minister more than anything",
    "The senator is the worst human being alive",
    "This official makes me sick to my stomach",
];

const SEED_DOXXING: &[&str] = &[
    "Found the home address of Senator Smith: 123 Main St",
    "Here's the personal phone number of the celebrity",
    "The politician lives at this location with family",
    "Private information about the minister's children",
    "Home address and workplace of this official",
];

const SEED_MISINFORMATION: &[&str] = &[
    "BREAKING: Politician caught in fake scandal (completely false)",
    "Celebrity spreading dangerous lies about vaccines",
    "Minister involved in corruption scheme (unverified)",
    "False information about the leader's policies",
    "Fake news about the senator's voting record",
];

const SEED_SAFE: &[&str] = &[
    "I disagree with this politician's policies",
    "The celebrity gave a great performance",
    "Looking forward to the minister's announcement",
    "Interesting interview with the senator",
    "The leader made some good points today",
    "Thanks to the official for their service",
    "Hope the politician considers this proposal",
    "The celebrity looks great in this photo",
];

const SEED_SPAM: &[&str] = &[
    "Click here for amazing deals on celebrity merchandise!",
    "Win money by following this politician!",
    "Crypto investment opportunity endorsed by senator!",
    "Free gift from your favorite celebrity!",
    "Make money fast with this political scheme!",
];

impl Corpus {
    pub fn new(samples: Vec<LabeledText>) -> Result<Self, ClassifierError> {
        if let Some(bad) = samples.iter().find(|s| s.label.class_index().is_none()) {
            return Err(ClassifierError::UnknownLabel(bad.label.to_string()));
        }
        Ok(Self { samples })
    }

    /// The bundled synthetic corpus.
    pub fn seed() -> Self {
        let groups = [
            (ThreatCategory::Threat, SEED_THREAT),
            (ThreatCategory::Harassment, SEED_HARASSMENT),
            (ThreatCategory::Doxxing, SEED_DOXXING),
            (ThreatCategory::Misinformation, SEED_MISINFORMATION),
            (ThreatCategory::Safe, SEED_SAFE),
            (ThreatCategory::Spam, SEED_SPAM),
        ];
        let samples = groups
            .into_iter()
            .flat_map(|(label, texts)| texts.iter().map(move |t| LabeledText::new(*t, label)))
            .collect();
        Self { samples }
    }

    /// Parse a JSON-lines corpus. Blank lines are skipped; any other
    /// malformed line is an error naming its line number.
    pub fn from_jsonl_str(input: &str) -> Result<Self, ClassifierError> {
        let mut samples = Vec::new();
        for (n, line) in input.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let parsed: CorpusLine =
                serde_json::from_str(line).map_err(|e| ClassifierError::CorpusLine {
                    line: n + 1,
                    detail: e.to_string(),
                })?;
            let label: ThreatCategory = parsed
                .label
                .parse()
                .map_err(|_| ClassifierError::UnknownLabel(parsed.label.clone()))?;
            samples.push(LabeledText::new(parsed.text, label));
        }
        Self::new(samples)
    }

    pub fn from_jsonl(path: &Path) -> Result<Self, ClassifierError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_jsonl_str(&input)
    }

    pub fn samples(&self) -> &[LabeledText] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count per class, in [`ThreatCategory::CLASSES`] order.
    pub fn class_counts(&self) -> [usize; 6] {
        let mut counts = [0; 6];
        for sample in &self.samples {
            if let Some(i) = sample.label.class_index() {
                counts[i] += 1;
            }
        }
        counts
    }

    /// Split into `(fit, held_out)`, holding out about `fraction` of every
    /// class. Each class keeps at least one sample in the fit part, so a
    /// singleton class is never held out. The split depends only on `seed`.
    pub fn stratified_split(&self, fraction: f64, seed: u64) -> (Corpus, Corpus) {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let mut rng = StdRng::seed_from_u64(seed);
        let mut held = vec![false; self.samples.len()];
        for category in ThreatCategory::CLASSES {
            let mut members: Vec<usize> = (0..self.samples.len())
                .filter(|&i| self.samples[i].label == category)
                .collect();
            if members.len() < 2 {
                continue;
            }
            members.shuffle(&mut rng);
            let take = ((members.len() as f64 * fraction).round() as usize).min(members.len() - 1);
            for &i in &members[..take] {
                held[i] = true;
            }
        }

        let (mut fit, mut held_out) = (Vec::new(), Vec::new());
        for (sample, is_held) in self.samples.iter().zip(held) {
            if is_held {
                held_out.push(sample.clone());
            } else {
                fit.push(sample.clone());
            }
        }
        (Corpus { samples: fit }, Corpus { samples: held_out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_covers_every_class() {
        let corpus = Corpus::seed();
        assert_eq!(corpus.len(), 37);
        // safe, harassment, threat, doxxing, misinformation, spam
        assert_eq!(corpus.class_counts(), [8, 6, 8, 5, 5, 5]);
    }

    #[test]
    fn parse_jsonl() {
        let input = r#"{"text": "go away", "label": "harassment"}

{"text": "nice speech", "label": "SAFE"}
"#;
        let corpus = Corpus::from_jsonl_str(input).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.samples()[1].label, ThreatCategory::Safe);
    }

    #[test]
    fn unknown_label_rejected() {
        let err = Corpus::from_jsonl_str(r#"{"text": "x", "label": "unknown"}"#).unwrap_err();
        assert!(matches!(err, ClassifierError::UnknownLabel(l) if l == "unknown"));

        let err = Corpus::from_jsonl_str(r#"{"text": "x", "label": "rude"}"#).unwrap_err();
        assert!(matches!(err, ClassifierError::UnknownLabel(l) if l == "rude"));
    }

    #[test]
    fn malformed_line_reports_position() {
        let input = "{\"text\": \"a\", \"label\": \"spam\"}\nnot json\n";
        let err = Corpus::from_jsonl_str(input).unwrap_err();
        assert!(matches!(err, ClassifierError::CorpusLine { line: 2, .. }));
    }

    #[test]
    fn split_is_stratified_and_seeded() {
        let corpus = Corpus::seed();
        let (fit, held_out) = corpus.stratified_split(0.2, 42);
        assert_eq!(fit.len() + held_out.len(), corpus.len());
        assert_eq!(held_out.class_counts(), [2, 1, 2, 1, 1, 1]);
        assert!(fit.class_counts().iter().all(|&n| n > 0));
        assert!(held_out.samples().iter().all(|s| !fit.samples().contains(s)));

        assert_eq!(corpus.stratified_split(0.2, 42), (fit, held_out));
        assert_ne!(corpus.stratified_split(0.2, 7).1, corpus.stratified_split(0.2, 42).1);
    }

    #[test]
    fn split_never_holds_out_a_whole_class() {
        let corpus = Corpus::new(vec![
            LabeledText::new("free money now", ThreatCategory::Spam),
            LabeledText::new("nice speech", ThreatCategory::Safe),
            LabeledText::new("great rally", ThreatCategory::Safe),
        ])
        .unwrap();
        let (fit, held_out) = corpus.stratified_split(0.9, 42);
        assert_eq!(fit.class_counts(), [1, 0, 0, 0, 0, 1]);
        assert_eq!(held_out.class_counts(), [1, 0, 0, 0, 0, 0]);

        let (fit, held_out) = corpus.stratified_split(0.0, 42);
        assert_eq!(fit.len(), 3);
        assert!(held_out.is_empty());
    }

    #[test]
    fn read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "{\"text\": \"free money\", \"label\": \"spam\"}\n").unwrap();
        let corpus = Corpus::from_jsonl(&path).unwrap();
        assert_eq!(corpus.class_counts()[5], 1);
    }
}
