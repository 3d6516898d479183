//! Rule-based adjustment of classifier output.

use serde::Serialize;
use vipwatch_core::ScoringConfig;

use crate::classifier::CategoryProbabilities;

/// How a final threat score was derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    /// Malicious probability mass before rules.
    pub base: f64,
    /// Co-occurrence bonus applied, zero if the rule did not fire.
    pub bonus: f64,
    /// `min(1, base + bonus)`.
    pub final_score: f64,
    pub vip_matches: Vec<String>,
    pub threat_matches: Vec<String>,
}

/// Adds the VIP/threat keyword co-occurrence bonus to a base score.
#[derive(Debug, Clone)]
pub struct ScoreAdjuster {
    vip_keywords: Vec<String>,
    threat_keywords: Vec<String>,
    bonus: f64,
}

impl ScoreAdjuster {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            vip_keywords: config.vip_keywords.clone(),
            threat_keywords: config.threat_keywords.clone(),
            bonus: config.cooccurrence_bonus(),
        }
    }

    pub fn adjust(&self, probabilities: &CategoryProbabilities, content: &str) -> Adjustment {
        self.adjust_base(probabilities.malicious_mass(), content)
    }

    pub fn adjust_base(&self, base: f64, content: &str) -> Adjustment {
        let lower = content.to_lowercase();
        let vip_matches = matches(&self.vip_keywords, &lower);
        let threat_matches = matches(&self.threat_keywords, &lower);
        let bonus = if !vip_matches.is_empty() && !threat_matches.is_empty() {
            self.bonus
        } else {
            0.0
        };
        Adjustment {
            base,
            bonus,
            final_score: (base + bonus).clamp(0.0, 1.0),
            vip_matches,
            threat_matches,
        }
    }
}

fn matches(keywords: &[String], lower: &str) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| lower.contains(k.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn adjuster() -> ScoreAdjuster {
        ScoreAdjuster::new(&ScoringConfig::with_keywords(
            vec!["Senator Smith".into(), "mayor".into()],
            vec!["kill".into(), "bomb".into()],
        ))
    }

    #[test]
    fn bonus_needs_both_keyword_kinds() {
        let a = adjuster();
        assert_eq!(a.adjust_base(0.2, "the mayor spoke").bonus, 0.0);
        assert_eq!(a.adjust_base(0.2, "kill time").bonus, 0.0);
        let adj = a.adjust_base(0.2, "KILL the MAYOR");
        assert!((adj.final_score - 0.5).abs() < 1e-12);
        assert_eq!(adj.vip_matches, vec!["mayor"]);
        assert_eq!(adj.threat_matches, vec!["kill"]);
    }

    #[test]
    fn multi_word_keyword_matches_substring() {
        let adj = adjuster().adjust_base(0.0, "bomb threat against senator smith's office");
        assert_eq!(adj.vip_matches, vec!["senator smith"]);
        assert_eq!(adj.bonus, 0.3);
    }

    #[test]
    fn high_base_with_bonus_clamped() {
        let adj = adjuster().adjust_base(0.85, "bomb the mayor");
        assert_eq!(adj.final_score, 1.0);
    }

    #[test]
    fn probabilities_feed_base() {
        let p = CategoryProbabilities::new([0.5, 0.1, 0.2, 0.1, 0.05, 0.05]);
        let adj = adjuster().adjust(&p, "nothing relevant");
        assert!((adj.base - 0.45).abs() < 1e-12);
        assert_eq!(adj.final_score, adj.base);
    }

    #[test]
    fn no_keywords_configured_never_bonus() {
        let a = ScoreAdjuster::new(&ScoringConfig::default());
        assert_eq!(a.adjust_base(0.3, "kill the mayor").bonus, 0.0);
    }

    proptest! {
        #[test]
        fn final_score_in_unit_interval(base in 0.0f64..=1.0, text in ".{0,40}") {
            let adj = adjuster().adjust_base(base, &format!("{text} bomb mayor"));
            prop_assert!((0.0..=1.0).contains(&adj.final_score));
            prop_assert!(adj.final_score >= base);
        }
    }
}
