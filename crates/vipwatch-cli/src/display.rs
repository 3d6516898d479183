//! Terminal rendering for items, assessments, and store summaries.

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use vipwatch_ai::{Evaluation, SeverityPolicy, ThreatAssessment, TrainingReport};
use vipwatch_core::{CanonicalItem, ThreatCategory};
use vipwatch_store::StoreStats;

const CONTENT_PREVIEW: usize = 60;
const MAX_LIST_ITEMS: usize = 10;

// ── Items ──

/// One line per item: id, platform, score, category, severity, preview.
pub fn print_item_table(items: &[CanonicalItem], policy: &SeverityPolicy) {
    if items.is_empty() {
        println!("(no items)");
        return;
    }
    println!(
        "{:<28} {:<9} {:>6}  {:<14} {:<9} content",
        "id", "platform", "score", "category", "severity"
    );
    for item in items {
        let severity = if item.is_scored() {
            policy.decide(item.threat_score).severity.as_str()
        } else {
            "-"
        };
        println!(
            "{:<28} {:<9} {:>6.3}  {:<14} {:<9} {}",
            truncate(&item.id, 28),
            item.platform.as_str(),
            item.threat_score,
            item.threat_category.as_str(),
            severity,
            truncate(&single_line(&item.content), CONTENT_PREVIEW)
        );
    }
}

/// Print a single item as a vertical card grouped by section.
pub fn print_item_card(item: &CanonicalItem, policy: &SeverityPolicy) {
    println!("=== {} ===", item.id);
    println!();

    println!("Source");
    field("platform", item.platform);
    if let Some(url) = &item.url {
        field("url", url);
    }
    if let Some(author) = &item.author_username {
        field("author", author);
    }
    if let Some(author_id) = &item.author_id {
        field("author_id", author_id);
    }
    field("timestamp", item.timestamp.to_rfc3339());
    println!();

    println!("Content");
    for line in item.content.lines() {
        println!("  {line}");
    }
    println!();

    println!("Engagement");
    field("likes", item.engagement.likes);
    field("shares", item.engagement.shares);
    field("comments", item.engagement.comments);
    println!();

    println!("Assessment");
    if item.threat_category == ThreatCategory::Unknown {
        field("status", "not yet scored");
    } else {
        let decision = policy.decide(item.threat_score);
        field("threat_score", format!("{:.3}", item.threat_score));
        field("category", item.threat_category);
        field("severity", decision.severity.as_str());
        field("action", decision.action.as_str());
    }
    println!();

    if let Some(map) = item.metadata.as_object()
        && !map.is_empty()
    {
        println!("Metadata ({}):", map.len());
        for (key, value) in map.iter().take(MAX_LIST_ITEMS) {
            field(key, value);
        }
        if map.len() > MAX_LIST_ITEMS {
            println!("  ... and {} more", map.len() - MAX_LIST_ITEMS);
        }
        println!();
    }

    println!("Timestamps");
    field("ingested_at", item.ingested_at.to_rfc3339());
}

// ── Scoring ──

pub fn print_assessment(text: &str, a: &ThreatAssessment) {
    println!("Text: {}", truncate(&single_line(text), 100));
    field("threat_score", format!("{:.3}", a.threat_score));
    field("base_score", format!("{:.3}", a.base_score));
    if a.bonus > 0.0 {
        field(
            "bonus",
            format!(
                "+{:.2} (vip: {}; threat: {})",
                a.bonus,
                a.vip_matches.join(", "),
                a.threat_matches.join(", ")
            ),
        );
    }
    field("category", a.category);
    field("confidence", format!("{:.3}", a.confidence));
    field("severity", a.severity.as_str());
    field("action", a.recommended_action.as_str());
    println!("  probabilities");
    for (category, p) in ThreatCategory::CLASSES.iter().zip(a.probabilities.as_array()) {
        println!("    {:<16} {:.3}", category.as_str(), p);
    }
}

pub fn print_training(report: &TrainingReport) {
    println!("Training");
    field("samples", report.samples);
    field("vocabulary", report.vocabulary);
    field("trees", report.trees);
    match &report.holdout {
        Some(eval) => {
            println!();
            println!("Held-out split");
            print_class_accuracy(eval);
        }
        None => field("held-out accuracy", "-"),
    }
}

pub fn print_evaluation(eval: &Evaluation) {
    println!("Evaluation");
    print_class_accuracy(eval);
}

fn print_class_accuracy(eval: &Evaluation) {
    field("samples", eval.total);
    field("accuracy", format!("{:.3}", eval.accuracy()));
    for class in &eval.per_class {
        if class.support == 0 {
            continue;
        }
        println!(
            "    {:<16} {:>3}/{:<3}",
            class.category.as_str(),
            class.correct,
            class.support
        );
    }
}

// ── Store ──

pub fn print_stats(stats: &StoreStats, threshold: f64) {
    field("total", stats.total);
    field(&format!("score >= {threshold}"), stats.above_threshold);
    field("platforms", stats.platforms);
    if !stats.by_category.is_empty() {
        println!("  by category");
        for (category, count) in &stats.by_category {
            println!("    {category:<16} {count}");
        }
    }
}

pub fn print_batches(batches: &[RecordBatch]) -> anyhow::Result<()> {
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    if batches.is_empty() {
        println!("(0 rows)");
        return Ok(());
    }
    println!("{}", pretty_format_batches(batches)?);
    println!("({rows} rows)");
    Ok(())
}

// ── Helpers ──

fn field(name: &str, value: impl std::fmt::Display) {
    println!("  {name:<26} {value}");
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to at most `max` characters, marking the cut with "...".
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn single_line_collapses_whitespace() {
        assert_eq!(single_line("Bug\n\n  details here"), "Bug details here");
    }
}
