mod config;
mod display;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vipwatch_ai::{Corpus, SeverityPolicy, ThreatClassifier, ThreatScorer, TrainParams};
use vipwatch_host::{Monitor, Orchestrator};

use crate::config::{Cli, Command, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    info!("vipwatch v{}", env!("CARGO_PKG_VERSION"));

    let settings = &cli.settings;
    match cli.command {
        Command::Cycle => {
            let orchestrator = build_orchestrator(settings)?;
            let report = orchestrator.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Monitor => {
            let orchestrator = Arc::new(build_orchestrator(settings)?);
            info!(
                sources = orchestrator.source_count(),
                interval_secs = settings.cycle_interval_secs,
                "monitoring, press Ctrl-C to stop"
            );
            let monitor = Monitor::start(orchestrator);
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            let cycles = monitor.stop().await;
            eprintln!("Stopped after {cycles} cycle(s)");
        }
        Command::Analyze { text } => {
            let scorer = ThreatScorer::lazy(&settings.model_path, &settings.scoring_config()?);
            let assessment = scorer.assess(&text)?;
            display::print_assessment(&text, &assessment);
        }
        Command::Train { corpus, eval } => {
            let corpus = match corpus {
                Some(path) => Corpus::from_jsonl(&path)
                    .with_context(|| format!("reading corpus {}", path.display()))?,
                None => Corpus::seed(),
            };
            let (model, report) = ThreatClassifier::train(&corpus, &TrainParams::default())?;
            model
                .save(&settings.model_path)
                .with_context(|| format!("saving model to {}", settings.model_path.display()))?;
            display::print_training(&report);
            if let Some(path) = eval {
                let held_out = Corpus::from_jsonl(&path)
                    .with_context(|| format!("reading corpus {}", path.display()))?;
                display::print_evaluation(&model.evaluate(&held_out));
            }
            eprintln!("Model saved to {}", settings.model_path.display());
        }
        Command::Recent { platform, limit } => {
            let store = settings.open_store()?;
            let items = store.recent(platform, limit)?;
            display::print_item_table(&items, &severity_policy(settings)?);
        }
        Command::HighThreat { threshold, limit } => {
            let store = settings.open_store()?;
            let threshold = threshold.unwrap_or(settings.threat_threshold);
            let items = store.above_threshold(threshold, limit)?;
            display::print_item_table(&items, &severity_policy(settings)?);
        }
        Command::Stats => {
            let store = settings.open_store()?;
            let stats = store.stats(settings.threat_threshold)?;
            display::print_stats(&stats, settings.threat_threshold);
        }
        Command::Show { id } => {
            let store = settings.open_store()?;
            let item = store.get(&id)?;
            display::print_item_card(&item, &severity_policy(settings)?);
        }
        Command::Query { sql } => {
            let store = settings.open_store()?;
            let batches = store.query_arrow(&sql)?;
            display::print_batches(&batches)?;
        }
    }
    Ok(())
}

fn build_orchestrator(settings: &Settings) -> anyhow::Result<Orchestrator> {
    let scoring = settings.scoring_config()?;
    let pipeline = settings.pipeline_config()?;
    let store = Arc::new(settings.open_store()?);
    let scorer = Arc::new(ThreatScorer::lazy(&settings.model_path, &scoring));
    // Load (or train) now so a bad artifact shows up at launch, not mid-cycle.
    scorer
        .classifier()
        .with_context(|| format!("loading model from {}", settings.model_path.display()))?;

    let mut orchestrator = Orchestrator::new(store, scorer, pipeline);
    for (collector, item_cap) in settings.collectors() {
        orchestrator.register_with_cap(collector, item_cap);
    }
    if orchestrator.source_count() == 0 {
        warn!("no sources configured; cycles will only score the existing backlog");
    }
    Ok(orchestrator)
}

fn severity_policy(settings: &Settings) -> anyhow::Result<SeverityPolicy> {
    Ok(SeverityPolicy::new(settings.scoring_config()?.bands))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_loads_model_before_first_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("models").join("threat.json");
        let db = dir.path().join("vipwatch.duckdb");
        let cli = Cli::try_parse_from([
            "vipwatch",
            "cycle",
            "--model-path",
            model.to_str().unwrap(),
            "--database-path",
            db.to_str().unwrap(),
            "--source",
            "twitter:25=posts.jsonl",
        ])
        .unwrap();

        let orchestrator = build_orchestrator(&cli.settings).unwrap();
        assert!(model.exists());
        assert_eq!(orchestrator.source_count(), 1);
    }
}
