//! Command-line and environment configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use vipwatch_core::{PipelineConfig, Platform, ScoringConfig, SeverityBands, parse_keywords};
use vipwatch_sources::{HttpFeedCollector, JsonlCollector, SourceCollector};
use vipwatch_store::DuckStore;

#[derive(Parser, Debug)]
#[command(name = "vipwatch", version)]
#[command(about = "Collect, score, and review content that targets public figures")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one collection and scoring cycle and print its report as JSON
    Cycle,
    /// Run cycles on an interval until Ctrl-C
    Monitor,
    /// Score a single text without storing it
    Analyze { text: String },
    /// Train the classifier and save the model artifact
    Train {
        /// JSON-lines corpus of {"text", "label"}; the bundled seed corpus if omitted
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// JSON-lines corpus to evaluate the trained model on
        #[arg(long)]
        eval: Option<PathBuf>,
    },
    /// List the most recent items
    Recent {
        #[arg(long)]
        platform: Option<Platform>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List items at or above a threat score, highest first
    HighThreat {
        /// Defaults to the configured threat threshold
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Store totals and per-category counts
    Stats,
    /// Show one item in full
    Show { id: String },
    /// Run SQL against the store and print the result table
    Query { sql: String },
}

/// Settings shared by all subcommands.
#[derive(Args, Debug)]
pub struct Settings {
    /// DuckDB database file
    #[arg(long, global = true, env = "DATABASE_PATH", default_value = "./data/vipwatch.duckdb")]
    pub database_path: PathBuf,

    /// Trained model artifact
    #[arg(long, global = true, env = "MODEL_PATH", default_value = "./models/vip_threat_model.json")]
    pub model_path: PathBuf,

    /// Score at or above which an item counts as high threat
    #[arg(long, global = true, env = "THREAT_THRESHOLD", default_value_t = 0.7)]
    pub threat_threshold: f64,

    /// Comma-separated names of the people being protected
    #[arg(long, global = true, env = "VIP_KEYWORDS", default_value = "")]
    pub vip_keywords: String,

    /// Comma-separated violent or threatening terms
    #[arg(long, global = true, env = "THREAT_KEYWORDS", default_value = "")]
    pub threat_keywords: String,

    /// Added to the score when a VIP and a threat keyword co-occur
    #[arg(long, global = true, env = "COOCCURRENCE_BONUS", default_value_t = ScoringConfig::DEFAULT_BONUS)]
    pub cooccurrence_bonus: f64,

    /// Lower bounds of the critical, high, and medium bands
    #[arg(long, global = true, env = "SEVERITY_BANDS", default_value = "0.9,0.7,0.4")]
    pub severity_bands: SeverityBands,

    #[arg(long, global = true, env = "CYCLE_INTERVAL_SECS", default_value_t = 300)]
    pub cycle_interval_secs: u64,

    #[arg(long, global = true, env = "SCORING_BATCH_LIMIT", default_value_t = 500)]
    pub scoring_batch_limit: usize,

    #[arg(long, global = true, env = "SOURCE_ITEM_CAP", default_value_t = 200)]
    pub source_item_cap: usize,

    #[arg(long, global = true, env = "SOURCE_TIMEOUT_SECS", default_value_t = 60)]
    pub source_timeout_secs: u64,

    /// JSON-lines export to collect from, as PLATFORM[:CAP]=PATH (repeatable)
    #[arg(long = "source", global = true, value_name = "PLATFORM[:CAP]=PATH")]
    pub sources: Vec<SourceSpec>,

    /// HTTP feed to collect from, as PLATFORM[:CAP]=URL (repeatable)
    #[arg(long = "feed", global = true, value_name = "PLATFORM[:CAP]=URL")]
    pub feeds: Vec<SourceSpec>,
}

/// A `platform[:cap]=target` source. The cap, when given, replaces the
/// default per-cycle item cap for this source only.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub platform: Platform,
    pub item_cap: Option<usize>,
    pub target: String,
}

impl FromStr for SourceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, target) = s
            .split_once('=')
            .ok_or_else(|| format!("expected PLATFORM[:CAP]=TARGET, got '{s}'"))?;
        let (platform, item_cap) = match head.split_once(':') {
            Some((platform, cap)) => {
                let cap = cap
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| format!("invalid item cap '{cap}': {e}"))?;
                (platform, Some(cap))
            }
            None => (head, None),
        };
        let platform = platform.parse::<Platform>().map_err(|e| e.to_string())?;
        let target = target.trim();
        if target.is_empty() {
            return Err(format!("missing target for {platform}"));
        }
        Ok(Self {
            platform,
            item_cap,
            target: target.to_string(),
        })
    }
}

impl Settings {
    pub fn scoring_config(&self) -> anyhow::Result<ScoringConfig> {
        ScoringConfig::new(
            parse_keywords(&self.vip_keywords),
            parse_keywords(&self.threat_keywords),
            self.cooccurrence_bonus,
            self.severity_bands,
        )
        .context("invalid scoring configuration")
    }

    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = PipelineConfig::default();
        config.source_item_cap = self.source_item_cap;
        config.source_timeout = Duration::from_secs(self.source_timeout_secs);
        config.scoring_batch_limit = self.scoring_batch_limit;
        config.cycle_interval = Duration::from_secs(self.cycle_interval_secs);
        config
            .with_alert_threshold(self.threat_threshold)
            .context("invalid pipeline configuration")
    }

    pub fn open_store(&self) -> anyhow::Result<DuckStore> {
        DuckStore::open_persistent(&self.database_path)
            .with_context(|| format!("opening store at {}", self.database_path.display()))
    }

    /// Configured collectors with their item cap overrides.
    pub fn collectors(&self) -> Vec<(Box<dyn SourceCollector>, Option<usize>)> {
        let files = self.sources.iter().map(|s| {
            let collector: Box<dyn SourceCollector> = Box::new(JsonlCollector::new(s.platform, &s.target));
            (collector, s.item_cap)
        });
        let feeds = self.feeds.iter().map(|s| {
            let collector: Box<dyn SourceCollector> =
                Box::new(HttpFeedCollector::new(s.platform, s.target.clone()));
            (collector, s.item_cap)
        });
        files.chain(feeds).collect()
    }
}
