//! Rodalex Gate
//!
//! Command-line front end for the traffic-law domain gatekeeper.
//!
//! Queries given as arguments are classified independently. With no
//! arguments, one query per stdin line is read and classified as a single
//! conversation, so prior turns bias later ones.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rodalex_classifiers::{ClassificationCascade, LexicalPolicy, StatisticalTier};
use rodalex_core::{ClassificationResult, ScoreBreakdown, SessionContext, Tier};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

mod config;

use config::GateConfig;

#[derive(Parser, Debug)]
#[command(name = "rodalex-gate")]
#[command(about = "Domain gatekeeper for Bolivian traffic-law queries", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "rodalex.yaml")]
    config: String,

    /// Ruleset file (defaults to the embedded ruleset)
    #[arg(short, long)]
    ruleset: Option<std::path::PathBuf>,

    /// Directory for the statistical model artifact
    #[arg(short, long, env = "RODALEX_MODELS_DIR")]
    models_dir: Option<std::path::PathBuf>,

    /// When the lexical tier defers to the fallback tiers
    #[arg(short, long, value_enum)]
    policy: Option<PolicyArg>,

    /// Disable the statistical tier
    #[arg(long)]
    no_statistical: bool,

    /// Deadline for each fallback tier in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Emit one JSON object per query
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify queries from the arguments or stdin
    Classify {
        /// Queries to classify; stdin is read when empty
        queries: Vec<String>,

        /// Include the matched terms in the output
        #[arg(long)]
        explain: bool,
    },

    /// Retrain the statistical model and overwrite its artifact
    Train,

    /// Load and compile the ruleset without classifying
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Decisive,
    WithholdWithoutEvidence,
    Withheld,
}

impl From<PolicyArg> for LexicalPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Decisive => LexicalPolicy::Decisive,
            PolicyArg::WithholdWithoutEvidence => LexicalPolicy::WithholdWithoutEvidence,
            PolicyArg::Withheld => LexicalPolicy::Withheld,
        }
    }
}

/// One classified query as printed to stdout
#[derive(Debug, Serialize)]
struct Report<'a> {
    query: &'a str,
    in_domain: bool,
    score: f32,
    confidence: f32,
    decided_at: Tier,
    latency_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    breakdown: Option<&'a ScoreBreakdown>,
}

impl<'a> Report<'a> {
    fn new(query: &'a str, result: &'a ClassificationResult, explain: bool) -> Self {
        Self {
            query,
            in_domain: result.in_domain,
            score: result.score,
            confidence: result.confidence,
            decided_at: result.decided_at,
            latency_us: result.latency_us,
            message: result.fallback_message(),
            breakdown: explain.then_some(&result.breakdown),
        }
    }

    fn render(&self, json: bool) -> Result<String> {
        if json {
            return Ok(serde_json::to_string(self)?);
        }

        let verdict = if self.in_domain { "IN " } else { "OUT" };
        let mut line = format!(
            "{verdict} {:<11} score={:>6.2} conf={:.2}  {}",
            self.decided_at.to_string(),
            self.score,
            self.confidence,
            self.query
        );
        if let Some(breakdown) = self.breakdown {
            line.push_str("\n    ");
            line.push_str(&breakdown.diagnosis());
        }
        if let Some(message) = self.message {
            line.push_str("\n    ");
            line.push_str(message);
        }
        Ok(line)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config = GateConfig::load(&cli.config, &cli)?;

    match &cli.command {
        Command::Classify { queries, explain } => {
            let cascade = config.build_cascade()?;
            info!(
                ruleset = cascade.ruleset_version(),
                tiers = ?cascade.tier_names(),
                "Gatekeeper ready"
            );
            warm_up(&cascade).await;

            if queries.is_empty() {
                classify_stdin(&cascade, &config, *explain, cli.json).await?;
            } else {
                for query in queries {
                    let result = cascade.classify(query).await;
                    println!("{}", Report::new(query, &result, *explain).render(cli.json)?);
                }
            }
        }
        Command::Train => {
            let ruleset = config.ruleset()?;
            let tier = StatisticalTier::from_config(&ruleset, config.models_dir())?;
            let model = tier.retrain().await?;
            match tier.artifact_path() {
                Some(path) => println!(
                    "Trained {} features for ruleset {} -> {}",
                    model.vocabulary_len(),
                    model.ruleset_version(),
                    path.display()
                ),
                None => anyhow::bail!("No models directory available to store the artifact"),
            }
        }
        Command::Validate => {
            let ruleset = config.ruleset()?;
            let entries = ruleset.entries().count();
            let cascade = config.build_cascade()?;
            println!(
                "Ruleset {} OK: {} weighted terms, lexical policy {:?}, tiers {:?}",
                cascade.ruleset_version(),
                entries,
                cascade.lexical_policy(),
                cascade.tier_names()
            );
        }
    }

    Ok(())
}

/// Classify stdin lines as successive turns of one conversation
async fn classify_stdin(
    cascade: &ClassificationCascade,
    config: &GateConfig,
    explain: bool,
    json: bool,
) -> Result<()> {
    let mut session = SessionContext::new(config.session_turns);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        let result = cascade.classify_turn(query, &mut session).await;
        println!("{}", Report::new(query, &result, explain).render(json)?);
    }
    Ok(())
}

/// Prepare lazy tiers up front; failures only degrade to fallthrough
async fn warm_up(cascade: &ClassificationCascade) {
    if cascade.lexical_policy() == LexicalPolicy::Decisive {
        return;
    }
    for (tier, error) in cascade.warm_up().await {
        warn!(tier = %tier, error = %error, "Tier unavailable, queries will fall through it");
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("rodalex=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rodalex=info"))
    };

    // Logs go to stderr so stdout carries only classification output
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
