//! CLI command definitions, routing, and tracing setup.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use bitfunnel_core::{
    Collaborators, JsonFileSink, Orchestrator, PipelineProgress, QueryPlanner, RunOutcome,
};
use bitfunnel_judgment::{CachedJudgment, ChatCompletionsClient, JudgmentClient};
use bitfunnel_shared::{
    AppConfig, Candidate, PersistenceSink, PipelineConfig, ProcessingRecord, ScreeningMode,
    init_config, load_config, validate_api_keys,
};
use bitfunnel_youtube::YouTubeProvider;

/// Bits shown per record in the run summary.
const SUMMARY_BITS: usize = 3;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bitfunnel — curate riffable comments from videos.
#[derive(Parser)]
#[command(
    name = "bitfunnel",
    version,
    about = "Screen, reduce and turn video comments into quality-checked comedy bits.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the funnel for a free-text request.
    Run(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags of `bitfunnel run`. Each overrides the config file.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// What to look for, in plain words.
    pub query: String,

    /// Videos requested per search term.
    #[arg(long)]
    pub max_videos: Option<usize>,

    /// Comments fetched per screened-in video.
    #[arg(long)]
    pub max_comments: Option<usize>,

    /// Quality bar handed to the reviewer (0-10).
    #[arg(long)]
    pub quality_threshold: Option<f64>,

    /// Screening pass threshold (0-10). Defaults to the mode's threshold.
    #[arg(long)]
    pub screening_threshold: Option<f64>,

    /// Generation attempts per video.
    #[arg(long)]
    pub max_retry: Option<u32>,

    /// Screening mode: content-aware or items-only.
    #[arg(long, value_parser = parse_screening_mode)]
    pub screening_mode: Option<ScreeningMode>,

    /// Videos analysed at once after screening.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Directory for result files.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Do not write a result file.
    #[arg(long)]
    pub no_save: bool,

    /// Send every judgment request, even repeated ones.
    #[arg(long)]
    pub no_cache: bool,

    /// Hide the progress spinner.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_screening_mode(s: &str) -> std::result::Result<ScreeningMode, String> {
    s.parse().map_err(|e: bitfunnel_shared::FunnelError| e.to_string())
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "bitfunnel=info",
        1 => "bitfunnel=debug",
        _ => "bitfunnel=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Config { action } => {
            match action {
                ConfigAction::Init => cmd_config_init().await?,
                ConfigAction::Show => cmd_config_show().await?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Fold `run` flags into the loaded config.
fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    let pipeline = &mut config.pipeline;
    if let Some(n) = args.max_videos {
        pipeline.max_candidates_per_term = n;
    }
    if let Some(n) = args.max_comments {
        pipeline.max_items_per_candidate = n;
    }
    if let Some(t) = args.quality_threshold {
        pipeline.quality_threshold = t;
    }
    if let Some(t) = args.screening_threshold {
        pipeline.screening_threshold = Some(t);
    }
    if let Some(n) = args.max_retry {
        pipeline.max_retry = n;
    }
    if let Some(mode) = args.screening_mode {
        pipeline.screening_mode = mode;
    }
    if let Some(n) = args.concurrency {
        pipeline.analysis_concurrency = n;
    }
    if let Some(dir) = &args.output {
        config.output.dir = dir.clone();
    }
    if args.no_cache {
        config.judgment.cache = false;
    }
}

async fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let mut config = load_config()?;
    apply_overrides(&mut config, &args);
    validate_api_keys(&config)?;

    let pipeline = PipelineConfig::from(&config);
    pipeline.validate()?;

    let http: Arc<dyn JudgmentClient> =
        Arc::new(ChatCompletionsClient::from_config(&config.judgment)?);
    let cache = config
        .judgment
        .cache
        .then(|| Arc::new(CachedJudgment::new(http.clone())));
    let client: Arc<dyn JudgmentClient> = match &cache {
        Some(cache) => cache.clone() as Arc<dyn JudgmentClient>,
        None => http,
    };

    let youtube = Arc::new(YouTubeProvider::from_config(&config.youtube)?);
    let sink: Option<Arc<dyn PersistenceSink>> = if args.no_save {
        None
    } else {
        let sink = JsonFileSink::new(&config.output.dir);
        debug!(dir = %sink.dir().display(), "results directory");
        Some(Arc::new(sink))
    };

    let collaborators = Collaborators {
        planner: Arc::new(QueryPlanner::new(client.clone(), pipeline.planning.clone())),
        discovery: youtube.clone(),
        content: youtube.clone(),
        items: youtube,
        sink,
    };

    info!(
        query = %args.query,
        mode = ?pipeline.screening_mode,
        max_retry = pipeline.max_retry,
        quality_threshold = pipeline.quality_threshold,
        "starting run"
    );

    let mut orchestrator = Orchestrator::new(pipeline, client, collaborators)?;
    if !args.quiet {
        orchestrator = orchestrator.with_progress(Arc::new(CliProgress::new()));
    }

    let outcome = match orchestrator.run(&args.query).await {
        Ok(outcome) => outcome,
        Err(e) if e.aborts_run() => {
            eprintln!("  {e}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };
    print_summary(&outcome);

    if let Some(cache) = &cache {
        let stats = cache.stats();
        info!(hits = stats.hits, misses = stats.misses, "judgment cache");
    }

    if outcome.records.is_empty() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(outcome: &RunOutcome) {
    println!();
    println!("  Run:        {}", outcome.run_id);
    println!("  Terms:      {}", outcome.terms.join(", "));
    println!("  Discovered: {}", outcome.discovered);
    println!("  Screened:   {} passed", outcome.screened_in);
    println!(
        "  Records:    {} ({} degraded, {} dropped)",
        outcome.records.len(),
        outcome.degraded_count(),
        outcome.dropped
    );
    if let Some(location) = &outcome.saved_to {
        println!("  Saved:      {location}");
    }
    println!("  Time:       {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    if outcome.records.is_empty() {
        println!("  No videos made it through the funnel.");
        println!();
        return;
    }

    for (i, record) in outcome.records.iter().enumerate() {
        print_record(i + 1, record);
    }
}

fn print_record(index: usize, record: &ProcessingRecord) {
    let status = if record.degraded { "DEGRADED" } else { "ACCEPTED" };
    println!("  {index}. {}", record.candidate.title);
    println!("     {}", record.candidate.url);
    println!(
        "     {status} after {} attempt(s) | screening {:.1} | quality {:.1} | {} bits",
        record.attempt_count,
        record.screening_verdict.score,
        record.final_quality_verdict.total_score,
        record.final_artifact.len()
    );

    for bit in record.final_artifact.iter().take(SUMMARY_BITS) {
        println!("     - [{}] {}", bit.category_tag, bit.source_item);
        println!("       > {}", bit.retort_example);
        if let Some(moment) = &bit.related_moment {
            println!("         @ {} {}", moment.timestamp, moment.description);
        }
    }
    if record.final_artifact.len() > SUMMARY_BITS {
        println!(
            "     ... {} more",
            record.final_artifact.len() - SUMMARY_BITS
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl PipelineProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn screened(&self, passed: usize, total: usize) {
        self.spinner
            .println(format!("  screening: {passed}/{total} videos passed"));
    }

    fn attempt(&self, candidate: &Candidate, attempt: u32, max_retry: u32) {
        self.spinner.set_message(format!(
            "Generating [{attempt}/{max_retry}] {}",
            candidate.title
        ));
    }

    fn candidate_finished(&self, candidate: &Candidate, record: Option<&ProcessingRecord>) {
        let status = match record {
            Some(r) if r.degraded => "degraded",
            Some(_) => "accepted",
            None => "dropped",
        };
        self.spinner
            .println(format!("  {status}: {}", candidate.title));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "bitfunnel",
            "run",
            "bad parking",
            "--max-videos",
            "5",
            "--screening-mode",
            "items-only",
            "--no-save",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.query, "bad parking");
        assert_eq!(args.max_videos, Some(5));
        assert_eq!(args.screening_mode, Some(ScreeningMode::ItemsOnly));
        assert!(args.no_save);
    }

    #[test]
    fn rejects_unknown_screening_mode() {
        let result = Cli::try_parse_from(["bitfunnel", "run", "q", "--screening-mode", "fast"]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = AppConfig::default();
        let args = RunArgs {
            query: "q".into(),
            max_comments: Some(80),
            quality_threshold: Some(8.0),
            max_retry: Some(3),
            output: Some("results".into()),
            no_cache: true,
            ..Default::default()
        };
        apply_overrides(&mut config, &args);

        assert_eq!(config.pipeline.max_items_per_candidate, 80);
        assert_eq!(config.pipeline.quality_threshold, 8.0);
        assert_eq!(config.pipeline.max_retry, 3);
        assert_eq!(config.pipeline.max_candidates_per_term, 3);
        assert_eq!(config.output.dir, "results");
        assert!(!config.judgment.cache);
    }
}
