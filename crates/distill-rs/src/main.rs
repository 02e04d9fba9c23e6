//! Summarize the Steam reviews of an app into one article.
//!
//! Reads the API key from `--api-key`, the `OPENROUTER_KEY` environment
//! variable, or `OPENROUTER_KEY` in a `.env` file in the working directory.
//!
//! # Examples
//!
//! ```sh
//! # Every review of an app
//! distill 2398120
//!
//! # A reproducible sample of about 20k tokens
//! distill 2398120 -t 20000 -s 7
//!
//! # Another model, no confirmation prompt
//! distill 2398120 --model openai/gpt-4o-mini --yes
//! ```

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use distill_rs::config::{DEFAULT_MODEL, resolve_api_key};
use distill_rs::cost::{AutoConfirm, Confirmation, StdinConfirmation};
use distill_rs::events::LoggingHandler;
use distill_rs::generate::OpenRouterGenerator;
use distill_rs::pipeline::{Pipeline, RunOutcome};
use distill_rs::report::render_summary;
use distill_rs::select::SelectionParams;
use distill_rs::source::ReviewSource;
use distill_rs::store::FsArtifactStore;
use distill_rs::tokenizer::{BpeCounter, TokenCounter};
use distill_rs::{DistillConfig, DistillError, OpenRouterClient};
use tracing::{debug, info};

/// Summarize the Steam reviews of an app into one article.
#[derive(Parser)]
#[command(name = "distill", version)]
struct Cli {
    /// Steam app id
    app_id: String,

    /// Token budget for the review sample (samples randomly when set)
    #[arg(short = 't', long)]
    token_limit: Option<usize>,

    /// Seed for the review sample
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// OpenRouter API key (overrides OPENROUTER_KEY and .env)
    #[arg(short = 'a', long)]
    api_key: Option<String>,

    /// Model used for every generation call
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Directory holding per-app review and summary data
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Continue without asking when the estimate is over the cost limit
    #[arg(short = 'y', long)]
    yes: bool,
}

async fn run(cli: Cli) -> Result<(), DistillError> {
    let config = DistillConfig::default()
        .with_model(cli.model.clone())
        .with_data_dir(cli.data_dir.clone());
    config.validate()?;

    let api_key = resolve_api_key(cli.api_key.as_deref(), Path::new(".env"))?;

    let source = ReviewSource::new(&cli.app_id, &config)?;
    let app = source.app_info().await?;
    info!(
        "{}",
        app.app_name.as_deref().unwrap_or("(unknown app name)")
    );

    source.sync().await?;
    let records = source.load_records()?;

    let params = SelectionParams::new(cli.token_limit, cli.seed);
    let store = FsArtifactStore::for_run(&config.data_dir, &cli.app_id, &params)?;
    let counter = BpeCounter::for_model(&config.model)?;
    debug!("Counting tokens with {}", counter.encoding());
    let client = OpenRouterClient::new(api_key).map_err(DistillError::Configuration)?;
    let generator = OpenRouterGenerator::new(client, config.model.clone());

    let confirmation: &dyn Confirmation = if cli.yes {
        &AutoConfirm
    } else {
        &StdinConfirmation
    };

    let outcome = Pipeline::new(&config, &counter, &generator, &store)
        .with_confirmation(confirmation)
        .with_event_handler(&LoggingHandler)
        .run(&records, &params)
        .await?;

    match outcome {
        RunOutcome::Completed { summary, .. } => {
            let tokens = counter.count_tokens(&summary.text);
            print!("{}", render_summary(&summary.text, tokens, &summary.location));
        }
        RunOutcome::Declined => println!("Exiting the program..."),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
