//! chorus - scheduled posting bot
//!
//! Picks content from a text file and publishes it to every configured
//! network on a fixed schedule.

mod generator;
mod setup;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use libchorus::backends::create_backends;
use libchorus::clock::{Clock, SystemClock};
use libchorus::logging::{LogFormat, LoggingConfig};
use libchorus::{Bot, ChorusError, Config, CycleOutcome, DedupCache, Dispatcher, StateStore};
use tracing::{error, info, warn};

use crate::generator::LineFileGenerator;
use crate::setup::{run_setup, TerminalPrompt};

#[derive(Parser, Debug)]
#[command(name = "chorus")]
#[command(version)]
#[command(about = "Scheduled posting bot for Bluesky and Mastodon")]
#[command(long_about = "\
chorus - scheduled posting bot for Bluesky and Mastodon

DESCRIPTION:
    chorus picks a post from a content file, skips anything it has posted
    before, and publishes it to every configured network. Long posts are
    either fitted (the longest alternative that fits wins) or, with
    `wrap = true`, split into a reply thread.

    Without --live nothing is sent: the full pipeline runs as a dry run.

CONTENT FILE:
    Paragraphs separated by blank lines are posts. Every line of a
    paragraph is an alternative wording of that post.

USAGE:
    # Configure networks interactively
    chorus --name newsbot --setup

    # Dry run a single cycle
    chorus --name newsbot --source posts.txt --once

    # Post for real, forever
    chorus --name newsbot --source posts.txt --live

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (saves history and state)

CONFIGURATION:
    ~/.config/chorus/<name>[-<profile>].toml (or $CHORUS_CONFIG)

EXIT CODES:
    0 - Success
    1 - Runtime error
    2 - Authentication error
    3 - Invalid input
")]
struct Cli {
    /// Bot name, selects the config and state files
    #[arg(long, default_value = "chorus")]
    name: String,

    /// Actually publish (dry run otherwise)
    #[arg(long)]
    live: bool,

    /// Interactively configure networks before running
    #[arg(long)]
    setup: bool,

    /// Configuration profile, e.g. "staging"
    #[arg(long)]
    profile: Option<String>,

    /// Minimum log level (error, warn, info, debug, trace)
    #[arg(long, env = "CHORUS_LOG_LEVEL", default_value = "info")]
    loglevel: String,

    /// Log output format (text, json, pretty)
    #[arg(long, env = "CHORUS_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Content file to post from
    #[arg(long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Run a single cycle, print the result as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, cli.loglevel.as_str()).init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<ChorusError>()
            .map(ChorusError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let profile = cli.profile.as_deref();
    let mut config = Config::load(&cli.name, profile)?;
    let paths = config.paths(&cli.name, profile)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if cli.setup {
        let added = run_setup(&mut TerminalPrompt::stdin(), &mut config, &paths.config, clock.clone())?;
        info!(added = ?added, "Setup finished");
        if cli.source.is_none() {
            return Ok(());
        }
    }

    let backends = create_backends(&config, cli.live, clock.clone())?;
    if backends.is_empty() {
        if cli.live {
            bail!(
                "No networks configured in {}, run with --setup first",
                paths.config.display()
            );
        }
        warn!("No networks configured, nothing will be posted");
    }
    if !cli.live {
        warn!("Dry run: posts are prepared but not sent (use --live to publish)");
    }

    let source = cli
        .source
        .as_deref()
        .context("No content file given, use --source FILE")?;
    let generator = LineFileGenerator::load(source)?;
    info!(source = %generator.source().display(), posts = generator.len(), "Content loaded");

    let mut bot = Bot::new(
        config.bot.clone(),
        generator,
        Dispatcher::new(backends),
        DedupCache::load(&paths.history, clock.clone()),
        StateStore::load(&paths.state),
    );
    bot.auth().await?;

    if cli.once {
        let outcome = bot.run_cycle().await?;
        return report(&outcome);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;
    bot.run(shutdown).await;

    info!("chorus stopped");
    Ok(())
}

/// Print the outcome of a single cycle as JSON on stdout
fn report(outcome: &CycleOutcome) -> Result<()> {
    let json = match outcome {
        CycleOutcome::Posted(report) => serde_json::json!({
            "outcome": "posted",
            "results": report.results,
            "failures": report.failures,
        }),
        CycleOutcome::NoContent => serde_json::json!({ "outcome": "no_content" }),
        CycleOutcome::Duplicate => serde_json::json!({ "outcome": "duplicate" }),
    };
    println!("{}", serde_json::to_string_pretty(&json)?);

    if let CycleOutcome::Posted(report) = outcome {
        if report.all_failed() {
            bail!("Post failed on every network");
        }
    }
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}
