//! Murmur application binary - composition root.
//!
//! Ties together the Murmur crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Build the classifier and command table
//! 3. Spawn the dictation pipeline (segmenter -> workers -> dispatcher)
//! 4. Wait for Ctrl-C, then drain and report counters
//!
//! No real audio or keystroke backend is wired in here: the pipeline runs
//! against the mock transcription service and a logging sink, which is
//! enough to exercise the full path end to end. Platform capture and
//! injection backends plug in through `AudioCaptureService` and
//! `ActionSink` without touching this file's structure.

mod cli;

use std::sync::Arc;

use clap::Parser;

use murmur_core::config::MurmurConfig;
use murmur_dispatch::{ActionSink, CommandTable, LogSink};
use murmur_engine::DictationPipeline;
use murmur_transcribe::MockTranscriptionService;

use cli::CliArgs;

/// Print the active command table, human- or machine-readable.
fn print_commands(config: &MurmurConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Validate the table before printing so a broken entry is reported.
    CommandTable::from_config(&config.dictation.commands)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config.dictation.commands)?);
        return Ok(());
    }
    let width = config
        .dictation
        .commands
        .keys()
        .map(String::len)
        .max()
        .unwrap_or(0);
    for (phrase, action) in &config.dictation.commands {
        println!("{phrase:width$}  {action}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Tracing. An explicit --log-level wins over RUST_LOG.
    let filter = match args.resolve_log_level() {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Murmur v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = args.resolve_config_path();
    let config = MurmurConfig::load_or_default(&config_file);
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    if args.print_commands {
        return print_commands(&config, args.json);
    }

    // Pipeline. The mock service stands in until a model backend is
    // configured; the log sink stands in for keystroke injection.
    if !config.output.inject_keystrokes {
        tracing::info!("Keystroke injection disabled, output actions will be suppressed");
    }
    let service = Arc::new(MockTranscriptionService::new());
    let sink: Arc<dyn ActionSink> = Arc::new(LogSink::new());
    let pipeline = DictationPipeline::spawn(config, service, sink)?;

    let input = pipeline.handle();
    tracing::info!("Pipeline running, press Ctrl-C to stop");
    // The input handle is where capture and hotkey backends would feed
    // frames and toggles.
    tokio::signal::ctrl_c().await?;
    drop(input);

    tracing::info!("Shutting down, draining in-flight utterances");
    let stats = pipeline.stats_handle();
    pipeline.shutdown().await?;

    let snap = stats.snapshot();
    tracing::info!(
        utterances = snap.utterances,
        transcripts = snap.transcripts,
        discarded = snap.discarded,
        actions_applied = snap.actions_applied,
        actions_failed = snap.actions_failed,
        "Shutdown complete"
    );
    Ok(())
}
