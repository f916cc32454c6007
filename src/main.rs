mod backend_executor;
mod cli;
mod config;
mod logging;
mod repair;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mend")]
#[command(about = "Run a program, ask an LLM to fix it, apply the fix, repeat until it works")]
struct Cli {
    /// Program to run and repair
    target: PathBuf,

    /// What the program is supposed to do (passed to the model)
    #[arg(trailing_var_arg = true)]
    intent: Vec<String>,

    /// Extra config file, applied after user and project config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Patch requests before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Interpreter used to run the target (e.g. "python3")
    #[arg(long)]
    interpreter: Option<String>,

    /// Model to ask for fixes
    #[arg(long)]
    model: Option<String>,

    /// Emit JSON lines instead of console text
    #[arg(long, conflicts_with = "quiet")]
    json: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Suppress normal output
    #[arg(long)]
    quiet: bool,

    /// Write logs to a timestamped file under the data directory
    #[arg(long)]
    log: bool,

    /// Write logs to this file
    #[arg(long, conflicts_with = "log")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match (cli.log_file.clone(), cli.log) {
        (Some(path), _) => Some(path),
        (None, true) => Some(logging::default_log_path(&cli.target.to_string_lossy())?),
        (None, false) => None,
    };
    let log_guard = logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let cwd = std::env::current_dir().context("reading current directory")?;
    let mut config = config::MendConfig::load(&cwd, cli.config.as_deref())?;

    if let Some(max_attempts) = cli.max_attempts {
        config.repair.max_attempts = max_attempts;
    }
    if let Some(interpreter) = cli.interpreter {
        config.repair.interpreter = interpreter;
    }
    if let Some(model) = cli.model {
        config.backend.model = model;
    }

    let intent = (!cli.intent.is_empty()).then(|| cli.intent.join(" "));

    let backend = backend_executor::create_executor("openai", &config.backend)?;
    let repair = repair::RepairLoop::new(&cli.target, &cwd, backend, &config.repair)?
        .with_intent(intent);

    let mode = if cli.json {
        cli::OutputMode::Json
    } else if cli.quiet {
        cli::OutputMode::Quiet
    } else {
        cli::OutputMode::Console
    };
    let handler = cli::create_handler(mode, cli.debug);

    let outcome = repair.run(&*handler).await;
    if let repair::RepairOutcome::Fatal(ref e) = outcome {
        eprintln!("Error: {}", e);
    }

    drop(log_guard);
    std::process::exit(outcome.exit_code());
}
