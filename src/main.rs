//! CLI entry point for ftmw-daq
//!
//! Provides command-line access to:
//! - running an acquisition against the simulated instruments
//! - validating a configuration file
//!
//! # Usage
//!
//! Run with a configuration file, answering consistency prompts in the terminal:
//! ```bash
//! ftmw-daq run --config config/ftmw.toml
//! ```
//!
//! Unattended continuous run (Ctrl-C aborts):
//! ```bash
//! ftmw-daq run --config config/ftmw.toml --mode continuous --yes
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use ftmw_daq::config::AppConfig;
use ftmw_daq::data::DataWriter;
use ftmw_daq::experiment::{
    AutoConfirm, AutoController, Decision, OperatorPrompt, RunEvent, RunMode,
};
use ftmw_daq::hardware::mock::{MockAwg, MockScope, MockTemperatureController};
use ftmw_daq::hardware::InstrumentRig;
use ftmw_daq::logging;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ftmw-daq")]
#[command(about = "Automated acquisition control for a chirped-pulse FTMW spectrometer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one acquisition against simulated instruments
    Run {
        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured run mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Accept every consistency correction without asking
        #[arg(long)]
        yes: bool,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Configuration file (TOML)
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Single,
    Continuous,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, mode, yes } => run(config, mode, yes).await,
        Commands::CheckConfig { path } => check_config(path),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn check_config(path: PathBuf) -> Result<()> {
    let config = load_config(Some(path))?;
    println!("Configuration OK");
    println!("  band:           {}", config.run.band);
    println!("  sample:         {}", config.run.sample);
    println!("  save threshold: {}", config.run.save_threshold);
    println!("  mode:           {}", config.run.mode.kind());
    println!("  data dir:       {}", config.acquisition.data_dir.display());
    Ok(())
}

async fn run(config_path: Option<PathBuf>, mode: Option<ModeArg>, yes: bool) -> Result<()> {
    let mut config = load_config(config_path)?;
    logging::init_from_config(&config)?;

    match mode {
        Some(ModeArg::Single) => config.run.mode = RunMode::Single,
        Some(ModeArg::Continuous) => config.run.mode = RunMode::Continuous,
        None => {}
    }

    let rig = InstrumentRig::new(
        MockScope::new(),
        MockAwg::new("chirp_2to8_1us"),
        MockTemperatureController::new(config.run.temperature.target_c),
    );
    let prompt: Arc<dyn OperatorPrompt> = if yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(TerminalPrompt)
    };
    let controller = AutoController::new(
        rig,
        prompt,
        DataWriter::new(&config.acquisition.data_dir),
    )
    .with_settings(config.acquisition.settings());

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RunEvent::TraceSaved { path } => println!("saved   {}", path.display()),
                RunEvent::SpectrumSaved { path } => println!("fft     {}", path.display()),
                RunEvent::Queue(queue) => println!(
                    "queue   prev {} | current {} | next {}",
                    queue.previous(),
                    queue.current(),
                    queue.next()
                ),
                RunEvent::Finished(_) => break,
                _ => {}
            }
        }
    });

    let run_id = match controller.start(config.run).await {
        Ok(run_id) => run_id,
        Err(e) if e.can_recover() => {
            warn!(error = %e, "Run not started; check the instruments and configuration, then retry");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    info!(run_id = %run_id, "Run started, Ctrl-C aborts");

    let aborter = controller.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = aborter.abort().await {
                warn!(error = %e, "Abort failed");
            }
        }
    });

    let summary = controller.wait().await?;
    ctrl_c.abort();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Asks consistency questions on stdin/stdout.
struct TerminalPrompt;

impl TerminalPrompt {
    async fn ask(question: String) -> Option<String> {
        tokio::task::spawn_blocking(move || {
            print!("{question} ");
            std::io::stdout().flush().ok()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok()?;
            Some(line.trim().to_string())
        })
        .await
        .ok()
        .flatten()
    }
}

#[async_trait]
impl OperatorPrompt for TerminalPrompt {
    async fn confirm(&self, question: &str) -> Decision {
        match Self::ask(format!("{question} [y]es / [n]o / [c]ancel:")).await {
            Some(answer) => match answer.to_lowercase().as_str() {
                "y" | "yes" => Decision::Confirm,
                "n" | "no" => Decision::Deny,
                _ => Decision::Cancel,
            },
            None => Decision::Cancel,
        }
    }

    async fn request_number(&self, question: &str, suggested: f64) -> Option<f64> {
        let answer = Self::ask(format!("{question} [{suggested}], empty to accept, c to cancel:")).await?;
        match answer.as_str() {
            "" => Some(suggested),
            "c" | "cancel" => None,
            text => text.parse().ok(),
        }
    }
}
