use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use hostroute_core::{AggregateResult, ConfigManager, DispatchMode, LoggingConfig};
use hostroute_dispatch::{RouteRequest, Router};
use std::path::PathBuf;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, Registry};

#[derive(Parser)]
#[command(name = "hostroute")]
#[command(about = "Route a task to discovered workers and merge their answers", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./.hostroute.toml, then ~/.hostroute/config.toml)
    #[arg(short, long, global = true, env = "HOSTROUTE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one task and print the merged answer
    Route {
        /// Registry keyword (category) to resolve candidates for
        #[arg(short, long)]
        keyword: String,

        /// Task text sent to every selected worker
        #[arg(short, long)]
        task: String,

        /// Number of candidates to select
        #[arg(long)]
        top_k: Option<usize>,

        /// Calling convention
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Session context id to reuse across turns
        #[arg(long)]
        context_id: Option<String>,

        /// Label each merged section with its worker name
        #[arg(long)]
        show_names: bool,

        /// Print the structured result instead of the merged text
        #[arg(long)]
        json: bool,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination
        #[arg(default_value = ".hostroute.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    FanOut,
    FirstSuccess,
}

impl From<ModeArg> for DispatchMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::FanOut => DispatchMode::FanOut,
            ModeArg::FirstSuccess => DispatchMode::FirstSuccess,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            ConfigManager::create_default_config(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} {}", "Wrote".green(), path.display());
            Ok(0)
        }
        Commands::Route {
            keyword,
            task,
            top_k,
            mode,
            context_id,
            show_names,
            json,
        } => {
            // Config loading logs before the configured subscriber exists.
            let manager = tracing::subscriber::with_default(bootstrap_subscriber(), || {
                match &cli.config {
                    Some(path) => ConfigManager::load_from(path),
                    None => ConfigManager::load(),
                }
            })
            .context("Failed to load configuration")?;
            let mut config = manager.into_config();
            if show_names {
                config.aggregation.redact_candidate_names = false;
            }
            init_logging(&config.logging);

            let router = Router::from_config(&config).context("Failed to build router")?;

            let mut request = RouteRequest::new(keyword, task);
            if let Some(top_k) = top_k {
                request = request.with_top_k(top_k);
            }
            if let Some(mode) = mode {
                request = request.with_mode(mode.into());
            }
            if let Some(context_id) = context_id {
                request = request.with_context_id(context_id);
            }

            let result = router.route(request).await?;
            print_result(&result, json)?;

            Ok(if result.all_failed() && result.diagnostics.has_failures() {
                2
            } else {
                0
            })
        }
    }
}

/// `RUST_LOG` if set, warnings otherwise.
fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
}

/// Logs go to stderr; stdout carries only the answer.
fn init_logging(cfg: &LoggingConfig) {
    let env_filter = match EnvFilter::try_new(&cfg.level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!(
                "{} invalid log filter {:?} ({}), using info",
                "Warning:".yellow().bold(),
                cfg.level,
                e
            );
            EnvFilter::new("info")
        }
    };

    if cfg.format == "json" {
        let subscriber = Registry::default()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

fn print_result(result: &AggregateResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&result.to_structured())?);
    } else if !result.merged_text.is_empty() {
        println!("{}", result.merged_text);
    }

    if !result.diagnostics.is_empty() {
        eprintln!("{}", "Diagnostics:".yellow().bold());
        for entry in result.diagnostics.entries() {
            let line = entry.to_string();
            if entry.is_failure() {
                eprintln!("  {}", line.red());
            } else {
                eprintln!("  {}", line.dimmed());
            }
        }
    }
    eprintln!("{} {}", "context_id:".cyan(), result.context_id);
    Ok(())
}
