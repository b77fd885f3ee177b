use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reconcile::{
    diff_roots, resolve_patch, write_text, ArtifactFormat, BackendRegistry, FsBackend,
    OperationType, ResolveStrategies,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use url::Url;
use uuid::Uuid;

mod config;
mod telemetry;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(version, about = "Compare two file trees and plan how to reconcile them")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Artifact format (json or yaml)
    #[arg(long, global = true)]
    format: Option<ArtifactFormat>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two roots and emit a diff artifact
    Diff {
        /// Source root, a URI such as fs:///data or a local path
        #[arg(short, long, value_parser = parse_location)]
        source: Url,
        /// Target root
        #[arg(short, long, value_parser = parse_location)]
        target: Url,
        /// Where to write the artifact instead of stdout
        #[arg(short, long, value_parser = parse_location)]
        output: Option<Url>,
    },
    /// Turn a diff artifact into a list of planned operations
    Resolve {
        /// Diff artifact to resolve
        #[arg(long, value_parser = parse_location)]
        patch: Url,
        /// Where to write the artifact instead of stdout
        #[arg(short, long, value_parser = parse_location)]
        output: Option<Url>,
        #[command(flatten)]
        strategies: StrategyArgs,
    },
}

#[derive(Args, Debug)]
struct StrategyArgs {
    /// For entries only on the source: none, copy-to-target, delete-at-source
    #[arg(long = "strategy-only-on-source", visible_alias = "strategy-oos", default_value = "none")]
    only_on_source: OperationType,
    /// For entries only on the target: none, copy-to-source, delete-at-target
    #[arg(long = "strategy-only-on-target", visible_alias = "strategy-oot", default_value = "none")]
    only_on_target: OperationType,
    /// For entries on both sides with different content
    #[arg(long = "strategy-both", default_value = "none")]
    both: OperationType,
}

impl From<&StrategyArgs> for ResolveStrategies {
    fn from(args: &StrategyArgs) -> Self {
        ResolveStrategies {
            only_on_source: args.only_on_source,
            only_on_target: args.only_on_target,
            both: args.both,
        }
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Diff { .. } => "diff",
            Commands::Resolve { .. } => "resolve",
        }
    }

    fn failure_code(&self) -> u8 {
        match self {
            Commands::Diff { .. } => 100,
            Commands::Resolve { .. } => 200,
        }
    }
}

/// Accept a URI with a registered-looking scheme, otherwise treat the text as a local path
fn parse_location(text: &str) -> std::result::Result<Url, String> {
    if let Ok(uri) = Url::parse(text) {
        // single letters are drive prefixes, not schemes
        if uri.scheme().len() > 1 {
            return Ok(uri);
        }
    }

    let path = PathBuf::from(text);
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(|e| format!("cannot resolve relative path '{}': {}", text, e))?
            .join(path)
    };
    FsBackend::uri_for(&path).map_err(|e| e.to_string())
}

async fn load_config(cli: &Cli) -> Result<CliConfig> {
    let mut config = match &cli.config {
        Some(path) => CliConfig::load(path).await?,
        None => CliConfig::default(),
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }

    config.validate()?;
    Ok(config)
}

async fn run(command: &Commands, config: &CliConfig) -> Result<()> {
    let registry = Arc::new(BackendRegistry::with_defaults(config.list_options()));
    let format = config.output.format;

    match command {
        Commands::Diff {
            source,
            target,
            output,
        } => {
            info!(%source, %target, "Diffing");
            let diff = diff_roots(registry.clone(), source, target)
                .await
                .with_context(|| format!("Failed to diff {} against {}", source, target))?;

            let text = format.format(&diff)?;
            write_text(&registry, output.as_ref(), &text)
                .await
                .context("Failed to write diff artifact")?;
        }
        Commands::Resolve {
            patch,
            output,
            strategies,
        } => {
            let strategies = ResolveStrategies::from(strategies);
            info!(%patch, ?strategies, "Resolving");
            let plan = resolve_patch(registry.clone(), patch, format, &strategies)
                .await
                .with_context(|| format!("Failed to resolve {}", patch))?;

            let text = format.format(&plan)?;
            write_text(&registry, output.as_ref(), &text)
                .await
                .context("Failed to write resolve artifact")?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#} - {e:?}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match telemetry::init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e:#} - {e:?}");
            return ExitCode::FAILURE;
        }
    };

    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id, command = cli.command.name());

    match run(&cli.command, &config).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%run_id, command = cli.command.name(), "{e:#}");
            eprintln!("{e:#} - {e:?}");
            ExitCode::from(cli.command.failure_code())
        }
    }
}
