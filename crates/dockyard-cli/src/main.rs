mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use dockyard_core::BumpKind;

#[derive(Parser)]
#[command(
    name = "dockyard",
    about = "Build and publish container images for many repositories"
)]
#[command(version)]
struct Cli {
    /// Directory holding the config, version.txt and CHANGELOG.md
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file (default: <root>/repos.conf)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    /// Fail any single git/docker invocation that runs longer than this (seconds)
    #[arg(long, global = true, value_name = "SECS")]
    tool_timeout: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone, build and push every configured repository
    Deploy {
        /// Version component to bump
        #[arg(value_enum, default_value_t = Bump::Patch)]
        bump: Bump,
        /// Dry run: build locally, push and persist nothing
        #[arg(long = "test", visible_alias = "no-commit")]
        test: bool,
        /// Extra tag applied to every image
        #[arg(long, value_parser = parse_image_tag)]
        tag: Option<String>,
        /// Print the deploy report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the persisted version (initializing it if absent)
    Version,
    /// Print the resolved deployment config
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Bump {
    Patch,
    Minor,
    Major,
}

impl From<Bump> for BumpKind {
    fn from(bump: Bump) -> Self {
        match bump {
            Bump::Patch => Self::Patch,
            Bump::Minor => Self::Minor,
            Bump::Major => Self::Major,
        }
    }
}

/// Accept only what `docker tag` accepts: `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
fn parse_image_tag(raw: &str) -> Result<String, String> {
    const MAX_LEN: usize = 128;
    let mut chars = raw.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if first_ok && rest_ok && raw.len() <= MAX_LEN {
        Ok(raw.to_owned())
    } else {
        Err(format!(
            "'{raw}' is not a valid image tag (letters, digits, '_', '.' and '-'; \
             must not start with '.' or '-'; at most {MAX_LEN} characters)"
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let workspace = commands::Workspace::load(&cli.root, cli.config.as_deref());

    match cli.command {
        Commands::Deploy {
            bump,
            test,
            tag,
            json,
        } => {
            let options = commands::DeployOptions {
                bump: bump.into(),
                dry_run: test,
                additional_tag: tag,
            };
            let timeout = cli.tool_timeout.map(Duration::from_secs);
            commands::deploy(&workspace, &options, timeout, json).await?
        }
        Commands::Version => commands::version(&workspace)?,
        Commands::Config { json } => commands::config(&workspace, json)?,
    }

    Ok(())
}
