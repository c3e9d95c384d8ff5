

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ledger_lifecycle::{
    CascadeRoot, InMemoryLedgerStore, LifecycleAction, LifecycleConfig, LifecycleManager,
    LifecycleRequest,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "ledger-lifecycle",
    version,
    about = "Validate, soft delete, restore or hard delete a client or branch subtree"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Optional config file layered under LEDGER_* environment variables.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Ledger snapshot (JSON). Overrides LEDGER_DATA_PATH.
    #[arg(long, value_name = "PATH", global = true)]
    data: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Count what a delete would affect without changing anything.
    Validate(TargetArgs),
    SoftDelete(TargetArgs),
    Restore(TargetArgs),
    /// Permanently remove the subtree.
    HardDelete(TargetArgs),
}

#[derive(Args)]
struct TargetArgs {
    #[arg(long, conflicts_with = "branch", required_unless_present = "branch")]
    client: Option<Uuid>,
    #[arg(long)]
    branch: Option<Uuid>,
}

impl TargetArgs {
    fn root(&self) -> anyhow::Result<CascadeRoot> {
        match (self.client, self.branch) {
            (Some(id), None) => Ok(CascadeRoot::Client(id)),
            (None, Some(id)) => Ok(CascadeRoot::Branch(id)),
            _ => anyhow::bail!("exactly one of --client or --branch is required"),
        }
    }
}

impl Command {
    fn request(&self) -> anyhow::Result<LifecycleRequest> {
        let (action, target) = match self {
            Command::Validate(t) => (LifecycleAction::Validate, t),
            Command::SoftDelete(t) => (LifecycleAction::SoftDelete, t),
            Command::Restore(t) => (LifecycleAction::Restore, t),
            Command::HardDelete(t) => (LifecycleAction::HardDelete, t),
        };
        Ok(LifecycleRequest::new(action, target.root()?))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = LifecycleConfig::load(cli.config.as_deref())?;
    if let Some(data) = cli.data.clone() {
        config.data_path = Some(data);
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)?,
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let data_path = config
        .data_path
        .clone()
        .context("no ledger file given (use --data or LEDGER_DATA_PATH)")?;
    let store = InMemoryLedgerStore::open(&data_path)
        .await
        .with_context(|| format!("failed to open ledger {}", data_path.display()))?;
    let manager = LifecycleManager::new(Arc::new(store.clone()));

    let request = cli.command.request()?;
    let report = manager.execute(request).await;

    let rendered = if config.pretty_reports {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{rendered}");

    if !report.success {
        std::process::exit(1);
    }

    if request.action.commits() {
        store
            .save(&data_path)
            .await
            .with_context(|| format!("failed to write {}", data_path.display()))?;
        info!("Ledger written back to {}", data_path.display());
    }

    Ok(())
}
