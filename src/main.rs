//! `agentpact` - record agent coordination events on Solana
//!
//! Publishes handoff and completion events as memo transactions and
//! reconstructs an address's event history from the ledger.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use console::Style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ConfigCommand, InspectCommand};
use agentpact_core::config::{self, ConfigPatch, PactConfig};
use agentpact_core::output::{page_json, OutputFormatter};
use agentpact_core::protocol::{create_completion_log, create_handoff_log, PactEvent};
use agentpact_core::signer::PendingWrite;
use agentpact_core::{AgentPact, Error, HistoryQuery, PublishError, Signature};

mod cli;

/// Main entry point for the AgentPact CLI
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let formatter = OutputFormatter::new();

    match &cli.command {
        Commands::Handoff { from, to, task } => {
            let client = connect(&cli)?;
            let event: PactEvent = create_handoff_log(from, to, task).into();
            let signature = client.publish(&event).await.map_err(publish_failed)?;
            formatter.print_published(&event, &signature, &client.config().rpc_url);
        }

        Commands::Complete { agent, task, result } => {
            let client = connect(&cli)?;
            let event: PactEvent = create_completion_log(agent, task, result).into();
            let signature = client.publish(&event).await.map_err(publish_failed)?;
            formatter.print_published(&event, &signature, &client.config().rpc_url);
        }

        Commands::History {
            identity,
            limit,
            before,
            pages,
            json,
        } => {
            let client = connect(&cli)?;
            let identity = match identity {
                Some(identity) => identity.clone(),
                None => client
                    .identity()
                    .map(|key| key.to_string())
                    .context("No identity given and no local keypair configured")?,
            };

            let mut query = HistoryQuery::new(limit.unwrap_or(client.config().history_limit));
            if let Some(before) = before {
                let cursor = before
                    .parse::<Signature>()
                    .map_err(|e| anyhow!("Invalid --before signature: {}", e))?;
                query = query.before(cursor);
            }

            let page = client
                .walk_history(&identity, query, *pages)
                .await
                .with_context(|| format!("Failed to read history for {}", identity))?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&page_json(&page))?);
            } else {
                formatter.print_history(&identity, &page);
            }
        }

        Commands::Inspect { event } => {
            let event: PactEvent = match event {
                InspectCommand::Handoff { from, to, task } => create_handoff_log(from, to, task).into(),
                InspectCommand::Completion { agent, task, result } => {
                    create_completion_log(agent, task, result).into()
                }
            };
            let payload = event.encode().context("Failed to encode event")?;
            let wire_size = PendingWrite::new(payload.as_bytes().to_vec()).wire_size();
            formatter.print_payload(&payload, wire_size);
        }

        Commands::Config { cmd } => match cmd {
            None | Some(ConfigCommand::Show) => {
                let source = config_source(&cli);
                let config = load_config(&cli)?;
                formatter.print_config(&config, source.as_deref());
            }
            Some(ConfigCommand::Path) => match config_source(&cli) {
                Some(path) => println!("{}", path.display()),
                None => {
                    let path = PactConfig::default_path().context("Could not determine config directory")?;
                    println!("{} (not created yet)", path.display());
                }
            },
            Some(ConfigCommand::Init { force }) => {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => PactConfig::default_path().context("Could not determine config directory")?,
                };
                if path.exists() && !force {
                    bail!("{} already exists; pass --force to overwrite", path.display());
                }
                PactConfig::default()
                    .save(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                let green = Style::new().green();
                println!("{} Wrote {}", green.apply_to("✓"), path.display());
            }
        },
    }

    Ok(())
}

/// `AGENTPACT_LOG` wins; otherwise warn, or debug with `-v`
fn init_logging(verbose: bool) {
    let default = if verbose { "agentpact=debug,agentpact_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("AGENTPACT_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn config_source(cli: &Cli) -> Option<PathBuf> {
    cli.config.clone().or_else(config::find_config_file)
}

/// File (or defaults), then environment, then command-line flags
fn load_config(cli: &Cli) -> Result<PactConfig> {
    let mut config = config::load_effective(cli.config.as_deref()).context("Failed to load configuration")?;

    let mut overrides = ConfigPatch::new();
    if let Some(url) = &cli.rpc_url {
        overrides = overrides.endpoint(url);
    }
    if let Some(path) = &cli.keypair {
        overrides = overrides.keypair_path(path);
        // An explicit keypair file replaces any inline key from file or env
        if let Some(local) = config.local.as_mut() {
            local.private_key = None;
        }
    }
    config.merge(overrides);
    Ok(config)
}

fn connect(cli: &Cli) -> Result<AgentPact> {
    let config = load_config(cli)?;
    AgentPact::new(config).map_err(|e| anyhow!(e.user_message())).context("Failed to initialize client")
}

fn publish_failed(err: PublishError) -> anyhow::Error {
    anyhow!(Error::from(err).user_message()).context("Failed to publish event")
}
