//! remote-resource CLI - read and update resources on managed clusters via the hub.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use remote_resource::{
    get_remote_resource, initiate_upgrade, update_remote_resource, ActionTarget, HubClient,
    HubConfig, Orchestrator, PollSettings, RemoteError, RemoteResourceRef,
};

/// remote-resource CLI - Work with resources on managed clusters.
#[derive(Parser)]
#[command(name = "remote-resource")]
#[command(about = "Read and update resources on managed clusters through the hub")]
struct Cli {
    /// Hub API server URL (or set `CLUSTER_API_URL` env var).
    #[arg(long)]
    hub_url: Option<String>,

    /// Bearer token for the hub (or set `HUB_TOKEN` env var).
    #[arg(long)]
    token: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(long, default_value = "false")]
    insecure_skip_tls_verify: bool,

    /// PEM file with an extra root certificate for the hub.
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Milliseconds between polls.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Polls before giving up.
    #[arg(long)]
    max_poll_attempts: Option<u32>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a resource from a managed cluster as JSON.
    Get {
        /// Managed cluster name.
        #[arg(long)]
        cluster: String,

        /// API group; empty for the core group.
        #[arg(long, default_value = "")]
        group: String,

        /// API version.
        #[arg(long, default_value = "v1")]
        api_version: String,

        /// Resource plural, e.g. `deployments`.
        #[arg(long)]
        resource: String,

        /// Resource kind, e.g. `Deployment`.
        #[arg(long)]
        kind: String,

        /// Resource name.
        #[arg(long)]
        name: String,

        /// Resource namespace; omit for cluster-scoped resources.
        #[arg(long, default_value = "")]
        namespace: String,
    },

    /// Replace a resource on a managed cluster with a JSON or YAML document.
    Update {
        /// Managed cluster name.
        #[arg(long)]
        cluster: String,

        /// Resource plural, e.g. `configmaps`.
        #[arg(long)]
        resource: String,

        /// Resource name.
        #[arg(long)]
        name: String,

        /// Resource namespace; omit for cluster-scoped resources.
        #[arg(long, default_value = "")]
        namespace: String,

        /// File holding the desired resource.
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Start an OpenShift upgrade on a managed cluster.
    Upgrade {
        /// Managed cluster name.
        #[arg(long)]
        cluster: String,

        /// Target version; must be one of the cluster's available updates.
        #[arg(long)]
        version: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = resolve_config(&cli)?;
    let hub = HubClient::new(&config.api_url, &config.token, &config.policy)
        .context("Failed to create hub client")?;

    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(hub.shared(), config.poll).with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            cancel.cancel();
        }
    });

    match run(cli.command, &orchestrator).await {
        Ok(()) => Ok(()),
        Err(CommandError::Remote(err)) => {
            let exception = err.to_exception();
            eprintln!("error {}: {}", exception.code, exception.message);
            std::process::exit(1);
        }
        Err(CommandError::Other(err)) => Err(err),
    }
}

enum CommandError {
    Remote(RemoteError),
    Other(anyhow::Error),
}

impl From<RemoteError> for CommandError {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err)
    }
}

async fn run(command: Commands, orchestrator: &Orchestrator) -> Result<(), CommandError> {
    match command {
        Commands::Get {
            cluster,
            group,
            api_version,
            resource,
            kind,
            name,
            namespace,
        } => {
            let target =
                RemoteResourceRef::namespaced(group, api_version, resource, kind, name, namespace);
            let resource: Value = get_remote_resource(orchestrator, &cluster, &target).await?;

            let rendered = serde_json::to_string_pretty(&resource).map_err(RemoteError::from)?;
            println!("{rendered}");
        }

        Commands::Update {
            cluster,
            resource,
            name,
            namespace,
            file,
        } => {
            let desired = load_document(&file)?;
            let target = ActionTarget::new(resource, name, namespace);

            update_remote_resource(orchestrator, &cluster, &target, &desired).await?;
            info!(cluster = %cluster, resource = %target.resource, name = %target.name, "Update applied");
        }

        Commands::Upgrade { cluster, version } => {
            initiate_upgrade(orchestrator, &cluster, &version).await?;
            println!("Upgrade of {cluster} to {version} requested");
        }
    }

    Ok(())
}

/// Resolve hub settings from the environment, then apply command-line overrides.
fn resolve_config(cli: &Cli) -> Result<HubConfig> {
    let mut config = match &cli.hub_url {
        Some(url) => HubConfig::from_env_with_url(url.clone()),
        None => HubConfig::from_env(),
    }
    .context("Failed to load hub configuration")?;

    if let Some(token) = &cli.token {
        config.token.clone_from(token);
    }
    if cli.insecure_skip_tls_verify {
        config.policy.accept_invalid_certs = true;
    }
    if let Some(path) = &cli.ca_file {
        let pem = std::fs::read(path)
            .with_context(|| format!("Failed to read CA file {}", path.display()))?;
        config.policy = config.policy.with_ca_certificate(pem);
    }

    let interval = cli
        .poll_interval_ms
        .map_or(config.poll.interval(), Duration::from_millis);
    let max_attempts = cli
        .max_poll_attempts
        .unwrap_or(config.poll.max_attempts());
    config.poll = PollSettings::new(interval, max_attempts);

    Ok(config)
}

/// Read a JSON or YAML document from disk.
fn load_document(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
