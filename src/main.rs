use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use epoch_syncer::cache_store::MemoryCacheStore;
use epoch_syncer::config::{get_global_config, init_global_config, SyncSettings};
use epoch_syncer::engine::Engine;
use epoch_syncer::fetcher::{ChainFetcher, HttpChainFetcher};
use epoch_syncer::metrics::init_metrics;
use epoch_syncer::nodegroup::{Group, NodeGroupRegistry};
use epoch_syncer::rpc::{serve, RpcState};
use epoch_syncer::telemetry::{init_tracing, TelemetryConfig};

/// Command-line overrides layered on top of `config.toml`.
#[derive(Parser, Debug)]
#[command(name = "epoch-syncer", about = "Epoch cache synchronizer")]
struct Cli {
    /// Upstream node URL to fetch epoch data from.
    #[arg(long, default_value = "http://127.0.0.1:12537")]
    node_url: String,

    /// Bind address for the node-management RPC server; overrides
    /// `rpc.bind` from config.toml when set.
    #[arg(long)]
    rpc_bind: Option<String>,
}

/// Polls the upstream node for its current tip epoch and feeds it into the
/// subscription validator, standing in for a real push subscription client
/// (out of scope for this crate). Also keeps the node-group registry's
/// health status for `node_url` current, since this is the only caller in
/// the process that actually observes whether the node answers.
#[allow(clippy::too_many_arguments)]
async fn run_polling_epoch_source(
    validator: Arc<epoch_syncer::subscription::SubscriptionValidator>,
    fetcher: Arc<dyn ChainFetcher>,
    nodes: Arc<NodeGroupRegistry>,
    node_url: String,
    cancel: CancellationToken,
    poll_interval: Duration,
) {
    validator.on_epoch_sub_start();

    let mut next_epoch = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("polling epoch source shutting down");
                return;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        match fetcher.query_epoch_data(next_epoch, true).await {
            Ok(data) => {
                nodes.mark_up(Group::Core, &node_url);
                validator.on_epoch_received(data.pivot_block.epoch).await;
                next_epoch = data.pivot_block.epoch + 1;
            }
            Err(err) => {
                nodes.mark_down(Group::Core, &node_url);
                tracing::warn!(error = %err, "polling epoch source failed to query tip");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_loaded = init_global_config().is_ok();
    if !config_loaded {
        eprintln!("no config.toml found, continuing with defaults");
    }

    init_tracing(TelemetryConfig::default())?;
    init_metrics()?;

    let mut settings = if config_loaded {
        SyncSettings::from_config(get_global_config())
    } else {
        SyncSettings::default()
    };
    if let Some(rpc_bind) = cli.rpc_bind {
        settings.rpc_bind = rpc_bind;
    }

    let cache: Arc<dyn epoch_syncer::cache_store::CacheStore> = Arc::new(MemoryCacheStore::new());
    let fetcher: Arc<dyn ChainFetcher> = Arc::new(HttpChainFetcher::new(cli.node_url.clone()));

    let cancel = CancellationToken::new();

    let (mut engine, validator, _checkpoint_handle) =
        Engine::new(fetcher.clone(), cache, settings.clone(), cancel.clone());
    engine.startup().await?;

    let mut node_seed = HashMap::new();
    node_seed.insert(Group::Core, vec![cli.node_url.clone()]);
    let nodes = Arc::new(NodeGroupRegistry::new(node_seed));

    let rpc_state = RpcState {
        nodes: nodes.clone(),
    };
    let rpc_bind = settings.rpc_bind.clone();
    let rpc_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = rpc_cancel.cancelled() => {}
            res = serve(&rpc_bind, rpc_state) => {
                if let Err(err) = res {
                    tracing::error!(error = %err, "node-management RPC server exited");
                }
            }
        }
    });

    let poll_validator = validator.clone();
    let poll_fetcher = fetcher.clone();
    let poll_nodes = nodes.clone();
    let poll_node_url = cli.node_url.clone();
    let poll_cancel = cancel.clone();
    tokio::spawn(run_polling_epoch_source(
        poll_validator,
        poll_fetcher,
        poll_nodes,
        poll_node_url,
        poll_cancel,
        settings.interval_normal,
    ));

    let cancel_on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("ctrl-c received, shutting down");
        cancel_on_ctrl_c.cancel();
    });

    engine.run().await;

    Ok(())
}
