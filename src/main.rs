// src/main.rs

use std::process;
use std::sync::Arc;
use std::time::Duration;

use fenced_rmstore::config::StoreConfig;
use fenced_rmstore::core::fencing::FencingMode;
use fenced_rmstore::core::layout::codec::OversizeBlobPolicy;
use fenced_rmstore::core::recovery::store::StoreOptions;
use fenced_rmstore::core::retry::RetryPolicy;
use fenced_rmstore::{RmStateStore, ZkCoordinationClient};

fn print_version() {
    println!("fenced-rmstore {}", env!("CARGO_PKG_VERSION"));
}

fn print_usage() {
    eprintln!("usage: fenced-rmstore --config <path> | --version");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version") {
        print_version();
        return;
    }

    let config_path = match args.iter().position(|a| a == "--config") {
        Some(idx) => match args.get(idx + 1) {
            Some(path) => path.clone(),
            None => {
                print_usage();
                process::exit(2);
            }
        },
        None => {
            print_usage();
            process::exit(2);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(&config_path).await {
        tracing::error!(error = %err, "fenced-rmstore exited with an error");
        process::exit(1);
    }
}

async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = StoreConfig::from_file(config_path).await?;
    tracing::info!(address = %config.zk.address, "connecting to coordination ensemble");

    let client = Arc::new(
        ZkCoordinationClient::connect(config.zk.address.clone(), config.zk.session_timeout)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect: {e}"))?,
    );
    let session = client.session();

    let retry_policy =
        RetryPolicy::new(config.zk.num_retries, config.zk.session_timeout, config.zk.ha_enabled);

    let fencing_mode = match &config.zk.explicit_root_acl {
        Some(principals) => {
            let acl = principals
                .iter()
                .map(|p| p.to_acl_entry())
                .collect::<anyhow::Result<Vec<_>>>()?;
            FencingMode::ExplicitAcl(acl)
        }
        None => FencingMode::SelfManaged,
    };

    let root_principals = config
        .zk
        .root_principals
        .iter()
        .map(|p| p.to_acl_entry())
        .collect::<anyhow::Result<Vec<_>>>()?;

    let options = StoreOptions {
        parent_path: config.zk.state_store_parent_path.clone(),
        znode_size_limit: config.zk.znode_size_limit_bytes,
        oversize_policy: OversizeBlobPolicy::from(config.zk.oversize_blob_policy),
        fencing_mode,
        root_principals,
        retry_policy,
        prober_interval: Duration::from_secs(5),
    };

    let store = Arc::new(RmStateStore::new(client, session, options));
    store.init().await?;
    store.start().await?;

    tracing::info!("fenced-rmstore started, awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    store.close().await?;
    Ok(())
}
