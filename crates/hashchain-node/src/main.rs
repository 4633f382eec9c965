mod api;
mod constants;

use clap::Parser;
use hashchain_core::{
    chain::Chain,
    constants::{DEFAULT_DIFFICULTY, GENESIS_PAYLOAD},
    pow::CancelFlag,
    Difficulty, MiningStrategy, SharedChain,
};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::constants::{DEFAULT_LISTEN, DEFAULT_LOG_FILTER};

#[derive(Parser, Debug)]
#[command(name = "hashchain-node")]
#[command(about = "In-memory proof-of-work chain served over HTTP")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "HASHCHAIN_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Leading zero bits required in every block hash (0-256). Each extra bit
    /// doubles the expected work; values much above 32 will not finish.
    #[arg(long, env = "HASHCHAIN_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Payload of the genesis block [default: "genesis"]
    #[arg(long)]
    genesis_data: Option<String>,

    /// Search nonces on all cores instead of one
    #[arg(long)]
    parallel: bool,
}

impl Args {
    fn genesis_payload(&self) -> Vec<u8> {
        self.genesis_data
            .as_ref()
            .map(|data| data.as_bytes().to_vec())
            .unwrap_or_else(|| GENESIS_PAYLOAD.to_vec())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();
    let difficulty = Difficulty::new(args.difficulty)?;
    let strategy = if args.parallel {
        MiningStrategy::Parallel
    } else {
        MiningStrategy::Sequential
    };
    let cancel = CancelFlag::new();

    info!("mining genesis block at difficulty {difficulty}");
    let genesis = tokio::task::spawn_blocking({
        let payload = args.genesis_payload();
        let cancel = cancel.clone();
        move || Chain::try_with_genesis_payload(difficulty, payload, &cancel)
    });
    let chain = tokio::select! {
        chain = genesis => chain??,
        _ = shutdown_signal(cancel.clone()) => {
            info!("shut down before the genesis block was mined");
            return Ok(());
        }
    };

    let state = AppState {
        chain: SharedChain::new(chain).with_strategy(strategy),
        cancel: cancel.clone(),
    };
    let app = api::router(state);

    info!("hashchain-node listening on http://{}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;
    Ok(())
}

async fn shutdown_signal(cancel: CancelFlag) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down, cancelling in-flight mining");
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_payload_defaults_to_core_constant() {
        let args = Args::try_parse_from(["hashchain-node"]).unwrap();
        assert!(args.genesis_data.is_none());
        assert_eq!(args.genesis_payload(), GENESIS_PAYLOAD);
    }

    #[test]
    fn genesis_payload_from_flag() {
        let args =
            Args::try_parse_from(["hashchain-node", "--genesis-data", "in the beginning"]).unwrap();
        assert_eq!(args.genesis_payload(), b"in the beginning");
    }
}
