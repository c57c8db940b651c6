use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use zkgate_relayer::proving::{SubprocessToolchain, Toolchain};
use zkgate_relayer::relay::{ChainRpc, SolanaRpc};
use zkgate_relayer::{router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(
        program_id = %config.program_id,
        rpc_url = %config.rpc_url,
        circuits_dir = %config.circuits_dir.display(),
        "starting zkgate relayer"
    );
    match config.relayer_pubkey() {
        Some(pk) => info!(relayer = %pk, "relayer key loaded"),
        None => warn!("no relayer key configured; /api/relayer will answer 503"),
    }

    let toolchain: Arc<dyn Toolchain> = Arc::new(SubprocessToolchain::new(
        config.nargo_path.clone(),
        config.sunspot_path.clone(),
    ));
    let rpc: Arc<dyn ChainRpc> = Arc::new(SolanaRpc::new(config.rpc_url.clone(), config.rpc_timeout));
    let addr = config.bind_addr.clone();

    let state = Arc::new(AppState::new(config, toolchain, rpc));
    let status = state.pipeline.probe();
    if !status.ready() {
        warn!(missing = ?status.missing(), "proving toolchain incomplete; proofs will fail");
    }

    let app = router::build(state);

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
