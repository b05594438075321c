use anyhow::Context;
use metrics_relay::{
    api::{ApiConfig, ApiState, middleware::admission::AdmissionFilter, spawn_api_server},
    config::HubArgs,
    storage::build_store,
    transport::{Decryptor, Signer},
    util::init_tracing,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing("relay_hub");

    let settings = HubArgs::load()?;
    trace!("started with settings: {settings:?}");

    let bind_addr = tokio::net::lookup_host(&settings.address)
        .await
        .with_context(|| format!("failed to resolve {}", settings.address))?
        .next()
        .with_context(|| format!("no address for {}", settings.address))?;

    let cancel = CancellationToken::new();
    let store = build_store(&settings.storage(), &cancel)
        .await
        .context("failed to initialize storage")?;

    let mut state = ApiState::new(store.clone());
    if let Some(key) = &settings.key {
        state = state.with_signer(Signer::new(key.as_bytes())?);
    }
    if let Some(path) = &settings.crypto_key {
        let decryptor = Decryptor::from_pem_file(path)
            .with_context(|| format!("failed to load private key {}", path.display()))?;
        state = state.with_decryptor(decryptor);
    }
    if let Some(cidr) = &settings.trusted_subnet {
        let filter = AdmissionFilter::from_cidr(cidr)
            .with_context(|| format!("invalid trusted subnet {cidr}"))?;
        state = state.with_admission(filter);
    }

    let (addr, server) = spawn_api_server(ApiConfig { bind_addr }, state, cancel.clone()).await?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    cancel.cancel();
    if let Err(e) = server.await {
        error!("API server task failed: {e}");
    }

    store.shutdown().await.context("failed to shut down storage")?;
    info!("hub stopped");

    Ok(())
}
