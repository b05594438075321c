use anyhow::Context;
use metrics_relay::{
    agent::{Agent, AgentOptions, DeliveryMode, Dispatcher},
    config::AgentArgs,
    transport::{Encryptor, Signer},
    util::{base_url, host_port, init_tracing, local_ip_for},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing("relay_agent");

    let settings = AgentArgs::load()?;
    trace!("started with settings: {settings:?}");

    let cancel = CancellationToken::new();

    let local_ip = local_ip_for(host_port(&settings.address));
    match local_ip {
        Some(ip) => debug!("advertising local address {ip}"),
        None => warn!("could not determine local address, X-Real-IP will not be sent"),
    }

    let mut dispatcher = Dispatcher::new(base_url(&settings.address), cancel.clone())?
        .with_mode(if settings.batch {
            DeliveryMode::Batch
        } else {
            DeliveryMode::Single
        })
        .with_local_ip(local_ip);

    if let Some(key) = &settings.key {
        dispatcher = dispatcher.with_signer(Signer::new(key.as_bytes())?);
    }
    if let Some(path) = &settings.crypto_key {
        let encryptor = Encryptor::from_pem_file(path)
            .with_context(|| format!("failed to load public key {}", path.display()))?;
        dispatcher = dispatcher.with_encryptor(encryptor);
    }

    let agent = Agent::spawn(
        AgentOptions {
            poll_interval: settings.poll_interval,
            report_interval: settings.report_interval,
            rate_limit: settings.rate_limit,
        },
        dispatcher,
        cancel.clone(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested, flushing final report");

    cancel.cancel();
    agent.join().await;

    Ok(())
}
