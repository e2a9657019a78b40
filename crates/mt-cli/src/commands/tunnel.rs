//! `tunnel` command: forward local ports through the tunnel server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use mt_client::{SessionDialer, TunnelClient};
use mt_core::config::ClientConfig;
use mt_core::{AddressSpec, ServiceRegistry};

use crate::output::{format_plan, format_services, print_info};

/// Tunnel `services` and `locals` until `cancel` fires
///
/// The plan is resolved before anything is dialed, so an unknown service or
/// a conflicting bind fails without touching the network.
pub async fn tunnel_command(
    mut config: ClientConfig,
    services: &[String],
    locals: &[AddressSpec],
    address: Option<String>,
    timeout: Option<u64>,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(address) = address {
        config.server_address = address;
    }
    if let Some(secs) = timeout {
        config.connect_timeout = Duration::from_secs(secs);
    }

    let registry = ServiceRegistry::from_config(&config.services)?;
    let plan = registry.build_plan(services, locals)?;

    let dialer = SessionDialer::connect(&config)
        .await
        .with_context(|| format!("connecting to tunnel server at {}", config.server_address))?;
    let dialer = Arc::new(dialer);

    print_info(&format!("Tunneling through {}", dialer.address()));
    eprintln!("{}", format_plan(&plan));

    let client = TunnelClient::new(Arc::clone(&dialer), plan);
    let result = client.run(cancel).await;
    dialer.shutdown();
    result?;

    Ok(())
}

/// Print the services the `tunnel` command knows about
pub fn list_services(config: &ClientConfig) -> Result<()> {
    let registry = ServiceRegistry::from_config(&config.services)?;
    println!("{}", format_services(&registry));
    Ok(())
}
