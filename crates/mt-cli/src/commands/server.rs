//! `server` command: run the tunnel server in the foreground

use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use mt_core::config::ServerConfig;
use mt_server::TunnelServer;

use crate::output::print_success;

/// Serve tunnel clients until `cancel` fires
pub async fn server_command(
    mut config: ServerConfig,
    bind: Option<String>,
    dial_timeout: Option<u64>,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(bind) = bind {
        config.bind_address = bind;
    }
    if let Some(secs) = dial_timeout {
        config.dial_timeout = Some(Duration::from_secs(secs));
    }

    let server = TunnelServer::bind(config).await?;
    print_success(&format!("Tunnel server listening on {}", server.local_addr()?));

    server.run(cancel).await
}
