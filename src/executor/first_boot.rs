//! The one-time grant against a transient daemon.
//!
//! The daemon is terminated and reaped whether or not the grant succeeded,
//! and the completion marker is written only after both the grant and the
//! reap succeeded.

use super::bounded;
use crate::config::Timeouts;
use crate::error::{Error, Result};
use crate::host::{DaemonHandle, HostPrimitives};
use crate::markers::CompletionMarker;
use crate::plan::FirstBootGrant;
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(super) async fn run(
    host: &dyn HostPrimitives,
    step: &str,
    grant: &FirstBootGrant,
    timeouts: &Timeouts,
) -> Result<()> {
    let mut daemon = host.spawn_daemon(&grant.daemon).await?;

    let granted = grant_while_running(host, daemon.as_mut(), grant, timeouts).await;
    let reaped = daemon.terminate(timeouts.daemon_grace).await;

    if let (Err(_), Err(reap_err)) = (&granted, &reaped) {
        tracing::warn!("Transient daemon cleanup also failed: {}", reap_err);
    }
    granted?;
    reaped?;

    let marker = CompletionMarker::now(step);
    host.write_file(
        &grant.marker,
        marker.to_file_contents().as_bytes(),
        &grant.marker_owner,
        &grant.marker_group,
        0o644,
    )
    .await?;
    Ok(())
}

async fn grant_while_running(
    host: &dyn HostPrimitives,
    daemon: &mut dyn DaemonHandle,
    grant: &FirstBootGrant,
    timeouts: &Timeouts,
) -> Result<()> {
    wait_for_socket(daemon, &grant.socket, timeouts.daemon_startup).await?;
    tracing::debug!("Daemon accepting connections on {}", grant.socket.display());
    bounded(timeouts.shell, "grant client", host.run_shell(&grant.client)).await
}

/// Poll until the socket accepts a connection, the daemon exits, or `limit` passes.
pub async fn wait_for_socket(
    daemon: &mut dyn DaemonHandle,
    socket: &Path,
    limit: Duration,
) -> Result<()> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = daemon.try_exited()? {
            return Err(Error::ToolInvocation {
                tool: "mysqld".to_string(),
                reason: format!("exited before accepting connections ({})", status),
            });
        }

        match UnixStream::connect(socket).await {
            Ok(_) => return Ok(()),
            Err(e) => tracing::trace!("{} not ready: {}", socket.display(), e),
        }

        if Instant::now() >= deadline {
            return Err(Error::Timeout {
                what: format!("{} to accept connections", socket.display()),
                after: limit,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
