//! `parceltrack watch`: follow shipments live until interrupted.

use std::sync::{Arc, Mutex};

use parceltrack_core::{ConnectionStatus, TrackingNumber};
use parceltrack_runtime::{SyncConfig, TrackingService};

use crate::render::{format_status, format_view};

/// Suppresses repeated banners when a transition lands on the same status.
#[derive(Debug, Default)]
struct StatusLatch {
    last: Option<ConnectionStatus>,
}

impl StatusLatch {
    fn changed(&mut self, status: ConnectionStatus) -> bool {
        if self.last == Some(status) {
            return false;
        }
        self.last = Some(status);
        true
    }
}

/// Entry point for `parceltrack watch`.
pub async fn cmd_watch(
    config: SyncConfig,
    ids: &[TrackingNumber],
    use_color: bool,
) -> anyhow::Result<()> {
    let service = TrackingService::http(config);

    let latch = Arc::new(Mutex::new(StatusLatch::default()));
    let status_guard = service.on_connection_status_change(move |status| {
        let mut latch = latch.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if latch.changed(status) {
            println!("{}", format_status(status, use_color));
        }
    });

    let error_guard = service.on_fetch_error(|failure| {
        eprintln!(
            "{}: refresh failed: {}",
            failure.tracking_number, failure.error
        );
    });

    let mut view_guards = Vec::with_capacity(ids.len());
    let mut handles = Vec::with_capacity(ids.len());
    for id in ids {
        view_guards.push(service.on_shipment_change(id, move |view| {
            println!("{}\n", format_view(view, use_color));
        }));
        handles.push(service.subscribe_to_shipment(id.clone()));
    }

    tracing::info!(shipments = ids.len(), "watching");
    service.connect();

    shutdown_signal().await?;

    drop(handles);
    service.shutdown().await;
    drop((view_guards, error_guard, status_guard));
    Ok(())
}

/// Resolve on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => {
                result?;
                tracing::info!("received ctrl-c, shutting down");
            }
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("received ctrl-c, shutting down");
    }

    Ok(())
}
