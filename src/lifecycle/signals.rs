//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT, SIGTERM, SIGPIPE)
//! - Translate termination signals into a shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGPIPE is logged and otherwise ignored; a vanished peer only ends
//!   its own connection

use crate::lifecycle::Shutdown;

/// Install the signal handlers. Must be called inside a Tokio runtime.
pub fn install(shutdown: &Shutdown) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut pipe = signal(SignalKind::pipe())?;
        tokio::spawn(async move {
            while pipe.recv().await.is_some() {
                tracing::warn!("Received SIGPIPE; peer closed while writing");
            }
        });
    }

    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let name = wait_for_termination().await;
        tracing::info!(signal = name, "Shutdown signal received");
        shutdown.trigger();
    });

    Ok(())
}

/// Resolve once SIGINT or SIGTERM arrives, returning the signal's name.
pub async fn wait_for_termination() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        "SIGINT"
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
}
