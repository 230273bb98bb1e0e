// SPDX-License-Identifier: Apache-2.0

use tokio::select;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::warn;

/// Resolves on the first SIGTERM or SIGINT.
pub async fn signal_wait() {
    let (mut sig_term, mut sig_int) = match (
        sig(SignalKind::terminate()),
        sig(SignalKind::interrupt()),
    ) {
        (Some(t), Some(i)) => (t, i),
        _ => return std::future::pending().await,
    };

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
}

fn sig(kind: SignalKind) -> Option<Signal> {
    match signal(kind) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(error = %e, "Unable to install signal handler, signals will be ignored.");
            None
        }
    }
}
