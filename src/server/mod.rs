// Server module entry point
// Listener setup, the accept loop and per-connection serving

pub mod connection;
pub mod listener;
pub mod signal;

// Re-export commonly used items
pub use listener::create_reusable_listener;
pub use signal::{start_signal_handler, SignalHandler};

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::AppState;
use crate::logger;
use connection::accept_connection;

/// Accept connections until shutdown is requested
///
/// Must run inside a `LocalSet`; connections are served on local tasks.
/// In-flight connections are left to finish on their own once the
/// listener closes.
#[allow(clippy::ignored_unit_patterns)]
pub async fn run(
    listener: TcpListener,
    state: Arc<AppState>,
    signals: Arc<SignalHandler>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = signals.shutdown.notified();
    tokio::pin!(shutdown);
    shutdown.as_mut().enable();

    while !signals.is_requested() {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &state),
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    drop(listener);
    logger::log_server_stop(state.active_connections());
    Ok(())
}
