use crate::error::{Error, Result};
use crate::server::tracker::{ConnectionId, ConnectionTracker};
use crate::surface::HttpSurface;
use crate::transport::message::{read_request, write_response};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

/// The TCP listener and accept loop behind a running query server.
///
/// Every accepted connection is served by its own task and registered with the
/// [`ConnectionTracker`] before that task begins, so the drain controller can
/// see (and, past the grace period, abort) every live socket. Shutting the
/// transport down stops the accept loop and drops the listener; draining the
/// already-accepted connections is the drain controller's job.
pub struct HttpTransport {
    /// Address the listener actually bound (resolves port `0`)
    local_addr: SocketAddr,
    /// Signals the accept loop to exit
    shutdown: Arc<Notify>,
    /// The accept loop task
    accept_task: Option<JoinHandle<()>>,
}

impl HttpTransport {
    /// Bind the listener and start accepting connections.
    ///
    /// Returns once the listener is bound; acceptance happens on a background
    /// task from that point on.
    pub async fn bind(
        host: &str,
        port: u16,
        tracker: Arc<ConnectionTracker>,
        surface: Arc<HttpSurface>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind {}:{}: {}", host, port, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("Failed to read bound address: {}", e)))?;

        let shutdown = Arc::new(Notify::new());
        let accept_task = tokio::spawn(accept_loop(
            listener,
            tracker,
            surface,
            Arc::clone(&shutdown),
        ));

        tracing::info!(address = %local_addr, "Transport accepting connections");
        Ok(Self {
            local_addr,
            shutdown,
            accept_task: Some(accept_task),
        })
    }

    /// The address the listener bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections and release the listener.
    ///
    /// Existing connections stay open; they belong to the tracker.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Accept loop task failed during shutdown");
            }
        }
        tracing::debug!("Transport stopped accepting connections");
    }
}

/// Accept connections until shutdown is signalled.
async fn accept_loop(
    listener: TcpListener,
    tracker: Arc<ConnectionTracker>,
    surface: Arc<HttpSurface>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                tracing::debug!("Accept loop shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        if tracker.is_draining() {
                            // Refuse connections that race the shutdown signal.
                            drop(stream);
                            continue;
                        }
                        spawn_connection(stream, peer_addr, &tracker, &surface);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }
    }
    // Listener dropped here; the port is released.
}

/// Spawn a serve task for an accepted connection and register it.
///
/// The task is gated on a oneshot so registration always happens before the
/// task can run (and possibly unregister itself) — otherwise a connection that
/// closes instantly could leave a stale entry behind.
fn spawn_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    tracker: &Arc<ConnectionTracker>,
    surface: &Arc<HttpSurface>,
) {
    let id = ConnectionId::new();
    tracing::debug!(connection_id = %id, peer = %peer_addr, "Accepted connection");

    let (registered_tx, registered_rx) = oneshot::channel::<()>();
    let tracker_for_task = Arc::clone(tracker);
    let surface_for_task = Arc::clone(surface);

    let handle = tokio::spawn(async move {
        if registered_rx.await.is_err() {
            return;
        }
        serve_connection(stream, peer_addr, id, tracker_for_task, surface_for_task).await;
    });

    tracker.register(id, handle.abort_handle());
    let _ = registered_tx.send(());
}

/// Serve requests on one connection until it closes.
///
/// The connection is marked active while a request is being processed and idle
/// once its response is fully written. When draining has begun, the connection
/// closes itself after finishing the in-flight response instead of waiting for
/// another request.
async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    id: ConnectionId,
    tracker: Arc<ConnectionTracker>,
    surface: Arc<HttpSurface>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let request = match read_request(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Dropping connection after read error");
                break;
            }
        };

        tracker.mark_active(id);
        let keep_alive = request.keep_alive();
        let response = surface.handle(&request, peer_addr).await;
        let write_result = write_response(&mut write_half, &response).await;
        tracker.mark_idle(id);

        if let Err(e) = write_result {
            tracing::debug!(connection_id = %id, error = %e, "Dropping connection after write error");
            break;
        }
        if !keep_alive || tracker.is_draining() {
            break;
        }
    }

    tracker.unregister(id);
    tracing::debug!(connection_id = %id, "Connection closed");
}
