use crate::server::tracker::{ConnectionState, ConnectionTracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Drains open connections so `stop` terminates in bounded time.
///
/// Idle connections are closed immediately. Active connections each get their
/// own grace timer: if the in-flight response completes first, the connection
/// closes itself and the timer finds nothing to do; if the timer elapses
/// first, the socket is forcibly destroyed. Forced destruction is the designed
/// failure mode for slow clients, not a server-side error.
///
/// A grace period of `None` is infinite: no timers are started and the
/// controller waits indefinitely for natural completion. A grace period of
/// zero destroys every active connection immediately.
pub struct DrainController {
    /// The connection set being drained
    tracker: Arc<ConnectionTracker>,
    /// Per-active-connection grace timer duration; `None` = wait forever
    grace_period: Option<Duration>,
}

impl DrainController {
    /// Create a controller over the given tracker
    pub fn new(tracker: Arc<ConnectionTracker>, grace_period: Option<Duration>) -> Self {
        Self {
            tracker,
            grace_period,
        }
    }

    /// Close all tracked connections, returning once the set is empty.
    ///
    /// The caller must already have stopped accepting new connections. A
    /// server with zero open connections completes immediately.
    pub async fn drain(&self) {
        self.tracker.begin_drain();

        let snapshot = self.tracker.snapshot();
        let started = Instant::now();
        tracing::info!(
            connections = snapshot.len(),
            grace_period = ?self.grace_period,
            "Draining connections"
        );

        for (id, state) in snapshot {
            match state {
                // An idle socket holds no pending work; close it without grace.
                ConnectionState::Idle => self.tracker.close_now(id),
                ConnectionState::Active => match self.grace_period {
                    Some(grace) if grace.is_zero() => self.tracker.close_now(id),
                    Some(grace) => {
                        let tracker = Arc::clone(&self.tracker);
                        tokio::spawn(async move {
                            sleep(grace).await;
                            // close_now is a no-op if the connection already
                            // finished and unregistered itself.
                            tracker.close_now(id);
                        });
                    }
                    // Infinite grace: wait for natural completion.
                    None => {}
                },
            }
        }

        let mut live = self.tracker.watch_live();
        if let Err(e) = live.wait_for(|count| *count == 0).await {
            tracing::warn!(error = %e, "Live-connection watch closed during drain");
        }

        tracing::info!(elapsed = ?started.elapsed(), "Drain complete");
    }
}
