use crate::error::{Error, Result};
use std::sync::Mutex;
use tokio::sync::watch;

/// Lifecycle state of a query server
///
/// The state machine is strictly monotonic: `Created → Starting → Running →
/// Stopping → Stopped`, with no cycles. A server that has stopped (or whose
/// start was aborted) cannot be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, `start` not yet called
    Created,
    /// Startup hooks are running and the transport is binding
    Starting,
    /// Accepting connections
    Running,
    /// Draining connections and running teardown hooks
    Stopping,
    /// Fully stopped; terminal
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of asking the state machine to begin a stop.
pub(crate) enum StopDecision {
    /// This caller owns the stop sequence and must run it to completion.
    Proceed,
    /// Another caller is already stopping; wait on the receiver until the
    /// stopped flag flips.
    Wait(watch::Receiver<bool>),
    /// The server is already stopped (or was never started); nothing to do.
    Done,
}

/// Gates `start` and `stop` so each runs at most once.
///
/// Transitions are checked and applied under a short-lived mutex that is never
/// held across an await point. Concurrent `stop` callers observe completion
/// through a `watch` channel, so every caller resolves exactly once even when
/// several race.
pub struct LifecycleStateMachine {
    /// Current state
    state: Mutex<LifecycleState>,
    /// Flips to `true` exactly once, when the server reaches `Stopped`
    stopped_tx: watch::Sender<bool>,
}

impl LifecycleStateMachine {
    /// Create a new state machine in the `Created` state
    pub fn new() -> Self {
        let (stopped_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(LifecycleState::Created),
            stopped_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition `Created → Starting`.
    ///
    /// Fails with a lifecycle error from every other state, so startup side
    /// effects can never run twice.
    pub(crate) fn begin_start(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            LifecycleState::Created => {
                *state = LifecycleState::Starting;
                Ok(())
            }
            LifecycleState::Starting | LifecycleState::Running => Err(Error::Lifecycle(format!(
                "start() called while server is already {}",
                *state
            ))),
            LifecycleState::Stopping | LifecycleState::Stopped => Err(Error::Lifecycle(
                "start() called on a stopped server; restart is not supported".to_string(),
            )),
        }
    }

    /// Transition `Starting → Running`.
    ///
    /// Fails if a concurrent `stop` already moved the machine past `Starting`.
    pub(crate) fn mark_running(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            LifecycleState::Starting => {
                *state = LifecycleState::Running;
                Ok(())
            }
            other => Err(Error::Lifecycle(format!(
                "server was stopped during startup (state: {})",
                other
            ))),
        }
    }

    /// Abort a start that failed partway: `Starting → Stopped`.
    ///
    /// The server must never report itself running after a failed start.
    pub(crate) fn abort_start(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == LifecycleState::Starting {
            *state = LifecycleState::Stopped;
            let _ = self.stopped_tx.send(true);
        }
    }

    /// Decide how a `stop` call should proceed.
    ///
    /// The first caller from `Running` (or `Starting`) wins ownership of the
    /// stop sequence; later callers get a waiter. Stopping a never-started
    /// server is a no-op that still lands in `Stopped`.
    pub(crate) fn begin_stop(&self) -> StopDecision {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            LifecycleState::Running | LifecycleState::Starting => {
                *state = LifecycleState::Stopping;
                StopDecision::Proceed
            }
            LifecycleState::Stopping => StopDecision::Wait(self.stopped_tx.subscribe()),
            LifecycleState::Stopped => StopDecision::Done,
            LifecycleState::Created => {
                *state = LifecycleState::Stopped;
                let _ = self.stopped_tx.send(true);
                StopDecision::Done
            }
        }
    }

    /// Transition `Stopping → Stopped` and release all waiting `stop` callers.
    pub(crate) fn mark_stopped(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = LifecycleState::Stopped;
        let _ = self.stopped_tx.send(true);
    }

    /// Wait until the machine reaches `Stopped`.
    pub(crate) async fn wait_stopped(&self, mut rx: watch::Receiver<bool>) {
        // wait_for checks the current value first, so a stop that completed
        // between begin_stop and this call is still observed.
        if rx.wait_for(|stopped| *stopped).await.is_err() {
            tracing::warn!("lifecycle watch channel closed before stop completed");
        }
    }
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
