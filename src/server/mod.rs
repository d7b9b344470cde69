/// Server core module for query-host.
///
/// This module holds the lifecycle and shutdown-draining machinery: the state
/// machine that gates `start`/`stop`, the plugin hook runner, the connection
/// tracker, and the drain controller.
///
/// # Components
///
/// * `lifecycle` - Monotonic start/stop state machine
/// * `plugins` - Ordered startup hooks and their collected teardowns
/// * `tracker` - Idle/active registry of live transport connections
/// * `drain` - Bounded-time connection draining on stop
///
/// # Examples
///
/// Registering a plugin with a teardown hook:
///
/// ```
/// use query_host::server::{PluginHookRunner, ServerPlugin, Teardown};
/// use query_host::error::Result;
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Announcer;
///
/// #[async_trait]
/// impl ServerPlugin for Announcer {
///     async fn server_will_start(&self) -> Result<Option<Teardown>> {
///         println!("starting");
///         Ok(Some(Box::pin(async {
///             println!("stopping");
///             Ok(())
///         })))
///     }
/// }
///
/// let mut runner = PluginHookRunner::new();
/// runner.push(Arc::new(Announcer));
/// assert_eq!(runner.len(), 1);
/// ```
pub mod drain;
pub mod lifecycle;
pub mod plugins;
pub mod tracker;

pub use drain::DrainController;
pub use lifecycle::{LifecycleState, LifecycleStateMachine};
pub use plugins::{PluginHookRunner, ServerPlugin, Teardown};
pub use tracker::{ConnectionId, ConnectionState, ConnectionTracker};
