use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A one-shot teardown computation returned by a startup hook.
///
/// Construct with `Box::pin(async move { ... })`. The server retains the
/// teardown only until it has been awaited once during `stop`.
pub type Teardown = BoxFuture<'static, Result<()>>;

/// A pluggable server extension.
///
/// A plugin may contribute a startup hook that runs once during `start`. The
/// hook can perform asynchronous work and may return a [`Teardown`] to be run
/// during `stop`. The default implementation does nothing, so a plugin only
/// implements the hooks it cares about.
///
/// # Example
///
/// ```
/// use query_host::server::{ServerPlugin, Teardown};
/// use query_host::error::Result;
/// use async_trait::async_trait;
///
/// struct CacheWarmer;
///
/// #[async_trait]
/// impl ServerPlugin for CacheWarmer {
///     async fn server_will_start(&self) -> Result<Option<Teardown>> {
///         // warm caches here
///         Ok(Some(Box::pin(async {
///             // flush caches here
///             Ok(())
///         })))
///     }
/// }
/// ```
#[async_trait]
pub trait ServerPlugin: Send + Sync {
    /// Called once while the server is starting, before the transport binds.
    ///
    /// Returning an error aborts the start; returning `Ok(Some(teardown))`
    /// schedules `teardown` to run during `stop`.
    async fn server_will_start(&self) -> Result<Option<Teardown>> {
        Ok(None)
    }
}

/// Runs plugin startup hooks and their teardowns on shutdown.
///
/// Startup hooks are invoked in registration order but make progress
/// concurrently, so each hook's own before-suspension and after-suspension
/// steps stay ordered while no hook blocks another. A teardown is linked only
/// to its own completed startup; teardowns run once, in the order their
/// startup hooks resolved.
pub struct PluginHookRunner {
    /// Registered plugins, in registration order
    plugins: Vec<Arc<dyn ServerPlugin>>,
    /// Teardowns collected from completed startup hooks; drained exactly once
    teardowns: Mutex<Vec<Teardown>>,
}

impl PluginHookRunner {
    /// Create a runner with no plugins
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            teardowns: Mutex::new(Vec::new()),
        }
    }

    /// Register a plugin. Hooks run in registration order.
    pub fn push(&mut self, plugin: Arc<dyn ServerPlugin>) {
        self.plugins.push(plugin);
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether any plugins are registered
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every startup hook once, collecting returned teardowns.
    ///
    /// Hooks are polled concurrently on the calling task, so one hook
    /// suspending never blocks another's progress, while each hook's own
    /// steps keep their order. Teardowns are collected in the order their
    /// startup hooks resolved.
    ///
    /// If any hook fails, the teardowns collected from hooks that did
    /// complete are run (best effort) and the first failing hook's original
    /// error is returned — partial start still partially tears down.
    pub(crate) async fn run_startup(&self) -> Result<()> {
        tracing::debug!(count = self.plugins.len(), "Running startup hooks");
        let startups = self.plugins.iter().enumerate().map(|(index, plugin)| {
            let plugin = Arc::clone(plugin);
            let teardowns = &self.teardowns;
            async move {
                match plugin.server_will_start().await {
                    Ok(Some(teardown)) => {
                        teardowns.lock().await.push(teardown);
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(e) => Err((index, e)),
                }
            }
        });

        let mut first_error = None;
        for result in futures::future::join_all(startups).await {
            if let Err((index, e)) = result {
                tracing::error!(plugin_index = index, error = %e, "Startup hook failed");
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            tracing::error!(error = %e, "Startup failed, unwinding completed hooks");
            if let Err(teardown_err) = self.run_teardown().await {
                tracing::warn!(
                    error = %teardown_err,
                    "Teardown after failed startup also reported errors"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Run every collected teardown once, in startup-completion order.
    ///
    /// Teardown is best-effort: a failing hook is logged and the remaining
    /// hooks still run. Failures are aggregated into a single error.
    pub(crate) async fn run_teardown(&self) -> Result<()> {
        let teardowns: Vec<Teardown> = {
            let mut guard = self.teardowns.lock().await;
            guard.drain(..).collect()
        };

        if teardowns.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = teardowns.len(), "Running teardown hooks");
        let mut failures = Vec::new();
        for (index, teardown) in teardowns.into_iter().enumerate() {
            if let Err(e) = teardown.await {
                tracing::warn!(
                    teardown_index = index,
                    error = %e,
                    "Teardown hook failed, continuing with remaining hooks"
                );
                failures.push(format!("hook {}: {}", index, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown(failures.join("; ")))
        }
    }
}

impl Default for PluginHookRunner {
    fn default() -> Self {
        Self::new()
    }
}
