/*!
 # query-host

 A Rust library for serving typed queries over HTTP with plugin lifecycle
 hooks and graceful connection draining.

 ## Overview

 query-host provides functionality to:
 - Serve typed queries over an HTTP endpoint backed by a pluggable executor
 - Run ordered asynchronous startup hooks and their teardowns via plugins
 - Track live connections and distinguish idle from active ones
 - Drain connections on stop, closing idle sockets immediately and forcibly
   terminating still-active ones after a configurable grace period
 - Execute operations directly, bypassing the network transport

 ## Basic Usage

 ```no_run
 use query_host::{QueryServer, Result};
 use query_host::config::ServerConfig;
 use query_host::execute::{FieldSchema, QueryRequest};
 use serde_json::json;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Define a schema with a single field
     let schema = FieldSchema::new().field_value("hello", json!("hi"));

     // Create and start the server
     let server = QueryServer::new(schema, ServerConfig::default());
     let address = server.start().await?;
     println!("Serving queries at http://{}", address);

     // Queries can also run without the transport
     let result = server.execute_operation(QueryRequest::new("{hello}")).await?;
     println!("Result: {:?}", result.data);

     // Stop cleanly: idle connections close immediately, active ones get
     // the configured grace period
     server.stop().await?;
     Ok(())
 }
 ```

 ## Features

 - **Lifecycle Management**: Single-shot start, idempotent stop, monotonic
   state machine
 - **Plugin Hooks**: Ordered async startup hooks with collected teardowns
 - **Connection Draining**: Bounded-time stop regardless of client behavior
 - **Configuration**: JSON configuration files with validation
 - **Error Handling**: Comprehensive error handling
 - **Async Support**: Full async/await support

 ## License

 This project is licensed under the terms in the LICENSE file.
*/

pub mod config;
pub mod context;
pub mod error;
pub mod execute;
pub mod server;
pub mod surface;
pub mod transport;

pub use config::ServerConfig;
pub use context::{ContextProvider, RequestDetails};
pub use error::{Error, Result};
pub use execute::{FieldSchema, QueryExecutor, QueryRequest, QueryResponse};
pub use server::{LifecycleState, ServerPlugin, Teardown};

use crate::server::drain::DrainController;
use crate::server::lifecycle::{LifecycleStateMachine, StopDecision};
use crate::server::plugins::PluginHookRunner;
use crate::server::tracker::ConnectionTracker;
use crate::surface::HttpSurface;
use crate::transport::HttpTransport;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Configure and run a query-serving HTTP endpoint
///
/// This struct is the main entry point of the library. Each instance owns its
/// own connection tracker and plugin hook runner for its whole lifetime; there
/// is no process-wide shared state. All public methods are instrumented with
/// `tracing` spans.
///
/// The lifecycle is strictly monotonic: a server starts at most once, stops at
/// most once, and cannot be restarted. Create a fresh instance to serve again.
pub struct QueryServer {
    /// Server configuration
    config: ServerConfig,
    /// Gates start/stop transitions
    lifecycle: LifecycleStateMachine,
    /// Ordered plugin hooks and collected teardowns
    hooks: PluginHookRunner,
    /// Live connection registry
    tracker: Arc<ConnectionTracker>,
    /// Query execution engine
    executor: Arc<dyn QueryExecutor>,
    /// Per-request context construction
    context: ContextProvider,
    /// The bound transport while running
    transport: Mutex<Option<HttpTransport>>,
    /// Held for the whole of `start`; `stop` acquires it so it never drains
    /// or tears down while startup hooks are still settling
    start_gate: Mutex<()>,
}

impl QueryServer {
    /// Create a new server over the given executor and configuration
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(executor, config), fields(host = %config.host, port = config.port))]
    pub fn new(executor: impl QueryExecutor + 'static, config: ServerConfig) -> Self {
        tracing::info!("Creating new QueryServer");
        Self {
            config,
            lifecycle: LifecycleStateMachine::new(),
            hooks: PluginHookRunner::new(),
            tracker: Arc::new(ConnectionTracker::new()),
            executor: Arc::new(executor),
            context: ContextProvider::empty(),
            transport: Mutex::new(None),
            start_gate: Mutex::new(()),
        }
    }

    /// Create a new server with the default configuration
    pub fn with_defaults(executor: impl QueryExecutor + 'static) -> Self {
        Self::new(executor, ServerConfig::default())
    }

    /// Register a plugin. Startup hooks run in registration order during
    /// `start`; call before starting the server.
    pub fn add_plugin(&mut self, plugin: Arc<dyn ServerPlugin>) {
        self.hooks.push(plugin);
    }

    /// Set the per-request context provider; call before starting the server.
    pub fn set_context(&mut self, context: ContextProvider) {
        self.context = context;
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Number of currently tracked connections
    pub fn connection_count(&self) -> usize {
        self.tracker.count()
    }

    /// Start the server: run startup hooks, then bind the transport.
    ///
    /// Resolves with the bound address once the transport is accepting
    /// connections and every startup hook has completed. Fails if the server
    /// was already started, or if any startup hook fails — in which case the
    /// hooks that did complete are torn down and the hook's error is returned.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<SocketAddr> {
        self.lifecycle.begin_start()?;
        // Held until start settles; a concurrent stop waits on it before
        // draining or tearing down.
        let _starting = self.start_gate.lock().await;
        tracing::info!("Starting server");

        if let Err(e) = self.hooks.run_startup().await {
            self.lifecycle.abort_start();
            tracing::error!(error = %e, "Startup aborted by failing hook");
            return Err(e);
        }

        let surface = Arc::new(HttpSurface::new(
            Arc::clone(&self.executor),
            self.context.clone(),
            self.config.cors_origin.clone(),
            self.config.query_path.clone(),
            self.config.health_check_path.clone(),
        ));

        let transport = match HttpTransport::bind(
            &self.config.host,
            self.config.port,
            Arc::clone(&self.tracker),
            surface,
        )
        .await
        {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!(error = %e, "Startup aborted by transport bind failure");
                if let Err(teardown_err) = self.hooks.run_teardown().await {
                    tracing::warn!(error = %teardown_err, "Teardown after failed bind reported errors");
                }
                self.lifecycle.abort_start();
                return Err(e);
            }
        };

        let address = transport.local_addr();
        *self.transport.lock().await = Some(transport);

        if let Err(e) = self.lifecycle.mark_running() {
            // A concurrent stop won the race. It is waiting on the start gate
            // and takes over the stored transport and collected teardowns
            // once this returns.
            tracing::warn!(error = %e, "Server was stopped while starting");
            return Err(e);
        }

        tracing::info!(address = %address, "Server running");
        Ok(address)
    }

    /// Stop the server: drain connections, then run teardown hooks.
    ///
    /// Resolves once every teardown hook has completed and every connection is
    /// closed. Safe to call more than once, including concurrently: subsequent
    /// calls await the same completion and hooks never run twice. A stop that
    /// races an in-flight `start` waits for the start to settle and then
    /// cleans up whatever it produced. Once invoked, draining always runs to
    /// completion; there is no cancellation.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        match self.lifecycle.begin_stop() {
            StopDecision::Done => return Ok(()),
            StopDecision::Wait(rx) => {
                tracing::debug!("stop() already in flight, awaiting its completion");
                self.lifecycle.wait_stopped(rx).await;
                return Ok(());
            }
            StopDecision::Proceed => {}
        }

        tracing::info!("Stopping server");

        // An in-flight start must settle first: every startup hook has then
        // resolved, its teardowns are collected, and any bound transport is
        // stored where we can take it.
        let _settled = self.start_gate.lock().await;

        // Stop accepting new connections before draining the existing ones.
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.shutdown().await;
        }

        let drain =
            DrainController::new(Arc::clone(&self.tracker), self.config.grace_period());
        drain.drain().await;

        // Teardown hooks run only after every startup hook settled and the
        // connection set is empty; failures here are aggregated, not fatal.
        let teardown_result = self.hooks.run_teardown().await;

        self.lifecycle.mark_stopped();
        tracing::info!("Server stopped");
        teardown_result
    }

    /// Execute a query directly, bypassing the transport.
    ///
    /// Builds a local context (the computed form receives synthetic request
    /// details) and runs the executor. Works whether or not the server has
    /// been started.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self, request))]
    pub async fn execute_operation(&self, request: QueryRequest) -> Result<QueryResponse> {
        let context = self.context.build(RequestDetails::local()).await?;
        Ok(self.executor.execute(&request, &context).await)
    }
}
