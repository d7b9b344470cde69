use async_trait::async_trait;
use query_host::config::ServerConfig;
use query_host::error::{Error, Result};
use query_host::execute::FieldSchema;
use query_host::server::{ServerPlugin, Teardown};
use query_host::{LifecycleState, QueryServer};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// A plugin that records the observable steps of its hooks.
///
/// Startup pushes `<prefix>-a`, suspends, pushes `<prefix>-b`; the returned
/// teardown pushes `<prefix>-c`, suspends, pushes `<prefix>-d`. With
/// `fail_startup` set, startup errors after its first mark; `startup_delay`
/// stretches the suspension between the two startup marks.
struct MarkingPlugin {
    marks: Arc<Mutex<Vec<String>>>,
    prefix: &'static str,
    fail_startup: bool,
    startup_delay: Duration,
}

impl MarkingPlugin {
    fn new(marks: &Arc<Mutex<Vec<String>>>, prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            marks: Arc::clone(marks),
            prefix,
            fail_startup: false,
            startup_delay: Duration::ZERO,
        })
    }

    fn failing(marks: &Arc<Mutex<Vec<String>>>, prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            marks: Arc::clone(marks),
            prefix,
            fail_startup: true,
            startup_delay: Duration::ZERO,
        })
    }

    fn slow(
        marks: &Arc<Mutex<Vec<String>>>,
        prefix: &'static str,
        startup_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            marks: Arc::clone(marks),
            prefix,
            fail_startup: false,
            startup_delay,
        })
    }
}

#[async_trait]
impl ServerPlugin for MarkingPlugin {
    async fn server_will_start(&self) -> Result<Option<Teardown>> {
        self.marks.lock().unwrap().push(format!("{}-a", self.prefix));
        tokio::task::yield_now().await;
        if !self.startup_delay.is_zero() {
            sleep(self.startup_delay).await;
        }
        if self.fail_startup {
            return Err(Error::StartupHook(format!("{} refused to start", self.prefix)));
        }
        self.marks.lock().unwrap().push(format!("{}-b", self.prefix));

        let marks = Arc::clone(&self.marks);
        let prefix = self.prefix;
        Ok(Some(Box::pin(async move {
            marks.lock().unwrap().push(format!("{}-c", prefix));
            tokio::task::yield_now().await;
            marks.lock().unwrap().push(format!("{}-d", prefix));
            Ok(())
        })))
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        ..ServerConfig::default()
    }
}

fn test_schema() -> FieldSchema {
    FieldSchema::new().field_value("hello", json!("hi"))
}

#[tokio::test]
async fn test_startup_and_teardown_hook_ordering() -> Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let mut server = QueryServer::new(test_schema(), test_config());
    server.add_plugin(MarkingPlugin::new(&marks, "p"));

    server.start().await?;
    assert_eq!(*marks.lock().unwrap(), vec!["p-a", "p-b"]);
    assert_eq!(server.state(), LifecycleState::Running);

    server.stop().await?;
    assert_eq!(*marks.lock().unwrap(), vec!["p-a", "p-b", "p-c", "p-d"]);
    assert_eq!(server.state(), LifecycleState::Stopped);

    Ok(())
}

/// Position of a mark in the record; panics if absent.
fn pos(marks: &[String], mark: &str) -> usize {
    marks
        .iter()
        .position(|m| m == mark)
        .unwrap_or_else(|| panic!("mark {} missing from {:?}", mark, marks))
}

#[tokio::test]
async fn test_multiple_hooks_keep_per_hook_ordering() -> Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let mut server = QueryServer::new(test_schema(), test_config());
    server.add_plugin(MarkingPlugin::new(&marks, "one"));
    server.add_plugin(MarkingPlugin::new(&marks, "two"));

    server.start().await?;
    {
        let marks = marks.lock().unwrap();
        // Both hooks ran to completion before start resolved, and no
        // teardown mark appears yet.
        assert_eq!(marks.len(), 4);
        assert!(pos(&marks, "one-a") < pos(&marks, "one-b"));
        assert!(pos(&marks, "two-a") < pos(&marks, "two-b"));
    }

    server.stop().await?;
    {
        let marks = marks.lock().unwrap();
        assert_eq!(marks.len(), 8);
        // Each teardown starts only after its own startup completed, and its
        // two marks never interleave with each other.
        assert!(pos(&marks, "one-b") < pos(&marks, "one-c"));
        assert!(pos(&marks, "one-c") < pos(&marks, "one-d"));
        assert!(pos(&marks, "two-b") < pos(&marks, "two-c"));
        assert!(pos(&marks, "two-c") < pos(&marks, "two-d"));
    }

    Ok(())
}

/// A pair of plugins that can only both start if the runner lets hooks make
/// progress concurrently: the first waits on a signal the second sends.
struct WaitingPlugin {
    signal: Arc<tokio::sync::Notify>,
}

struct SignallingPlugin {
    signal: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl ServerPlugin for WaitingPlugin {
    async fn server_will_start(&self) -> Result<Option<Teardown>> {
        self.signal.notified().await;
        Ok(None)
    }
}

#[async_trait]
impl ServerPlugin for SignallingPlugin {
    async fn server_will_start(&self) -> Result<Option<Teardown>> {
        self.signal.notify_one();
        Ok(None)
    }
}

#[tokio::test]
async fn test_suspended_hook_does_not_block_other_hooks() -> Result<()> {
    let signal = Arc::new(tokio::sync::Notify::new());
    let mut server = QueryServer::new(test_schema(), test_config());
    // Registered first, resolves only once the second hook has run.
    server.add_plugin(Arc::new(WaitingPlugin {
        signal: Arc::clone(&signal),
    }));
    server.add_plugin(Arc::new(SignallingPlugin { signal }));

    tokio::time::timeout(std::time::Duration::from_secs(2), server.start())
        .await
        .expect("a suspended hook must not starve the hooks after it")?;

    server.stop().await
}

#[tokio::test]
async fn test_start_twice_fails_without_rerunning_hooks() -> Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let mut server = QueryServer::new(test_schema(), test_config());
    server.add_plugin(MarkingPlugin::new(&marks, "p"));

    server.start().await?;
    let err = server.start().await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle(_)));

    // The failed second start must not have re-run the startup hook.
    assert_eq!(*marks.lock().unwrap(), vec!["p-a", "p-b"]);

    server.stop().await
}

#[tokio::test]
async fn test_stop_is_idempotent() -> Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let mut server = QueryServer::new(test_schema(), test_config());
    server.add_plugin(MarkingPlugin::new(&marks, "p"));

    server.start().await?;
    server.stop().await?;
    server.stop().await?;

    assert_eq!(*marks.lock().unwrap(), vec!["p-a", "p-b", "p-c", "p-d"]);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_stops_run_teardown_once() -> Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let mut server = QueryServer::new(test_schema(), test_config());
    server.add_plugin(MarkingPlugin::new(&marks, "p"));

    server.start().await?;

    let (first, second) = tokio::join!(server.stop(), server.stop());
    first?;
    second?;

    assert_eq!(*marks.lock().unwrap(), vec!["p-a", "p-b", "p-c", "p-d"]);
    assert_eq!(server.state(), LifecycleState::Stopped);
    Ok(())
}

#[tokio::test]
async fn test_failing_startup_hook_unwinds_completed_hooks() -> Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let mut server = QueryServer::new(test_schema(), test_config());
    server.add_plugin(MarkingPlugin::new(&marks, "one"));
    server.add_plugin(MarkingPlugin::failing(&marks, "two"));

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, Error::StartupHook(_)));

    // The completed hook was torn down; the failed one never completed its
    // startup and contributes no teardown marks.
    {
        let marks = marks.lock().unwrap();
        assert_eq!(marks.len(), 5);
        assert!(pos(&marks, "one-a") < pos(&marks, "one-b"));
        assert!(pos(&marks, "one-b") < pos(&marks, "one-c"));
        assert!(pos(&marks, "one-c") < pos(&marks, "one-d"));
        assert!(marks.contains(&"two-a".to_string()));
        assert!(!marks.contains(&"two-b".to_string()));
        assert!(!marks.contains(&"two-c".to_string()));
    }

    // The server must not report itself running, and cannot be started again.
    assert_eq!(server.state(), LifecycleState::Stopped);
    assert!(server.start().await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_stop_during_start_settles_hooks_before_teardown() -> Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let mut server = QueryServer::new(test_schema(), test_config());
    server.add_plugin(MarkingPlugin::slow(&marks, "p", Duration::from_millis(200)));

    // Stop while the startup hook is still suspended.
    let (start_result, stop_result) = tokio::join!(server.start(), async {
        sleep(Duration::from_millis(50)).await;
        server.stop().await
    });

    // The stop won the race, so the start reports a lifecycle error...
    assert!(matches!(start_result.unwrap_err(), Error::Lifecycle(_)));
    stop_result?;

    // ...but stop waited for the hook to settle and still ran its teardown.
    assert_eq!(*marks.lock().unwrap(), vec!["p-a", "p-b", "p-c", "p-d"]);
    assert_eq!(server.state(), LifecycleState::Stopped);
    assert_eq!(server.connection_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_before_start_is_a_noop() -> Result<()> {
    let marks = Arc::new(Mutex::new(Vec::new()));
    let mut server = QueryServer::new(test_schema(), test_config());
    server.add_plugin(MarkingPlugin::new(&marks, "p"));

    server.stop().await?;
    assert!(marks.lock().unwrap().is_empty());
    assert_eq!(server.state(), LifecycleState::Stopped);

    // Restart is not supported; a stopped server stays stopped.
    assert!(server.start().await.is_err());
    Ok(())
}
