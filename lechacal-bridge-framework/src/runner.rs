//! Bridge runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::AsyncClient;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use lechacal_common::{MqttConfig, connect, init_tracing};

use crate::BridgeArgs;
use crate::connection::{ConnectionWatcher, LinkState, drive_event_loop, link_channel};
use crate::error::{BridgeError, Result};
use crate::publisher::Publisher;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bridge runner that manages the lifecycle of a bridge.
///
/// Handles:
/// - Logging initialization
/// - MQTT client creation and event loop driving
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C or when the main worker ends
/// - A final status message on shutdown (optional)
///
/// # Example
///
/// ```ignore
/// use lechacal_bridge_framework::{BridgeArgs, BridgeRunner};
///
/// let mut runner = BridgeRunner::new_with_args("mybridge", &args, "mybridge-client")?;
/// let publisher = runner.publisher();
/// runner.spawn(async move {
///     // Background worker logic here
/// });
/// runner.run_until(main_worker(publisher)).await?;
/// ```
pub struct BridgeRunner {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// MQTT client handle.
    client: AsyncClient,
    /// Publisher backed by the client.
    publisher: Publisher,
    /// Link state reported by the event loop driver.
    link: watch::Receiver<LinkState>,
    /// Message published right before disconnecting.
    shutdown_message: Option<(String, String)>,
    /// Spawned tasks, aborted on shutdown.
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeRunner {
    /// Create a new bridge runner.
    ///
    /// This will:
    /// 1. Initialize logging from the CLI/environment arguments
    /// 2. Create the MQTT client
    /// 3. Spawn the event loop driver, which connects in the background
    pub fn new_with_args(
        name: impl Into<String>,
        args: &BridgeArgs,
        default_client_id: &str,
    ) -> Result<Self> {
        init_tracing(&args.logging()).map_err(|e| BridgeError::config(e.to_string()))?;
        Self::new(name, &args.mqtt(default_client_id))
    }

    /// Create a runner without touching the global tracing subscriber.
    pub fn new(name: impl Into<String>, mqtt: &MqttConfig) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        tracing::info!(bridge = %name, version = %version, "Starting bridge");

        let (client, event_loop) = connect(mqtt)?;
        let (link_tx, link) = link_channel();
        let driver = tokio::spawn(drive_event_loop(event_loop, link_tx, RECONNECT_DELAY));

        let publisher = Publisher::new(Arc::new(client.clone()));

        Ok(Self {
            name,
            version,
            client,
            publisher,
            link,
            shutdown_message: None,
            tasks: vec![driver],
        })
    }

    /// Publish `payload` to `topic` when the bridge shuts down.
    pub fn with_shutdown_message(
        mut self,
        topic: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        self.shutdown_message = Some((topic.into(), payload.into()));
        self
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Watcher yielding every broker (re)connection.
    pub fn connections(&self) -> ConnectionWatcher {
        ConnectionWatcher::new(self.link.clone())
    }

    /// Spawn a background task.
    ///
    /// The task will be tracked and aborted on shutdown.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Run until Ctrl+C is received or `main` completes.
    ///
    /// This will:
    /// 1. Drive `main` and wait for it or for Ctrl+C
    /// 2. Publish the shutdown message (if configured)
    /// 3. Disconnect from the broker
    /// 4. Abort all spawned tasks
    ///
    /// An error returned by `main` is returned from here after shutdown.
    pub async fn run_until<F, E>(self, main: F) -> Result<()>
    where
        F: Future<Output = std::result::Result<(), E>>,
        E: std::fmt::Display,
    {
        tracing::info!(
            bridge = %self.name,
            tasks = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        let outcome = tokio::select! {
            result = main => match result {
                Ok(()) => {
                    tracing::warn!(bridge = %self.name, "Main worker finished");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(bridge = %self.name, error = %e, "Main worker failed");
                    Err(BridgeError::worker(e.to_string()))
                }
            },
            signal = signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                tracing::info!(bridge = %self.name, "Received shutdown signal");
                Ok(())
            }
        };

        self.shutdown().await;
        outcome
    }

    async fn shutdown(self) {
        // Never wait on a full queue here; the broker may already be gone.
        if let Some((topic, payload)) = &self.shutdown_message {
            if let Err(e) = self.publisher.try_publish(topic, payload.as_str()) {
                tracing::warn!(error = %e, "Failed to publish shutdown message");
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            tracing::warn!(error = %e, "Error disconnecting from MQTT broker");
        }

        // Let the event loop flush the queued messages.
        tokio::time::sleep(Duration::from_millis(200)).await;

        for task in &self.tasks {
            task.abort();
        }

        tracing::info!(bridge = %self.name, "Goodbye!");
    }
}
