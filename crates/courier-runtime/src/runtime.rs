//! Process-level runtime: configuration, logging and the dispatch loop.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! // Loads courier.toml from the current directory, falling back to defaults
//! let runtime = CourierRuntime::new(session);
//!
//! // Custom configuration path
//! let runtime = CourierRuntime::builder()
//!     .config_file("deploy/courier.toml")
//!     .profile("production")
//!     .build(session)?;
//!
//! runtime.register(on_kind(EventKind::Text).handler(echo));
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use crate::config::{ConfigLoader, ConfigResult, CourierConfig};
use crate::error::RuntimeResult;
use crate::logging;
use courier_core::BoxedSession;
use courier_framework::{
    DispatchResult, Dispatcher, HandlerId, HandlerRegistration, HistoryLog, RegistrationTable,
};

/// Owns a configured [`Dispatcher`] and drives it until shutdown.
///
/// Shutdown happens when the session terminates, or on Ctrl+C / SIGTERM with
/// [`run`](Self::run). Either way the session state is persisted when
/// `dispatcher.persist_on_exit` is set.
pub struct CourierRuntime {
    config: CourierConfig,
    dispatcher: Arc<Dispatcher>,
}

impl CourierRuntime {
    /// Creates a runtime, loading configuration from the default locations.
    ///
    /// Defaults are used if the configuration cannot be loaded.
    pub fn new(session: BoxedSession) -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .with_user_config_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                CourierConfig::default()
            });

        Self::from_config(&config, session)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration.
    ///
    /// Initializes logging unless a subscriber is already installed.
    pub fn from_config(config: &CourierConfig, session: BoxedSession) -> Self {
        logging::init_from_config(&config.logging);

        let dispatcher = Dispatcher::with_options(session, config.dispatcher.to_options());

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            max_history = config.dispatcher.max_history,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the registration table.
    pub fn registrations(&self) -> &Arc<RegistrationTable> {
        self.dispatcher.registrations()
    }

    /// Returns the history log.
    pub fn history(&self) -> &Arc<HistoryLog> {
        self.dispatcher.history()
    }

    /// Registers a handler. Later registrations take priority.
    pub fn register(&self, registration: HandlerRegistration) -> HandlerId {
        self.dispatcher.register(registration)
    }

    /// Registers several handlers in order.
    ///
    /// ```rust,ignore
    /// runtime.register_all([
    ///     on_any().handler(log_everything),
    ///     on_kind(EventKind::Text).handler(echo),
    /// ]);
    /// ```
    pub fn register_all<I>(&self, registrations: I) -> Vec<HandlerId>
    where
        I: IntoIterator<Item = HandlerRegistration>,
    {
        registrations
            .into_iter()
            .map(|registration| self.dispatcher.register(registration))
            .collect()
    }

    /// Enables one registration, or all of them with `None`.
    pub fn enable(&self, id: Option<HandlerId>) -> DispatchResult<()> {
        self.dispatcher.enable(id)
    }

    /// Disables one registration, or all of them with `None`.
    pub fn disable(&self, id: Option<HandlerId>) -> DispatchResult<()> {
        self.dispatcher.disable(id)
    }

    /// Runs until the session terminates or a shutdown signal is received.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Courier runtime is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until the session terminates or `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut handle = self.dispatcher.spawn()?;

        tokio::select! {
            joined = &mut handle => {
                joined?;
                info!("Session ended");
            }
            _ = shutdown => {
                self.dispatcher.stop();
                handle.await?;
            }
        }

        info!("Runtime stopped");
        Ok(())
    }
}

/// Waits for Ctrl+C or SIGTERM.
///
/// If the signal handlers cannot be installed, the error is logged and the
/// future never completes, leaving shutdown to the session.
async fn wait_for_shutdown() {
    if let Err(err) = shutdown_signal().await {
        error!(error = %err, "Failed to listen for shutdown signals");
        std::future::pending::<()>().await;
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`CourierRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the runtime around `session`.
    pub fn build(self, session: BoxedSession) -> ConfigResult<CourierRuntime> {
        let config = self.config_loader.load()?;
        Ok(CourierRuntime::from_config(&config, session))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use courier_core::{ChannelSession, Event, RawEvent, channel_session};
    use courier_framework::{DispatcherState, Rule};

    fn runtime(session: &Arc<ChannelSession>) -> CourierRuntime {
        CourierRuntime::from_config(&CourierConfig::default(), Arc::clone(session) as BoxedSession)
    }

    #[tokio::test]
    async fn test_run_until_session_ends() {
        let (session, mut channels) = channel_session("bot_self", 8);
        let session = Arc::new(session);
        let runtime = runtime(&session);
        runtime.register(
            Rule::new()
                .concurrent(false)
                .handler(|event: Arc<Event>| async move { event.text().map(str::to_uppercase) }),
        );

        channels.inbound.push(RawEvent::text("friend", "hi")).await.unwrap();
        let feeder = channels.inbound.clone();
        let driver = tokio::spawn(async move {
            let reply = channels.outbound.recv().await;
            feeder.terminate();
            reply
        });

        runtime.run_until(std::future::pending()).await.unwrap();

        let reply = driver.await.unwrap().unwrap();
        assert_eq!(reply.text, "HI");
        assert_eq!(runtime.dispatcher().state(), DispatcherState::Stopped);
        assert_eq!(session.persist_count(), 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown_future() {
        let (session, _channels) = channel_session("bot_self", 8);
        let session = Arc::new(session);
        let runtime = runtime(&session);

        runtime
            .run_until(tokio::time::sleep(Duration::from_millis(10)))
            .await
            .unwrap();

        assert_eq!(runtime.dispatcher().state(), DispatcherState::Stopped);
        assert_eq!(session.persist_count(), 1);
        assert!(runtime.run_until(async {}).await.is_err());
    }

    #[test]
    fn test_register_all_keeps_order() {
        let (session, _channels) = channel_session("bot_self", 8);
        let runtime = runtime(&Arc::new(session));

        let ids = runtime.register_all([
            Rule::new().handler(|_event: Arc<Event>| async {}),
            Rule::new().handler(|_event: Arc<Event>| async {}),
        ]);
        assert_eq!(runtime.registrations().enabled_ids(), ids);

        runtime.disable(None).unwrap();
        assert_eq!(runtime.registrations().disabled_ids(), ids);
    }
}
