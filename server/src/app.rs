//! Top-level application runner: parses the CLI, wires the state store and
//! stream backends, registers the example handlers, and drives the engine
//! until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::core::Cli;
use crate::core::config::CommandEngineConfig;
use crate::core::constants::{APP_NAME, ENV_LOG, HEALTH_REPORT_INTERVAL_SECS};
use crate::core::shutdown::ShutdownService;
use crate::data::store::StateStoreService;
use crate::data::stream::StreamService;
use crate::domain::command::CommandService;
use crate::domain::handlers::{ComputationHandler, SlowJobHandler};

pub struct CommandEngineApp {
    pub shutdown: ShutdownService,
    pub config: CommandEngineConfig,
    pub service: Arc<CommandService>,
}

impl CommandEngineApp {
    /// Parse CLI/env, init logging, build the engine and run it to
    /// completion (i.e. until a shutdown signal is received).
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!(app = APP_NAME, "starting");

        let cli = Cli::parse();
        let app = Self::init(&cli).await?;
        Self::start(app).await
    }

    async fn init(cli: &Cli) -> Result<Self> {
        let config = CommandEngineConfig::load(cli)?;
        tracing::info!(backend = %config.backend, "configuration loaded");

        let store = Arc::new(StateStoreService::init(&config.store_config()).await?);
        let stream = Arc::new(StreamService::init(&config.stream_config()).await?);
        let shutdown = ShutdownService::new();

        let service = Arc::new(CommandService::new(store, stream, &config, shutdown.clone()));
        service.register_handler(ComputationHandler)?;
        service.register_handler(SlowJobHandler)?;

        Ok(Self {
            shutdown,
            config,
            service,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{APP_NAME}=debug");
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();
        app.service.start().await?;
        app.shutdown.register(app.start_health_report_task()).await;

        tracing::info!(
            poll_interval_ms = app.config.timeouts.poll_interval.as_millis() as u64,
            execute_timeout_ms = app.config.timeouts.execute_timeout.as_millis() as u64,
            "command engine running"
        );

        app.shutdown.wait().await;
        app.service.stop().await;
        app.shutdown.shutdown().await;

        Ok(())
    }

    /// Periodically logs a collaborator health snapshot (store, queue,
    /// heartbeat round-trip) until shutdown.
    fn start_health_report_task(&self) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(HEALTH_REPORT_INTERVAL_SECS));
            ticker.tick().await; // first tick fires immediately

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }

                    _ = ticker.tick() => {
                        match service.health_report().await {
                            Ok(report) => tracing::info!(
                                live_commands = report.live_commands,
                                queue_depth = report.queue_depth,
                                queue_pending = report.queue_pending,
                                oldest_pending_ms = ?report.oldest_pending_ms,
                                heartbeat_recorded = report.heartbeat_recorded,
                                heartbeat_ttl_ms = ?report.heartbeat_ttl.map(|d| d.as_millis() as u64),
                                "engine health report"
                            ),
                            Err(e) => tracing::warn!(error = %e, "health report failed"),
                        }
                    }
                }
            }
        })
    }
}
