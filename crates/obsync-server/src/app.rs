//! Main application orchestration.
//!
//! Owns the component graph:
//! - `ObsClient` wrapped in `TimeoutControl`
//! - `StateMonitor` over the OBS facets, with the event stream as push source
//! - `BroadcastHub` fed by monitor change events
//! - dashboard server routing commands back to the control client

use std::sync::{Arc, Weak};
use std::time::Duration;

use obsync_core::{DynControlClient, ServerMessage, TimeoutControl};
use obsync_dashboard::{BroadcastHub, CommandRouter};
use obsync_monitor::{obs_facets, obs_push_bindings, ChangeEvent, StateMonitor};
use obsync_obs::ObsClient;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Main application.
pub struct Application {
    config: AppConfig,
    obs: Option<Arc<ObsClient>>,
    monitor: Arc<StateMonitor>,
    hub: Arc<BroadcastHub>,
    shutdown_token: CancellationToken,
}

impl Application {
    /// Connect to the configured OBS instance, then build the component graph.
    ///
    /// Facets are registered from the capabilities OBS reports, so the
    /// connection comes first. If OBS is not reachable yet its capabilities
    /// are unknown and every facet is registered; the client reconnects
    /// lazily on the first poll.
    pub async fn connect(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let obs = Arc::new(ObsClient::new(config.obs.clone()));

        match obs.connect().await {
            Ok(()) => info!(obs_url = %config.obs.url(), "Connected to OBS"),
            Err(e) => warn!(
                obs_url = %config.obs.url(),
                error = %e,
                "OBS not reachable yet, registering every facet"
            ),
        }

        let control: DynControlClient = Arc::new(TimeoutControl::new(
            obs.clone(),
            config.obs.request_timeout(),
        ));
        Ok(Self::assemble(config, control, Some(obs)))
    }

    /// Create the application around an arbitrary control client.
    pub fn with_control(config: AppConfig, control: DynControlClient) -> Self {
        Self::assemble(config, control, None)
    }

    fn assemble(config: AppConfig, control: DynControlClient, obs: Option<Arc<ObsClient>>) -> Self {
        let mut builder = StateMonitor::builder().facets(obs_facets(control.clone()));
        if config.monitor.push_enabled {
            builder = builder.push_source(control.clone(), obs_push_bindings());
        }
        let monitor = builder.build();

        let commands = CommandRouter::with_obs_commands(control, monitor.clone());
        let hub = Arc::new(BroadcastHub::new(monitor.clone(), commands));

        // Weak: the hub already holds the monitor as its snapshot source.
        let weak_hub = Arc::downgrade(&hub);
        monitor.on_change(move |event| forward_change(&weak_hub, event));

        Self {
            config,
            obs,
            monitor,
            hub,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn monitor(&self) -> &Arc<StateMonitor> {
        &self.monitor
    }

    /// Token that stops the application when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let addr = self.config.dashboard.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| obsync_dashboard::DashboardError::Bind { addr, source })?;

        let token = self.shutdown_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            token.cancel();
        });

        self.serve(listener).await
    }

    /// Run on an already bound listener until the shutdown token is cancelled.
    pub async fn serve(self, listener: TcpListener) -> AppResult<()> {
        info!(
            facets = ?self.monitor.facet_kinds(),
            poll_interval_ms = self.config.monitor.poll_interval_ms,
            push_enabled = self.config.monitor.push_enabled,
            "Starting application"
        );

        self.monitor.start(self.config.monitor.poll_interval());

        let result = obsync_dashboard::serve(
            listener,
            self.hub.clone(),
            self.config.dashboard.clone(),
            self.shutdown_token.child_token(),
        )
        .await;

        info!("Shutting down");
        self.shutdown_token.cancel();
        self.monitor.stop();
        if let Some(obs) = &self.obs {
            obs.shutdown();
        }

        // Let socket tasks flush their close frames.
        tokio::time::sleep(Duration::from_millis(50)).await;
        result.map_err(AppError::from)
    }
}

fn forward_change(hub: &Weak<BroadcastHub>, event: &ChangeEvent) {
    let Some(hub) = hub.upgrade() else {
        return;
    };
    match ServerMessage::from_change(event.facet, &event.new_value) {
        Ok(message) => {
            let report = hub.broadcast(&message);
            debug!(
                facet = %event.facet,
                source = event.source.as_str(),
                ?report,
                "Change broadcast"
            );
        }
        Err(e) => {
            warn!(facet = %event.facet, error = %e, "Change value does not fit its message");
        }
    }
}
