pub mod config;
pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod probe;
pub mod prompt;
pub mod queue;
pub mod retry;
pub mod speech;
pub mod transport;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, ReachabilityCheck, TcpReachability};
use crate::dispatcher::{Dispatcher, StoryTicket};
use crate::error::Result;
use crate::models::{GenerationRequest, Story};
use crate::probe::{ServiceAvailability, ServiceProbe};
use crate::retry::BackoffPolicy;
use crate::speech::SpeechClient;
use crate::transport::{OpenAiTransport, Transport};

/// Background tasks started by [`StoryService::start`]. Dropping the handle
/// stops them.
pub struct ServiceTasks {
    monitor: JoinHandle<()>,
    recovery: JoinHandle<()>,
}

impl Drop for ServiceTasks {
    fn drop(&mut self) {
        self.monitor.abort();
        self.recovery.abort();
    }
}

pub struct StoryService {
    dispatcher: Dispatcher,
    monitor: Arc<ConnectivityMonitor>,
    reachability: Arc<dyn ReachabilityCheck>,
    monitor_interval: Duration,
    speech: SpeechClient,
}

impl StoryService {
    pub fn new(cfg: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(OpenAiTransport::new(cfg)?);
        let reachability = Arc::new(TcpReachability::new(
            cfg.monitor.check_address.clone(),
            cfg.monitor_check_timeout(),
        ));
        Self::with_parts(cfg, transport, reachability)
    }

    /// Wire the service around caller-supplied seams
    pub fn with_parts(
        cfg: &Config,
        transport: Arc<dyn Transport>,
        reachability: Arc<dyn ReachabilityCheck>,
    ) -> Result<Self> {
        let monitor = Arc::new(ConnectivityMonitor::new());
        let probe = Arc::new(ServiceProbe::new(
            Arc::clone(&transport),
            Duration::from_secs(cfg.probe.freshness_seconds),
            BackoffPolicy::from_config(&cfg.probe),
        ));
        let dispatcher = Dispatcher::new(
            transport,
            Arc::clone(&monitor),
            probe,
            cfg.openai.clone(),
        );

        Ok(Self {
            dispatcher,
            monitor,
            reachability,
            monitor_interval: cfg.monitor_interval(),
            speech: SpeechClient::new(cfg)?,
        })
    }

    /// Start reachability polling and queue replay on recovery
    pub fn start(&self) -> ServiceTasks {
        let recovery = self.dispatcher.spawn_recovery_listener();
        let monitor = self
            .monitor
            .spawn(Arc::clone(&self.reachability), self.monitor_interval);
        tracing::info!(interval = ?self.monitor_interval, "Story service started");
        ServiceTasks { monitor, recovery }
    }

    pub async fn submit(&self, request: GenerationRequest) -> StoryTicket {
        self.dispatcher.submit(request).await
    }

    pub async fn generate(&self, request: GenerationRequest) -> Result<Story> {
        self.dispatcher.generate(request).await
    }

    pub async fn narrate(&self, story: &Story) -> Result<Vec<u8>> {
        self.speech
            .synthesize(&format!("{}\n\n{}", story.title, story.body))
            .await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn service_status(&self) -> ServiceAvailability {
        self.dispatcher.service_status()
    }
}
