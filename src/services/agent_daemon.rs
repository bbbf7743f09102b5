//! Agent background daemon.
//!
//! Drives two schedules on independent intervals:
//! - revision collection, refreshing the cached cluster listing;
//! - reconciliation passes over every cluster.
//!
//! No pass or collection error stops the daemon; only a stop request or a
//! closed event channel does.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::models::AgentConfig;
use crate::services::agent::{duration_ms, Agent, PassReport};

/// Configuration for the agent daemon.
#[derive(Debug, Clone)]
pub struct AgentDaemonConfig {
    /// Interval between reconciliation passes.
    pub pass_period: Duration,
    /// Interval between revision listings.
    pub revision_collect_period: Duration,
    /// Stop after this many passes; `None` runs until stopped.
    pub max_passes: Option<u64>,
}

impl Default for AgentDaemonConfig {
    fn default() -> Self {
        Self::from_agent_config(&AgentConfig::default())
    }
}

impl AgentDaemonConfig {
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            pass_period: config.pass_period(),
            revision_collect_period: config.revision_collect_period(),
            max_passes: None,
        }
    }

    pub fn with_max_passes(mut self, passes: u64) -> Self {
        self.max_passes = Some(passes);
        self
    }
}

/// Event emitted by the agent daemon.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Started,
    RevisionsCollected { clusters: usize },
    RevisionCollectionFailed { error: String },
    PassCompleted { report: PassReport, duration_ms: u64 },
    PassFailed { pass_number: u64, error: String },
    Stopped { reason: StopReason },
}

/// Reason the daemon stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Stop requested through the handle.
    Requested,
    /// Configured number of passes reached.
    PassLimitReached,
    /// Event receiver dropped.
    ChannelClosed,
}

/// Status of the agent daemon.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub running: bool,
    pub total_passes: u64,
    pub failed_passes: u64,
    pub collections: u64,
    pub failed_collections: u64,
    pub last_pass: Option<Instant>,
}

/// Handle to control the agent daemon.
#[derive(Clone)]
pub struct DaemonHandle {
    cancel: CancellationToken,
    status: Arc<RwLock<DaemonStatus>>,
}

impl DaemonHandle {
    /// Request the daemon to stop; an in-flight pass is interrupted.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }
}

/// Runs the agent on its configured schedules.
pub struct AgentDaemon {
    agent: Arc<Agent>,
    config: AgentDaemonConfig,
    status: Arc<RwLock<DaemonStatus>>,
    cancel: CancellationToken,
}

impl AgentDaemon {
    pub fn new(agent: Arc<Agent>, config: AgentDaemonConfig) -> Self {
        Self {
            agent,
            config,
            status: Arc::new(RwLock::new(DaemonStatus::default())),
            cancel: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            cancel: self.cancel.clone(),
            status: self.status.clone(),
        }
    }

    /// Run the daemon, returning a channel for events.
    pub async fn run(self) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            self.run_loop(tx).await;
        });

        rx
    }

    /// Run the daemon on the current task with an existing sender.
    pub async fn run_with_sender(self, tx: mpsc::Sender<AgentEvent>) {
        self.run_loop(tx).await;
    }

    async fn run_loop(self, tx: mpsc::Sender<AgentEvent>) {
        self.status.write().await.running = true;
        info!(
            pass_period_ms = duration_ms(self.config.pass_period),
            revision_collect_period_ms = duration_ms(self.config.revision_collect_period),
            "agent daemon started"
        );

        let reason = if tx.send(AgentEvent::Started).await.is_err() {
            StopReason::ChannelClosed
        } else {
            self.schedule(&tx).await
        };

        self.status.write().await.running = false;
        info!(reason = ?reason, "agent daemon stopped");
        let _ = tx.send(AgentEvent::Stopped { reason }).await;
    }

    async fn schedule(&self, tx: &mpsc::Sender<AgentEvent>) -> StopReason {
        let mut collect_timer = interval(self.config.revision_collect_period);
        let mut pass_timer = interval(self.config.pass_period);
        collect_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        pass_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Both timers fire immediately; collect first so the first pass
        // works from a fresh listing.
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return StopReason::Requested,
                _ = collect_timer.tick() => self.collect().await,
                _ = pass_timer.tick() => self.pass().await,
            };

            if tx.send(event).await.is_err() {
                return StopReason::ChannelClosed;
            }

            if let Some(limit) = self.config.max_passes {
                if self.status.read().await.total_passes >= limit {
                    return StopReason::PassLimitReached;
                }
            }
        }
    }

    async fn collect(&self) -> AgentEvent {
        let result = self.agent.collect_revisions().await;
        let mut status = self.status.write().await;
        status.collections += 1;
        match result {
            Ok(nodes) => AgentEvent::RevisionsCollected {
                clusters: nodes.len(),
            },
            Err(e) => {
                status.failed_collections += 1;
                warn!(error = %e, "revision collection failed");
                AgentEvent::RevisionCollectionFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn pass(&self) -> AgentEvent {
        let start = Instant::now();
        let result = self.agent.run_pass(&self.cancel).await;
        let duration_ms = duration_ms(start.elapsed());

        let mut status = self.status.write().await;
        status.total_passes += 1;
        status.last_pass = Some(Instant::now());
        match result {
            Ok(report) => AgentEvent::PassCompleted {
                report,
                duration_ms,
            },
            Err(e) => {
                status.failed_passes += 1;
                warn!(error = %e, "pass failed");
                AgentEvent::PassFailed {
                    pass_number: status.total_passes,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Run one collection and one pass without scheduling.
    pub async fn run_once(&self) -> (AgentEvent, AgentEvent) {
        (self.collect().await, self.pass().await)
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }

    pub fn config(&self) -> &AgentDaemonConfig {
        &self.config
    }
}
