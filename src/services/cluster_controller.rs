//! Single-cluster reconciliation.
//!
//! One call to [`ClusterController::reconcile`] compares a cluster's desired
//! speclet with its tracked operation and performs at most one of: start,
//! adopt, restart, ACL update, deactivate, or nothing. Nothing is retried
//! inside a call; the next pass re-derives everything from scratch.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::artifact::{DATA_BUNDLE, LOG_TAILER, QUERY_ENGINE, TRAMPOLINE};
use crate::domain::models::{
    AclEntry, ArtifactDefaults, ArtifactSet, ClusterHealth, ClusterRecord, Config, OperationId,
    OperationSpec, OperationState, Speclet,
};
use crate::domain::ports::{JobSubstrate, NamespaceStore, SubstrateError};
use crate::services::acl_translator::translate_acl;
use crate::services::artifact_resolver::ArtifactResolver;
use crate::services::operation_classifier::{
    conflicting_operation_id, needs_restart, ErrorClassifier, SubstrateErrorKind,
};
use crate::services::speclet_differ::{diff_speclets, restart_triggering_fields};

/// Settings the controller needs from the agent configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub robot_username: String,
    pub alias_prefix: String,
    pub validate_acl: bool,
    pub artifacts: ArtifactDefaults,
}

impl ControllerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            robot_username: config.agent.robot_username.clone(),
            alias_prefix: config.agent.alias_prefix.clone(),
            validate_acl: config.agent.validate_acl,
            artifacts: config.artifacts.clone(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a tracked operation is being replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RestartReason {
    /// Operation reached a state it will not recover from
    OperationFinished { state: OperationState },
    /// Restart-triggering speclet fields changed
    SpecletChanged { fields: Vec<&'static str> },
    /// The speclet the operation was launched from is not known
    BaselineUnknown,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperationFinished { state } => write!(f, "operation is {state}"),
            Self::SpecletChanged { fields } => {
                write!(f, "speclet changed: {}", fields.join(", "))
            }
            Self::BaselineUnknown => f.write_str("launch speclet unknown"),
        }
    }
}

/// How an operation came to be tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Launch {
    Started(OperationId),
    /// A live operation already held the alias and was taken over
    Adopted(OperationId),
}

impl Launch {
    pub fn operation_id(&self) -> &OperationId {
        match self {
            Self::Started(id) | Self::Adopted(id) => id,
        }
    }
}

/// Result of one reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No operation was tracked; one is tracked now
    Launched { launch: Launch },
    Restarted { reason: RestartReason, launch: Launch },
    AclUpdated,
    Unchanged,
    /// Cluster became inactive and its operation was stopped
    Deactivated,
    /// Cluster is inactive and nothing is running
    Inactive,
}

/// Reconciles one cluster record against the substrate.
pub struct ClusterController {
    store: Arc<dyn NamespaceStore>,
    substrate: Arc<dyn JobSubstrate>,
    resolver: ArtifactResolver,
    classifier: Arc<ErrorClassifier>,
    config: ControllerConfig,
}

impl ClusterController {
    pub fn new(
        store: Arc<dyn NamespaceStore>,
        substrate: Arc<dyn JobSubstrate>,
        classifier: Arc<ErrorClassifier>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            resolver: ArtifactResolver::new(store.clone()),
            store,
            substrate,
            classifier,
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one reconciliation step for `record`.
    ///
    /// The outcome or error is also recorded on the record.
    #[tracing::instrument(skip(self, record), fields(cluster = %record.alias))]
    pub async fn reconcile(&self, record: &mut ClusterRecord) -> DomainResult<ReconcileOutcome> {
        let result = self.reconcile_inner(record).await;
        record.last_reconciled = Some(Utc::now());
        match &result {
            Ok(outcome) => {
                record.clear_error();
                debug!(outcome = ?outcome, "cluster reconciled");
            }
            Err(err) => {
                record.record_error(err);
                match err {
                    DomainError::InvariantViolation(_) => {
                        error!(error = %err, "internal invariant violated")
                    }
                    DomainError::Transient(_) => warn!(error = %err, "transient failure"),
                    _ => warn!(error = %err, class = err.error_class().as_str(), "reconciliation failed"),
                }
            }
        }
        result
    }

    async fn reconcile_inner(&self, record: &mut ClusterRecord) -> DomainResult<ReconcileOutcome> {
        let speclet = record.speclet.clone().ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "cluster {} reconciled before its speclet was read",
                record.alias
            ))
        })?;
        speclet.validate(self.config.validate_acl)?;

        if !speclet.active {
            return self.deactivate(record).await;
        }

        self.refresh_operation_state(record).await?;

        if record.operation_id.is_none() {
            let launch = self.launch(record, &speclet).await?;
            return Ok(ReconcileOutcome::Launched { launch });
        }

        match self.restart_reason(record, &speclet) {
            Some(reason) => {
                info!(reason = %reason, "restarting cluster operation");
                self.stop_tracked(record, &reason.to_string()).await?;
                let launch = self.launch(record, &speclet).await?;
                Ok(ReconcileOutcome::Restarted { reason, launch })
            }
            None => self.keep_running(record, &speclet).await,
        }
    }

    /// Abort the operation of a cluster whose node was removed.
    #[tracing::instrument(skip(self, record), fields(cluster = %record.alias))]
    pub async fn teardown(&self, record: &mut ClusterRecord) -> DomainResult<()> {
        self.refresh_operation_state(record).await?;
        self.stop_tracked(record, "cluster node removed").await
    }

    async fn refresh_operation_state(&self, record: &mut ClusterRecord) -> DomainResult<()> {
        let Some(operation_id) = record.operation_id.clone() else {
            return Ok(());
        };

        match self.substrate.get_operation_state(&operation_id).await {
            Ok(state) => {
                if record.operation_state != Some(state) {
                    debug!(operation_id = %operation_id, state = %state, "operation state changed");
                }
                record.operation_state = Some(state);
                Ok(())
            }
            Err(err) if self.classifier.is(&err, SubstrateErrorKind::NoSuchOperation) => {
                info!(operation_id = %operation_id, "tracked operation no longer exists");
                record.clear_operation();
                Ok(())
            }
            Err(err) => Err(self.substrate_failure(err)),
        }
    }

    /// Decide whether the tracked operation must be replaced.
    ///
    /// A live operation whose speclet is unchanged is kept even if its state
    /// looks stale.
    fn restart_reason(&self, record: &mut ClusterRecord, speclet: &Speclet) -> Option<RestartReason> {
        if let Some(state) = record.operation_state {
            if needs_restart(state) {
                return Some(RestartReason::OperationFinished { state });
            }
        }

        if !speclet.restart_on_speclet_change {
            return None;
        }

        if record.applied_speclet.is_none() && record.applied_revision == record.revision {
            record.applied_speclet = Some(speclet.clone());
        }

        let Some(applied) = record.applied_speclet.as_ref() else {
            return Some(RestartReason::BaselineUnknown);
        };
        let Some(diff) = diff_speclets(applied, speclet) else {
            return Some(RestartReason::BaselineUnknown);
        };
        let fields = restart_triggering_fields(&diff);
        if fields.is_empty() {
            None
        } else {
            Some(RestartReason::SpecletChanged { fields })
        }
    }

    async fn keep_running(
        &self,
        record: &mut ClusterRecord,
        speclet: &Speclet,
    ) -> DomainResult<ReconcileOutcome> {
        record.health = ClusterHealth::Running;

        let Some(applied) = record.applied_speclet.as_mut() else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        let desired_acl = translate_acl(speclet.acl.as_deref());
        if translate_acl(applied.acl.as_deref()) == desired_acl {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let Some(operation_id) = record.operation_id.as_ref() else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        self.substrate
            .update_operation_acl(operation_id, desired_acl.as_deref())
            .await
            .map_err(|err| self.substrate_failure(err))?;
        info!(operation_id = %operation_id, "operation acl updated");

        applied.acl = speclet.acl.clone();
        Ok(ReconcileOutcome::AclUpdated)
    }

    async fn deactivate(&self, record: &mut ClusterRecord) -> DomainResult<ReconcileOutcome> {
        if record.operation_id.is_none() {
            record.health = ClusterHealth::Inactive;
            return Ok(ReconcileOutcome::Inactive);
        }

        self.refresh_operation_state(record).await?;
        self.stop_tracked(record, "cluster is inactive").await?;
        self.persist(record).await;
        record.health = ClusterHealth::Inactive;
        info!("cluster deactivated");
        Ok(ReconcileOutcome::Deactivated)
    }

    /// Abort the tracked operation unless it already finished, then forget it.
    async fn stop_tracked(&self, record: &mut ClusterRecord, message: &str) -> DomainResult<()> {
        let Some(operation_id) = record.operation_id.clone() else {
            return Ok(());
        };

        let finished = record
            .operation_state
            .is_some_and(|state| state.is_finished());
        if !finished {
            match self.substrate.abort_operation(&operation_id, message).await {
                Ok(()) => info!(operation_id = %operation_id, "operation aborted"),
                Err(err) if self.classifier.is(&err, SubstrateErrorKind::NoSuchOperation) => {
                    debug!(operation_id = %operation_id, "operation vanished before abort");
                }
                Err(err) => return Err(self.substrate_failure(err)),
            }
        }

        record.clear_operation();
        Ok(())
    }

    /// Start an operation for the record's speclet, adopting a live holder of its alias.
    async fn launch(&self, record: &mut ClusterRecord, speclet: &Speclet) -> DomainResult<Launch> {
        let artifacts = self
            .resolver
            .build_artifacts(speclet, &self.config.artifacts)
            .await?;
        let acl = translate_acl(speclet.acl.as_deref());
        let spec = self.compose_spec(record, speclet, artifacts, acl);

        let launch = match self.substrate.start_operation(&spec).await {
            Ok(operation_id) => {
                info!(operation_id = %operation_id, alias = %spec.alias, "operation started");
                Launch::Started(operation_id)
            }
            Err(err) if self.classifier.is(&err, SubstrateErrorKind::AliasConflict) => {
                let operation_id = conflicting_operation_id(&err)?;
                warn!(
                    operation_id = %operation_id,
                    alias = %spec.alias,
                    "alias already held by a live operation; adopting it"
                );
                Launch::Adopted(operation_id)
            }
            Err(err) => return Err(self.substrate_failure(err)),
        };

        record.track_operation(launch.operation_id().clone());
        self.persist(record).await;
        Ok(launch)
    }

    fn compose_spec(
        &self,
        record: &ClusterRecord,
        speclet: &Speclet,
        artifacts: ArtifactSet,
        acl: Option<Vec<AclEntry>>,
    ) -> OperationSpec {
        let alias = format!("{}{}", self.config.alias_prefix, record.alias);
        let command = launch_command(&artifacts);

        let mut description: BTreeMap<String, String> = artifacts
            .description
            .into_iter()
            .map(|(name, path)| (format!("artifact:{name}"), path))
            .collect();
        description.insert("cluster_path".to_string(), record.path.clone());
        description.insert("incarnation".to_string(), (record.incarnation + 1).to_string());
        if let Some(revision) = record.revision {
            description.insert("speclet_revision".to_string(), revision.to_string());
        }
        if let Some(note) = &speclet.description {
            description.insert("note".to_string(), note.clone());
        }

        OperationSpec {
            title: format!("Clique {}", record.alias),
            alias,
            pool: speclet.pool.clone(),
            started_by: self.config.robot_username.clone(),
            acl,
            file_paths: artifacts.manifest,
            command,
            instance_count: speclet.resources.instance_count,
            instance_cpu: speclet.resources.instance_cpu,
            instance_memory_bytes: speclet.resources.instance_memory_bytes,
            description,
        }
    }

    async fn persist(&self, record: &ClusterRecord) {
        let state = record.persistent_state();
        if let Err(err) = self.store.set_persistent_state(&record.path, &state).await {
            warn!(error = %err, "failed to persist cluster state");
        }
    }

    fn substrate_failure(&self, err: SubstrateError) -> DomainError {
        if self.classifier.is(&err, SubstrateErrorKind::PrerequisiteFailed) {
            DomainError::Transient(err.to_string())
        } else {
            DomainError::Substrate(err)
        }
    }
}

/// Command line run in every job sandbox; artifacts land under their names.
fn launch_command(artifacts: &ArtifactSet) -> String {
    let mut command = format!("./{TRAMPOLINE} ./{QUERY_ENGINE} --log-tailer-bin ./{LOG_TAILER}");
    if artifacts.contains(DATA_BUNDLE) {
        command.push_str(&format!(" --data-bundle ./{DATA_BUNDLE}"));
    }
    command
}
