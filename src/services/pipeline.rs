//! Wires watch -> claim -> identify -> commit.
//!
//! Every stage owns the sending half of its output queue and drops it when
//! it finishes, so completion flows downstream. Staging and store must share
//! one filesystem unless `allow_cross_device` is set.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::models::IngestOutcome;
use crate::services::claim::{ClaimStats, run_claim_stage};
use crate::services::classifier::{InferClassifier, MediaClassifier};
use crate::services::commit::{CommitStats, Committer, run_commit_stage};
use crate::services::identify::{Identifier, run_identify_stage};
use crate::services::watcher::{EventStream, forward_candidates};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Totals collected from every stage once the pipeline has drained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub claim: ClaimStats,
    pub identified: usize,
    pub commit: CommitStats,
}

pub struct Pipeline {
    config: IngestConfig,
    classifier: Arc<dyn MediaClassifier>,
}

impl Pipeline {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            classifier: Arc::new(InferClassifier),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn MediaClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Starts all stages. With `events == None` only the staging recovery
    /// (and input sweep, if configured) runs, after which the pipeline
    /// drains and finishes on its own.
    ///
    /// Outcomes are published on the returned receiver; dropping it is fine.
    pub fn spawn(
        self,
        events: Option<EventStream>,
        cancel: CancellationToken,
    ) -> (PipelineHandle, mpsc::Receiver<IngestOutcome>) {
        let cap = self.config.queue_capacity.max(1);
        let (candidate_tx, candidate_rx) = mpsc::channel(cap);
        let (staged_tx, staged_rx) = mpsc::channel(cap);
        let (record_tx, record_rx) = mpsc::channel(cap);
        let (outcome_tx, outcome_rx) = mpsc::channel(cap);

        let watch = match events {
            Some(events) => {
                let cancel = cancel.clone();
                Some(tokio::spawn(forward_candidates(events, candidate_tx, cancel)))
            }
            None => {
                drop(candidate_tx);
                None
            }
        };

        let sweep_dir = self
            .config
            .sweep_input_on_start
            .then(|| self.config.input_dir.clone());
        let claim = tokio::spawn(run_claim_stage(
            candidate_rx,
            self.config.staging_dir.clone(),
            sweep_dir,
            staged_tx,
            cancel.clone(),
        ));

        let identifier = Arc::new(Identifier::new(
            self.classifier,
            self.config.hash_buffer_size,
            self.config.sniff_len,
        ));
        let identify = tokio::spawn(run_identify_stage(
            identifier,
            staged_rx,
            record_tx,
            self.config.identify_workers,
            cancel.clone(),
        ));

        let committer = Committer::new(
            self.config.store_dir.clone(),
            self.config.extension_policy,
            self.config.allow_cross_device,
        );
        let commit = tokio::spawn(run_commit_stage(
            committer,
            record_rx,
            outcome_tx,
            cancel.clone(),
        ));

        (
            PipelineHandle {
                cancel,
                watch,
                claim,
                identify,
                commit,
            },
            outcome_rx,
        )
    }
}

pub struct PipelineHandle {
    cancel: CancellationToken,
    watch: Option<JoinHandle<Result<(), IngestError>>>,
    claim: JoinHandle<ClaimStats>,
    identify: JoinHandle<usize>,
    commit: JoinHandle<CommitStats>,
}

impl PipelineHandle {
    /// Requests a prompt stop. Files still in flight stay in staging and are
    /// picked up by the next recovery scan.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for every stage to finish. A failed change-notification stream
    /// is reported as an error once the rest of the pipeline has drained.
    pub async fn join(self) -> Result<PipelineReport, IngestError> {
        let watch_result = match self.watch {
            Some(handle) => handle.await.map_err(join_error)?,
            None => Ok(()),
        };

        let report = PipelineReport {
            claim: self.claim.await.map_err(join_error)?,
            identified: self.identify.await.map_err(join_error)?,
            commit: self.commit.await.map_err(join_error)?,
        };

        info!(
            "🏁 Pipeline drained: recovered={} claimed={} stored={} duplicates={} failed={}",
            report.claim.recovered,
            report.claim.claimed,
            report.commit.stored,
            report.commit.duplicates,
            report.commit.failed
        );

        watch_result.map(|_| report)
    }
}

fn join_error(e: tokio::task::JoinError) -> IngestError {
    IngestError::Task(e.to_string())
}
