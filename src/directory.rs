/// Directory - submission and read paths over an operation store
///
/// Submissions follow read -> resolve -> commit. Validation holds no lock;
/// the store's commit rejects a plan whose tail moved in the meantime, and
/// that `Conflict` is returned to the caller unchanged.
use crate::{
    error::{PlcError, PlcResult},
    metrics,
    operations::{Document, IndexedOperation, Operation},
    store::{CommitPlan, OpStore},
    validation::{self, ForkResolution},
};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Source of acceptance timestamps
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Current state of an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Active(Document),
    Tombstoned,
    NotFound,
}

impl Resolution {
    pub fn into_document(self) -> Option<Document> {
        match self {
            Resolution::Active(doc) => Some(doc),
            Resolution::Tombstoned | Resolution::NotFound => None,
        }
    }
}

/// DID directory
#[derive(Clone)]
pub struct Directory {
    store: Arc<dyn OpStore>,
    clock: Clock,
}

impl Directory {
    pub fn new(store: Arc<dyn OpStore>) -> Self {
        Self {
            store,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for acceptance timestamps
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<dyn OpStore> {
        &self.store
    }

    /// Acceptance time, truncated to the precision stores keep
    fn now(&self) -> DateTime<Utc> {
        (self.clock)().trunc_subsecs(6)
    }

    /// Validate and append `op` to the log of `did`
    ///
    /// Deprecated `create` operations are refused here; they remain valid as
    /// the genesis of historical logs that are replayed or audited.
    pub async fn submit(&self, did: &str, op: Operation) -> PlcResult<ForkResolution> {
        if let Operation::Legacy(_) = op {
            let e = PlcError::ImproperOperation(
                "deprecated create operations are not accepted".to_string(),
            );
            metrics::record_rejected(e.kind());
            return Err(e);
        }

        let existing = self.store.indexed_ops_for_did(did, false).await?;
        // acceptance times never run backwards within a log
        let now = self.now();
        let now = match existing.last() {
            Some(tail) if tail.created_at > now => tail.created_at,
            _ => now,
        };

        let resolution = match validation::resolve_next_op(did, &existing, &op, now) {
            Ok(resolution) => resolution,
            Err(e) => {
                debug!(did = %did, kind = e.kind(), "Rejected operation: {}", e);
                metrics::record_rejected(e.kind());
                return Err(e);
            }
        };

        let cid = op.cid()?;
        let plan = CommitPlan {
            did: did.to_string(),
            operation: op,
            cid,
            prev: resolution.prev,
            nullified: resolution.nullified.clone(),
            created_at: now,
        };

        let started = Instant::now();
        match self.store.commit(plan).await {
            Ok(()) => {
                metrics::record_accepted(
                    resolution.nullified.len(),
                    started.elapsed().as_secs_f64(),
                );
                if resolution.is_fork() {
                    info!(
                        did = %did,
                        cid = %cid,
                        nullified = resolution.nullified.len(),
                        "Accepted fork"
                    );
                } else {
                    debug!(did = %did, cid = %cid, "Accepted operation");
                }
                Ok(resolution)
            }
            Err(e) => {
                if let PlcError::Conflict(_) = e {
                    warn!(did = %did, cid = %cid, "Commit conflict: {}", e);
                }
                metrics::record_rejected(e.kind());
                Err(e)
            }
        }
    }

    /// Resolve the current state of `did` by replaying its active log
    pub async fn resolve(&self, did: &str) -> PlcResult<Resolution> {
        let log = self.store.indexed_ops_for_did(did, false).await?;
        if log.is_empty() {
            return Ok(Resolution::NotFound);
        }

        Ok(match validation::replay_indexed(did, &log)? {
            Some(doc) => Resolution::Active(doc),
            None => Resolution::Tombstoned,
        })
    }

    /// Current document, `None` when unknown or tombstoned
    pub async fn document(&self, did: &str) -> PlcResult<Option<Document>> {
        Ok(self.resolve(did).await?.into_document())
    }

    /// Active operations for `did`, oldest first
    pub async fn operation_log(&self, did: &str) -> PlcResult<Vec<Operation>> {
        let log = self.store.indexed_ops_for_did(did, false).await?;
        Ok(log.into_iter().map(|entry| entry.operation).collect())
    }

    /// Every stored entry for `did`, nullified ones included
    pub async fn audit_log(&self, did: &str) -> PlcResult<Vec<IndexedOperation>> {
        self.store.indexed_ops_for_did(did, true).await
    }

    /// Latest active operation for `did`
    pub async fn last_op(&self, did: &str) -> PlcResult<Option<Operation>> {
        self.store.last_op_for_did(did).await
    }

    /// Verify the full stored history of `did`
    pub async fn audit_did(&self, did: &str) -> PlcResult<Option<Document>> {
        let entries = self.audit_log(did).await?;
        validation::verify_audit_log(did, &entries)
    }
}
