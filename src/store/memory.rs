/// In-memory operation store
///
/// Each DID owns an arena of entries in acceptance order plus a cid -> offset
/// index. A single write lock covers the whole commit.
use super::{CommitPlan, OpStore};
use crate::error::{PlcError, PlcResult};
use crate::operations::{IndexedOperation, Operation};
use async_trait::async_trait;
use libipld::Cid;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct DidLog {
    entries: Vec<IndexedOperation>,
    index: HashMap<Cid, usize>,
}

impl DidLog {
    fn active(&self) -> impl DoubleEndedIterator<Item = &IndexedOperation> {
        self.entries.iter().filter(|e| !e.nullified)
    }

    /// Offsets to nullify if `plan` applies cleanly to this log
    fn check(&self, plan: &CommitPlan) -> PlcResult<Vec<usize>> {
        if self.index.contains_key(&plan.cid) {
            return Err(PlcError::Conflict(format!(
                "{} is already stored for {}",
                plan.cid, plan.did
            )));
        }

        let mut offsets = Vec::with_capacity(plan.nullified.len());
        for cid in &plan.nullified {
            match self.index.get(cid) {
                Some(&offset) if !self.entries[offset].nullified => offsets.push(offset),
                _ => {
                    return Err(PlcError::Conflict(format!(
                        "{} is no longer active for {}",
                        cid, plan.did
                    )))
                }
            }
        }

        let tail = self
            .active()
            .filter(|e| !plan.nullified.contains(&e.cid))
            .next_back()
            .map(|e| e.cid);
        if tail != plan.prev {
            return Err(PlcError::Conflict(format!(
                "log tail for {} moved during validation",
                plan.did
            )));
        }

        Ok(offsets)
    }
}

/// Operation store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryOpStore {
    logs: RwLock<BTreeMap<String, DidLog>>,
}

impl MemoryOpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OpStore for MemoryOpStore {
    async fn indexed_ops_for_did(
        &self,
        did: &str,
        include_nullified: bool,
    ) -> PlcResult<Vec<IndexedOperation>> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(did)
            .map(|log| {
                log.entries
                    .iter()
                    .filter(|e| include_nullified || !e.nullified)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last_op_for_did(&self, did: &str) -> PlcResult<Option<Operation>> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(did)
            .and_then(|log| log.active().next_back())
            .map(|e| e.operation.clone()))
    }

    async fn commit(&self, plan: CommitPlan) -> PlcResult<()> {
        let mut logs = self.logs.write().await;

        // unknown DIDs are checked against an empty log and only created on success
        let offsets = match logs.get(&plan.did) {
            Some(log) => log.check(&plan)?,
            None => DidLog::default().check(&plan)?,
        };

        let log = logs.entry(plan.did.clone()).or_default();
        for offset in offsets {
            log.entries[offset].nullified = true;
        }
        log.index.insert(plan.cid, log.entries.len());
        log.entries.push(plan.into_entry());

        Ok(())
    }

    async fn dids(&self, limit: usize, after: Option<&str>) -> PlcResult<Vec<String>> {
        use std::ops::Bound;

        let logs = self.logs.read().await;
        let lower = match after {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };
        Ok(logs
            .range((lower, Bound::Unbounded))
            .map(|(did, _)| did.clone())
            .take(limit)
            .collect())
    }

    async fn health_check(&self) -> PlcResult<()> {
        Ok(())
    }
}
