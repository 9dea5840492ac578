/// Background task implementations
use crate::{directory::Directory, error::PlcResult, metrics};
use futures::future::join_all;
use tracing::warn;

/// Outcome of one integrity audit pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub checked: usize,
    /// DIDs whose stored history failed verification
    pub failed: Vec<String>,
}

/// Page through every DID and verify its stored audit log
///
/// Each page is verified concurrently. A failing log is reported and
/// counted; storage errors end the pass.
pub async fn audit_operation_logs(directory: &Directory, batch_size: usize) -> PlcResult<AuditReport> {
    let mut report = AuditReport::default();
    let mut after: Option<String> = None;

    loop {
        let page = directory.store().dids(batch_size, after.as_deref()).await?;
        if page.is_empty() {
            break;
        }

        let results = join_all(page.iter().map(|did| directory.audit_did(did))).await;
        for (did, result) in page.iter().zip(results) {
            report.checked += 1;
            if let Err(e) = result {
                if !e.is_validation() {
                    return Err(e);
                }
                warn!(did = %did, kind = e.kind(), "Operation log failed verification: {}", e);
                metrics::record_audit_failure();
                report.failed.push(did.clone());
            }
        }

        if page.len() < batch_size {
            break;
        }
        after = page.last().cloned();
    }

    Ok(report)
}

/// Health check - verify the operation store is reachable
pub async fn health_check(directory: &Directory) -> PlcResult<()> {
    directory.store().health_check().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::plc::{PlcOperationBuilder, PlcSigner};
    use crate::operations::did_for_genesis;
    use crate::store::{conformance, CommitPlan, MemoryOpStore, OpStore};
    use std::sync::Arc;

    async fn seed(dir: &Directory, seeds: std::ops::Range<u8>) -> Vec<String> {
        let mut dids = Vec::new();
        for seed in seeds {
            let signer = PlcSigner::new(&[seed; 32]).unwrap();
            let op = signer
                .sign_operation(
                    PlcOperationBuilder::new()
                        .rotation_keys(vec![signer.did_key()])
                        .build()
                        .unwrap(),
                )
                .unwrap();
            let did = did_for_genesis(&op).unwrap();
            dir.submit(&did, op).await.unwrap();
            dids.push(did);
        }
        dids
    }

    #[tokio::test]
    async fn test_audit_pages_through_all_dids() {
        let dir = Directory::new(Arc::new(MemoryOpStore::new()));
        seed(&dir, 90..97).await;

        let report = audit_operation_logs(&dir, 3).await.unwrap();
        assert_eq!(report.checked, 7);
        assert!(report.failed.is_empty());
        health_check(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_audit_flags_corrupt_log() {
        let store = Arc::new(MemoryOpStore::new());
        let dir = Directory::new(store.clone());
        seed(&dir, 100..102).await;

        // a genesis stored under the wrong identifier
        let f = conformance::fixture(102);
        let wrong_did = "did:plc:zzzzzzzzzzzzzzzzzzzzzzzz".to_string();
        store
            .commit(CommitPlan {
                did: wrong_did.clone(),
                cid: f.genesis.cid().unwrap(),
                operation: f.genesis,
                prev: None,
                nullified: Vec::new(),
                created_at: conformance::now(),
            })
            .await
            .unwrap();

        let report = audit_operation_logs(&dir, 500).await.unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.failed, vec![wrong_did]);
    }
}
