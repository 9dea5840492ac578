/// Operation storage
///
/// Stores are append-only logs of `IndexedOperation`s keyed by DID. The only
/// mutation after insert is flipping `nullified` to true, which happens in the
/// same atomic commit that appends the fork's replacement entry.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryOpStore;
pub use sqlite::SqliteOpStore;

use crate::error::PlcResult;
use crate::operations::{IndexedOperation, Operation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libipld::Cid;

/// Everything needed to append one accepted operation
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub did: String,
    pub operation: Operation,
    pub cid: Cid,
    /// Expected tail of the active log once `nullified` is applied
    pub prev: Option<Cid>,
    pub nullified: Vec<Cid>,
    pub created_at: DateTime<Utc>,
}

impl CommitPlan {
    pub(crate) fn into_entry(self) -> IndexedOperation {
        IndexedOperation {
            did: self.did,
            operation: self.operation,
            cid: self.cid,
            nullified: false,
            created_at: self.created_at,
        }
    }
}

/// Operation storage backend
///
/// `commit` must be atomic: either the new entry is appended and every cid in
/// `plan.nullified` flips to nullified, or nothing changes and the call fails
/// with `PlcError::Conflict`. A commit conflicts when, after applying
/// `plan.nullified`, the tail of the active log is not `plan.prev`.
///
/// Entries are ordered by `created_at` with insertion order breaking ties.
/// Callers must commit with a `created_at` no earlier than the current tail;
/// backends that sort by timestamp would otherwise see the new entry below
/// the tail and report a conflict.
#[async_trait]
pub trait OpStore: Send + Sync {
    /// Entries for `did` ordered by acceptance time, oldest first
    async fn indexed_ops_for_did(
        &self,
        did: &str,
        include_nullified: bool,
    ) -> PlcResult<Vec<IndexedOperation>>;

    /// Latest non-nullified operation for `did`
    async fn last_op_for_did(&self, did: &str) -> PlcResult<Option<Operation>>;

    /// Append an accepted operation
    async fn commit(&self, plan: CommitPlan) -> PlcResult<()>;

    /// Up to `limit` DIDs in ascending order, starting after `after`
    async fn dids(&self, limit: usize, after: Option<&str>) -> PlcResult<Vec<String>>;

    /// Check the backend is reachable
    async fn health_check(&self) -> PlcResult<()>;
}

/// Behaviour every backend must share
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::crypto::plc::{PlcOperationBuilder, PlcSigner};
    use crate::error::PlcError;
    use crate::operations::did_for_genesis;
    use chrono::{Duration, SubsecRound};

    /// Stores keep microsecond precision
    pub fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    pub struct Fixture {
        pub did: String,
        pub signer: PlcSigner,
        pub genesis: Operation,
    }

    pub fn fixture(seed: u8) -> Fixture {
        let signer = PlcSigner::new(&[seed; 32]).unwrap();
        let genesis = signer
            .sign_operation(
                PlcOperationBuilder::new()
                    .rotation_keys(vec![signer.did_key()])
                    .also_known_as(vec![format!("at://user{}.test", seed)])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Fixture {
            did: did_for_genesis(&genesis).unwrap(),
            signer,
            genesis,
        }
    }

    pub fn child(f: &Fixture, prev: &Operation, handle: &str) -> Operation {
        let base = prev.normalized().unwrap().into_owned();
        f.signer
            .sign_operation(
                PlcOperationBuilder::extending(&base, &prev.cid().unwrap())
                    .also_known_as(vec![format!("at://{}", handle)])
                    .build()
                    .unwrap(),
            )
            .unwrap()
    }

    pub fn plan(
        did: &str,
        op: &Operation,
        prev: Option<&Operation>,
        nullified: &[&Operation],
        created_at: DateTime<Utc>,
    ) -> CommitPlan {
        CommitPlan {
            did: did.to_string(),
            operation: op.clone(),
            cid: op.cid().unwrap(),
            prev: prev.map(|p| p.cid().unwrap()),
            nullified: nullified.iter().map(|n| n.cid().unwrap()).collect(),
            created_at,
        }
    }

    pub async fn append_and_read(store: &dyn OpStore) {
        let f = fixture(51);
        let t0 = now();
        let op2 = child(&f, &f.genesis, "second.test");

        assert!(store.last_op_for_did(&f.did).await.unwrap().is_none());

        store
            .commit(plan(&f.did, &f.genesis, None, &[], t0))
            .await
            .unwrap();
        store
            .commit(plan(&f.did, &op2, Some(&f.genesis), &[], t0 + Duration::seconds(1)))
            .await
            .unwrap();

        let log = store.indexed_ops_for_did(&f.did, false).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].operation, f.genesis);
        assert_eq!(log[1].operation, op2);
        assert_eq!(log[1].created_at, t0 + Duration::seconds(1));
        assert_eq!(store.last_op_for_did(&f.did).await.unwrap(), Some(op2));

        store.health_check().await.unwrap();
    }

    pub async fn stale_prev_conflicts(store: &dyn OpStore) {
        let f = fixture(52);
        let t0 = now();
        let a = child(&f, &f.genesis, "a.test");
        let b = child(&f, &f.genesis, "b.test");

        store
            .commit(plan(&f.did, &f.genesis, None, &[], t0))
            .await
            .unwrap();
        store
            .commit(plan(&f.did, &a, Some(&f.genesis), &[], t0))
            .await
            .unwrap();

        let err = store
            .commit(plan(&f.did, &b, Some(&f.genesis), &[], t0))
            .await
            .unwrap_err();
        assert!(matches!(err, PlcError::Conflict(_)));

        // a second genesis is also a conflict
        let err = store
            .commit(plan(&f.did, &b, None, &[], t0))
            .await
            .unwrap_err();
        assert!(matches!(err, PlcError::Conflict(_)));

        // nothing leaked from the failed commits
        let log = store.indexed_ops_for_did(&f.did, true).await.unwrap();
        assert_eq!(log.len(), 2);
    }

    pub async fn fork_nullifies(store: &dyn OpStore) {
        let f = fixture(53);
        let t0 = now();
        let a = child(&f, &f.genesis, "a.test");
        let a2 = child(&f, &a, "a2.test");
        let b = child(&f, &f.genesis, "b.test");

        store
            .commit(plan(&f.did, &f.genesis, None, &[], t0))
            .await
            .unwrap();
        store
            .commit(plan(&f.did, &a, Some(&f.genesis), &[], t0 + Duration::seconds(1)))
            .await
            .unwrap();
        store
            .commit(plan(&f.did, &a2, Some(&a), &[], t0 + Duration::seconds(2)))
            .await
            .unwrap();
        store
            .commit(plan(
                &f.did,
                &b,
                Some(&f.genesis),
                &[&a, &a2],
                t0 + Duration::seconds(3),
            ))
            .await
            .unwrap();

        let active = store.indexed_ops_for_did(&f.did, false).await.unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[1].operation, b);

        let all = store.indexed_ops_for_did(&f.did, true).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all[1].nullified && all[2].nullified);
        assert!(!all[0].nullified && !all[3].nullified);
    }

    pub async fn racing_forks_conflict(store: &dyn OpStore) {
        let f = fixture(54);
        let t0 = now();
        let a = child(&f, &f.genesis, "a.test");
        let b = child(&f, &f.genesis, "b.test");
        let c = child(&f, &f.genesis, "c.test");

        store
            .commit(plan(&f.did, &f.genesis, None, &[], t0))
            .await
            .unwrap();
        store
            .commit(plan(&f.did, &a, Some(&f.genesis), &[], t0 + Duration::seconds(1)))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            store.commit(plan(&f.did, &b, Some(&f.genesis), &[&a], t0 + Duration::seconds(2))),
            store.commit(plan(&f.did, &c, Some(&f.genesis), &[&a], t0 + Duration::seconds(2))),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(PlcError::Conflict(_)))));

        let active = store.indexed_ops_for_did(&f.did, false).await.unwrap();
        assert_eq!(active.len(), 2);
    }

    pub async fn lists_dids(store: &dyn OpStore) {
        let mut dids = Vec::new();
        for seed in 60..65 {
            let f = fixture(seed);
            store
                .commit(plan(&f.did, &f.genesis, None, &[], now()))
                .await
                .unwrap();
            dids.push(f.did);
        }
        dids.sort();

        let first = store.dids(3, None).await.unwrap();
        assert_eq!(first, dids[..3].to_vec());

        let rest = store.dids(10, Some(&first[2])).await.unwrap();
        assert_eq!(rest, dids[3..].to_vec());
    }
}
