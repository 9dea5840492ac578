/// Full-log replay and audit-log verification
use super::{
    authority::{assert_supported_keys, verify_signed_by},
    fork::resolve_next_op,
    genesis::validate_genesis,
};
use crate::{
    error::{PlcError, PlcResult},
    operations::{Document, IndexedOperation, Operation},
};
use libipld::Cid;
use std::collections::HashSet;

/// Document described by `op`, or `None` for a tombstone
pub fn project_document(did: &str, op: &Operation) -> Option<Document> {
    op.normalized()
        .map(|normalized| Document::from_op(did, &normalized))
}

/// Re-validate an active log from genesis and fold it into the current document
///
/// Returns `None` when the log ends in a tombstone.
pub fn replay_log(did: &str, ops: &[Operation]) -> PlcResult<Option<Document>> {
    let (first, rest) = ops
        .split_first()
        .ok_or_else(|| PlcError::ImproperOperation(format!("empty operation log for {}", did)))?;

    let genesis = validate_genesis(did, first)?;
    let mut keys = genesis.rotation_keys.clone();
    let mut doc = Some(genesis);
    let mut prev = first.cid()?;

    for op in rest {
        if !chains_from(op, &prev) {
            return Err(PlcError::MisorderedOperation(format!(
                "{} does not extend {}",
                op.describe(),
                prev
            )));
        }

        match op {
            Operation::Regular(regular) => {
                assert_supported_keys(regular)?;
                verify_signed_by(&keys, op)?;
                keys = regular.rotation_keys.clone();
                doc = Some(Document::from_op(did, regular));
            }
            Operation::Tombstone(_) => {
                verify_signed_by(&keys, op)?;
                doc = None;
            }
            Operation::Legacy(_) => {
                return Err(PlcError::MisorderedOperation(
                    "create operations are only valid as genesis".to_string(),
                ));
            }
        }

        prev = op.cid()?;
    }

    Ok(doc)
}

/// Replay stored entries, checking they belong to `did` and are active
pub fn replay_indexed(did: &str, entries: &[IndexedOperation]) -> PlcResult<Option<Document>> {
    for entry in entries {
        check_entry(did, entry)?;
        if entry.nullified {
            return Err(PlcError::ImproperOperation(format!(
                "nullified entry {} in active log",
                entry.cid
            )));
        }
    }

    let ops: Vec<Operation> = entries.iter().map(|e| e.operation.clone()).collect();
    replay_log(did, &ops)
}

/// Verify a complete audit log, nullified entries included
///
/// Each entry is re-resolved against the active log as it stood when the entry
/// was accepted; the resulting nullification pattern must match the stored
/// flags exactly.
pub fn verify_audit_log(did: &str, entries: &[IndexedOperation]) -> PlcResult<Option<Document>> {
    let first = entries
        .first()
        .ok_or_else(|| PlcError::ImproperOperation(format!("empty audit log for {}", did)))?;
    if first.nullified {
        return Err(PlcError::ImproperOperation(
            "genesis entry cannot be nullified".to_string(),
        ));
    }

    let mut active: Vec<IndexedOperation> = Vec::with_capacity(entries.len());
    let mut last_created = first.created_at;

    for entry in entries {
        check_entry(did, entry)?;
        if entry.created_at < last_created {
            return Err(PlcError::MisorderedOperation(format!(
                "{} was accepted before its predecessor",
                entry.cid
            )));
        }
        last_created = entry.created_at;

        let resolution = resolve_next_op(did, &active, &entry.operation, entry.created_at)?;
        let keep = active.len() - resolution.nullified.len();
        active.truncate(keep);
        active.push(IndexedOperation {
            nullified: false,
            ..entry.clone()
        });
    }

    let survivors: HashSet<Cid> = active.iter().map(|e| e.cid).collect();
    for entry in entries {
        let expected = !survivors.contains(&entry.cid);
        if entry.nullified != expected {
            return Err(PlcError::ImproperOperation(format!(
                "entry {} has nullified={} but history implies {}",
                entry.cid, entry.nullified, expected
            )));
        }
    }

    Ok(active
        .last()
        .and_then(|last| project_document(did, &last.operation)))
}

fn chains_from(op: &Operation, prev: &Cid) -> bool {
    op.prev()
        .and_then(|p| Cid::try_from(p).ok())
        .map_or(false, |p| &p == prev)
}

fn check_entry(did: &str, entry: &IndexedOperation) -> PlcResult<()> {
    if entry.did != did {
        return Err(PlcError::ImproperOperation(format!(
            "entry {} belongs to {}, not {}",
            entry.cid, entry.did, did
        )));
    }
    let computed = entry.operation.cid()?;
    if computed != entry.cid {
        return Err(PlcError::ImproperOperation(format!(
            "stored cid {} does not match computed {}",
            entry.cid, computed
        )));
    }
    Ok(())
}
