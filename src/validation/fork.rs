/// Fork resolution for proposed operations
///
/// A proposed operation either extends the tail of the active log or forks
/// from an earlier entry. Forking discards the suffix after the fork point,
/// which is only permitted to a rotation key that strictly outranks the key
/// that signed the first discarded entry, and only within the recovery window.
use super::{
    authority::{assert_supported_keys, rotation_keys_in_force, signer_rank, verify_signed_by},
    genesis::validate_genesis,
};
use crate::{
    error::{PlcError, PlcResult},
    operations::{IndexedOperation, Operation},
};
use chrono::{DateTime, Duration, Utc};
use libipld::Cid;
use tracing::debug;

/// Length of the recovery window in seconds (72 hours)
pub const RECOVERY_WINDOW_SECS: i64 = 72 * 60 * 60;

/// How long after acceptance an entry may still be nullified
pub fn recovery_window() -> Duration {
    Duration::seconds(RECOVERY_WINDOW_SECS)
}

/// Outcome of accepting a proposed operation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForkResolution {
    /// Entries to mark nullified, oldest first
    pub nullified: Vec<Cid>,
    /// Entry the proposal extends, `None` for genesis
    pub prev: Option<Cid>,
}

impl ForkResolution {
    pub fn is_fork(&self) -> bool {
        !self.nullified.is_empty()
    }
}

/// Decide whether `proposed` may be appended to `existing`
///
/// `existing` is the active (non-nullified) log for `did`, oldest first.
/// `now` is the acceptance time and drives the recovery-window check.
pub fn resolve_next_op(
    did: &str,
    existing: &[IndexedOperation],
    proposed: &Operation,
    now: DateTime<Utc>,
) -> PlcResult<ForkResolution> {
    if let Operation::Regular(op) = proposed {
        assert_supported_keys(op)?;
    }

    if existing.is_empty() {
        validate_genesis(did, proposed)?;
        return Ok(ForkResolution::default());
    }

    if let Operation::Legacy(_) = proposed {
        return Err(PlcError::MisorderedOperation(
            "create operations are only valid as genesis".to_string(),
        ));
    }

    let cid = proposed.cid()?;
    if existing.iter().any(|entry| entry.cid == cid) {
        return Err(PlcError::MisorderedOperation(format!(
            "{} has already been accepted",
            cid
        )));
    }

    let prev_str = proposed.prev().ok_or_else(|| {
        PlcError::MisorderedOperation(format!("{} already has a genesis operation", did))
    })?;
    let prev = Cid::try_from(prev_str)
        .map_err(|e| PlcError::ImproperOperation(format!("invalid prev {}: {}", prev_str, e)))?;

    let fork_point = existing
        .iter()
        .position(|entry| entry.cid == prev)
        .ok_or_else(|| {
            PlcError::MisorderedOperation(format!("prev {} is not an active entry", prev))
        })?;

    let (history, tail) = existing.split_at(fork_point + 1);
    let keys = rotation_keys_in_force(history.iter().map(|entry| &entry.operation))?;

    let disputed = match tail.first() {
        None => {
            verify_signed_by(&keys, proposed)?;
            return Ok(ForkResolution {
                nullified: Vec::new(),
                prev: Some(prev),
            });
        }
        Some(disputed) => disputed,
    };

    let rank = signer_rank(&keys, &disputed.operation)?;
    verify_signed_by(&keys[..rank], proposed)?;

    let elapsed = now - disputed.created_at;
    if elapsed > recovery_window() {
        return Err(PlcError::LateRecovery { elapsed });
    }

    debug!(
        did = %did,
        fork_point = %prev,
        nullified = tail.len(),
        disputed_rank = rank,
        "Resolved fork"
    );

    Ok(ForkResolution {
        nullified: tail.iter().map(|entry| entry.cid).collect(),
        prev: Some(prev),
    })
}
