/// Rotation-key authority and signature attribution
use crate::{
    crypto::did_key::{parse_did_key, verify_signature},
    error::{PlcError, PlcResult},
    operations::{Operation, PlcOperation, MAX_ROTATION_KEYS},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Return the first key in `keys` whose signature verifies `op`
///
/// Keys are tried in authority order so the returned key identifies the
/// highest-ranked signer.
pub fn verify_signed_by<'k>(keys: &'k [String], op: &Operation) -> PlcResult<&'k str> {
    let rank = signer_rank(keys, op)?;
    Ok(keys[rank].as_str())
}

/// Position within `keys` of the first key whose signature verifies `op`
pub fn signer_rank(keys: &[String], op: &Operation) -> PlcResult<usize> {
    let sig = URL_SAFE_NO_PAD
        .decode(op.sig())
        .map_err(|_| PlcError::InvalidSignature(op.describe()))?;
    let data = op.unsigned_bytes()?;

    for (rank, key) in keys.iter().enumerate() {
        if verify_signature(key, &data, &sig)? {
            return Ok(rank);
        }
    }

    Err(PlcError::InvalidSignature(op.describe()))
}

/// Every key must be parseable and the rotation set must hold 1..=5 keys
pub fn assert_supported_keys(op: &PlcOperation) -> PlcResult<()> {
    for key in op
        .rotation_keys
        .iter()
        .chain(op.verification_methods.values())
    {
        parse_did_key(key)?;
    }

    let count = op.rotation_keys.len();
    if count == 0 || count > MAX_ROTATION_KEYS {
        return Err(PlcError::ImproperOperation(format!(
            "expected 1 to {} rotation keys, got {}",
            MAX_ROTATION_KEYS, count
        )));
    }

    Ok(())
}

/// Rotation keys in force after applying `ops` in order
///
/// Tombstones carry no keys of their own, so authority falls back to the
/// nearest earlier operation.
pub fn rotation_keys_in_force<'a, I>(ops: I) -> PlcResult<Vec<String>>
where
    I: DoubleEndedIterator<Item = &'a Operation>,
{
    ops.rev()
        .find_map(|op| op.normalized().map(|n| n.rotation_keys.clone()))
        .ok_or_else(|| {
            PlcError::MisorderedOperation("no operation establishes rotation keys".to_string())
        })
}
