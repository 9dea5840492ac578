/// Canonical DAG-CBOR encoding, CIDs and DID derivation
use super::{Operation, Service};
use crate::error::{PlcError, PlcResult};
use libipld::{cbor::DagCborCodec, codec::Codec, multihash::Multihash, Cid, Ipld};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Multicodec code for dag-cbor
const DAG_CBOR_CODEC: u64 = 0x71;

/// Multihash code for sha2-256
const SHA2_256_CODE: u64 = 0x12;

/// Number of base32 characters kept when minting a DID
pub const DID_SUFFIX_LEN: usize = 24;

/// Method prefix of every identifier
pub const DID_PLC_PREFIX: &str = "did:plc:";

/// Encode an operation as DAG-CBOR, optionally including `sig`
pub(crate) fn encode(op: &Operation, with_sig: bool) -> PlcResult<Vec<u8>> {
    let ipld = to_ipld(op, with_sig);
    DagCborCodec
        .encode(&ipld)
        .map_err(|e| PlcError::Encoding(format!("Failed to encode {}: {}", op.type_name(), e)))
}

fn to_ipld(op: &Operation, with_sig: bool) -> Ipld {
    let mut map = BTreeMap::new();
    map.insert("type".to_string(), string(op.type_name()));

    match op {
        Operation::Regular(op) => {
            map.insert("rotationKeys".to_string(), string_list(&op.rotation_keys));
            map.insert(
                "verificationMethods".to_string(),
                Ipld::Map(
                    op.verification_methods
                        .iter()
                        .map(|(id, key)| (id.clone(), string(key)))
                        .collect(),
                ),
            );
            map.insert("alsoKnownAs".to_string(), string_list(&op.also_known_as));
            map.insert(
                "services".to_string(),
                Ipld::Map(
                    op.services
                        .iter()
                        .map(|(id, service)| (id.clone(), service_ipld(service)))
                        .collect(),
                ),
            );
            map.insert("prev".to_string(), optional_string(op.prev.as_deref()));
        }
        Operation::Tombstone(op) => {
            map.insert("prev".to_string(), string(&op.prev));
        }
        Operation::Legacy(op) => {
            map.insert("signingKey".to_string(), string(&op.signing_key));
            map.insert("recoveryKey".to_string(), string(&op.recovery_key));
            map.insert("handle".to_string(), string(&op.handle));
            map.insert("service".to_string(), string(&op.service));
            map.insert("prev".to_string(), optional_string(op.prev.as_deref()));
        }
    }

    if with_sig {
        map.insert("sig".to_string(), string(op.sig()));
    }

    Ipld::Map(map)
}

fn service_ipld(service: &Service) -> Ipld {
    let mut map = BTreeMap::new();
    map.insert("type".to_string(), string(&service.service_type));
    map.insert("endpoint".to_string(), string(&service.endpoint));
    Ipld::Map(map)
}

fn string(value: &str) -> Ipld {
    Ipld::String(value.to_string())
}

fn optional_string(value: Option<&str>) -> Ipld {
    value.map(string).unwrap_or(Ipld::Null)
}

fn string_list(values: &[String]) -> Ipld {
    Ipld::List(values.iter().map(|v| string(v)).collect())
}

/// CIDv1, dag-cbor, sha2-256 over `bytes`
pub fn cid_for_bytes(bytes: &[u8]) -> PlcResult<Cid> {
    let digest = Sha256::digest(bytes);
    let multihash = Multihash::wrap(SHA2_256_CODE, &digest)
        .map_err(|e| PlcError::Encoding(format!("Failed to wrap multihash: {}", e)))?;
    Ok(Cid::new_v1(DAG_CBOR_CODEC, multihash))
}

/// Lowercase unpadded base32 of the SHA-256 of the signed genesis encoding
fn genesis_hash(op: &Operation) -> PlcResult<String> {
    let digest = Sha256::digest(op.signed_bytes()?);
    Ok(base32::encode(
        base32::Alphabet::Rfc4648Lower { padding: false },
        &digest,
    ))
}

/// Identifier minted from a signed genesis operation
pub fn did_for_genesis(op: &Operation) -> PlcResult<String> {
    did_with_suffix_len(op, DID_SUFFIX_LEN)
}

/// Identifier derived from a signed genesis operation, keeping at most
/// `len` characters of the hash
pub fn did_with_suffix_len(op: &Operation, len: usize) -> PlcResult<String> {
    let hash = genesis_hash(op)?;
    let len = len.min(hash.len());
    Ok(format!("{}{}", DID_PLC_PREFIX, &hash[..len]))
}
