/// PLC operation model
///
/// Operations are immutable signed records. Their canonical form is DAG-CBOR,
/// which is both the signed payload (without `sig`) and the input to the
/// content identifier (with `sig`).

pub mod encoding;

pub use encoding::{
    cid_for_bytes, did_for_genesis, did_with_suffix_len, DID_PLC_PREFIX, DID_SUFFIX_LEN,
};

use crate::error::PlcResult;
use chrono::{DateTime, Utc};
use libipld::Cid;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Maximum number of rotation keys on a single operation
pub const MAX_ROTATION_KEYS: usize = 5;

/// Service entry of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "type")]
    pub service_type: String,
    pub endpoint: String,
}

/// Regular `plc_operation`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlcOperation {
    /// Rotation keys, most authoritative first
    pub rotation_keys: Vec<String>,
    pub verification_methods: BTreeMap<String, String>,
    pub also_known_as: Vec<String>,
    pub services: BTreeMap<String, Service>,
    /// CID of the operation this one extends, `None` only for genesis
    pub prev: Option<String>,
    pub sig: String,
}

/// Terminal `plc_tombstone` marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlcTombstone {
    pub prev: String,
    pub sig: String,
}

/// Deprecated `create` genesis shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCreate {
    pub signing_key: String,
    pub recovery_key: String,
    pub handle: String,
    pub service: String,
    pub prev: Option<String>,
    pub sig: String,
}

impl LegacyCreate {
    /// Convert into the equivalent regular operation, keeping the signature
    pub fn normalize(&self) -> PlcOperation {
        let mut verification_methods = BTreeMap::new();
        verification_methods.insert("atproto".to_string(), self.signing_key.clone());

        let mut services = BTreeMap::new();
        services.insert(
            "atproto_pds".to_string(),
            Service {
                service_type: "AtprotoPersonalDataServer".to_string(),
                endpoint: self.service.clone(),
            },
        );

        PlcOperation {
            rotation_keys: vec![self.recovery_key.clone(), self.signing_key.clone()],
            verification_methods,
            also_known_as: vec![format!("at://{}", self.handle)],
            services,
            prev: self.prev.clone(),
            sig: self.sig.clone(),
        }
    }
}

/// Any entry of an operation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    #[serde(rename = "plc_operation")]
    Regular(PlcOperation),
    #[serde(rename = "plc_tombstone")]
    Tombstone(PlcTombstone),
    #[serde(rename = "create")]
    Legacy(LegacyCreate),
}

impl Operation {
    /// Wire discriminator
    pub fn type_name(&self) -> &'static str {
        match self {
            Operation::Regular(_) => "plc_operation",
            Operation::Tombstone(_) => "plc_tombstone",
            Operation::Legacy(_) => "create",
        }
    }

    pub fn prev(&self) -> Option<&str> {
        match self {
            Operation::Regular(op) => op.prev.as_deref(),
            Operation::Tombstone(op) => Some(op.prev.as_str()),
            Operation::Legacy(op) => op.prev.as_deref(),
        }
    }

    pub fn sig(&self) -> &str {
        match self {
            Operation::Regular(op) => &op.sig,
            Operation::Tombstone(op) => &op.sig,
            Operation::Legacy(op) => &op.sig,
        }
    }

    pub(crate) fn set_sig(&mut self, sig: String) {
        match self {
            Operation::Regular(op) => op.sig = sig,
            Operation::Tombstone(op) => op.sig = sig,
            Operation::Legacy(op) => op.sig = sig,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Operation::Tombstone(_))
    }

    /// Regular or legacy operation with a null `prev`
    pub fn is_genesis(&self) -> bool {
        !self.is_tombstone() && self.prev().is_none()
    }

    /// The regular-operation view of this entry; `None` for tombstones
    pub fn normalized(&self) -> Option<Cow<'_, PlcOperation>> {
        match self {
            Operation::Regular(op) => Some(Cow::Borrowed(op)),
            Operation::Legacy(op) => Some(Cow::Owned(op.normalize())),
            Operation::Tombstone(_) => None,
        }
    }

    /// Canonical encoding without `sig`; this is the signed payload
    pub fn unsigned_bytes(&self) -> PlcResult<Vec<u8>> {
        encoding::encode(self, false)
    }

    /// Canonical encoding including `sig`
    pub fn signed_bytes(&self) -> PlcResult<Vec<u8>> {
        encoding::encode(self, true)
    }

    /// Content identifier of the signed operation
    pub fn cid(&self) -> PlcResult<Cid> {
        cid_for_bytes(&self.signed_bytes()?)
    }

    /// Short description for diagnostics
    pub fn describe(&self) -> String {
        match self.prev() {
            Some(prev) => format!("{} (prev {})", self.type_name(), prev),
            None => format!("{} (genesis)", self.type_name()),
        }
    }
}

/// Build an unsigned tombstone extending `prev`
pub fn tombstone(prev: &Cid) -> Operation {
    Operation::Tombstone(PlcTombstone {
        prev: prev.to_string(),
        sig: String::new(),
    })
}

/// Storage projection of an accepted operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedOperation {
    pub did: String,
    pub operation: Operation,
    #[serde(with = "cid_string")]
    pub cid: Cid,
    pub nullified: bool,
    /// Assigned by the server at acceptance time
    pub created_at: DateTime<Utc>,
}

/// Current state of an identifier, derived from its latest operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub did: String,
    pub rotation_keys: Vec<String>,
    pub verification_methods: BTreeMap<String, String>,
    pub also_known_as: Vec<String>,
    pub services: BTreeMap<String, Service>,
}

impl Document {
    pub fn from_op(did: &str, op: &PlcOperation) -> Self {
        Self {
            did: did.to_string(),
            rotation_keys: op.rotation_keys.clone(),
            verification_methods: op.verification_methods.clone(),
            also_known_as: op.also_known_as.clone(),
            services: op.services.clone(),
        }
    }
}

/// Serialize CIDs as their canonical string form
mod cid_string {
    use libipld::Cid;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cid: &Cid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&cid.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::try_from(s.as_str()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_op() -> PlcOperation {
        let mut services = BTreeMap::new();
        services.insert(
            "atproto_pds".to_string(),
            Service {
                service_type: "AtprotoPersonalDataServer".to_string(),
                endpoint: "https://example.com".to_string(),
            },
        );
        PlcOperation {
            rotation_keys: vec!["did:key:zQ3shA".to_string()],
            verification_methods: BTreeMap::new(),
            also_known_as: vec!["at://alice.test".to_string()],
            services,
            prev: None,
            sig: "c2ln".to_string(),
        }
    }

    #[test]
    fn test_json_shape_matches_wire_format() {
        let op = Operation::Regular(sample_op());
        let json = serde_json::to_value(&op).unwrap();

        assert_eq!(json["type"], "plc_operation");
        assert!(json["prev"].is_null());
        assert_eq!(json["services"]["atproto_pds"]["type"], "AtprotoPersonalDataServer");
        assert_eq!(json["alsoKnownAs"][0], "at://alice.test");

        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_parses_tombstone_and_legacy() {
        let tombstone: Operation =
            serde_json::from_str(r#"{"type":"plc_tombstone","prev":"bafyabc","sig":"xyz"}"#)
                .unwrap();
        assert!(tombstone.is_tombstone());
        assert!(!tombstone.is_genesis());
        assert!(tombstone.normalized().is_none());

        let legacy: Operation = serde_json::from_str(
            r#"{"type":"create","signingKey":"did:key:a","recoveryKey":"did:key:b","handle":"alice.test","service":"https://pds.test","prev":null,"sig":"xyz"}"#,
        )
        .unwrap();
        assert!(legacy.is_genesis());
    }

    #[test]
    fn test_legacy_normalization() {
        let legacy = LegacyCreate {
            signing_key: "did:key:signing".to_string(),
            recovery_key: "did:key:recovery".to_string(),
            handle: "alice.test".to_string(),
            service: "https://example.com".to_string(),
            prev: None,
            sig: "sig".to_string(),
        };

        let normalized = legacy.normalize();
        assert_eq!(
            normalized.rotation_keys,
            vec!["did:key:recovery".to_string(), "did:key:signing".to_string()]
        );
        assert_eq!(normalized.verification_methods["atproto"], "did:key:signing");
        assert_eq!(normalized.also_known_as, vec!["at://alice.test".to_string()]);
        assert_eq!(normalized.services["atproto_pds"].endpoint, "https://example.com");
        assert_eq!(normalized.sig, "sig");
    }

    #[test]
    fn test_indexed_operation_serializes_cid_as_string() {
        let op = Operation::Regular(sample_op());
        let indexed = IndexedOperation {
            did: "did:plc:test".to_string(),
            cid: op.cid().unwrap(),
            operation: op,
            nullified: false,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&indexed).unwrap();
        assert!(json["cid"].as_str().unwrap().starts_with("bafyrei"));

        let back: IndexedOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back.cid, indexed.cid);
    }
}
