/// PLC operation building and signing
///
/// Implements secp256k1 and P-256 signing for did:plc operations. Signatures
/// are produced over the canonical unsigned DAG-CBOR encoding of the operation.
use crate::{
    crypto::did_key::{did_key_for, KeyAlgorithm},
    error::{PlcError, PlcResult},
    operations::{Operation, PlcOperation, Service},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use k256::ecdsa::signature::Signer;
use libipld::Cid;
use rand::RngCore;
use std::collections::BTreeMap;

/// Builder for regular PLC operations
#[derive(Debug, Default, Clone)]
pub struct PlcOperationBuilder {
    prev: Option<String>,
    rotation_keys: Vec<String>,
    verification_methods: BTreeMap<String, String>,
    also_known_as: Vec<String>,
    services: BTreeMap<String, Service>,
}

impl PlcOperationBuilder {
    /// Create a new PLC operation builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the contents of an existing operation, extending `prev`
    pub fn extending(op: &PlcOperation, prev: &Cid) -> Self {
        Self {
            prev: Some(prev.to_string()),
            rotation_keys: op.rotation_keys.clone(),
            verification_methods: op.verification_methods.clone(),
            also_known_as: op.also_known_as.clone(),
            services: op.services.clone(),
        }
    }

    /// Set the previous operation CID
    pub fn prev(mut self, prev: &Cid) -> Self {
        self.prev = Some(prev.to_string());
        self
    }

    /// Set rotation keys, most authoritative first
    pub fn rotation_keys(mut self, keys: Vec<String>) -> Self {
        self.rotation_keys = keys;
        self
    }

    /// Add or replace a verification method
    pub fn verification_method(mut self, id: &str, key: String) -> Self {
        self.verification_methods.insert(id.to_string(), key);
        self
    }

    /// Set also known as
    pub fn also_known_as(mut self, aka: Vec<String>) -> Self {
        self.also_known_as = aka;
        self
    }

    /// Add or replace a service
    pub fn service(mut self, id: &str, service_type: &str, endpoint: &str) -> Self {
        self.services.insert(
            id.to_string(),
            Service {
                service_type: service_type.to_string(),
                endpoint: endpoint.to_string(),
            },
        );
        self
    }

    /// Build the operation (without signature)
    pub fn build(self) -> PlcResult<Operation> {
        if self.rotation_keys.is_empty() {
            return Err(PlcError::ImproperOperation(
                "at least one rotation key is required".to_string(),
            ));
        }

        Ok(Operation::Regular(PlcOperation {
            rotation_keys: self.rotation_keys,
            verification_methods: self.verification_methods,
            also_known_as: self.also_known_as,
            services: self.services,
            prev: self.prev,
            sig: String::new(),
        }))
    }
}

enum SignerKey {
    Secp256k1(k256::ecdsa::SigningKey),
    P256(p256::ecdsa::SigningKey),
}

/// PLC Signer - handles signing of PLC operations
pub struct PlcSigner {
    signing_key: SignerKey,
}

impl PlcSigner {
    /// Create a new secp256k1 signer from a private key (32 bytes)
    pub fn new(private_key: &[u8]) -> PlcResult<Self> {
        check_key_length(private_key)?;

        let signing_key = k256::ecdsa::SigningKey::from_slice(private_key)
            .map_err(|e| PlcError::Internal(format!("Invalid private key: {}", e)))?;

        Ok(Self {
            signing_key: SignerKey::Secp256k1(signing_key),
        })
    }

    /// Create a new P-256 signer from a private key (32 bytes)
    pub fn new_p256(private_key: &[u8]) -> PlcResult<Self> {
        check_key_length(private_key)?;

        let signing_key = p256::ecdsa::SigningKey::from_slice(private_key)
            .map_err(|e| PlcError::Internal(format!("Invalid private key: {}", e)))?;

        Ok(Self {
            signing_key: SignerKey::P256(signing_key),
        })
    }

    /// Create a secp256k1 signer from hex-encoded private key
    pub fn from_hex(hex_key: &str) -> PlcResult<Self> {
        let key_bytes = hex::decode(hex_key)
            .map_err(|e| PlcError::Config(format!("Invalid hex private key: {}", e)))?;

        Self::new(&key_bytes)
    }

    /// Generate a fresh secp256k1 signer
    pub fn generate_k256() -> PlcResult<Self> {
        Self::new(&random_key_bytes())
    }

    /// Generate a fresh P-256 signer
    pub fn generate_p256() -> PlcResult<Self> {
        Self::new_p256(&random_key_bytes())
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match &self.signing_key {
            SignerKey::Secp256k1(_) => KeyAlgorithm::Secp256k1,
            SignerKey::P256(_) => KeyAlgorithm::P256,
        }
    }

    /// Sign raw bytes
    ///
    /// Returns a 64-byte low-S compact signature over SHA-256 of `data`
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        match &self.signing_key {
            SignerKey::Secp256k1(key) => {
                let signature: k256::ecdsa::Signature = key.sign(data);
                signature.to_bytes().to_vec()
            }
            SignerKey::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(data);
                let signature = signature.normalize_s().unwrap_or(signature);
                signature.to_bytes().to_vec()
            }
        }
    }

    /// Sign a PLC operation or tombstone
    ///
    /// Any existing signature is replaced.
    pub fn sign_operation(&self, mut operation: Operation) -> PlcResult<Operation> {
        let unsigned = operation.unsigned_bytes()?;
        let sig = URL_SAFE_NO_PAD.encode(self.sign(&unsigned));
        operation.set_sig(sig);
        Ok(operation)
    }

    /// Get the public key in compressed form (33 bytes, hex-encoded)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.compressed_public_key())
    }

    /// Get the public key as a `did:key` identifier
    pub fn did_key(&self) -> String {
        did_key_for(self.algorithm(), &self.compressed_public_key())
    }

    fn compressed_public_key(&self) -> Vec<u8> {
        match &self.signing_key {
            SignerKey::Secp256k1(key) => key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
            SignerKey::P256(key) => key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        }
    }
}

fn check_key_length(private_key: &[u8]) -> PlcResult<()> {
    if private_key.len() != 32 {
        return Err(PlcError::Config(
            "Private key must be exactly 32 bytes".to_string(),
        ));
    }
    Ok(())
}

fn random_key_bytes() -> [u8; 32] {
    let mut private_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut private_key);
    private_key
}
