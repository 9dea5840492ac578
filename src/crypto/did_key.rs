/// did:key parsing and signature verification
///
/// Rotation keys and verification methods are self-describing `did:key`
/// identifiers: a base58btc multibase string wrapping a multicodec-prefixed,
/// compressed SEC1 public key.
use crate::error::{PlcError, PlcResult};
use k256::ecdsa::signature::Verifier;

/// Prefix of every key identifier
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Multicodec varint for secp256k1-pub
const SECP256K1_MULTICODEC: [u8; 2] = [0xe7, 0x01];

/// Multicodec varint for p256-pub
const P256_MULTICODEC: [u8; 2] = [0x80, 0x24];

/// Signature algorithms recognized for rotation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Secp256k1,
    P256,
}

impl KeyAlgorithm {
    fn multicodec(&self) -> [u8; 2] {
        match self {
            KeyAlgorithm::Secp256k1 => SECP256K1_MULTICODEC,
            KeyAlgorithm::P256 => P256_MULTICODEC,
        }
    }
}

/// A parsed public key
#[derive(Debug, Clone)]
pub enum PublicKey {
    Secp256k1(k256::ecdsa::VerifyingKey),
    P256(p256::ecdsa::VerifyingKey),
}

impl PublicKey {
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Secp256k1(_) => KeyAlgorithm::Secp256k1,
            PublicKey::P256(_) => KeyAlgorithm::P256,
        }
    }

    /// Verify a 64-byte compact ECDSA signature over SHA-256 of `message`
    ///
    /// Malformed signatures simply fail to verify. Only the low-S form of a
    /// signature is accepted on either curve, so each signed operation has
    /// exactly one valid encoding.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            PublicKey::Secp256k1(key) => match k256::ecdsa::Signature::from_slice(signature) {
                Ok(sig) => sig.normalize_s().is_none() && key.verify(message, &sig).is_ok(),
                Err(_) => false,
            },
            PublicKey::P256(key) => match p256::ecdsa::Signature::from_slice(signature) {
                Ok(sig) => sig.normalize_s().is_none() && key.verify(message, &sig).is_ok(),
                Err(_) => false,
            },
        }
    }

    /// Compressed SEC1 encoding (33 bytes)
    pub fn compressed_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Secp256k1(key) => key.to_encoded_point(true).as_bytes().to_vec(),
            PublicKey::P256(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    /// Render as a `did:key` identifier
    pub fn did_key(&self) -> String {
        did_key_for(self.algorithm(), &self.compressed_bytes())
    }
}

/// Render a `did:key` identifier from an algorithm and a compressed point
pub fn did_key_for(algorithm: KeyAlgorithm, compressed: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(2 + compressed.len());
    bytes.extend_from_slice(&algorithm.multicodec());
    bytes.extend_from_slice(compressed);
    format!("{}z{}", DID_KEY_PREFIX, bs58::encode(bytes).into_string())
}

/// Parse a `did:key` identifier into a public key
pub fn parse_did_key(key: &str) -> PlcResult<PublicKey> {
    let unsupported = |reason: &str| PlcError::UnsupportedKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let multibase = key
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| unsupported("missing did:key prefix"))?;
    let encoded = multibase
        .strip_prefix('z')
        .ok_or_else(|| unsupported("only base58btc multibase is supported"))?;
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| unsupported(&format!("invalid base58btc: {}", e)))?;

    if bytes.len() < 2 {
        return Err(unsupported("missing multicodec prefix"));
    }
    let (prefix, point) = bytes.split_at(2);

    if prefix == SECP256K1_MULTICODEC {
        k256::ecdsa::VerifyingKey::from_sec1_bytes(point)
            .map(PublicKey::Secp256k1)
            .map_err(|e| unsupported(&format!("invalid secp256k1 point: {}", e)))
    } else if prefix == P256_MULTICODEC {
        p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
            .map(PublicKey::P256)
            .map_err(|e| unsupported(&format!("invalid p256 point: {}", e)))
    } else {
        Err(unsupported(&format!(
            "unrecognized multicodec prefix {}",
            hex::encode(prefix)
        )))
    }
}

/// Verify `signature` over `message` with the key named by `key`
///
/// Fails only when the key itself cannot be parsed.
pub fn verify_signature(key: &str, message: &[u8], signature: &[u8]) -> PlcResult<bool> {
    let public_key = parse_did_key(key)?;
    Ok(public_key.verify(message, signature))
}
