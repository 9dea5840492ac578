/// Cryptography module for PLC operations and key management
///
/// Handles did:key parsing, signature verification and operation signing
/// for secp256k1 and P-256 rotation keys.

pub mod did_key;
pub mod plc;

pub use did_key::{parse_did_key, verify_signature, KeyAlgorithm, PublicKey};
pub use plc::PlcSigner;
