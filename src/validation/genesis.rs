/// Genesis operation validation
use super::authority::{assert_supported_keys, verify_signed_by};
use crate::{
    error::{PlcError, PlcResult},
    operations::{did_with_suffix_len, Document, Operation},
};

/// Hash characters compared when checking a claimed identifier
const DID_CHECK_LEN: usize = 64;

/// Shortest identifier accepted (`did:plc:` plus 24 hash characters)
pub const MIN_DID_LEN: usize = 32;

/// Validate the first operation of a log and bind it to `did`
pub fn validate_genesis(did: &str, op: &Operation) -> PlcResult<Document> {
    let normalized = op.normalized().ok_or_else(|| {
        PlcError::MisorderedOperation("a log cannot begin with a tombstone".to_string())
    })?;
    if normalized.prev.is_some() {
        return Err(PlcError::MisorderedOperation(
            "genesis operation must have a null prev".to_string(),
        ));
    }

    assert_supported_keys(&normalized)?;
    verify_signed_by(&normalized.rotation_keys, op)?;

    let expected = did_with_suffix_len(op, DID_CHECK_LEN)?;
    if did.len() < MIN_DID_LEN {
        return Err(PlcError::ImproperOperation(format!(
            "identifier {} is shorter than {} characters",
            did, MIN_DID_LEN
        )));
    }
    if !expected.starts_with(did) {
        return Err(PlcError::GenesisHashError { expected });
    }

    Ok(Document::from_op(did, &normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::plc::{PlcOperationBuilder, PlcSigner};
    use crate::operations::{did_for_genesis, tombstone, LegacyCreate};

    fn signed_genesis(signer: &PlcSigner) -> Operation {
        let op = PlcOperationBuilder::new()
            .rotation_keys(vec![signer.did_key()])
            .verification_method("atproto", signer.did_key())
            .also_known_as(vec!["at://alice.test".to_string()])
            .service("atproto_pds", "AtprotoPersonalDataServer", "https://pds.test")
            .build()
            .unwrap();
        signer.sign_operation(op).unwrap()
    }

    #[test]
    fn test_valid_genesis() {
        let signer = PlcSigner::new(&[5u8; 32]).unwrap();
        let op = signed_genesis(&signer);
        let did = did_for_genesis(&op).unwrap();

        let doc = validate_genesis(&did, &op).unwrap();
        assert_eq!(doc.did, did);
        assert_eq!(doc.rotation_keys, vec![signer.did_key()]);
        assert_eq!(doc.also_known_as, vec!["at://alice.test".to_string()]);
    }

    #[test]
    fn test_longer_prefix_is_accepted() {
        let signer = PlcSigner::new(&[5u8; 32]).unwrap();
        let op = signed_genesis(&signer);
        let full = did_with_suffix_len(&op, 64).unwrap();

        assert!(validate_genesis(&full, &op).is_ok());
        assert!(validate_genesis(&full[..40], &op).is_ok());
    }

    #[test]
    fn test_wrong_did_is_hash_error() {
        let signer = PlcSigner::new(&[5u8; 32]).unwrap();
        let op = signed_genesis(&signer);
        let other = signed_genesis(&PlcSigner::new(&[6u8; 32]).unwrap());
        let other_did = did_for_genesis(&other).unwrap();

        match validate_genesis(&other_did, &op) {
            Err(PlcError::GenesisHashError { expected }) => {
                assert!(expected.starts_with(&did_for_genesis(&op).unwrap()))
            }
            other => panic!("expected GenesisHashError, got {:?}", other),
        }
    }

    #[test]
    fn test_short_did_is_improper() {
        let signer = PlcSigner::new(&[5u8; 32]).unwrap();
        let op = signed_genesis(&signer);
        let did = did_for_genesis(&op).unwrap();

        assert!(matches!(
            validate_genesis(&did[..20], &op),
            Err(PlcError::ImproperOperation(_))
        ));
    }

    #[test]
    fn test_genesis_must_be_self_signed() {
        let signer = PlcSigner::new(&[5u8; 32]).unwrap();
        let outsider = PlcSigner::new(&[6u8; 32]).unwrap();
        let op = PlcOperationBuilder::new()
            .rotation_keys(vec![signer.did_key()])
            .build()
            .unwrap();
        let op = outsider.sign_operation(op).unwrap();
        let did = did_for_genesis(&op).unwrap();

        assert!(matches!(
            validate_genesis(&did, &op),
            Err(PlcError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_tombstone_or_prev_is_misordered() {
        let signer = PlcSigner::new(&[5u8; 32]).unwrap();
        let genesis = signed_genesis(&signer);
        let did = did_for_genesis(&genesis).unwrap();
        let cid = genesis.cid().unwrap();

        let dead = signer.sign_operation(tombstone(&cid)).unwrap();
        assert!(matches!(
            validate_genesis(&did, &dead),
            Err(PlcError::MisorderedOperation(_))
        ));

        let with_prev = PlcOperationBuilder::new()
            .rotation_keys(vec![signer.did_key()])
            .prev(&cid)
            .build()
            .unwrap();
        let with_prev = signer.sign_operation(with_prev).unwrap();
        assert!(matches!(
            validate_genesis(&did, &with_prev),
            Err(PlcError::MisorderedOperation(_))
        ));
    }

    #[test]
    fn test_legacy_create_genesis() {
        let signing = PlcSigner::new(&[7u8; 32]).unwrap();
        let recovery = PlcSigner::new(&[8u8; 32]).unwrap();
        let op = Operation::Legacy(LegacyCreate {
            signing_key: signing.did_key(),
            recovery_key: recovery.did_key(),
            handle: "alice.test".to_string(),
            service: "https://pds.test".to_string(),
            prev: None,
            sig: String::new(),
        });
        let op = signing.sign_operation(op).unwrap();
        let did = did_for_genesis(&op).unwrap();

        let doc = validate_genesis(&did, &op).unwrap();
        assert_eq!(doc.rotation_keys, vec![recovery.did_key(), signing.did_key()]);
        assert_eq!(doc.verification_methods["atproto"], signing.did_key());
        assert_eq!(doc.services["atproto_pds"].endpoint, "https://pds.test");
    }

    #[test]
    fn test_malleated_signature_does_not_mint_second_did() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use p256::elliptic_curve::ff::PrimeField;

        let signer = PlcSigner::new_p256(&[13u8; 32]).unwrap();
        let op = signed_genesis(&signer);
        let did = did_for_genesis(&op).unwrap();
        validate_genesis(&did, &op).unwrap();

        let sig = URL_SAFE_NO_PAD.decode(op.sig()).unwrap();
        let low = p256::ecdsa::Signature::from_slice(&sig).unwrap();
        let (r, s) = low.split_scalars();
        let high = p256::ecdsa::Signature::from_scalars(r.to_repr(), (-*s).to_repr()).unwrap();

        let mut copy = op.clone();
        copy.set_sig(URL_SAFE_NO_PAD.encode(high.to_bytes()));
        let copy_did = did_for_genesis(&copy).unwrap();
        assert_ne!(copy_did, did);

        let err = validate_genesis(&copy_did, &copy).unwrap_err();
        assert!(matches!(err, PlcError::InvalidSignature(_)));
    }
}
