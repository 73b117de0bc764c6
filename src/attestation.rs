//! Gateway attestation verification
//!
//! An attestation is the sole trust boundary between off-chain query
//! execution and bridge state: a signature over (requestCID, responseCID,
//! deploymentID) whose recovered signer must hold sufficient slashable stake.
//! Verification is stateless and re-run on every call that presents one.

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::host::StakingLedger;
use crate::types::{Attestation, RequestCid, ResponseCid};

/// Keccak256 over the canonical byte concatenation the gateway signs.
pub fn attestation_digest(
    request_cid: RequestCid,
    response_cid: ResponseCid,
    subgraph_deployment_id: B256,
) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(request_cid.as_slice());
    hasher.update(response_cid.as_slice());
    hasher.update(subgraph_deployment_id.as_slice());
    B256::from_slice(&hasher.finalize())
}

/// Recover the signing identity from an attestation's signature.
pub fn recover_signer(attestation: &Attestation) -> Result<Address> {
    let digest = attestation_digest(
        attestation.request_cid,
        attestation.response_cid,
        attestation.subgraph_deployment_id,
    );

    let recovery_id = recovery_id_from_v(attestation.v)?;
    let signature = Signature::from_scalars(attestation.r.0, attestation.s.0)
        .map_err(|e| BridgeError::Validation(format!("malformed attestation signature: {}", e)))?;

    let verifying_key =
        VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map_err(|e| BridgeError::Validation(format!("signature recovery failed: {}", e)))?;

    Ok(address_from_key(&verifying_key))
}

/// Verify `attestation` against locally recomputed expectations and return
/// the recovered, sufficiently staked signer.
pub fn verify_attestation<L: StakingLedger>(
    attestation: &Attestation,
    expected_request_cid: RequestCid,
    expected_response_cid: ResponseCid,
    expected_deployment_id: B256,
    minimum_slashable_stake: u128,
    ledger: &L,
) -> Result<Address> {
    if attestation.subgraph_deployment_id != expected_deployment_id {
        return Err(BridgeError::Authorization(format!(
            "attestation is for deployment {}, expected {}",
            attestation.subgraph_deployment_id, expected_deployment_id
        )));
    }
    if attestation.request_cid != expected_request_cid {
        return Err(BridgeError::Consistency(format!(
            "attestation request CID {} does not match recomputed {}",
            attestation.request_cid, expected_request_cid
        )));
    }
    if attestation.response_cid != expected_response_cid {
        return Err(BridgeError::Consistency(format!(
            "attestation response CID {} does not match recomputed {}",
            attestation.response_cid, expected_response_cid
        )));
    }

    let signer = recover_signer(attestation)?;
    let stake = ledger.slashable_stake(signer);
    if stake < minimum_slashable_stake {
        return Err(BridgeError::Authorization(format!(
            "signer {} holds {} slashable stake, bridge requires {}",
            signer, stake, minimum_slashable_stake
        )));
    }

    debug!("Attestation verified: signer={} stake={}", signer, stake);
    Ok(signer)
}

fn recovery_id_from_v(v: u8) -> Result<RecoveryId> {
    // Accept both raw (0/1) and Ethereum-style (27/28) recovery bytes.
    let byte = if v >= 27 { v - 27 } else { v };
    RecoveryId::from_byte(byte)
        .ok_or_else(|| BridgeError::Validation(format!("invalid recovery byte: {}", v)))
}

fn address_from_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let mut hasher = Keccak256::new();
    hasher.update(&encoded.as_bytes()[1..]); // skip the 0x04 prefix
    let hash = hasher.finalize();
    Address::from_slice(&hash[12..])
}

/// Produce a valid attestation for tests, signed with a key derived from
/// `seed`. Returns the attestation and the signer's address.
#[cfg(test)]
pub(crate) fn sign_test_attestation(
    seed: &[u8],
    request_cid: RequestCid,
    response_cid: ResponseCid,
    subgraph_deployment_id: B256,
) -> (Attestation, Address) {
    use k256::ecdsa::SigningKey;

    let key_bytes = {
        let mut hasher = Keccak256::new();
        hasher.update(seed);
        hasher.finalize()
    };
    let signing_key = SigningKey::from_slice(&key_bytes).unwrap();
    let digest = attestation_digest(request_cid, response_cid, subgraph_deployment_id);
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(digest.as_slice())
        .unwrap();

    let signature_bytes = signature.to_bytes();
    let attestation = Attestation {
        request_cid,
        response_cid,
        subgraph_deployment_id,
        r: B256::from_slice(&signature_bytes[..32]),
        s: B256::from_slice(&signature_bytes[32..]),
        v: 27 + recovery_id.to_byte(),
    };
    let signer = address_from_key(signing_key.verifying_key());
    (attestation, signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::keccak;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestLedger {
        slashable: HashMap<Address, u128>,
    }

    impl StakingLedger for TestLedger {
        fn slashable_stake(&self, signer: Address) -> u128 {
            self.slashable.get(&signer).copied().unwrap_or(0)
        }

        fn external_stake(&self, _staker: Address, _token: Address) -> u128 {
            0
        }

        fn slash(&mut self, _identity: Address, _amount: u128) -> Result<()> {
            Ok(())
        }

        fn reward(&mut self, _identity: Address, _amount: u128) -> Result<()> {
            Ok(())
        }
    }

    fn fixture() -> (Attestation, Address, TestLedger) {
        let request_cid = keccak(b"query");
        let response_cid = keccak(b"response");
        let deployment = keccak(b"deployment");
        let (attestation, signer) =
            sign_test_attestation(b"indexer-key", request_cid, response_cid, deployment);

        let mut ledger = TestLedger::default();
        ledger.slashable.insert(signer, 100);
        (attestation, signer, ledger)
    }

    #[test]
    fn recovers_the_signing_address() {
        let (attestation, signer, _) = fixture();
        assert_eq!(recover_signer(&attestation).unwrap(), signer);
    }

    #[test]
    fn verifies_a_well_formed_attestation() {
        let (attestation, signer, ledger) = fixture();
        let recovered = verify_attestation(
            &attestation,
            keccak(b"query"),
            keccak(b"response"),
            keccak(b"deployment"),
            100,
            &ledger,
        )
        .unwrap();
        assert_eq!(recovered, signer);
    }

    #[test]
    fn response_tampering_is_a_consistency_error() {
        let (attestation, _, ledger) = fixture();
        let err = verify_attestation(
            &attestation,
            keccak(b"query"),
            keccak(b"tampered response"),
            keccak(b"deployment"),
            100,
            &ledger,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Consistency(_)));
    }

    #[test]
    fn request_mismatch_is_a_consistency_error() {
        let (attestation, _, ledger) = fixture();
        let err = verify_attestation(
            &attestation,
            keccak(b"some other query"),
            keccak(b"response"),
            keccak(b"deployment"),
            100,
            &ledger,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Consistency(_)));
    }

    #[test]
    fn wrong_deployment_is_an_authorization_error() {
        let (attestation, _, ledger) = fixture();
        let err = verify_attestation(
            &attestation,
            keccak(b"query"),
            keccak(b"response"),
            keccak(b"another deployment"),
            100,
            &ledger,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Authorization(_)));
    }

    #[test]
    fn understaked_signer_is_an_authorization_error() {
        let (attestation, _, ledger) = fixture();
        let err = verify_attestation(
            &attestation,
            keccak(b"query"),
            keccak(b"response"),
            keccak(b"deployment"),
            101,
            &ledger,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Authorization(_)));
    }

    #[test]
    fn unknown_signer_is_an_authorization_error() {
        let (attestation, _, _) = fixture();
        let empty_ledger = TestLedger::default();
        let err = verify_attestation(
            &attestation,
            keccak(b"query"),
            keccak(b"response"),
            keccak(b"deployment"),
            1,
            &empty_ledger,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Authorization(_)));
    }

    #[test]
    fn invalid_recovery_byte_is_a_validation_error() {
        let (mut attestation, _, _) = fixture();
        attestation.v = 99;
        let err = recover_signer(&attestation).unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn forged_signature_recovers_a_different_address() {
        let (mut attestation, signer, _) = fixture();
        attestation.s = keccak(b"not the real s");
        match recover_signer(&attestation) {
            Ok(recovered) => assert_ne!(recovered, signer),
            // Some corrupted scalars fail recovery outright, which is fine.
            Err(err) => assert!(matches!(err, BridgeError::Validation(_))),
        }
    }
}
