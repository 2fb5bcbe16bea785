//! Built-in predicate templates and the P2PKH proof format.
//!
//! A predicate is opaque bytes to everyone but the validators. The wallet
//! only ever needs to *produce* three shapes and *recognize* one:
//!
//! | Template      | Bytes                        |
//! |---------------|------------------------------|
//! | always-false  | `83 00`                      |
//! | always-true   | `83 01`                      |
//! | P2PKH         | `83 02` ++ sha256(pubkey)    |
//!
//! A P2PKH proof is `signature(64) ++ public_key(32)`.

use crate::crypto::keys::{AccountKey, PubKeyHash, PublicKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Leading byte shared by all built-in templates.
pub const TEMPLATE_MARKER: u8 = 0x83;

pub const ALWAYS_FALSE_ID: u8 = 0x00;
pub const ALWAYS_TRUE_ID: u8 = 0x01;
pub const P2PKH_ID: u8 = 0x02;

/// Length of a P2PKH predicate.
pub const P2PKH_PREDICATE_LENGTH: usize = 2 + 32;

/// Length of a P2PKH proof.
pub const P2PKH_PROOF_LENGTH: usize = SIGNATURE_LENGTH + PUBLIC_KEY_LENGTH;

pub fn always_true() -> Vec<u8> {
    vec![TEMPLATE_MARKER, ALWAYS_TRUE_ID]
}

pub fn always_false() -> Vec<u8> {
    vec![TEMPLATE_MARKER, ALWAYS_FALSE_ID]
}

/// P2PKH predicate committing to `pub_key_hash`.
pub fn p2pkh(pub_key_hash: &PubKeyHash) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(P2PKH_PREDICATE_LENGTH);
    bytes.push(TEMPLATE_MARKER);
    bytes.push(P2PKH_ID);
    bytes.extend_from_slice(pub_key_hash);
    bytes
}

/// The key hash a P2PKH predicate commits to, or `None` for any other
/// predicate.
pub fn p2pkh_hash(predicate: &[u8]) -> Option<PubKeyHash> {
    match predicate {
        [TEMPLATE_MARKER, P2PKH_ID, hash @ ..] => hash.try_into().ok(),
        _ => None,
    }
}

/// Signs `signing_bytes` and packs the P2PKH proof.
pub fn p2pkh_proof(key: &AccountKey, signing_bytes: &[u8]) -> Vec<u8> {
    let mut proof = Vec::with_capacity(P2PKH_PROOF_LENGTH);
    proof.extend_from_slice(&key.sign(signing_bytes));
    proof.extend_from_slice(key.public_key().as_bytes());
    proof
}

/// Public key carried by a P2PKH proof, if `proof` has that shape.
pub fn proof_public_key(proof: &[u8]) -> Option<PublicKey> {
    if proof.len() != P2PKH_PROOF_LENGTH {
        return None;
    }
    PublicKey::try_from_slice(&proof[SIGNATURE_LENGTH..]).ok()
}

/// Checks a P2PKH proof against a P2PKH predicate. Any other predicate
/// shape returns `false`; only validators evaluate those.
pub fn verify_p2pkh(predicate: &[u8], proof: &[u8], signing_bytes: &[u8]) -> bool {
    let (Some(expected), Some(public_key)) = (p2pkh_hash(predicate), proof_public_key(proof)) else {
        return false;
    };
    public_key.key_hash() == expected
        && public_key.verify(signing_bytes, &proof[..SIGNATURE_LENGTH])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_bytes() {
        assert_eq!(always_true(), vec![0x83, 0x01]);
        assert_eq!(always_false(), vec![0x83, 0x00]);
        let p = p2pkh(&[7u8; 32]);
        assert_eq!(p.len(), P2PKH_PREDICATE_LENGTH);
        assert_eq!(&p[..2], &[0x83, 0x02]);
    }

    #[test]
    fn p2pkh_hash_recognizes_only_p2pkh() {
        assert_eq!(p2pkh_hash(&p2pkh(&[7u8; 32])), Some([7u8; 32]));
        assert_eq!(p2pkh_hash(&always_true()), None);
        assert_eq!(p2pkh_hash(&[0x83, 0x02, 1, 2, 3]), None);
    }

    #[test]
    fn proof_verifies_against_owner_predicate() {
        let key = AccountKey::generate();
        let predicate = p2pkh(&key.pub_key_hash());
        let proof = p2pkh_proof(&key, b"signing bytes");

        assert_eq!(proof.len(), P2PKH_PROOF_LENGTH);
        assert_eq!(proof_public_key(&proof), Some(key.public_key()));
        assert!(verify_p2pkh(&predicate, &proof, b"signing bytes"));
        assert!(!verify_p2pkh(&predicate, &proof, b"other bytes"));

        let stranger = AccountKey::generate();
        assert!(!verify_p2pkh(
            &p2pkh(&stranger.pub_key_hash()),
            &proof,
            b"signing bytes"
        ));
    }
}
