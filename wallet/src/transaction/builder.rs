//! Transaction construction via the builder pattern.
//!
//! [`TxBuilder`] collects the payload fields, then [`TxBuilder::sign`]
//! computes the canonical signing bytes once and asks every
//! [`PredicateInput`] for its proof over them. Nothing about the proofs
//! feeds back into the payload, so the signing bytes are stable across
//! however many proofs get attached.

use super::types::{ClientMetadata, EncodingError, Payload, TransactionOrder, TxAttributes};
use crate::predicate::PredicateInput;
use crate::unit::UnitId;

/// Fluent builder for [`TransactionOrder`]s.
///
/// ```rust
/// use token_wallet::predicate::PredicateInput;
/// use token_wallet::transaction::{TxAttributes, TxBuilder, UnlockAttributes};
/// use token_wallet::unit::{UnitId, FUNGIBLE_TOKEN_TAG};
///
/// let order = TxBuilder::new(2, UnitId::random(FUNGIBLE_TOKEN_TAG),
///         TxAttributes::Unlock(UnlockAttributes { counter: 3 }))
///     .timeout_round(42)
///     .max_fee(10)
///     .sign(&PredicateInput::nil(), &[])
///     .unwrap();
/// assert_eq!(order.timeout_round(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct TxBuilder {
    partition_id: u32,
    unit_id: UnitId,
    attributes: TxAttributes,
    timeout_round: u64,
    max_fee: u64,
    fee_credit_record_id: Option<UnitId>,
}

impl TxBuilder {
    pub fn new(partition_id: u32, unit_id: UnitId, attributes: TxAttributes) -> Self {
        Self {
            partition_id,
            unit_id,
            attributes,
            timeout_round: 0,
            max_fee: 0,
            fee_credit_record_id: None,
        }
    }

    pub fn timeout_round(mut self, round: u64) -> Self {
        self.timeout_round = round;
        self
    }

    pub fn max_fee(mut self, fee: u64) -> Self {
        self.max_fee = fee;
        self
    }

    pub fn fee_credit_record_id(mut self, id: UnitId) -> Self {
        self.fee_credit_record_id = Some(id);
        self
    }

    /// The payload as it stands, unsigned.
    pub fn payload(&self) -> Payload {
        Payload {
            partition_id: self.partition_id,
            unit_id: self.unit_id.clone(),
            attributes: self.attributes.clone(),
            client_metadata: ClientMetadata {
                timeout_round: self.timeout_round,
                max_fee: self.max_fee,
                fee_credit_record_id: self.fee_credit_record_id.clone(),
            },
        }
    }

    /// Signs the payload with `owner` and one proof per `type_proofs`
    /// entry, in the order given.
    pub fn sign(
        self,
        owner: &PredicateInput,
        type_proofs: &[PredicateInput],
    ) -> Result<TransactionOrder, EncodingError> {
        let payload = self.payload();
        let signing_bytes = payload.signing_bytes()?;

        Ok(TransactionOrder {
            owner_proof: owner.proof(&signing_bytes),
            type_proofs: type_proofs
                .iter()
                .map(|input| input.proof(&signing_bytes))
                .collect(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::AccountKey;
    use crate::predicate::templates;
    use crate::transaction::types::{LockAttributes, UnlockAttributes};
    use crate::unit::{NFT_TAG, FEE_CREDIT_RECORD_TAG};

    #[test]
    fn builder_sets_client_metadata() {
        let fcr = UnitId::random(FEE_CREDIT_RECORD_TAG);
        let unit = UnitId::random(NFT_TAG);
        let payload = TxBuilder::new(
            2,
            unit.clone(),
            TxAttributes::Unlock(UnlockAttributes { counter: 1 }),
        )
        .timeout_round(15)
        .max_fee(7)
        .fee_credit_record_id(fcr.clone())
        .payload();

        assert_eq!(payload.partition_id, 2);
        assert_eq!(payload.unit_id, unit);
        assert_eq!(payload.client_metadata.timeout_round, 15);
        assert_eq!(payload.client_metadata.max_fee, 7);
        assert_eq!(payload.client_metadata.fee_credit_record_id, Some(fcr));
    }

    #[test]
    fn all_proofs_sign_the_same_bytes() {
        let owner = AccountKey::generate();
        let root_type_owner = AccountKey::generate();
        let leaf_type_owner = AccountKey::generate();

        let order = TxBuilder::new(
            2,
            UnitId::random(NFT_TAG),
            TxAttributes::Lock(LockAttributes {
                lock_status: 1,
                counter: 0,
            }),
        )
        .timeout_round(5)
        .sign(
            &PredicateInput::Key(owner.clone()),
            &[
                PredicateInput::Key(root_type_owner.clone()),
                PredicateInput::Key(leaf_type_owner.clone()),
            ],
        )
        .unwrap();

        let signing_bytes = order.signing_bytes().unwrap();
        assert!(templates::verify_p2pkh(
            &templates::p2pkh(&owner.pub_key_hash()),
            &order.owner_proof,
            &signing_bytes
        ));
        assert_eq!(order.type_proofs.len(), 2);
        assert!(templates::verify_p2pkh(
            &templates::p2pkh(&root_type_owner.pub_key_hash()),
            &order.type_proofs[0],
            &signing_bytes
        ));
        assert!(templates::verify_p2pkh(
            &templates::p2pkh(&leaf_type_owner.pub_key_hash()),
            &order.type_proofs[1],
            &signing_bytes
        ));
    }
}
