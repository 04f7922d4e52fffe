// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Relayer Store Module 🕸️
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store keeps every transaction the relayer signed until it is
//! confirmed deep enough on chain. Records are keyed by their id, with a
//! unique secondary index on `(signer, nonce)` so a nonce can never be used
//! by two stored transactions of the same signer.
use std::sync::Arc;

use ethers::types::{Address, H256};
use hub_relayer_types::StoredTransaction;
use hub_relayer_utils::Result;

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// Durable store of the transactions signed by the relayer.
///
/// Writers are serialized by the transaction manager, the store only
/// enforces the `(signer, nonce)` uniqueness.
pub trait TxStore: Send + Sync {
    /// Inserts a record.
    ///
    /// When a record with the same `(from, nonce)` exists, fails with
    /// [`hub_relayer_utils::Error::DuplicateNonce`] unless `allow_update` is
    /// set, in which case the old record is replaced. The write is durable
    /// once this returns.
    fn put(&self, tx: &StoredTransaction, allow_update: bool) -> Result<()>;
    /// Looks a record up by its id.
    fn get_by_id(&self, id: H256) -> Result<Option<StoredTransaction>>;
    /// Looks a record up by its signer and nonce.
    fn get_by_nonce(
        &self,
        signer: Address,
        nonce: u64,
    ) -> Result<Option<StoredTransaction>>;
    /// All records of a signer, by ascending nonce.
    fn get_all_for_signer(
        &self,
        signer: Address,
    ) -> Result<Vec<StoredTransaction>>;
    /// All records, ordered by signer then nonce.
    fn get_all(&self) -> Result<Vec<StoredTransaction>>;
    /// Deletes every record of `signer` with a nonce lower than or equal to
    /// `nonce`, returns how many were removed.
    fn remove_up_to_nonce(&self, signer: Address, nonce: u64) -> Result<usize>;
    /// Deletes everything.
    fn clear_all(&self) -> Result<()>;
}

impl<S> TxStore for Arc<S>
where
    S: TxStore + ?Sized,
{
    fn put(&self, tx: &StoredTransaction, allow_update: bool) -> Result<()> {
        S::put(self, tx, allow_update)
    }

    fn get_by_id(&self, id: H256) -> Result<Option<StoredTransaction>> {
        S::get_by_id(self, id)
    }

    fn get_by_nonce(
        &self,
        signer: Address,
        nonce: u64,
    ) -> Result<Option<StoredTransaction>> {
        S::get_by_nonce(self, signer, nonce)
    }

    fn get_all_for_signer(
        &self,
        signer: Address,
    ) -> Result<Vec<StoredTransaction>> {
        S::get_all_for_signer(self, signer)
    }

    fn get_all(&self) -> Result<Vec<StoredTransaction>> {
        S::get_all(self)
    }

    fn remove_up_to_nonce(&self, signer: Address, nonce: u64) -> Result<usize> {
        S::remove_up_to_nonce(self, signer, nonce)
    }

    fn clear_all(&self) -> Result<()> {
        S::clear_all(self)
    }
}

/// Behaviour every [`TxStore`] backend must show, shared by the backend tests.
#[cfg(test)]
pub(crate) mod conformance {
    use ethers::types::{Bytes, U256};
    use hub_relayer_types::{Identity, ServerAction};
    use hub_relayer_utils::Error;

    use super::*;

    pub fn record(signer: u8, nonce: u64, gas_price: u64) -> StoredTransaction {
        let mut id = [0u8; 32];
        id[0] = signer;
        id[1..9].copy_from_slice(&nonce.to_be_bytes());
        id[9..17].copy_from_slice(&gas_price.to_be_bytes());
        StoredTransaction {
            id: H256(id),
            identity: Identity::Worker(u32::from(signer)),
            from: Address::repeat_byte(signer),
            to: Address::repeat_byte(0xaa),
            value: U256::zero(),
            gas_limit: U256::from(21_000),
            gas_price: U256::from(gas_price),
            data: Bytes::default(),
            nonce,
            attempts: 1,
            action: ServerAction::RelayCall,
            creation_block: 1,
            mined_block: None,
        }
    }

    pub fn duplicate_nonce_is_rejected<S: TxStore>(store: &S) {
        let first = record(1, 0, 10);
        store.put(&first, false).unwrap();
        let conflicting = record(1, 0, 20);
        let err = store.put(&conflicting, false).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateNonce { nonce: 0, signer } if signer == first.from
        ));
        // nothing of the rejected record was written.
        assert_eq!(store.get_by_id(conflicting.id).unwrap(), None);
        assert_eq!(store.get_by_nonce(first.from, 0).unwrap(), Some(first));
    }

    pub fn update_replaces_the_record<S: TxStore>(store: &S) {
        let first = record(1, 0, 10);
        store.put(&first, false).unwrap();
        let mut boosted = record(1, 0, 12);
        boosted.attempts = 2;
        store.put(&boosted, true).unwrap();
        assert_eq!(store.get_by_id(first.id).unwrap(), None);
        assert_eq!(
            store.get_by_nonce(first.from, 0).unwrap(),
            Some(boosted.clone())
        );
        assert_eq!(store.get_all().unwrap(), vec![boosted]);
    }

    pub fn signers_are_independent_and_ordered<S: TxStore>(store: &S) {
        for nonce in [2, 0, 1] {
            store.put(&record(1, nonce, 10), false).unwrap();
        }
        store.put(&record(2, 0, 10), false).unwrap();
        let nonces: Vec<_> = store
            .get_all_for_signer(Address::repeat_byte(1))
            .unwrap()
            .into_iter()
            .map(|tx| tx.nonce)
            .collect();
        assert_eq!(nonces, vec![0, 1, 2]);
        assert_eq!(store.get_all_for_signer(Address::repeat_byte(2)).unwrap().len(), 1);
        assert_eq!(store.get_all().unwrap().len(), 4);
    }

    pub fn remove_up_to_nonce_is_inclusive<S: TxStore>(store: &S) {
        for nonce in 0..5 {
            store.put(&record(1, nonce, 10), false).unwrap();
        }
        store.put(&record(2, 1, 10), false).unwrap();
        let removed = store.remove_up_to_nonce(Address::repeat_byte(1), 2).unwrap();
        assert_eq!(removed, 3);
        let nonces: Vec<_> = store
            .get_all_for_signer(Address::repeat_byte(1))
            .unwrap()
            .into_iter()
            .map(|tx| tx.nonce)
            .collect();
        assert_eq!(nonces, vec![3, 4]);
        // other signers are untouched.
        assert!(store.get_by_nonce(Address::repeat_byte(2), 1).unwrap().is_some());
        // the freed nonce can be stored again.
        store.put(&record(1, 0, 99), false).unwrap();
    }

    pub fn clear_all_empties_the_store<S: TxStore>(store: &S) {
        store.put(&record(1, 0, 10), false).unwrap();
        store.put(&record(2, 0, 10), false).unwrap();
        store.clear_all().unwrap();
        assert!(store.get_all().unwrap().is_empty());
        store.put(&record(1, 0, 10), false).unwrap();
    }
}
