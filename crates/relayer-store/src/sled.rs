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

use std::path::Path;

use ethers::types::{Address, H256};
use hub_relayer_types::StoredTransaction;
use hub_relayer_utils::{Error, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use crate::TxStore;

const TRANSACTIONS_TREE: &str = "transactions";
const NONCE_INDEX_TREE: &str = "transactions_by_nonce";

/// SledStore is a store that stores the transactions in a [Sled](https://sled.rs)-based database.
///
/// Records live in one tree keyed by id, a second tree maps
/// `signer ++ big endian nonce` to the id, so a prefix scan over a signer
/// yields its records by ascending nonce.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Opens (or creates) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore, removed once dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn trees(&self) -> Result<(sled::Tree, sled::Tree)> {
        Ok((
            self.db.open_tree(TRANSACTIONS_TREE)?,
            self.db.open_tree(NONCE_INDEX_TREE)?,
        ))
    }

    fn decode(bytes: &[u8]) -> Result<StoredTransaction> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn lookup(
        txs: &sled::Tree,
        id: impl AsRef<[u8]>,
    ) -> Result<Option<StoredTransaction>> {
        txs.get(id)?.map(|v| Self::decode(&v)).transpose()
    }
}

fn nonce_key(signer: Address, nonce: u64) -> [u8; 28] {
    let mut key = [0u8; 28];
    key[..20].copy_from_slice(signer.as_bytes());
    key[20..].copy_from_slice(&nonce.to_be_bytes());
    key
}

fn flatten(err: TransactionError<Error>) -> Error {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => Error::Sled(e),
    }
}

impl TxStore for SledStore {
    #[tracing::instrument(
        skip_all,
        fields(id = ?tx.id, signer = ?tx.from, nonce = tx.nonce, allow_update = %allow_update)
    )]
    fn put(&self, tx: &StoredTransaction, allow_update: bool) -> Result<()> {
        let (txs, index) = self.trees()?;
        let key = nonce_key(tx.from, tx.nonce);
        let value = serde_json::to_vec(tx)?;
        // both trees move together, or not at all.
        (&txs, &index)
            .transaction(|(txs, index)| {
                if let Some(old_id) = index.get(key)? {
                    if !allow_update {
                        return Err(ConflictableTransactionError::Abort(
                            Error::DuplicateNonce {
                                signer: tx.from,
                                nonce: tx.nonce,
                            },
                        ));
                    }
                    txs.remove(old_id)?;
                }
                index.insert(&key[..], tx.id.as_bytes())?;
                txs.insert(tx.id.as_bytes(), value.as_slice())?;
                Ok(())
            })
            .map_err(flatten)?;
        // flush the db to make sure we don't lose anything.
        self.db.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn get_by_id(&self, id: H256) -> Result<Option<StoredTransaction>> {
        let (txs, _) = self.trees()?;
        Self::lookup(&txs, id.as_bytes())
    }

    #[tracing::instrument(skip(self))]
    fn get_by_nonce(
        &self,
        signer: Address,
        nonce: u64,
    ) -> Result<Option<StoredTransaction>> {
        let (txs, index) = self.trees()?;
        match index.get(nonce_key(signer, nonce))? {
            Some(id) => Self::lookup(&txs, id),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    fn get_all_for_signer(
        &self,
        signer: Address,
    ) -> Result<Vec<StoredTransaction>> {
        let (txs, index) = self.trees()?;
        let mut records = Vec::new();
        for entry in index.scan_prefix(signer.as_bytes()) {
            let (_, id) = entry?;
            if let Some(tx) = Self::lookup(&txs, id)? {
                records.push(tx);
            }
        }
        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    fn get_all(&self) -> Result<Vec<StoredTransaction>> {
        let (txs, index) = self.trees()?;
        let mut records = Vec::new();
        for entry in index.iter() {
            let (_, id) = entry?;
            if let Some(tx) = Self::lookup(&txs, id)? {
                records.push(tx);
            }
        }
        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    fn remove_up_to_nonce(&self, signer: Address, nonce: u64) -> Result<usize> {
        let (txs, index) = self.trees()?;
        let range = nonce_key(signer, 0)..=nonce_key(signer, nonce);
        let doomed = index
            .range(range)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if doomed.is_empty() {
            return Ok(0);
        }
        (&txs, &index)
            .transaction(|(txs, index)| {
                for (key, id) in &doomed {
                    index.remove(&key[..])?;
                    txs.remove(&id[..])?;
                }
                Ok(())
            })
            .map_err(flatten)?;
        self.db.flush()?;
        Ok(doomed.len())
    }

    #[tracing::instrument(skip(self))]
    fn clear_all(&self) -> Result<()> {
        let (txs, index) = self.trees()?;
        txs.clear()?;
        index.clear()?;
        self.db.flush()?;
        Ok(())
    }
}
