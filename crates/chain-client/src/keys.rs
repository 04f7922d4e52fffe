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

use std::collections::BTreeMap;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes};
use hub_relayer_types::Identity;
use hub_relayer_utils::{Error, Result};

use crate::KeyManager;

/// Keeps the manager and worker keys in process memory.
#[derive(Debug, Clone)]
pub struct LocalKeyManager {
    chain_id: u64,
    wallets: BTreeMap<Identity, LocalWallet>,
}

impl LocalKeyManager {
    pub fn new(
        chain_id: u64,
        manager: LocalWallet,
        workers: impl IntoIterator<Item = LocalWallet>,
    ) -> Self {
        let mut wallets = BTreeMap::new();
        wallets.insert(Identity::Manager, manager.with_chain_id(chain_id));
        for (index, worker) in workers.into_iter().enumerate() {
            wallets.insert(
                Identity::Worker(index as u32),
                worker.with_chain_id(chain_id),
            );
        }
        Self { chain_id, wallets }
    }

    /// Fresh random keys for the manager and `workers` workers, lost on exit.
    pub fn random(chain_id: u64, workers: u32) -> Self {
        let mut rng = rand::thread_rng();
        let manager = LocalWallet::new(&mut rng);
        let workers: Vec<_> =
            (0..workers).map(|_| LocalWallet::new(&mut rng)).collect();
        Self::new(chain_id, manager, workers)
    }

    fn wallet(&self, identity: Identity) -> Result<&LocalWallet> {
        self.wallets
            .get(&identity)
            .ok_or_else(|| Error::UnknownIdentity {
                identity: identity.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl KeyManager for LocalKeyManager {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn identities(&self) -> Vec<Identity> {
        self.wallets.keys().copied().collect()
    }

    fn address(&self, identity: Identity) -> Result<Address> {
        self.wallet(identity).map(Signer::address)
    }

    async fn sign_transaction(
        &self,
        identity: Identity,
        tx: &TypedTransaction,
    ) -> Result<Bytes> {
        let wallet = self.wallet(identity)?;
        let mut tx = tx.clone();
        tx.set_chain_id(self.chain_id);
        tx.set_from(wallet.address());
        let signature = wallet.sign_transaction_sync(&tx).map_err(|e| {
            Error::SigningUnavailable {
                identity: identity.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(tx.rlp_signed(&signature))
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{TransactionRequest, U256};
    use ethers::utils::rlp::Rlp;

    use super::*;

    #[tokio::test]
    async fn signs_for_known_identities_only() {
        let keys = LocalKeyManager::random(1337, 2);
        assert_eq!(
            keys.identities(),
            vec![Identity::Manager, Identity::Worker(0), Identity::Worker(1)]
        );
        let tx: TypedTransaction = TransactionRequest::new()
            .to(Address::repeat_byte(1))
            .value(U256::from(10))
            .nonce(0)
            .gas(21_000)
            .gas_price(1_000_000_000u64)
            .into();
        let raw = keys.sign_transaction(Identity::Worker(1), &tx).await.unwrap();
        let (decoded, signature) =
            TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
        let signer = signature.recover(decoded.sighash()).unwrap();
        assert_eq!(signer, keys.address(Identity::Worker(1)).unwrap());
        assert_eq!(decoded.chain_id(), Some(1337u64.into()));

        let err = keys
            .sign_transaction(Identity::Worker(5), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownIdentity { .. }));
    }
}
