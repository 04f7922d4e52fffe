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

//! End to end scenarios of a relay server over an in-memory chain.

mod common;

use ethers::types::U256;
use hub_relayer_store::TxStore;
use hub_relayer_types::ServerAction;
use hub_relayer_utils::{Error, RelayRequestError};

use common::*;

#[tokio::test]
async fn underpriced_request_is_rejected_before_signing() {
    let h = harness();
    h.ready_at(10).await;

    let offered = U256::from(GWEI / 2);
    let err = h
        .worker
        .create_relay_transaction(h.relay_request(offered))
        .await
        .unwrap_err();
    match &err {
        Error::RelayRequest(RelayRequestError::GasPriceTooLow {
            offered: o,
            current,
        }) => {
            assert_eq!(*o, offered);
            assert_eq!(*current, U256::from(GWEI));
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("500000000"));
    assert!(message.contains("1000000000"));
    assert!(h.store.get_all_for_signer(h.worker_address).unwrap().is_empty());
    assert!(h.chain.sent_by(h.worker_address).is_empty());
}

#[tokio::test]
async fn exact_stake_and_authorization_registers_in_one_tick() {
    let h = harness();
    h.stake_and_authorize();
    h.chain.set_block_number(10);

    h.worker.tick(10).await.unwrap();

    assert!(h.worker.snapshot().ready);
    assert!(h.worker.ping().await.ready);
    let registrations: Vec<_> = h
        .store
        .get_all()
        .unwrap()
        .into_iter()
        .filter(|tx| tx.action == ServerAction::RegisterServer)
        .collect();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].from, h.manager_address);
}

#[tokio::test]
async fn stuck_relay_call_is_replaced_once() {
    let h = harness();
    h.ready_at(100).await;
    let relayed = h
        .worker
        .create_relay_transaction(h.relay_request(U256::from(GWEI)))
        .await
        .unwrap();
    assert_eq!(relayed.nonce, 0);

    h.chain.set_block_number(130);
    let sent = h.worker.tick(130).await.unwrap();
    assert_eq!(sent.len(), 1);

    let records = h.store.get_all_for_signer(h.worker_address).unwrap();
    assert_eq!(records.len(), 1);
    let replacement = &records[0];
    assert_eq!(replacement.id, sent[0]);
    assert_eq!(replacement.nonce, 0);
    assert_eq!(replacement.attempts, 2);
    assert_eq!(replacement.gas_price, U256::from(GWEI * 12 / 10));
    assert_eq!(replacement.creation_block, 130);

    let broadcast = h.chain.sent_by(h.worker_address);
    assert_eq!(broadcast.len(), 2);
    assert!(broadcast.iter().all(|tx| tx.nonce == 0));

    // Not stuck anymore.
    h.chain.set_block_number(131);
    assert!(h.worker.tick(131).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_relay_requests_get_consecutive_nonces() {
    let h = harness();
    h.ready_at(10).await;
    let first = h.relay_request(U256::from(GWEI));
    let mut second = h.relay_request(U256::from(GWEI));
    second.relay_request.request.nonce = U256::one();

    let (a, b) = tokio::join!(
        h.worker.create_relay_transaction(first),
        h.worker.create_relay_transaction(second),
    );
    let mut nonces = vec![a.unwrap().nonce, b.unwrap().nonce];
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1]);
    assert_eq!(h.store.get_all_for_signer(h.worker_address).unwrap().len(), 2);
}
