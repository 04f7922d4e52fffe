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


mod info;
mod metric;
mod relay;

pub use info::*;
pub use metric::*;
pub use relay::*;

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use ethers::types::{Address, Bytes, H256, U256};
    use hub_relayer_types::relay::{
        PingResponse, RelayTransactionRequest, RelayTransactionResponse,
    };
    use hub_relayer_utils::metric::Metrics;
    use hub_relayer_utils::{Error, RelayRequestError, Result};
    use hub_relayer_worker::RelayApi;

    /// Accepts every request while `ready`, rejects them otherwise.
    pub struct StaticApi {
        pub ready: AtomicBool,
        pub metrics: Arc<Metrics>,
    }

    impl StaticApi {
        pub fn new(ready: bool) -> Arc<Self> {
            Arc::new(Self {
                ready: AtomicBool::new(ready),
                metrics: Arc::new(Metrics::new().unwrap()),
            })
        }
    }

    #[async_trait::async_trait]
    impl RelayApi for StaticApi {
        async fn create_relay_transaction(
            &self,
            request: RelayTransactionRequest,
        ) -> Result<RelayTransactionResponse> {
            if !self.ready.load(Ordering::SeqCst) {
                self.metrics.relay_requests_rejected.inc();
                return Err(Error::RelayRequest(RelayRequestError::NotReady(
                    "not registered".into(),
                )));
            }
            self.metrics.relay_requests_accepted.inc();
            Ok(RelayTransactionResponse {
                signed_tx: Bytes::from(vec![0xf8, 0x01]),
                tx_hash: H256::repeat_byte(0x11),
                nonce: request.metadata.relay_max_nonce,
            })
        }

        async fn ping(&self) -> Result<PingResponse> {
            Ok(PingResponse {
                relay_worker_address: Address::repeat_byte(0x01),
                relay_manager_address: Address::repeat_byte(0x02),
                relay_hub_address: Address::repeat_byte(0x03),
                owner_address: None,
                min_gas_price: U256::from(1_000_000_000u64),
                max_acceptance_budget: U256::from(285_252u64),
                chain_id: 1337,
                ready: self.ready.load(Ordering::SeqCst),
                version: "0.1.0".into(),
            })
        }

        fn metrics(&self) -> Arc<Metrics> {
            self.metrics.clone()
        }
    }
}
