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

//! # Relay Worker 🏃
//!
//! Drives the relay server one block at a time and answers relay requests.
//!
//! [`RelayWorker::tick`] refreshes the gas price and the manager balance,
//! feeds new hub events to the registration manager and, once the server is
//! registered, tops up the workers and replaces stuck transactions. Each tick
//! publishes a fresh [`WorkerSnapshot`] that relay requests are validated
//! against.

use std::sync::Arc;

use hub_relayer_types::relay::{
    PingResponse, RelayTransactionRequest, RelayTransactionResponse,
};
use hub_relayer_utils::metric::Metrics;
use hub_relayer_utils::Result;

/// Gas accounting of relayed calls.
pub mod fees;
mod validation;
mod worker;

pub use worker::{RelayWorker, WorkerSnapshot};

/// What the transport layer needs from the relay server.
#[async_trait::async_trait]
pub trait RelayApi: Send + Sync {
    /// Validates and signs a relay request.
    async fn create_relay_transaction(
        &self,
        request: RelayTransactionRequest,
    ) -> Result<RelayTransactionResponse>;
    /// Addresses and readiness of the server.
    async fn ping(&self) -> Result<PingResponse>;
    fn metrics(&self) -> Arc<Metrics>;
}
