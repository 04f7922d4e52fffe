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

//! Types shared between the hub relayer crates: signing identities, stored
//! transactions, hub events and the relay request wire format.

/// Amounts of wei as they appear in config files.
pub mod amount;
/// Events emitted by the relay hub and the stake manager.
pub mod hub;
/// Signing identities.
pub mod identity;
/// Private keys loaded from config or the environment.
pub mod private_key;
/// Relay request and response payloads.
pub mod relay;
/// RPC endpoint url.
pub mod rpc_url;
/// Transactions signed by the relayer.
pub mod transaction;

pub use amount::Amount;
pub use hub::{HubEvent, LoggedEvent, PaymasterGasLimits, StakeInfo};
pub use identity::Identity;
pub use transaction::{ServerAction, StoredTransaction};

/// Resolves `$VAR` references to the value of the environment variable,
/// anything else is returned as is.
pub(crate) fn from_env_or_literal(value: &str) -> Result<String, String> {
    match value.strip_prefix('$') {
        Some(var) => {
            tracing::trace!("Reading {} from env", var);
            std::env::var(var).map_err(|e| {
                format!("error while loading this env {var}: {e}")
            })
        }
        None => Ok(value.to_owned()),
    }
}
