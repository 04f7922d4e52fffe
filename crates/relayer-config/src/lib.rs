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

//! # Relayer Configuration Module 🕸️
//!
//! Everything the hub relayer reads from its config directory: the ledger
//! endpoint, contract addresses, keys, fee terms and the tuning knobs of the
//! transaction manager and the relay worker.
#![warn(missing_docs)]

/// Ledger endpoint and contract addresses.
pub mod chain;
/// Command line interface, logger and store setup.
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of the configuration.
pub mod defaults;
/// Registration, transaction manager and worker settings.
pub mod relay;
/// Config files discovery and parsing.
pub mod utils;

use chain::{ChainConfig, ContractsConfig, KeysConfig};
use relay::{RegistrationConfig, TxManagerConfig, WorkerConfig};
use serde::{Deserialize, Serialize};

/// HubRelayerConfig is the configuration for the hub relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HubRelayerConfig {
    /// Http Server Port number
    ///
    /// default to 8090
    #[serde(default = "defaults::relayer_port", skip_serializing)]
    pub port: u16,
    /// The ledger this relayer works on.
    pub chain: ChainConfig,
    /// Relay hub and stake manager deployment.
    pub contracts: ContractsConfig,
    /// Manager and worker keys.
    #[serde(default, skip_serializing)]
    pub keys: KeysConfig,
    /// Fee terms and staking requirements.
    pub registration: RegistrationConfig,
    /// Transaction manager tuning.
    #[serde(default)]
    pub tx_manager: TxManagerConfig,
    /// Worker loop and request validation policy.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl HubRelayerConfig {
    /// Makes sure that the config is valid, by going
    /// through the whole config and doing some basic checks.
    pub fn verify(&self) -> hub_relayer_utils::Result<()> {
        // Keys are only optional when explicitly running with throwaway keys.
        let has_keys =
            self.keys.manager.is_some() && !self.keys.workers.is_empty();
        if !has_keys && !self.keys.ephemeral {
            return Err(hub_relayer_utils::Error::MissingSecrets);
        }
        url::Url::parse(&self.registration.url)?;
        if self.tx_manager.retry_gas_price_percent < 100 {
            return Err(hub_relayer_utils::Error::Generic(
                "retry-gas-price-percent must be at least 100",
            ));
        }
        if self.worker.min_gas_price > self.tx_manager.max_gas_price {
            return Err(hub_relayer_utils::Error::Generic(
                "min-gas-price must not exceed max-gas-price",
            ));
        }
        if self.worker.max_blocks_per_step == 0 {
            return Err(hub_relayer_utils::Error::Generic(
                "max-blocks-per-step must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> serde_json::Value {
        serde_json::json!({
            "chain": {
                "name": "local",
                "http-endpoint": "http://localhost:8545",
                "chain-id": 1337
            },
            "contracts": {
                "relay-hub": "0x1111111111111111111111111111111111111111",
                "stake-manager": "0x2222222222222222222222222222222222222222"
            },
            "keys": {
                "manager": "0x8db55b05db86c0b1786ca49f095d76344c9e6056b2f02701a7e7f3c20aabfd91",
                "workers": ["0x9b2b9d0c5f6f8f4f9e0b5b8d6c0c1e4f3a2b1c0d9e8f7a6b5c4d3e2f1a0b9c8d"]
            },
            "registration": {
                "url": "https://relay.example.org/gsn1",
                "min-stake": "1 ether"
            }
        })
    }

    #[test]
    fn defaults_are_applied() {
        let config: HubRelayerConfig =
            serde_json::from_value(minimal()).unwrap();
        config.verify().unwrap();
        assert_eq!(config.port, defaults::relayer_port());
        assert_eq!(config.tx_manager.confirmations, 12);
        assert_eq!(config.tx_manager.retry_gas_price_percent, 120);
        assert_eq!(config.worker.max_blocks_per_step, 500);
        assert_eq!(config.contracts.expected_hub_version, "2.");
        assert_eq!(
            config.registration.min_stake.wei(),
            ethers::utils::parse_ether(1).unwrap()
        );
    }

    #[test]
    fn missing_keys_are_rejected() {
        let mut value = minimal();
        value["keys"] = serde_json::json!({});
        let config: HubRelayerConfig = serde_json::from_value(value).unwrap();
        assert!(matches!(
            config.verify(),
            Err(hub_relayer_utils::Error::MissingSecrets)
        ));
        let mut value = minimal();
        value["keys"] = serde_json::json!({ "ephemeral": true });
        let config: HubRelayerConfig = serde_json::from_value(value).unwrap();
        assert!(config.verify().is_ok());
    }

    #[test]
    fn retry_percent_below_100_is_rejected() {
        let mut value = minimal();
        value["tx-manager"] =
            serde_json::json!({ "retry-gas-price-percent": 90 });
        let config: HubRelayerConfig = serde_json::from_value(value).unwrap();
        assert!(config.verify().is_err());
    }
}
