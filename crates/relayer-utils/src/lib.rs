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

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ethers::types::{Address, H256, U256};

/// Metrics functionality
pub mod metric;
/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;

/// An enum of all possible errors that could be encountered during the execution of the Hub
/// Relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// HTTP Error
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// ABI encoding or decoding error.
    #[error(transparent)]
    Abi(#[from] ethers::abi::Error),
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Missing Secrets in the config.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// The key manager does not hold a key for this identity.
    #[error("No key configured for signing identity {identity}")]
    UnknownIdentity {
        /// The signing identity, e.g. `manager` or `worker-0`.
        identity: String,
    },
    /// The store already holds a transaction of this signer with the same nonce.
    #[error("Nonce {nonce} of signer {signer:?} is already used by a stored transaction")]
    DuplicateNonce {
        /// Address of the signer.
        signer: Address,
        /// The conflicting nonce.
        nonce: u64,
    },
    /// Key material could not be accessed.
    #[error("Signing unavailable for {identity}: {reason}")]
    SigningUnavailable {
        /// The signing identity.
        identity: String,
        /// What went wrong.
        reason: String,
    },
    /// A ledger query failed.
    #[error("Chain query `{operation}` failed: {reason}")]
    ChainQuery {
        /// Name of the failing operation.
        operation: &'static str,
        /// Underlying provider error.
        reason: String,
    },
    /// The node refused or failed to accept a signed transaction.
    #[error(
        "Failed to broadcast tx {tx_hash:?} of {identity} with nonce {nonce}: {reason}"
    )]
    Broadcast {
        /// The signing identity.
        identity: String,
        /// Nonce of the transaction.
        nonce: u64,
        /// Hash of the signed payload.
        tx_hash: H256,
        /// Underlying provider error.
        reason: String,
    },
    /// The nonce allocated for a relayed call is above the ceiling the client accepts.
    #[error("Allocated nonce {nonce} exceeds the requested ceiling {max_nonce}")]
    NonceCeilingExceeded {
        /// The nonce that would have been used.
        nonce: u64,
        /// Highest nonce the caller accepts.
        max_nonce: u64,
    },
    /// The manager needs more funds before it can operate.
    #[error("Funding needed: manager balance {balance} is below the minimum {required}")]
    FundingNeeded {
        /// Current manager balance (wei).
        balance: U256,
        /// Minimum operating balance (wei).
        required: U256,
    },
    /// The network gas price went above what the relayer is willing to pay.
    #[error("Network gas price {gas_price} exceeds the configured maximum {max_gas_price}")]
    GasPriceTooHigh {
        /// Current gas price (wei).
        gas_price: U256,
        /// Configured maximum (wei).
        max_gas_price: U256,
    },
    /// The relay server is not in a valid operating state.
    #[error(transparent)]
    State(#[from] StateError),
    /// A relay request violates the server policy.
    #[error(transparent)]
    RelayRequest(#[from] RelayRequestError),
    /// There is no contract code at the configured hub address.
    #[error("No relay hub contract deployed at {0:?}")]
    InvalidHubContract(Address),
    /// The deployed hub speaks a different protocol version.
    #[error("Relay hub version {found} is not compatible with the expected {expected}")]
    HubVersionMismatch {
        /// Expected version prefix.
        expected: String,
        /// Version reported by the hub.
        found: String,
    },
    /// The node serves a different chain than the configured one.
    #[error("Chain id mismatch, configured {expected} but the node reports {found}")]
    ChainIdMismatch {
        /// Configured chain id.
        expected: u64,
        /// Chain id reported by the node.
        found: u64,
    },
}

impl Error {
    /// Misconfiguration that cannot heal by itself, the process should exit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidHubContract(_)
                | Error::HubVersionMismatch { .. }
                | Error::ChainIdMismatch { .. }
        )
    }
}

/// The precondition that keeps the relay server from being registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Nothing is staked for the relay manager.
    #[error("Relay manager is not staked")]
    NotStaked,
    /// Stake is below the configured requirement.
    #[error("Stake too low: {current}, required: {required}")]
    StakeTooLow {
        /// Current stake (wei).
        current: U256,
        /// Required stake (wei).
        required: U256,
    },
    /// Unstake delay is below the configured requirement.
    #[error("Unstake delay too low: {current}, required: {required}")]
    UnstakeDelayTooLow {
        /// Current unstake delay (blocks).
        current: U256,
        /// Required unstake delay (blocks).
        required: U256,
    },
    /// The owner already started to unlock the stake.
    #[error("Stake is not locked")]
    StakeNotLocked,
    /// The relay hub may not spend the stake.
    #[error("Relay hub is not authorized")]
    HubNotAuthorized,
    /// No matching registration on chain and none in flight.
    #[error("Relay server is not registered yet")]
    NotRegistered,
}

/// Reasons for rejecting a relay request before anything is signed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayRequestError {
    /// The worker loop did not reach a valid state yet.
    #[error("Relay server is not ready: {0}")]
    NotReady(String),
    /// The request targets a different relay hub.
    #[error(
        "Wrong hub address. Relay server's hub: {expected:?}, request's hub: {found:?}"
    )]
    WrongHub {
        /// This server's hub.
        expected: Address,
        /// Hub named by the request.
        found: Address,
    },
    /// The request names a worker that does not belong to this server.
    #[error(
        "Wrong worker address. Relay server's worker: {expected:?}, request's worker: {found:?}"
    )]
    WrongWorker {
        /// This server's worker.
        expected: Address,
        /// Worker named by the request.
        found: Address,
    },
    #[error(
        "Unacceptable baseRelayFee: {offered}, relay server's baseRelayFee: {minimum}"
    )]
    BaseFeeTooLow {
        /// Fee offered by the client.
        offered: U256,
        /// Minimum accepted by the server.
        minimum: U256,
    },
    #[error(
        "Unacceptable pctRelayFee: {offered}, relay server's pctRelayFee: {minimum}"
    )]
    PctFeeTooLow {
        /// Fee offered by the client.
        offered: U256,
        /// Minimum accepted by the server.
        minimum: U256,
    },
    #[error(
        "Unacceptable gasPrice: {offered}, relay server's current gasPrice: {current}"
    )]
    GasPriceTooLow {
        /// Gas price offered by the client.
        offered: U256,
        /// The server's current gas price.
        current: U256,
    },
    #[error(
        "Unacceptable gasPrice: {offered}, relay server's maximum gasPrice: {maximum}"
    )]
    GasPriceTooHigh {
        /// Gas price offered by the client.
        offered: U256,
        /// The highest gas price the server signs with.
        maximum: U256,
    },
    /// The gas limit of the relayed call does not fit a transaction.
    #[error("Unacceptable request gas: {gas}")]
    GasLimitTooHigh {
        /// Gas requested for the relayed call.
        gas: U256,
    },
    /// The fee terms of the request overflow the charge computation.
    #[error("Relay fee can not be computed for gas limit {gas_limit}")]
    ChargeOverflow {
        /// Gas limit of the relay call.
        gas_limit: U256,
    },
    #[error(
        "Unacceptable relayMaxNonce: {max_nonce}, relay server's next nonce: {next_nonce}"
    )]
    NonceCeilingTooLow {
        /// Ceiling sent by the client.
        max_nonce: u64,
        /// Next nonce of the worker.
        next_nonce: u64,
    },
    #[error(
        "Paymaster acceptance budget {acceptance_budget} exceeds the server's maximum {max_acceptance_budget}"
    )]
    AcceptanceBudgetTooHigh {
        /// Budget reported by the paymaster.
        acceptance_budget: U256,
        /// Server exposure cap.
        max_acceptance_budget: U256,
    },
    #[error(
        "Paymaster balance too low: {balance}, maximum possible charge: {max_charge}"
    )]
    PaymasterBalanceTooLow {
        /// Paymaster deposit on the hub.
        balance: U256,
        /// Worst case charge of the relayed call.
        max_charge: U256,
    },
    /// The paymaster refused the call during the local view-call.
    #[error("Paymaster rejected the relayed call: {reason}")]
    PaymasterRejected {
        /// Revert data or reason returned by the view-call.
        reason: String,
    },
}

/// A type alias for the result for hub relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for HandlerError {
    fn from(value: Error) -> Self {
        match value {
            Error::RelayRequest(_)
            | Error::State(_)
            | Error::NonceCeilingExceeded { .. } => {
                HandlerError(StatusCode::BAD_REQUEST, value.to_string())
            }
            _ => HandlerError(
                StatusCode::INTERNAL_SERVER_ERROR,
                value.to_string(),
            ),
        }
    }
}

/// Error type for HTTP handlers
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Response message
    pub String,
);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_price_rejection_names_both_values() {
        let err = RelayRequestError::GasPriceTooLow {
            offered: U256::from(10),
            current: U256::from(20),
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn only_misconfiguration_is_fatal() {
        assert!(Error::InvalidHubContract(Address::zero()).is_fatal());
        assert!(Error::HubVersionMismatch {
            expected: "2.".into(),
            found: "1.0.0".into()
        }
        .is_fatal());
        assert!(Error::ChainIdMismatch {
            expected: 1,
            found: 5
        }
        .is_fatal());
        assert!(!Error::State(StateError::NotRegistered).is_fatal());
        assert!(!Error::ChainQuery {
            operation: "get_gas_price",
            reason: "timeout".into()
        }
        .is_fatal());
    }

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = Error::from(RelayRequestError::NotReady("x".into()));
        let HandlerError(status, _) = err.into();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let HandlerError(status, _) = Error::Generic("boom").into();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
