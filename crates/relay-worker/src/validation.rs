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

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Bytes, U256};
use hub_relayer_chain::{calls, CallRequest, ChainClient, KeyManager};
use hub_relayer_store::TxStore;
use hub_relayer_tx_manager::SendTransactionDetails;
use hub_relayer_types::relay::{
    RelayTransactionRequest, RelayTransactionResponse,
};
use hub_relayer_types::{Identity, ServerAction};
use hub_relayer_utils::{probe, RelayRequestError, Result};

use crate::fees;
use crate::worker::RelayWorker;

/// Selector of `Error(string)`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// A relay request that passed every check.
struct ValidatedRequest {
    gas_limit: U256,
    data: Bytes,
}

impl<S, C, K> RelayWorker<S, C, K>
where
    S: TxStore + 'static,
    C: ChainClient + 'static,
    K: KeyManager + 'static,
{
    /// Validates `request` and, when it passes, signs and broadcasts the
    /// `relayCall` transaction with the worker key.
    #[tracing::instrument(
        skip_all,
        fields(
            from = ?request.relay_request.request.from,
            paymaster = ?request.relay_request.relay_data.paymaster,
        )
    )]
    pub async fn create_relay_transaction(
        &self,
        request: RelayTransactionRequest,
    ) -> Result<RelayTransactionResponse> {
        let result = self.relay(&request).await;
        match &result {
            Ok(response) => {
                self.tx_manager.metrics().relay_requests_accepted.inc();
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::RelayRequest,
                    accepted = true,
                    nonce = response.nonce,
                    tx_hash = ?response.tx_hash,
                );
            }
            Err(e) => {
                self.tx_manager.metrics().relay_requests_rejected.inc();
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::RelayRequest,
                    accepted = false,
                    reason = %e,
                );
            }
        }
        result
    }

    async fn relay(
        &self,
        request: &RelayTransactionRequest,
    ) -> Result<RelayTransactionResponse> {
        let snapshot = self.snapshot();
        let validated = self.validate(request).await?;
        let details = SendTransactionDetails::builder()
            .identity(Identity::Worker(0))
            .action(ServerAction::RelayCall)
            .to(self.tx_manager.chain().relay_hub())
            .data(validated.data)
            .gas_limit(validated.gas_limit)
            .gas_price(request.relay_request.relay_data.gas_price)
            .creation_block(snapshot.block_number)
            .max_nonce(request.metadata.relay_max_nonce)
            .build();
        let signed = self.tx_manager.send_transaction(details).await?;
        Ok(RelayTransactionResponse {
            signed_tx: signed.raw,
            tx_hash: signed.tx_hash,
            nonce: signed.record.nonce,
        })
    }

    /// Checks the request against the server policy, first violation wins.
    /// Nothing is mutated.
    async fn validate(
        &self,
        request: &RelayTransactionRequest,
    ) -> Result<ValidatedRequest> {
        let snapshot = self.snapshot();
        self.ensure_ready(&snapshot)?;

        let chain = self.tx_manager.chain();
        let relay_request = &request.relay_request;
        let relay_data = &relay_request.relay_data;
        let relay_hub = chain.relay_hub();
        if request.metadata.relay_hub_address != relay_hub {
            return Err(RelayRequestError::WrongHub {
                expected: relay_hub,
                found: request.metadata.relay_hub_address,
            }
            .into());
        }
        if relay_data.relay_worker != self.worker {
            return Err(RelayRequestError::WrongWorker {
                expected: self.worker,
                found: relay_data.relay_worker,
            }
            .into());
        }

        let trusted = self.config.trusted_paymasters.contains(&relay_data.paymaster);
        if !trusted {
            let minimum = self.fees.base_relay_fee.wei();
            if relay_data.base_relay_fee < minimum {
                return Err(RelayRequestError::BaseFeeTooLow {
                    offered: relay_data.base_relay_fee,
                    minimum,
                }
                .into());
            }
            let minimum = U256::from(self.fees.pct_relay_fee);
            if relay_data.pct_relay_fee < minimum {
                return Err(RelayRequestError::PctFeeTooLow {
                    offered: relay_data.pct_relay_fee,
                    minimum,
                }
                .into());
            }
        }

        if relay_data.gas_price < snapshot.gas_price {
            return Err(RelayRequestError::GasPriceTooLow {
                offered: relay_data.gas_price,
                current: snapshot.gas_price,
            }
            .into());
        }
        let maximum = self.tx_manager.config().max_gas_price.wei();
        if relay_data.gas_price > maximum {
            return Err(RelayRequestError::GasPriceTooHigh {
                offered: relay_data.gas_price,
                maximum,
            }
            .into());
        }

        let next_nonce = self.tx_manager.poll_nonce(Identity::Worker(0)).await?;
        if request.metadata.relay_max_nonce < next_nonce {
            return Err(RelayRequestError::NonceCeilingTooLow {
                max_nonce: request.metadata.relay_max_nonce,
                next_nonce,
            }
            .into());
        }

        let limits = chain.paymaster_gas_limits(relay_data.paymaster).await?;
        let max_acceptance_budget = U256::from(self.config.max_acceptance_budget);
        if !trusted && limits.acceptance_budget > max_acceptance_budget {
            return Err(RelayRequestError::AcceptanceBudgetTooHigh {
                acceptance_budget: limits.acceptance_budget,
                max_acceptance_budget,
            }
            .into());
        }
        let acceptance_budget = if trusted {
            limits.acceptance_budget
        } else {
            max_acceptance_budget
        };

        // Worst case calldata, the real gas limit is not known yet.
        let placeholder = calls::relay_call(
            acceptance_budget,
            relay_request,
            &request.metadata.signature,
            &request.metadata.approval_data,
            U256::MAX,
        );
        let hub_overhead = chain.hub_gas_overhead().await?;
        let gas_limit = fees::max_possible_gas(
            self.config.gas_reserve,
            hub_overhead,
            &limits,
            relay_request.request.gas,
            &placeholder,
        )
        .ok_or(RelayRequestError::GasLimitTooHigh {
            gas: relay_request.request.gas,
        })?;
        let max_charge = fees::calculate_charge(gas_limit, relay_data)
            .ok_or(RelayRequestError::ChargeOverflow { gas_limit })?;
        let balance = chain.hub_balance_of(relay_data.paymaster).await?;
        if balance < max_charge {
            return Err(RelayRequestError::PaymasterBalanceTooLow {
                balance,
                max_charge,
            }
            .into());
        }

        let data = calls::relay_call(
            acceptance_budget,
            relay_request,
            &request.metadata.signature,
            &request.metadata.approval_data,
            gas_limit,
        );
        let dry_run = CallRequest {
            from: self.worker,
            to: relay_hub,
            value: U256::zero(),
            data: data.clone(),
            gas: Some(gas_limit),
            gas_price: Some(relay_data.gas_price),
        };
        let output = chain.call(&dry_run).await?;
        let outcome = calls::decode_relay_call_result(&output)?;
        if !outcome.paymaster_accepted {
            return Err(RelayRequestError::PaymasterRejected {
                reason: revert_reason(&outcome.return_value),
            }
            .into());
        }
        Ok(ValidatedRequest { gas_limit, data })
    }
}

/// Human readable revert data: the `Error(string)` message when there is
/// one, hex otherwise.
fn revert_reason(data: &[u8]) -> String {
    if let Some(encoded) = data.strip_prefix(&ERROR_STRING_SELECTOR[..]) {
        if let Ok(tokens) = abi::decode(&[ParamType::String], encoded) {
            if let [Token::String(reason)] = tokens.as_slice() {
                return reason.clone();
            }
        }
    }
    if data.is_empty() {
        return String::from("no revert data");
    }
    Bytes::from(data.to_vec()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_reason_prefers_the_error_string() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(abi::encode(&[Token::String("paymaster says no".into())]));
        assert_eq!(revert_reason(&data), "paymaster says no");
        assert_eq!(revert_reason(&[]), "no revert data");
        assert_eq!(revert_reason(&[0xde, 0xad]), "0xdead");
    }
}
