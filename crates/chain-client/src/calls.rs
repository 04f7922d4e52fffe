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

use ethers::abi::{self, AbiEncode, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use hub_relayer_types::relay::{ForwardRequest, RelayData, RelayRequest};
use hub_relayer_utils::{Error, Result};

use crate::contracts::relay_hub::{
    AddRelayWorkersCall, RegisterRelayServerCall, WithdrawCall,
};

/// Canonical signature of `RelayHub.relayCall`.
pub const RELAY_CALL_SIGNATURE: &str = "relayCall(uint256,((address,address,uint256,uint256,uint256,bytes,uint256),(uint256,uint256,uint256,address,address,address,bytes,uint256)),bytes,bytes,uint256)";

/// `registerRelayServer(baseRelayFee, pctRelayFee, url)`.
pub fn register_relay_server(
    base_relay_fee: U256,
    pct_relay_fee: U256,
    url: &str,
) -> Bytes {
    RegisterRelayServerCall {
        base_relay_fee,
        pct_relay_fee,
        url: url.to_owned(),
    }
    .encode()
    .into()
}

/// `addRelayWorkers(workers)`.
pub fn add_relay_workers(workers: Vec<Address>) -> Bytes {
    AddRelayWorkersCall {
        new_relay_workers: workers,
    }
    .encode()
    .into()
}

/// `withdraw(amount, dest)` of the caller's hub balance.
pub fn hub_withdraw(amount: U256, dest: Address) -> Bytes {
    WithdrawCall { amount, dest }.encode().into()
}

fn forward_request_token(request: &ForwardRequest) -> Token {
    Token::Tuple(vec![
        Token::Address(request.from),
        Token::Address(request.to),
        Token::Uint(request.value),
        Token::Uint(request.gas),
        Token::Uint(request.nonce),
        Token::Bytes(request.data.to_vec()),
        Token::Uint(request.valid_until),
    ])
}

fn relay_data_token(data: &RelayData) -> Token {
    Token::Tuple(vec![
        Token::Uint(data.gas_price),
        Token::Uint(data.pct_relay_fee),
        Token::Uint(data.base_relay_fee),
        Token::Address(data.relay_worker),
        Token::Address(data.paymaster),
        Token::Address(data.forwarder),
        Token::Bytes(data.paymaster_data.to_vec()),
        Token::Uint(data.client_id),
    ])
}

/// `relayCall(maxAcceptanceBudget, relayRequest, signature, approvalData, externalGasLimit)`.
pub fn relay_call(
    max_acceptance_budget: U256,
    relay_request: &RelayRequest,
    signature: &Bytes,
    approval_data: &Bytes,
    external_gas_limit: U256,
) -> Bytes {
    let tokens = [
        Token::Uint(max_acceptance_budget),
        Token::Tuple(vec![
            forward_request_token(&relay_request.request),
            relay_data_token(&relay_request.relay_data),
        ]),
        Token::Bytes(signature.to_vec()),
        Token::Bytes(approval_data.to_vec()),
        Token::Uint(external_gas_limit),
    ];
    let selector = ethers::utils::id(RELAY_CALL_SIGNATURE);
    let mut data = selector.to_vec();
    data.extend(abi::encode(&tokens));
    data.into()
}

/// Outcome of a read-only `relayCall`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCallResult {
    pub paymaster_accepted: bool,
    /// Revert data of the paymaster or of the relayed call.
    pub return_value: Bytes,
}

/// Decodes the `(bool paymasterAccepted, bytes returnValue)` output of
/// `relayCall`.
pub fn decode_relay_call_result(output: &[u8]) -> Result<RelayCallResult> {
    let tokens = abi::decode(&[ParamType::Bool, ParamType::Bytes], output)?;
    match tokens.as_slice() {
        [Token::Bool(paymaster_accepted), Token::Bytes(return_value)] => {
            Ok(RelayCallResult {
                paymaster_accepted: *paymaster_accepted,
                return_value: return_value.clone().into(),
            })
        }
        _ => Err(Error::Generic("unexpected relayCall output")),
    }
}

/// Encodes a `relayCall` output, the inverse of
/// [`decode_relay_call_result`].
pub fn encode_relay_call_result(
    paymaster_accepted: bool,
    return_value: &[u8],
) -> Bytes {
    abi::encode(&[
        Token::Bool(paymaster_accepted),
        Token::Bytes(return_value.to_vec()),
    ])
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RelayRequest {
        RelayRequest {
            request: ForwardRequest {
                from: Address::repeat_byte(1),
                to: Address::repeat_byte(2),
                value: U256::zero(),
                gas: U256::from(100_000),
                nonce: U256::from(4),
                data: Bytes::from(vec![0xca, 0xfe]),
                valid_until: U256::zero(),
            },
            relay_data: RelayData {
                gas_price: U256::from(2_000_000_000u64),
                pct_relay_fee: U256::from(70),
                base_relay_fee: U256::zero(),
                relay_worker: Address::repeat_byte(3),
                paymaster: Address::repeat_byte(4),
                forwarder: Address::repeat_byte(5),
                paymaster_data: Bytes::default(),
                client_id: U256::one(),
            },
        }
    }

    #[test]
    fn relay_call_layout() {
        let data = relay_call(
            U256::from(285_252),
            &request(),
            &Bytes::from(vec![0xaa; 65]),
            &Bytes::default(),
            U256::from(500_000),
        );
        assert_eq!(&data[..4], &ethers::utils::id(RELAY_CALL_SIGNATURE));
        let forward = ParamType::Tuple(vec![
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Bytes,
            ParamType::Uint(256),
        ]);
        let relay_data = ParamType::Tuple(vec![
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Address,
            ParamType::Address,
            ParamType::Address,
            ParamType::Bytes,
            ParamType::Uint(256),
        ]);
        let tokens = abi::decode(
            &[
                ParamType::Uint(256),
                ParamType::Tuple(vec![forward, relay_data]),
                ParamType::Bytes,
                ParamType::Bytes,
                ParamType::Uint(256),
            ],
            &data[4..],
        )
        .unwrap();
        assert_eq!(tokens[0], Token::Uint(U256::from(285_252)));
        assert_eq!(tokens[2], Token::Bytes(vec![0xaa; 65]));
        assert_eq!(tokens[4], Token::Uint(U256::from(500_000)));
        let Token::Tuple(parts) = &tokens[1] else {
            panic!("relay request is not a tuple");
        };
        let Token::Tuple(relay_data) = &parts[1] else {
            panic!("relay data is not a tuple");
        };
        assert_eq!(relay_data[3], Token::Address(Address::repeat_byte(3)));
    }

    #[test]
    fn relay_call_result_decodes() {
        let out = encode_relay_call_result(false, b"no");
        let result = decode_relay_call_result(&out).unwrap();
        assert!(!result.paymaster_accepted);
        assert_eq!(result.return_value.as_ref(), b"no");
        assert!(decode_relay_call_result(&[1, 2, 3]).is_err());
    }

    #[test]
    fn registration_calldata_uses_hub_selectors() {
        let data = register_relay_server(
            U256::zero(),
            U256::from(70),
            "https://relay.example.org",
        );
        assert_eq!(
            &data[..4],
            &ethers::utils::id("registerRelayServer(uint256,uint256,string)")
        );
        let data = add_relay_workers(vec![Address::repeat_byte(9)]);
        assert_eq!(&data[..4], &ethers::utils::id("addRelayWorkers(address[])"));
        let data = hub_withdraw(U256::one(), Address::repeat_byte(8));
        assert_eq!(&data[..4], &ethers::utils::id("withdraw(uint256,address)"));
    }
}
