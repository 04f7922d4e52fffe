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

#![allow(missing_docs, clippy::too_many_arguments)]

//! `abigen!` bindings of the relay hub, the stake manager and the paymaster,
//! limited to what the relayer uses.

pub mod relay_hub {
    use ethers::contract::abigen;

    abigen!(
        RelayHubContract,
        r#"[
            function registerRelayServer(uint256 baseRelayFee, uint256 pctRelayFee, string url) external
            function addRelayWorkers(address[] newRelayWorkers) external
            function withdraw(uint256 amount, address dest) external
            function balanceOf(address target) external view returns (uint256)
            function versionHub() external view returns (string)
            function gasOverhead() external view returns (uint256)
            event RelayServerRegistered(address indexed relayManager, uint256 baseRelayFee, uint256 pctRelayFee, string relayUrl)
            event RelayWorkersAdded(address indexed relayManager, address[] newRelayWorkers, uint256 workersCount)
        ]"#
    );
}

pub mod stake_manager {
    use ethers::contract::abigen;

    abigen!(
        StakeManagerContract,
        r#"[
            function getStakeInfo(address relayManager) external view returns (uint256 stake, uint256 unstakeDelay, uint256 withdrawBlock, address owner)
            function authorizedHubs(address relayManager, address relayHub) external view returns (uint256 removalBlock)
            event StakeAdded(address indexed relayManager, address indexed owner, uint256 stake, uint256 unstakeDelay)
            event StakeUnlocked(address indexed relayManager, address indexed owner, uint256 withdrawBlock)
            event StakeWithdrawn(address indexed relayManager, address indexed owner, uint256 amount)
            event HubAuthorized(address indexed relayManager, address indexed relayHub)
            event HubUnauthorized(address indexed relayManager, address indexed relayHub, uint256 removalBlock)
        ]"#
    );
}

pub mod paymaster {
    use ethers::contract::abigen;

    abigen!(
        PaymasterContract,
        r#"[
            function getGasLimits() external view returns (uint256 acceptanceBudget, uint256 preRelayedCallGasLimit, uint256 postRelayedCallGasLimit)
        ]"#
    );
}
