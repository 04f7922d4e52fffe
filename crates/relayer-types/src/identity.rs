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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A logical signing role bound to exactly one private key.
///
/// Every identity owns its own nonce sequence. The manager handles staking
/// and registration, workers sign the user facing relay calls.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Identity {
    /// The relay manager.
    Manager,
    /// The relay worker with the given index.
    Worker(u32),
}

impl Identity {
    /// Returns `true` for worker identities.
    pub fn is_worker(&self) -> bool {
        matches!(self, Identity::Worker(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Manager => write!(f, "manager"),
            Identity::Worker(index) => write!(f, "worker-{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid signing identity `{0}`, expected `manager` or `worker-<n>`")]
pub struct InvalidIdentity(String);

impl FromStr for Identity {
    type Err = InvalidIdentity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "manager" {
            return Ok(Identity::Manager);
        }
        s.strip_prefix("worker-")
            .and_then(|index| index.parse().ok())
            .map(Identity::Worker)
            .ok_or_else(|| InvalidIdentity(s.to_owned()))
    }
}

impl TryFrom<String> for Identity {
    type Error = InvalidIdentity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.to_string()
    }
}
