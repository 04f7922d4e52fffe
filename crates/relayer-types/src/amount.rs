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

use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// An amount of wei.
///
/// Config files may write it as a plain integer, a decimal or `0x` hex
/// string, a string with a unit such as `"0.5 ether"` or `"20 gwei"`, or a
/// `$ENV_VAR` holding any of those.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub U256);

impl Amount {
    /// Amount of wei.
    pub const fn wei(&self) -> U256 {
        self.0
    }

    fn parse(value: &str) -> Result<U256, String> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix("0x") {
            return U256::from_str_radix(hex, 16)
                .map_err(|e| format!("invalid hex amount `{value}`: {e:?}"));
        }
        match value.split_once(char::is_whitespace) {
            Some((number, unit)) => {
                ethers::utils::parse_units(number.trim(), unit.trim())
                    .map(Into::into)
                    .map_err(|e| format!("invalid amount `{value}`: {e}"))
            }
            None => U256::from_dec_str(value)
                .map_err(|e| format!("invalid amount `{value}`: {e}")),
        }
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<Amount> for U256 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct AmountVisitor;
        impl<'de> serde::de::Visitor<'de> for AmountVisitor {
            type Value = U256;

            fn expecting(
                &self,
                formatter: &mut fmt::Formatter,
            ) -> fmt::Result {
                formatter.write_str(
                    "an integer, a decimal/hex string, a string with a unit (e.g. \"1 ether\") or an env var",
                )
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(U256::from(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(value).map(U256::from).map_err(|_| {
                    serde::de::Error::custom(format!(
                        "amount can not be negative, got {value}"
                    ))
                })
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let value = crate::from_env_or_literal(value)
                    .map_err(serde::de::Error::custom)?;
                Amount::parse(&value).map_err(serde::de::Error::custom)
            }
        }

        let amount = deserializer.deserialize_any(AmountVisitor)?;
        Ok(Self(amount))
    }
}
