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

use std::str::FromStr;

use ethers::signers::LocalWallet;
use ethers::types::H256;
use serde::Deserialize;

/// PrivateKey represents a private key.
///
/// Deserialized from a `0x` prefixed 32 bytes hex string or from `$ENV_VAR`
/// holding one. Never printed.
#[derive(Clone)]
pub struct PrivateKey(H256);

impl PrivateKey {
    /// Builds the wallet signing with this key.
    pub fn to_wallet(
        &self,
    ) -> Result<LocalWallet, ethers::signers::WalletError> {
        LocalWallet::from_bytes(self.0.as_bytes())
    }

    fn parse(value: &str) -> Result<H256, String> {
        if !value.starts_with("0x") {
            return Err(format!(
                "expected a 0x prefixed hex string, got {} chars",
                value.len()
            ));
        }
        H256::from_str(value).map_err(|e| {
            format!(
                "{e}\n got {} chars but expected a 66 chars string (including the 0x prefix)",
                value.len()
            )
        })
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<H256> for PrivateKey {
    fn from(secret: H256) -> Self {
        PrivateKey(secret)
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = H256;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let value = crate::from_env_or_literal(value)
                    .map_err(serde::de::Error::custom)?;
                PrivateKey::parse(&value).map_err(serde::de::Error::custom)
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}

#[cfg(test)]
mod tests {
    use ethers::signers::Signer;

    use super::*;

    const KEY: &str =
        "0x8db55b05db86c0b1786ca49f095d76344c9e6056b2f02701a7e7f3c20aabfd91";

    #[test]
    fn loads_hex_and_env() {
        let key: PrivateKey =
            serde_json::from_str(&format!("\"{KEY}\"")).unwrap();
        std::env::set_var("HUB_RELAYER_TEST_KEY", KEY);
        let from_env: PrivateKey =
            serde_json::from_str("\"$HUB_RELAYER_TEST_KEY\"").unwrap();
        assert_eq!(
            key.to_wallet().unwrap().address(),
            from_env.to_wallet().unwrap().address()
        );
        assert_eq!(format!("{key:?}"), "PrivateKey");
    }

    #[test]
    fn rejects_short_keys() {
        assert!(serde_json::from_str::<PrivateKey>("\"0x1234\"").is_err());
        assert!(serde_json::from_str::<PrivateKey>("\"abandon\"").is_err());
    }
}
