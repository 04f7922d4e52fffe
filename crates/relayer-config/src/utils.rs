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

use std::path::{Path, PathBuf};

use config::{Config, File};

use crate::HubRelayerConfig;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> hub_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(hub_relayer_utils::Error::from))
        .collect()
}

/// Try to parse the [`HubRelayerConfig`] from the given config file(s),
/// merged with `HUB_RELAYER__*` environment variables.
pub fn parse_from_files(
    files: &[PathBuf],
) -> hub_relayer_utils::Result<HubRelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // e.g. `HUB_RELAYER__PORT=9000` overrides `port`.
    let builder = builder.add_source(
        config::Environment::with_prefix("HUB_RELAYER")
            .prefix_separator("__")
            .separator("__"),
    );
    let cfg = builder.build()?;
    let config: Result<
        HubRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and merge them into one.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> hub_relayer_utils::Result<HubRelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// Sanity checks and normalization applied after deserializing.
pub fn postloading_process(
    mut config: HubRelayerConfig,
) -> hub_relayer_utils::Result<HubRelayerConfig> {
    tracing::trace!("Checking configration sanity ...");
    config.worker.trusted_paymasters.sort();
    config.worker.trusted_paymasters.dedup();
    if config.registration.url.ends_with('/') {
        let trimmed = config.registration.url.trim_end_matches('/').len();
        config.registration.url.truncate(trimmed);
    }
    if config.keys.ephemeral {
        tracing::warn!(
            "!!WARNING!!: missing keys will be generated on every start, \
            funds sent to them are lost once the relayer stops."
        );
    }
    config.verify()?;
    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CONFIG: &str = r#"
port = 9000

[chain]
name = "local"
http-endpoint = "http://localhost:8545"
chain-id = 1337

[contracts]
relay-hub = "0x1111111111111111111111111111111111111111"
stake-manager = "0x2222222222222222222222222222222222222222"
deployed-at = 10

[keys]
ephemeral = true

[registration]
url = "https://relay.example.org/"
pct-relay-fee = 10
min-stake = "0.5 ether"

[worker]
trusted-paymasters = [
  "0x3333333333333333333333333333333333333333",
  "0x3333333333333333333333333333333333333333",
]
"#;

    #[test]
    fn loads_toml_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        let mut file = std::fs::File::create(nested.join("relay.toml")).unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let files = search_config_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);

        let config = load(dir.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.contracts.deployed_at, 10);
        assert_eq!(config.registration.url, "https://relay.example.org");
        assert_eq!(config.registration.pct_relay_fee, 10);
        assert_eq!(config.worker.trusted_paymasters.len(), 1);
        assert_eq!(config.tx_manager.confirmations, 12);
    }

    #[test]
    fn empty_directory_fails_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).is_err());
    }
}
