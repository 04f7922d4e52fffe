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

use ethers::types::U256;
use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{opts, Encoder, Registry, TextEncoder};

/// A struct for collecting metrics for particular topics.
///
/// Every instance owns its own [`Registry`], so several relayers (or tests)
/// can live in the same process.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Transactions signed and persisted by the transaction manager.
    pub transactions_sent: GenericCounter<AtomicF64>,
    /// Stuck transactions replaced with a boosted gas price.
    pub transactions_resent: GenericCounter<AtomicF64>,
    /// Relay requests that passed validation and got signed.
    pub relay_requests_accepted: GenericCounter<AtomicF64>,
    /// Relay requests rejected by the validator.
    pub relay_requests_rejected: GenericCounter<AtomicF64>,
    /// 1 while the worker is ready to relay, 0 otherwise.
    pub ready: GenericGauge<AtomicF64>,
    /// Manager account balance (in gwei).
    pub manager_balance: GenericGauge<AtomicF64>,
    /// Sum of the worker account balances (in gwei).
    pub worker_balance: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("hub_relayer".into()), None)?;

        let transactions_sent = GenericCounter::with_opts(opts!(
            "transactions_sent",
            "The total number of transactions signed by the relayer"
        ))?;
        registry.register(Box::new(transactions_sent.clone()))?;

        let transactions_resent = GenericCounter::with_opts(opts!(
            "transactions_resent",
            "How many stuck transactions were replaced with a higher gas price"
        ))?;
        registry.register(Box::new(transactions_resent.clone()))?;

        let relay_requests_accepted = GenericCounter::with_opts(opts!(
            "relay_requests_accepted",
            "The total number of relay requests accepted"
        ))?;
        registry.register(Box::new(relay_requests_accepted.clone()))?;

        let relay_requests_rejected = GenericCounter::with_opts(opts!(
            "relay_requests_rejected",
            "The total number of relay requests rejected"
        ))?;
        registry.register(Box::new(relay_requests_rejected.clone()))?;

        let ready = GenericGauge::with_opts(opts!(
            "ready",
            "Whether the relay worker is ready to serve requests"
        ))?;
        registry.register(Box::new(ready.clone()))?;

        let manager_balance = GenericGauge::with_opts(opts!(
            "manager_balance",
            "Relay manager account balance in gwei"
        ))?;
        registry.register(Box::new(manager_balance.clone()))?;

        let worker_balance = GenericGauge::with_opts(opts!(
            "worker_balance",
            "Total relay worker account balance in gwei"
        ))?;
        registry.register(Box::new(worker_balance.clone()))?;

        Ok(Self {
            registry,
            transactions_sent,
            transactions_resent,
            relay_requests_accepted,
            relay_requests_rejected,
            ready,
            manager_balance,
            worker_balance,
        })
    }

    /// Gathers the whole relayer metrics
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        // Gather the metrics.
        let metric_families = self.registry.gather();
        // Encode them to send.
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

/// Converts a wei amount to gwei, for gauges.
pub fn wei_to_gwei(wei: U256) -> f64 {
    ethers::utils::format_units(wei, "gwei")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
