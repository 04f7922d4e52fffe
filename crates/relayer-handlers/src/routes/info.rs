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


use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use hub_relayer_types::relay::PingResponse;
use hub_relayer_utils::HandlerError;
use hub_relayer_worker::RelayApi;

/// Handles `GET /getaddr`.
///
/// Returns the addresses of the relay server and whether it is ready to
/// relay, clients use it to pick a relay server.
pub async fn handle_ping(
    State(api): State<Arc<dyn RelayApi>>,
) -> Result<Json<PingResponse>, HandlerError> {
    let ping = api.ping().await?;
    Ok(Json(ping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_utils::StaticApi;

    #[tokio::test]
    async fn reports_readiness() {
        let api: Arc<dyn RelayApi> = StaticApi::new(false);
        let Json(ping) = handle_ping(State(api)).await.ok().unwrap();
        assert!(!ping.ready);
        assert_eq!(ping.chain_id, 1337);
    }
}
