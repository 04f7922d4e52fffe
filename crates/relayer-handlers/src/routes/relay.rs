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

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use hub_relayer_types::relay::{
    RelayTransactionRequest, RelayTransactionResponse,
};
use hub_relayer_utils::HandlerError;
use hub_relayer_worker::RelayApi;

/// Handles `POST /relay`.
///
/// Validates the relay request and answers with the signed `relayCall`
/// transaction. Rejected requests get a `400` with the rejection reason.
pub async fn handle_relay_transaction(
    State(api): State<Arc<dyn RelayApi>>,
    payload: Result<Json<RelayTransactionRequest>, JsonRejection>,
) -> Result<Json<RelayTransactionResponse>, HandlerError> {
    let Json(request) = payload
        .map_err(|e| HandlerError(StatusCode::BAD_REQUEST, e.body_text()))?;
    let response = api.create_relay_transaction(request).await?;
    Ok(Json(response))
}
