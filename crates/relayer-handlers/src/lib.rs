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


//! Relayer handlers for HTTP calls

#![warn(missing_docs)]
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use hub_relayer_worker::RelayApi;

/// Module handles relayer API
pub mod routes;

/// Routes of the relay server, all of them served from the [`RelayApi`].
pub fn build_router(api: Arc<dyn RelayApi>) -> Router {
    Router::new()
        .route("/getaddr", get(routes::handle_ping))
        .route("/relay", post(routes::handle_relay_transaction))
        .route("/metrics", get(routes::handle_metric_info))
        .with_state(api)
}
