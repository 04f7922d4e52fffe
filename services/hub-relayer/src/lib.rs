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


#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Hub Relayer Crate 🕸️
//!
//! A meta-transaction relay server. Clients sign a forward request, the
//! relay server wraps it into a `relayCall` on the relay hub, signs it with
//! one of its worker keys and broadcasts it, getting paid back by the
//! paymaster of the request.
//!
//! ## Overview
//!
//! The server is made of a handful of collaborating parts:
//!
//!   1. The transaction manager, owning the nonces of the manager and
//!      worker accounts. Every transaction it signs is persisted before it
//!      is broadcast, and stuck ones get replaced with a higher gas price.
//!   2. The registration manager, following the stake of the relay manager
//!      and registering the server on the hub once the stake is locked and
//!      the hub is authorized.
//!   3. The relay worker, ticking once per block and validating incoming
//!      relay requests against the state of the last tick.
//!
//! [`service`] wires them together over a JSON-RPC provider and a
//! [Sled](https://sled.rs) store, and serves them over HTTP.

/// Wiring of the relay server and its HTTP services.
pub mod service;
