// Copyright 2025 The Offload Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use offload_error::Error;

use crate::protocol::{RpcPayload, RpcResponse};

/// Host side of the worker-to-host channel. Workers hold one and call
/// `execute` whenever a transformation needs a host-only capability.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Runs `op_type` with `payload`. Unknown operations, unknown compiler
    /// ids and unknown job ids are errors, never no-ops.
    async fn execute(&self, op_type: &str, payload: RpcPayload) -> Result<RpcResponse, Error>;
}
