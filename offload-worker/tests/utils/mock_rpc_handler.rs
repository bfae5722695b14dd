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
use offload_error::{Error, make_input_err};
use offload_worker::protocol::{LoadedModule, RpcPayload, RpcResponse};
use offload_worker::rpc::RpcHandler;
use parking_lot::Mutex;

/// Records every RPC and answers `resolve` and `loadModule` with canned
/// values derived from the payload.
#[derive(Debug, Default)]
pub(crate) struct MockRpcHandler {
    calls: Mutex<Vec<(String, RpcPayload)>>,
}

impl MockRpcHandler {
    pub(crate) fn calls(&self) -> Vec<(String, RpcPayload)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RpcHandler for MockRpcHandler {
    async fn execute(&self, op_type: &str, payload: RpcPayload) -> Result<RpcResponse, Error> {
        self.calls.lock().push((op_type.to_string(), payload.clone()));
        match op_type {
            "resolve" => Ok(RpcResponse::Resolved {
                path: format!(
                    "{}/{}",
                    payload.context.unwrap_or_default(),
                    payload.resource.unwrap_or_default()
                ),
            }),
            "loadModule" => Ok(RpcResponse::Module(LoadedModule {
                source: format!("module:{}", payload.file.unwrap_or_default()),
                source_map: None,
            })),
            "bogus" => Err(make_input_err!("bogus")),
            _ => Ok(RpcResponse::Done),
        }
    }
}
