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

use std::sync::Arc;

use offload_config::plugins::PluginConfig;
use offload_error::{Error, ResultExt};
use offload_worker::protocol::{CompilerOptions, JobOutput, JobPayload};
use tracing::{debug, info};

use crate::host::CompilerContext;
use crate::worker_pool::WorkerPool;

/// Ties one hook id and its loader chain to a worker pool, and tracks the
/// build lifecycle of every compiler that uses it.
#[derive(Debug)]
pub struct OffloadPlugin {
    config: PluginConfig,
    pool: Arc<WorkerPool>,
}

impl OffloadPlugin {
    pub const fn new(config: PluginConfig, pool: Arc<WorkerPool>) -> Self {
        Self { config, pool }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub const fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Builds the loader request for `resource`: every configured loader,
    /// then the resource, joined with `!`.
    pub fn generate_request(&self, resource: &str) -> String {
        self.config
            .loaders
            .iter()
            .map(String::as_str)
            .chain([resource])
            .collect::<Vec<_>>()
            .join("!")
    }

    /// Makes `compiler_id` a user of the pool: its compiler context becomes
    /// reachable by workers and its options are sent to every worker.
    pub async fn on_build_start(
        &self,
        compiler_id: &str,
        compiler_context: CompilerContext,
        options: &CompilerOptions,
    ) -> Result<(), Error> {
        self.pool
            .rpc_dispatcher()
            .register_compiler_context(compiler_context, Some(compiler_id));
        info!(plugin_id = %self.id(), %compiler_id, "Acquiring worker pool");
        self.pool
            .acquire(compiler_id, options)
            .await
            .err_tip(|| format!("Plugin '{}' could not start its pool", self.id()))
    }

    /// Releases everything `on_build_start` acquired for `compiler_id`.
    pub async fn on_build_done(&self, compiler_id: &str) {
        debug!(plugin_id = %self.id(), %compiler_id, "Build done");
        self.pool
            .rpc_dispatcher()
            .unregister_compiler_context(Some(compiler_id));
        self.pool.stop(compiler_id).await;
    }

    /// Runs `job` on the next worker of the pool.
    pub async fn compile(&self, job: JobPayload) -> Result<JobOutput, Error> {
        let worker = self.pool.get_worker();
        debug!(plugin_id = %self.id(), worker_id = %worker.id(), job_id = %job.job_id, "Submitting job");
        worker.dispatch(job).await
    }
}
