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

use std::collections::HashMap;
use std::sync::Arc;

use offload_config::OffloadConfig;
use offload_config::pools::PoolConfig;
use offload_error::{Error, ResultExt, make_input_err};
use offload_worker::protocol::{CompilerOptions, JobOutput};
use offload_worker::worker::{Worker, WorkerId};
use tracing::info;

use crate::host::{CompilerContext, HookInvocation};
use crate::job_adapter::run_job;
use crate::plugin::OffloadPlugin;
use crate::rpc_dispatcher::RpcDispatcher;
use crate::worker_pool::WorkerPool;

/// Every pool and plugin declared in an `OffloadConfig`. Each pool gets its
/// own `RpcDispatcher`; plugins referencing the same pool share it.
#[derive(Debug)]
pub struct PluginManager {
    pools: HashMap<String, Arc<WorkerPool>>,
    plugins: Vec<Arc<OffloadPlugin>>,
}

impl PluginManager {
    pub fn from_config<F>(config: &OffloadConfig, mut worker_factory: F) -> Result<Self, Error>
    where
        F: FnMut(&PoolConfig, WorkerId, Arc<RpcDispatcher>) -> Arc<dyn Worker>,
    {
        let mut pools = HashMap::with_capacity(config.pools.len());
        for pool_config in &config.pools {
            let pool = WorkerPool::new(pool_config, Arc::new(RpcDispatcher::new()), |id, rpc| {
                worker_factory(pool_config, id, rpc)
            })
            .err_tip(|| format!("Could not create pool '{}'", pool_config.name))?;
            if pools
                .insert(pool_config.name.clone(), Arc::new(pool))
                .is_some()
            {
                return Err(make_input_err!(
                    "Duplicate pool name '{}'",
                    pool_config.name
                ));
            }
        }

        let plugins = config
            .plugins
            .iter()
            .map(|plugin_config| {
                let pool = pools.get(&plugin_config.pool).cloned().ok_or_else(|| {
                    make_input_err!(
                        "Plugin '{}' references unknown pool '{}'",
                        plugin_config.id,
                        plugin_config.pool
                    )
                })?;
                Ok(Arc::new(OffloadPlugin::new(plugin_config.clone(), pool)))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        info!(
            pools = pools.len(),
            plugins = plugins.len(),
            "Offload plugins configured"
        );
        Ok(Self { pools, plugins })
    }

    pub fn pool(&self, name: &str) -> Option<Arc<WorkerPool>> {
        self.pools.get(name).cloned()
    }

    pub fn plugin(&self, id: &str) -> Option<Arc<OffloadPlugin>> {
        self.plugins.iter().find(|plugin| plugin.id() == id).cloned()
    }

    pub fn plugins(&self) -> &[Arc<OffloadPlugin>] {
        &self.plugins
    }

    /// Starts a build of `compiler_id` on every plugin.
    pub async fn on_build_start(
        &self,
        compiler_id: &str,
        compiler_context: &CompilerContext,
        options: &CompilerOptions,
    ) -> Result<(), Error> {
        for plugin in &self.plugins {
            plugin
                .on_build_start(compiler_id, compiler_context.clone(), options)
                .await?;
        }
        Ok(())
    }

    pub async fn on_build_done(&self, compiler_id: &str) {
        for plugin in &self.plugins {
            plugin.on_build_done(compiler_id).await;
        }
    }

    /// Runs one hook invocation against the configured plugins.
    pub async fn run_job(&self, invocation: HookInvocation) -> Result<JobOutput, Error> {
        run_job(invocation, Some(self.plugins.as_slice())).await
    }
}
