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

use core::fmt;
use core::future::Future;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use offload_config::pools::PoolConfig;
use offload_error::{Code, Error, ResultExt, make_err, make_input_err};
use offload_worker::protocol::CompilerOptions;
use offload_worker::worker::{Worker, WorkerId};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, trace, warn};

use crate::rpc_dispatcher::RpcDispatcher;

#[derive(Debug, Default)]
struct PoolState {
    next_worker: usize,
    /// Owner id -> number of outstanding `configure` calls.
    owners: HashMap<String, usize>,
}

/// A fixed set of workers shared by every build configuration that
/// configures it. Jobs are handed out round robin.
pub struct WorkerPool {
    id: Option<String>,
    workers: Vec<Arc<dyn Worker>>,
    rpc_dispatcher: Arc<RpcDispatcher>,
    state: Mutex<PoolState>,
    /// Held across start, configure and stop so a teardown in progress is
    /// never interleaved with a new owner.
    lifecycle: AsyncMutex<()>,
    verbose: bool,
    debug: bool,
}

/// Runs `f` on every worker concurrently and merges all failures into one
/// error.
async fn for_each_worker<'a, F, Fut>(
    workers: impl Iterator<Item = &'a Arc<dyn Worker>>,
    f: F,
) -> Result<(), Error>
where
    F: Fn(&'a Arc<dyn Worker>) -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    join_all(workers.map(f))
        .await
        .into_iter()
        .fold(Ok(()), |acc, result| acc.merge(result))
}

impl WorkerPool {
    /// Creates `config.size` workers through `worker_factory`. Workers are
    /// not opened until `start`.
    pub fn new<F>(
        config: &PoolConfig,
        rpc_dispatcher: Arc<RpcDispatcher>,
        mut worker_factory: F,
    ) -> Result<Self, Error>
    where
        F: FnMut(WorkerId, Arc<RpcDispatcher>) -> Arc<dyn Worker>,
    {
        if config.size == 0 {
            return Err(make_input_err!(
                "Pool '{}' must have at least one worker",
                config.name
            ));
        }
        let workers = (0..config.size)
            .map(|index| {
                worker_factory(
                    WorkerId::new(config.id.as_deref(), index),
                    rpc_dispatcher.clone(),
                )
            })
            .collect();
        Ok(Self {
            id: config.id.clone(),
            workers,
            rpc_dispatcher,
            state: Mutex::new(PoolState::default()),
            lifecycle: AsyncMutex::new(()),
            verbose: config.verbose,
            debug: config.debug,
        })
    }

    pub const fn size(&self) -> usize {
        self.workers.len()
    }

    pub const fn rpc_dispatcher(&self) -> &Arc<RpcDispatcher> {
        &self.rpc_dispatcher
    }

    /// True iff every worker is open.
    pub fn is_running(&self) -> bool {
        self.workers.iter().all(|worker| worker.is_open())
    }

    /// Opens every worker that is not open yet.
    pub async fn start(&self) -> Result<(), Error> {
        let _lifecycle = self.lifecycle.lock().await;
        self.open_pending().await
    }

    /// Takes a reference on the pool for `owner_id` and hands `options` to
    /// every worker. The reference is taken even when the pool is not
    /// running; `stop` releases it.
    pub async fn configure(&self, owner_id: &str, options: &CompilerOptions) -> Result<(), Error> {
        let _lifecycle = self.lifecycle.lock().await;
        self.configure_locked(owner_id, options).await
    }

    /// `start` followed by `configure`, with no `stop` able to run in
    /// between.
    pub async fn acquire(&self, owner_id: &str, options: &CompilerOptions) -> Result<(), Error> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_running() {
            self.open_pending().await?;
        }
        self.configure_locked(owner_id, options).await
    }

    /// Releases one reference held by `owner_id`. Workers are closed once no
    /// owner holds a reference. Close failures are logged.
    pub async fn stop(&self, owner_id: &str) {
        let _lifecycle = self.lifecycle.lock().await;
        let remaining_owners = {
            let mut state = self.state.lock();
            if let Some(count) = state.owners.get_mut(owner_id) {
                *count -= 1;
                if *count == 0 {
                    state.owners.remove(owner_id);
                }
            }
            state.owners.len()
        };
        if remaining_owners != 0 {
            debug!(pool_id = %self.display_id(), %owner_id, remaining_owners, "Pool still in use");
            return;
        }

        let open = self.workers.iter().filter(|worker| worker.is_open());
        let result = for_each_worker(open, |worker| async move {
            worker
                .close()
                .await
                .err_tip(|| format!("Failed to close worker {}", worker.id()))
        })
        .await;
        if let Err(err) = result {
            warn!(pool_id = %self.display_id(), ?err, "Errors while stopping worker pool");
        }
        if self.verbose {
            info!(pool_id = %self.display_id(), "Worker pool stopped");
        } else {
            debug!(pool_id = %self.display_id(), "Worker pool stopped");
        }
    }

    async fn open_pending(&self) -> Result<(), Error> {
        let pending = self.workers.iter().filter(|worker| !worker.is_open());
        for_each_worker(pending, |worker| async move {
            worker
                .open()
                .await
                .err_tip(|| format!("Failed to open worker {}", worker.id()))
        })
        .await
        .err_tip(|| format!("Starting pool {}", self.display_id()))?;
        if self.verbose {
            info!(pool_id = %self.display_id(), size = self.size(), "Worker pool started");
        } else {
            debug!(pool_id = %self.display_id(), size = self.size(), "Worker pool started");
        }
        Ok(())
    }

    async fn configure_locked(&self, owner_id: &str, options: &CompilerOptions) -> Result<(), Error> {
        *self
            .state
            .lock()
            .owners
            .entry(owner_id.to_string())
            .or_default() += 1;
        if !self.is_running() {
            return Err(make_err!(
                Code::FailedPrecondition,
                "Pool {} must be started before '{owner_id}' can configure it",
                self.display_id()
            ));
        }
        for_each_worker(self.workers.iter(), |worker| async move {
            worker
                .configure(owner_id, options)
                .await
                .err_tip(|| format!("Failed to configure worker {}", worker.id()))
        })
        .await
    }

    /// Next worker in round robin order.
    pub fn get_worker(&self) -> Arc<dyn Worker> {
        let index = {
            let mut state = self.state.lock();
            let index = state.next_worker;
            state.next_worker = (index + 1) % self.workers.len();
            index
        };
        let worker = self.workers[index].clone();
        if self.debug {
            debug!(pool_id = %self.display_id(), worker_id = %worker.id(), "Assigned worker");
        } else {
            trace!(pool_id = %self.display_id(), worker_id = %worker.id(), "Assigned worker");
        }
        worker
    }

    /// Number of outstanding references `owner_id` holds.
    pub fn owner_count(&self, owner_id: &str) -> usize {
        self.state
            .lock()
            .owners
            .get(owner_id)
            .copied()
            .unwrap_or_default()
    }

    fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<unnamed>")
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.id)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}
