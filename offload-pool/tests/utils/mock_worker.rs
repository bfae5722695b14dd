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
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use offload_config::pools::PoolConfig;
use offload_error::{Code, Error, make_err};
use offload_pool::rpc_dispatcher::RpcDispatcher;
use offload_pool::worker_pool::WorkerPool;
use offload_worker::protocol::{CompilerOptions, JobOutput, JobPayload, RpcPayload};
use offload_worker::worker::{Worker, WorkerId};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Worker double. Opens and closes instantly unless told to fail, records
/// configure calls, and answers every job by prefixing the source with its
/// own id after warning the job's host context through the dispatcher.
#[derive(Debug)]
pub(crate) struct MockWorker {
    id: WorkerId,
    rpc: Arc<RpcDispatcher>,
    open: AtomicBool,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    open_error: Mutex<Option<Error>>,
    close_error: Mutex<Option<Error>>,
    close_gate: Mutex<Option<Arc<Notify>>>,
    dispatch_error: Mutex<Option<Error>>,
    configured: Mutex<Vec<(String, CompilerOptions)>>,
    dispatched: Mutex<Vec<JobPayload>>,
}

impl MockWorker {
    pub(crate) fn new(id: WorkerId, rpc: Arc<RpcDispatcher>) -> Self {
        Self {
            id,
            rpc,
            open: AtomicBool::new(false),
            open_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            open_error: Mutex::new(None),
            close_error: Mutex::new(None),
            close_gate: Mutex::new(None),
            dispatch_error: Mutex::new(None),
            configured: Mutex::new(Vec::new()),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_open_with(&self, err: Error) {
        *self.open_error.lock() = Some(err);
    }

    pub(crate) fn fail_close_with(&self, err: Error) {
        *self.close_error.lock() = Some(err);
    }

    /// Makes `close` wait for `gate` before the worker reports itself
    /// closed.
    pub(crate) fn hold_close_until(&self, gate: Arc<Notify>) {
        *self.close_gate.lock() = Some(gate);
    }

    pub(crate) fn fail_dispatch_with(&self, err: Error) {
        *self.dispatch_error.lock() = Some(err);
    }

    pub(crate) fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::Acquire)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }

    pub(crate) fn configured(&self) -> Vec<(String, CompilerOptions)> {
        self.configured.lock().clone()
    }

    pub(crate) fn dispatched(&self) -> Vec<JobPayload> {
        self.dispatched.lock().clone()
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn id(&self) -> &WorkerId {
        &self.id
    }

    async fn open(&self) -> Result<(), Error> {
        self.open_calls.fetch_add(1, Ordering::AcqRel);
        if let Some(err) = self.open_error.lock().clone() {
            return Err(err);
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        let gate = self.close_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.open.store(false, Ordering::Release);
        match self.close_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn configure(&self, owner_id: &str, options: &CompilerOptions) -> Result<(), Error> {
        if !self.is_open() {
            return Err(make_err!(Code::Unavailable, "{} is closed", self.id));
        }
        self.configured
            .lock()
            .push((owner_id.to_string(), options.clone()));
        Ok(())
    }

    async fn dispatch(&self, job: JobPayload) -> Result<JobOutput, Error> {
        self.dispatched.lock().push(job.clone());
        let warning = RpcPayload {
            message: Some(format!("{} saw {}", self.id, job.resource)),
            ..RpcPayload::for_job(job.job_id.clone())
        };
        self.rpc.execute("emitWarning", warning).await?;
        if let Some(err) = self.dispatch_error.lock().clone() {
            return Err(err);
        }
        Ok(JobOutput {
            source_code: format!("{}:{}", self.id, job.source_code),
            source_map: job.source_map,
        })
    }
}

/// Builds a pool of `size` mock workers sharing a fresh dispatcher.
pub(crate) fn make_pool(
    size: usize,
    pool_id: Option<&str>,
) -> Result<(Arc<WorkerPool>, Vec<Arc<MockWorker>>), Error> {
    let config = PoolConfig {
        id: pool_id.map(str::to_string),
        ..PoolConfig::new("test", size)
    };
    let mut workers = Vec::new();
    let pool = WorkerPool::new(&config, Arc::new(RpcDispatcher::new()), |id, rpc| {
        let worker = Arc::new(MockWorker::new(id, rpc));
        workers.push(worker.clone());
        worker as Arc<dyn Worker>
    })?;
    Ok((Arc::new(pool), workers))
}
