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
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use offload_error::{Code, Error, ResultExt, make_err};
use offload_util::spawn;
use offload_util::task::JoinHandleDropGuard;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, trace, trace_span, warn};

use crate::protocol::{
    CompilerOp, CompilerOptions, JobOp, JobOutput, JobPayload, LoadedModule, RpcOp, RpcPayload,
    RpcResponse, SourceMap,
};
use crate::rpc::RpcHandler;
use crate::worker::{Worker, WorkerId};

/// The transformation a worker runs for every job. Implementations may call
/// back into the host through the `TransformContext`.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, ctx: &TransformContext) -> Result<JobOutput, Error>;
}

/// Everything a `Transformer` can see or do while running one job.
pub struct TransformContext {
    worker_id: WorkerId,
    job: JobPayload,
    options: Option<CompilerOptions>,
    rpc: Arc<dyn RpcHandler>,
}

impl TransformContext {
    pub fn new(
        worker_id: WorkerId,
        job: JobPayload,
        options: Option<CompilerOptions>,
        rpc: Arc<dyn RpcHandler>,
    ) -> Self {
        Self {
            worker_id,
            job,
            options,
            rpc,
        }
    }

    pub const fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub const fn job(&self) -> &JobPayload {
        &self.job
    }

    /// Options the job's build configuration passed to `configure`, if any.
    pub const fn options(&self) -> Option<&CompilerOptions> {
        self.options.as_ref()
    }

    async fn call(&self, op: RpcOp, payload: RpcPayload) -> Result<RpcResponse, Error> {
        trace!(worker_id = %self.worker_id, job_id = %self.job.job_id, %op, "Sending RPC to host");
        self.rpc
            .execute(op.as_str(), payload)
            .await
            .err_tip(|| format!("In RPC '{op}' for job {}", self.job.job_id))
    }

    async fn call_job(&self, op: JobOp, payload: RpcPayload) -> Result<RpcResponse, Error> {
        let payload = RpcPayload {
            job_id: Some(self.job.job_id.clone()),
            ..payload
        };
        self.call(RpcOp::Job(op), payload).await
    }

    /// Resolves `request` relative to `context` with the job's compiler.
    pub async fn resolve(&self, context: &str, request: &str) -> Result<String, Error> {
        let payload = RpcPayload {
            context: Some(context.to_string()),
            resource: Some(request.to_string()),
            ..RpcPayload::for_compiler(self.job.compiler_id.clone())
        };
        match self.call(RpcOp::Compiler(CompilerOp::Resolve), payload).await? {
            RpcResponse::Resolved { path } => Ok(path),
            other => Err(make_err!(
                Code::Internal,
                "Expected a resolved path from 'resolve', got {other:?}"
            )),
        }
    }

    pub async fn emit_warning(&self, message: &str) -> Result<(), Error> {
        let payload = RpcPayload {
            message: Some(message.to_string()),
            ..Default::default()
        };
        self.call_job(JobOp::EmitWarning, payload).await.map(drop)
    }

    pub async fn emit_error(&self, message: &str) -> Result<(), Error> {
        let payload = RpcPayload {
            message: Some(message.to_string()),
            ..Default::default()
        };
        self.call_job(JobOp::EmitError, payload).await.map(drop)
    }

    pub async fn emit_file(
        &self,
        name: &str,
        contents: &str,
        source_map: Option<&SourceMap>,
    ) -> Result<(), Error> {
        let payload = RpcPayload {
            name: Some(name.to_string()),
            contents: Some(contents.to_string()),
            source_map: source_map.map(SourceMap::to_json).transpose()?,
            ..Default::default()
        };
        self.call_job(JobOp::EmitFile, payload).await.map(drop)
    }

    pub async fn add_dependency(&self, file: &str) -> Result<(), Error> {
        let payload = RpcPayload {
            file: Some(file.to_string()),
            ..Default::default()
        };
        self.call_job(JobOp::AddDependency, payload).await.map(drop)
    }

    pub async fn add_context_dependency(&self, file: &str) -> Result<(), Error> {
        let payload = RpcPayload {
            file: Some(file.to_string()),
            ..Default::default()
        };
        self.call_job(JobOp::AddContextDependency, payload)
            .await
            .map(drop)
    }

    pub async fn clear_dependencies(&self) -> Result<(), Error> {
        self.call_job(JobOp::ClearDependencies, RpcPayload::default())
            .await
            .map(drop)
    }

    /// Asks the host to load and build another module.
    pub async fn load_module(&self, file: &str) -> Result<LoadedModule, Error> {
        let payload = RpcPayload {
            file: Some(file.to_string()),
            ..Default::default()
        };
        match self.call_job(JobOp::LoadModule, payload).await? {
            RpcResponse::Module(module) => Ok(module),
            other => Err(make_err!(
                Code::Internal,
                "Expected a module from 'loadModule', got {other:?}"
            )),
        }
    }
}

impl fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformContext")
            .field("worker_id", &self.worker_id)
            .field("job_id", &self.job.job_id)
            .finish_non_exhaustive()
    }
}

enum WorkerMessage {
    Configure {
        owner_id: String,
        options: CompilerOptions,
        reply: oneshot::Sender<()>,
    },
    Dispatch {
        job: JobPayload,
        reply: oneshot::Sender<Result<JobOutput, Error>>,
    },
}

struct RunningWorker {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    // Dropping the guard aborts the loop, which aborts every job it owns.
    _worker_loop: JoinHandleDropGuard<()>,
}

/// Worker that runs on a background task of the host's tokio runtime.
/// Every job gets its own task so a transformation waiting on an RPC never
/// blocks other jobs assigned to the same worker.
pub struct LocalWorker {
    id: WorkerId,
    transformer: Arc<dyn Transformer>,
    rpc: Arc<dyn RpcHandler>,
    running: Mutex<Option<RunningWorker>>,
}

impl LocalWorker {
    pub fn new(id: WorkerId, transformer: Arc<dyn Transformer>, rpc: Arc<dyn RpcHandler>) -> Self {
        Self {
            id,
            transformer,
            rpc,
            running: Mutex::new(None),
        }
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<WorkerMessage>, Error> {
        self.running
            .lock()
            .as_ref()
            .map(|running| running.tx.clone())
            .err_tip_with_code(|_| (Code::Unavailable, format!("Worker {} is not open", self.id)))
    }

    fn send(&self, message: WorkerMessage) -> Result<(), Error> {
        self.sender()?
            .send(message)
            .map_err(|_| make_err!(Code::Unavailable, "Worker {} has shut down", self.id))
    }
}

impl fmt::Debug for LocalWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWorker")
            .field("id", &self.id)
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

async fn run_worker_loop(
    id: WorkerId,
    transformer: Arc<dyn Transformer>,
    rpc: Arc<dyn RpcHandler>,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    let mut options_by_owner: HashMap<String, CompilerOptions> = HashMap::new();
    let mut running_jobs = JoinSet::new();
    loop {
        tokio::select! {
            maybe_message = rx.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };
                match message {
                    WorkerMessage::Configure { owner_id, options, reply } => {
                        debug!(worker_id = %id, %owner_id, "Worker configured");
                        options_by_owner.insert(owner_id, options);
                        drop(reply.send(()));
                    }
                    WorkerMessage::Dispatch { job, reply } => {
                        let span = trace_span!("transform", worker_id = %id, job_id = %job.job_id);
                        let options = options_by_owner.get(&job.compiler_id).cloned();
                        let ctx = TransformContext::new(id.clone(), job, options, rpc.clone());
                        let transformer = transformer.clone();
                        running_jobs.spawn(
                            async move {
                                let result = transformer.transform(&ctx).await;
                                drop(reply.send(result));
                            }
                            .instrument(span),
                        );
                    }
                }
            }
            Some(join_result) = running_jobs.join_next(), if !running_jobs.is_empty() => {
                if let Err(err) = join_result {
                    warn!(worker_id = %id, ?err, "Transform task did not complete");
                }
            }
        }
    }
    debug!(worker_id = %id, pending = running_jobs.len(), "Worker loop exiting");
}

#[async_trait]
impl Worker for LocalWorker {
    fn id(&self) -> &WorkerId {
        &self.id
    }

    async fn open(&self) -> Result<(), Error> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(make_err!(
                Code::FailedPrecondition,
                "Worker {} is already open",
                self.id
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let worker_loop = spawn!(
            "local_worker_loop",
            run_worker_loop(self.id.clone(), self.transformer.clone(), self.rpc.clone(), rx),
            worker_id = %self.id
        );
        *running = Some(RunningWorker {
            tx,
            _worker_loop: worker_loop,
        });
        debug!(worker_id = %self.id, "Worker opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        let running = self.running.lock().take();
        if running.is_some() {
            debug!(worker_id = %self.id, "Worker closed");
        }
        drop(running);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.running.lock().is_some()
    }

    async fn configure(&self, owner_id: &str, options: &CompilerOptions) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerMessage::Configure {
            owner_id: owner_id.to_string(),
            options: options.clone(),
            reply,
        })?;
        rx.await.map_err(|_| {
            make_err!(
                Code::Unavailable,
                "Worker {} closed before it was configured",
                self.id
            )
        })
    }

    async fn dispatch(&self, job: JobPayload) -> Result<JobOutput, Error> {
        let job_id = job.job_id.clone();
        let (reply, rx) = oneshot::channel();
        self.send(WorkerMessage::Dispatch { job, reply })?;
        rx.await.map_err(|_| {
            make_err!(
                Code::Unavailable,
                "Worker {} closed before job {job_id} completed",
                self.id
            )
        })?
    }
}
