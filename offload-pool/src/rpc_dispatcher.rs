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
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use offload_error::{Code, Error, ResultExt, make_err};
use offload_worker::protocol::{
    CompilerOp, DEFAULT_COMPILER_ID, JobOp, RpcOp, RpcPayload, RpcResponse, SourceMap,
};
use offload_worker::rpc::RpcHandler;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::host::{CompilerContext, JobContext};
use crate::shared_handle::SharedHandle;

/// Routes RPCs issued by workers to the host resources they address.
///
/// Compiler contexts are keyed by compiler id and live as long as their
/// `SharedHandle` has owners. Job contexts are keyed by job id and live for
/// the duration of one request.
#[derive(Default)]
pub struct RpcDispatcher {
    compilers: Mutex<HashMap<String, SharedHandle<Arc<CompilerContext>>>>,
    jobs: Mutex<HashMap<String, Arc<dyn JobContext>>>,
}

impl RpcDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `context` under `compiler_id` (or the default id). A handle
    /// already registered under the same id is replaced.
    pub fn register_compiler_context(&self, context: CompilerContext, compiler_id: Option<&str>) {
        let compiler_id = compiler_id.unwrap_or(DEFAULT_COMPILER_ID);
        debug!(%compiler_id, resolver = ?context.resolver(), "Registering compiler context");
        self.compilers
            .lock()
            .insert(compiler_id.to_string(), SharedHandle::new(Arc::new(context)));
    }

    /// Releases one owner of the compiler context. Unknown ids are ignored.
    pub fn unregister_compiler_context(&self, compiler_id: Option<&str>) {
        let compiler_id = compiler_id.unwrap_or(DEFAULT_COMPILER_ID);
        let mut compilers = self.compilers.lock();
        let Some(handle) = compilers.get_mut(compiler_id) else {
            return;
        };
        handle.reset();
        if handle.get().is_none() {
            compilers.remove(compiler_id);
            debug!(%compiler_id, "Compiler context released");
        }
    }

    pub fn has_compiler_context(&self, compiler_id: &str) -> bool {
        SharedHandle::safe_get(self.compilers.lock().get(compiler_id)).is_some()
    }

    /// Makes `job_context` reachable by RPCs carrying `job_id`. Fails with
    /// `AlreadyExists` if a job with that id is still active.
    pub fn register_job_context(
        &self,
        job_id: &str,
        job_context: Arc<dyn JobContext>,
    ) -> Result<(), Error> {
        match self.jobs.lock().entry(job_id.to_string()) {
            Entry::Occupied(_) => Err(make_err!(
                Code::AlreadyExists,
                "Job '{job_id}' is already active"
            )),
            Entry::Vacant(entry) => {
                trace!(%job_id, "Registering job context");
                entry.insert(job_context);
                Ok(())
            }
        }
    }

    pub fn unregister_job_context(&self, job_id: &str) {
        if self.jobs.lock().remove(job_id).is_some() {
            trace!(%job_id, "Unregistered job context");
        }
    }

    pub fn has_job_context(&self, job_id: &str) -> bool {
        self.jobs.lock().contains_key(job_id)
    }

    fn compiler_context(&self, compiler_id: Option<&str>) -> Result<Arc<CompilerContext>, Error> {
        let compiler_id = compiler_id
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_COMPILER_ID);
        SharedHandle::safe_get(self.compilers.lock().get(compiler_id))
            .cloned()
            .err_tip_with_code(|_| {
                (
                    Code::NotFound,
                    format!("No compiler context registered for '{compiler_id}'"),
                )
            })
    }

    fn job_context(&self, job_id: Option<&str>) -> Result<Arc<dyn JobContext>, Error> {
        let job_id = job_id.unwrap_or_default();
        self.jobs
            .lock()
            .get(job_id)
            .cloned()
            .err_tip_with_code(|_| (Code::NotFound, format!("No active job with id '{job_id}'")))
    }

    /// Services the RPC `op_type` issued by a worker.
    pub async fn execute(&self, op_type: &str, payload: RpcPayload) -> Result<RpcResponse, Error> {
        let op: RpcOp = op_type.parse()?;
        trace!(%op, compiler_id = ?payload.compiler_id, job_id = ?payload.job_id, "Executing RPC");
        match op {
            RpcOp::Compiler(compiler_op) => {
                let compiler = self.compiler_context(payload.compiler_id.as_deref())?;
                Self::execute_compiler_op(compiler_op, &compiler, &payload).await
            }
            RpcOp::Job(job_op) => {
                let job = self.job_context(payload.job_id.as_deref())?;
                Self::execute_job_op(job_op, job.as_ref(), &payload).await
            }
        }
    }

    async fn execute_compiler_op(
        op: CompilerOp,
        compiler: &CompilerContext,
        payload: &RpcPayload,
    ) -> Result<RpcResponse, Error> {
        let rpc_op = RpcOp::Compiler(op);
        match op {
            CompilerOp::Resolve => {
                let context = RpcPayload::require(&payload.context, "context", rpc_op)?;
                let request = RpcPayload::require(&payload.resource, "resource", rpc_op)?;
                let path = compiler
                    .resolver()
                    .resolve(context, request)
                    .await
                    .err_tip(|| format!("Resolving '{request}' from '{context}'"))?;
                Ok(RpcResponse::Resolved { path })
            }
        }
    }

    async fn execute_job_op(
        op: JobOp,
        job: &dyn JobContext,
        payload: &RpcPayload,
    ) -> Result<RpcResponse, Error> {
        let rpc_op = RpcOp::Job(op);
        match op {
            JobOp::EmitWarning => {
                job.emit_warning(RpcPayload::require(&payload.message, "message", rpc_op)?);
            }
            JobOp::EmitError => {
                job.emit_error(RpcPayload::require(&payload.message, "message", rpc_op)?);
            }
            JobOp::EmitFile => {
                let name = RpcPayload::require(&payload.name, "name", rpc_op)?;
                let contents = RpcPayload::require(&payload.contents, "contents", rpc_op)?;
                let source_map = payload
                    .source_map
                    .as_deref()
                    .map(SourceMap::from_json)
                    .transpose()
                    .err_tip(|| format!("In 'emitFile' for '{name}'"))?;
                job.emit_file(name, contents, source_map);
            }
            JobOp::AddDependency => {
                job.add_dependency(RpcPayload::require(&payload.file, "file", rpc_op)?);
            }
            JobOp::AddContextDependency => {
                job.add_context_dependency(RpcPayload::require(&payload.file, "file", rpc_op)?);
            }
            JobOp::ClearDependencies => job.clear_dependencies(),
            JobOp::LoadModule => {
                let file = RpcPayload::require(&payload.file, "file", rpc_op)?;
                let module = job
                    .load_module(file)
                    .await
                    .err_tip(|| format!("Loading module '{file}'"))?;
                return Ok(RpcResponse::Module(module));
            }
        }
        Ok(RpcResponse::Done)
    }
}

impl fmt::Debug for RpcDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcDispatcher")
            .field("compilers", &self.compilers.lock().len())
            .field("jobs", &self.jobs.lock().len())
            .finish()
    }
}

#[async_trait]
impl RpcHandler for RpcDispatcher {
    async fn execute(&self, op_type: &str, payload: RpcPayload) -> Result<RpcResponse, Error> {
        Self::execute(self, op_type, payload).await
    }
}
