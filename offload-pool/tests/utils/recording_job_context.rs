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

use async_trait::async_trait;
use offload_error::{Code, Error, make_err};
use offload_pool::host::{HookInvocation, IssuerPathResolver, JobContext, PathResolver};
use offload_worker::protocol::{LoadedModule, SourceMap};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobEvent {
    Cacheable,
    Warning(String),
    Error(String),
    File {
        name: String,
        contents: String,
        source_map: Option<SourceMap>,
    },
    Dependency(String),
    ContextDependency(String),
    ClearDependencies,
    LoadModule(String),
}

/// Job context double that records every call in order.
#[derive(Debug, Default)]
pub(crate) struct RecordingJobContext {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingJobContext {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<JobEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: JobEvent) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl JobContext for RecordingJobContext {
    fn mark_cacheable(&self) {
        self.record(JobEvent::Cacheable);
    }

    fn emit_warning(&self, message: &str) {
        self.record(JobEvent::Warning(message.to_string()));
    }

    fn emit_error(&self, message: &str) {
        self.record(JobEvent::Error(message.to_string()));
    }

    fn emit_file(&self, name: &str, contents: &str, source_map: Option<SourceMap>) {
        self.record(JobEvent::File {
            name: name.to_string(),
            contents: contents.to_string(),
            source_map,
        });
    }

    fn add_dependency(&self, file: &str) {
        self.record(JobEvent::Dependency(file.to_string()));
    }

    fn add_context_dependency(&self, file: &str) {
        self.record(JobEvent::ContextDependency(file.to_string()));
    }

    fn clear_dependencies(&self) {
        self.record(JobEvent::ClearDependencies);
    }

    async fn load_module(&self, file: &str) -> Result<LoadedModule, Error> {
        self.record(JobEvent::LoadModule(file.to_string()));
        if file.ends_with(".missing") {
            return Err(make_err!(Code::NotFound, "Module '{file}' does not exist"));
        }
        Ok(LoadedModule {
            source: format!("export default '{file}';"),
            source_map: None,
        })
    }
}

/// Resolver double for the `(context, request)` convention. Records its
/// arguments and joins them with `/`.
#[derive(Debug, Default)]
pub(crate) struct ScriptedResolver {
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedResolver {
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PathResolver for ScriptedResolver {
    async fn resolve(&self, context: &str, request: &str) -> Result<String, Error> {
        self.calls
            .lock()
            .push((context.to_string(), request.to_string()));
        Ok(format!("{context}/{request}"))
    }
}

/// Resolver double for the `(context, issuer, request)` convention.
#[derive(Debug, Default)]
pub(crate) struct ScriptedIssuerResolver {
    calls: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedIssuerResolver {
    pub(crate) fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl IssuerPathResolver for ScriptedIssuerResolver {
    async fn resolve(
        &self,
        context: &str,
        issuer: &str,
        request: &str,
    ) -> Result<String, Error> {
        self.calls
            .lock()
            .push((context.to_string(), issuer.to_string(), request.to_string()));
        Ok(format!("{issuer}!{request}"))
    }
}

/// A hook invocation for `resource` in `/src` that allows async completion.
pub(crate) fn make_invocation(
    query: &str,
    resource: &str,
    job_context: Arc<RecordingJobContext>,
) -> HookInvocation {
    HookInvocation {
        query: query.to_string(),
        source_code: format!("source of {resource}"),
        source_map: None,
        use_source_map: false,
        context: "/src".to_string(),
        resource: resource.to_string(),
        resource_path: resource.to_string(),
        resource_query: String::new(),
        target: "web".to_string(),
        supports_async: true,
        job_context,
    }
}
