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

//! Entry point the host calls for every resource routed through the
//! offloading hook.

use std::sync::Arc;

use offload_config::plugins::DEFAULT_PLUGIN_ID;
use offload_error::{Code, Error, ResultExt, make_err, make_input_err};
use offload_worker::protocol::{DEFAULT_COMPILER_ID, JobOutput, JobPayload};
use serde_json::Value;
use tracing::{debug, trace};

use crate::host::HookInvocation;
use crate::plugin::OffloadPlugin;

/// Parameters encoded in the hook query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookQuery {
    /// Id of the plugin the hook submits to.
    pub id: String,
    /// Build configuration the hook runs in.
    pub compiler_id: String,
}

impl Default for HookQuery {
    fn default() -> Self {
        Self {
            id: DEFAULT_PLUGIN_ID.to_string(),
            compiler_id: DEFAULT_COMPILER_ID.to_string(),
        }
    }
}

/// Stringifies a query value. Empty, null and false values count as unset.
fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

impl HookQuery {
    /// Parses `?id=..&compilerId=..` or the JSON5 object form `?{...}`. An
    /// empty query yields the defaults.
    pub fn parse(query: &str) -> Result<Self, Error> {
        if query.is_empty() {
            return Ok(Self::default());
        }
        let Some(query) = query.strip_prefix('?') else {
            return Err(make_input_err!("Hook query '{query}' must begin with '?'"));
        };

        let mut parsed = Self::default();
        if query.starts_with('{') {
            let fields: serde_json::Map<String, Value> = serde_json5::from_str(query)
                .err_tip(|| format!("Could not parse hook query '?{query}'"))?;
            if let Some(id) = fields.get("id").and_then(query_value) {
                parsed.id = id;
            }
            if let Some(compiler_id) = fields.get("compilerId").and_then(query_value) {
                parsed.compiler_id = compiler_id;
            }
            return Ok(parsed);
        }

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, "true"));
            if value.is_empty() {
                continue;
            }
            match key {
                "id" => parsed.id = value.to_string(),
                "compilerId" => parsed.compiler_id = value.to_string(),
                _ => trace!(%key, "Ignoring unknown hook query parameter"),
            }
        }
        Ok(parsed)
    }

    /// Key under which the job context of `resource` is registered.
    pub fn job_id(&self, resource: &str) -> String {
        format!("Loader::{}:{}:{resource}", self.compiler_id, self.id)
    }
}

/// Runs one hook invocation to completion.
///
/// With no plugin list the source passes through untouched. Otherwise the
/// job is submitted to the plugin whose id matches the hook query, and the
/// job context stays registered for exactly as long as the job runs.
pub async fn run_job(
    invocation: HookInvocation,
    plugins: Option<&[Arc<OffloadPlugin>]>,
) -> Result<JobOutput, Error> {
    let query = HookQuery::parse(&invocation.query)?;
    let job_id = query.job_id(&invocation.resource);

    if !invocation.supports_async {
        return Err(make_err!(
            Code::FailedPrecondition,
            "Offloading requires a host that allows asynchronous hooks"
        ));
    }
    invocation.job_context.mark_cacheable();

    let Some(plugins) = plugins else {
        trace!(%job_id, "No plugins configured, passing source through");
        return Ok(JobOutput {
            source_code: invocation.source_code,
            source_map: invocation.source_map,
        });
    };
    let plugin = plugins
        .iter()
        .find(|plugin| plugin.id() == query.id)
        .err_tip_with_code(|_| {
            (
                Code::InvalidArgument,
                format!(
                    "Could not find plugin for id '{}'; is it in the plugin list?",
                    query.id
                ),
            )
        })?;

    let rpc_dispatcher = plugin.pool().rpc_dispatcher().clone();
    rpc_dispatcher.register_job_context(&job_id, invocation.job_context.clone())?;
    let _unregister = scopeguard::guard(job_id.clone(), move |job_id| {
        rpc_dispatcher.unregister_job_context(&job_id);
    });

    let job = JobPayload {
        job_id: job_id.clone(),
        compiler_id: query.compiler_id,
        request: plugin.generate_request(&invocation.resource),
        source_code: invocation.source_code,
        source_map: invocation.source_map,
        use_source_map: invocation.use_source_map,
        context: invocation.context,
        resource: invocation.resource,
        resource_path: invocation.resource_path,
        resource_query: invocation.resource_query,
        target: invocation.target,
    };
    debug!(%job_id, plugin_id = %plugin.id(), "Running job");
    plugin
        .compile(job)
        .await
        .err_tip_with_code(|_| (Code::Aborted, format!("Job {job_id} failed")))
}
