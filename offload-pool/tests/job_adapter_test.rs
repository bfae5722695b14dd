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

mod utils {
    pub(crate) mod mock_worker;
    pub(crate) mod recording_job_context;
}

use offload_config::plugins::PluginConfig;
use offload_error::{Code, Error, make_err};
use offload_macro::offload_test;
use offload_pool::host::CompilerContext;
use offload_pool::job_adapter::{HookQuery, run_job};
use offload_pool::plugin::OffloadPlugin;
use offload_worker::protocol::{JobOutput, SourceMap};
use pretty_assertions::assert_eq;
use serde_json::json;
use utils::mock_worker::{MockWorker, make_pool};
use utils::recording_job_context::{
    JobEvent, RecordingJobContext, ScriptedResolver, make_invocation,
};

fn hook_query(id: &str, compiler_id: &str) -> HookQuery {
    HookQuery {
        id: id.to_string(),
        compiler_id: compiler_id.to_string(),
    }
}

async fn started_plugin(
    loaders: &[&str],
) -> Result<(Arc<OffloadPlugin>, Vec<Arc<MockWorker>>), Error> {
    let (pool, workers) = make_pool(2, None)?;
    let plugin = Arc::new(OffloadPlugin::new(
        PluginConfig {
            id: "1".to_string(),
            loaders: loaders.iter().map(ToString::to_string).collect(),
            pool: "test".to_string(),
        },
        pool,
    ));
    plugin
        .on_build_start(
            "default",
            CompilerContext::with_resolver(Arc::new(ScriptedResolver::default())),
            &json!({}),
        )
        .await?;
    Ok((plugin, workers))
}

#[test]
fn hook_query_defaults() {
    assert_eq!(HookQuery::parse("").unwrap(), hook_query("1", "default"));
    assert_eq!(HookQuery::parse("?").unwrap(), hook_query("1", "default"));
}

#[test]
fn hook_query_string_form() {
    assert_eq!(
        HookQuery::parse("?id=styles&compilerId=web").unwrap(),
        hook_query("styles", "web")
    );
    assert_eq!(
        HookQuery::parse("?compilerId=web&cacheDirectory").unwrap(),
        hook_query("1", "web")
    );
    // Empty values fall back to the defaults.
    assert_eq!(
        HookQuery::parse("?id=&compilerId=node").unwrap(),
        hook_query("1", "node")
    );
}

#[test]
fn hook_query_object_form() {
    assert_eq!(
        HookQuery::parse("?{id: 2, compilerId: 'node'}").unwrap(),
        hook_query("2", "node")
    );
    assert_eq!(
        HookQuery::parse(r#"?{"id": "js", "extra": [1, 2]}"#).unwrap(),
        hook_query("js", "default")
    );
}

#[test]
fn hook_query_rejects_malformed_queries() {
    let err = HookQuery::parse("id=1").unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    let err = HookQuery::parse("?{id: ").unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
}

#[test]
fn job_id_combines_compiler_hook_and_resource() {
    assert_eq!(
        hook_query("styles", "web").job_id("/src/a.css"),
        "Loader::web:styles:/src/a.css"
    );
}

#[offload_test]
async fn passes_source_through_without_plugins() -> Result<(), Error> {
    let job = RecordingJobContext::new();
    let mut invocation = make_invocation("", "/src/a.js", job.clone());
    let map = SourceMap {
        version: 3,
        ..Default::default()
    };
    invocation.source_map = Some(map.clone());

    let output = run_job(invocation, None).await?;
    assert_eq!(
        output,
        JobOutput {
            source_code: "source of /src/a.js".to_string(),
            source_map: Some(map),
        }
    );
    assert_eq!(job.events(), vec![JobEvent::Cacheable]);
    Ok(())
}

#[offload_test]
async fn requires_async_capable_host() -> Result<(), Error> {
    let job = RecordingJobContext::new();
    let mut invocation = make_invocation("", "/src/a.js", job.clone());
    invocation.supports_async = false;

    let err = run_job(invocation, None).await.unwrap_err();
    assert_eq!(err.code, Code::FailedPrecondition);
    assert_eq!(job.events(), vec![]);
    Ok(())
}

#[offload_test]
async fn unknown_hook_id_is_a_configuration_error() -> Result<(), Error> {
    let (plugin, workers) = started_plugin(&[]).await?;
    let job = RecordingJobContext::new();

    let err = run_job(
        make_invocation("?id=styles", "/src/a.css", job),
        Some(core::slice::from_ref(&plugin)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    assert_eq!(
        err.messages,
        vec!["Could not find plugin for id 'styles'; is it in the plugin list?".to_string()]
    );
    assert!(workers.iter().all(|worker| worker.dispatched().is_empty()));
    Ok(())
}

#[offload_test]
async fn job_context_is_registered_while_the_job_runs() -> Result<(), Error> {
    let (plugin, workers) = started_plugin(&["babel-loader", "eslint-loader"]).await?;
    let dispatcher = plugin.pool().rpc_dispatcher().clone();
    let job = RecordingJobContext::new();

    let output = run_job(
        make_invocation("?compilerId=default", "/src/a.js", job.clone()),
        Some(core::slice::from_ref(&plugin)),
    )
    .await?;
    assert_eq!(output.source_code, "0:source of /src/a.js");

    // The worker's RPC reached the job context, so it was registered.
    assert_eq!(
        job.events(),
        vec![
            JobEvent::Cacheable,
            JobEvent::Warning("0 saw /src/a.js".to_string()),
        ]
    );
    assert!(!dispatcher.has_job_context("Loader::default:1:/src/a.js"));

    let dispatched = workers[0].dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].job_id, "Loader::default:1:/src/a.js");
    assert_eq!(dispatched[0].compiler_id, "default");
    assert_eq!(
        dispatched[0].request,
        "babel-loader!eslint-loader!/src/a.js"
    );
    assert_eq!(dispatched[0].context, "/src");
    assert_eq!(dispatched[0].target, "web");
    Ok(())
}

#[offload_test]
async fn failed_job_is_unregistered_and_aborted() -> Result<(), Error> {
    let (plugin, workers) = started_plugin(&[]).await?;
    let dispatcher = plugin.pool().rpc_dispatcher().clone();
    workers[0].fail_dispatch_with(make_err!(Code::InvalidArgument, "Unexpected token"));

    let err = run_job(
        make_invocation("", "/src/a.js", RecordingJobContext::new()),
        Some(core::slice::from_ref(&plugin)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, Code::Aborted);
    assert_eq!(
        err.messages,
        vec![
            "Unexpected token".to_string(),
            "Job Loader::default:1:/src/a.js failed".to_string(),
        ]
    );
    assert!(!dispatcher.has_job_context("Loader::default:1:/src/a.js"));
    Ok(())
}
