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

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use futures::future::try_join_all;
use offload_config::OffloadConfig;
use offload_error::{Code, Error, ResultExt, make_err};
use offload_pool::host::{CompilerContext, HookInvocation, JobContext, PathResolver};
use offload_pool::plugin_manager::PluginManager;
use offload_util::{background_spawn, init_tracing};
use offload_worker::local_worker::{LocalWorker, TransformContext, Transformer};
use offload_worker::protocol::{DEFAULT_COMPILER_ID, JobOutput, LoadedModule, SourceMap};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[clap(version, about = "Validates an offload config and exercises every pool it declares")]
struct Args {
    /// Config file to use.
    #[clap(value_parser)]
    config_file: String,

    /// Only parse and validate the config; do not start any workers.
    #[clap(long)]
    check: bool,
}

/// Returns the source unchanged.
#[derive(Debug)]
struct PassthroughTransformer;

#[async_trait]
impl Transformer for PassthroughTransformer {
    async fn transform(&self, ctx: &TransformContext) -> Result<JobOutput, Error> {
        Ok(JobOutput {
            source_code: ctx.job().source_code.clone(),
            source_map: ctx.job().source_map.clone(),
        })
    }
}

/// Resolves requests as paths relative to the context directory.
#[derive(Debug)]
struct DirectoryResolver;

#[async_trait]
impl PathResolver for DirectoryResolver {
    async fn resolve(&self, context: &str, request: &str) -> Result<String, Error> {
        Ok(Path::new(context).join(request).display().to_string())
    }
}

/// Logs whatever a job reports back.
#[derive(Debug)]
struct LoggingJobContext {
    resource: String,
}

#[async_trait]
impl JobContext for LoggingJobContext {
    fn mark_cacheable(&self) {}

    fn emit_warning(&self, message: &str) {
        warn!(resource = %self.resource, %message, "Job warning");
    }

    fn emit_error(&self, message: &str) {
        error!(resource = %self.resource, %message, "Job error");
    }

    fn emit_file(&self, name: &str, contents: &str, _source_map: Option<SourceMap>) {
        info!(resource = %self.resource, %name, bytes = contents.len(), "Job emitted file");
    }

    fn add_dependency(&self, file: &str) {
        info!(resource = %self.resource, %file, "Job added dependency");
    }

    fn add_context_dependency(&self, file: &str) {
        info!(resource = %self.resource, %file, "Job added context dependency");
    }

    fn clear_dependencies(&self) {}

    async fn load_module(&self, file: &str) -> Result<LoadedModule, Error> {
        Err(make_err!(
            Code::Unimplemented,
            "Loading '{file}' is not supported outside a build tool"
        ))
    }
}

fn make_invocation(plugin_id: &str) -> HookInvocation {
    let resource = PathBuf::from("/offload-check")
        .join(format!("{plugin_id}.js"))
        .display()
        .to_string();
    HookInvocation {
        query: format!("?id={plugin_id}&compilerId={DEFAULT_COMPILER_ID}"),
        source_code: format!("// checked by plugin {plugin_id}\n"),
        source_map: None,
        use_source_map: false,
        context: "/offload-check".to_string(),
        resource_path: resource.clone(),
        job_context: Arc::new(LoggingJobContext {
            resource: resource.clone(),
        }),
        resource,
        resource_query: String::new(),
        target: "node".to_string(),
        supports_async: true,
    }
}

async fn inner_main(config: OffloadConfig) -> Result<(), Error> {
    let manager = PluginManager::from_config(&config, |_pool_config, id, rpc| {
        Arc::new(LocalWorker::new(id, Arc::new(PassthroughTransformer), rpc))
    })?;

    let compiler_context = CompilerContext::with_resolver(Arc::new(DirectoryResolver));
    manager
        .on_build_start(
            DEFAULT_COMPILER_ID,
            &compiler_context,
            &serde_json::Value::Null,
        )
        .await
        .err_tip(|| "Could not start plugins")?;

    let result = try_join_all(manager.plugins().iter().map(|plugin| {
        let manager = &manager;
        async move {
            let output = manager
                .run_job(make_invocation(plugin.id()))
                .await
                .err_tip(|| format!("Plugin '{}' failed its check", plugin.id()))?;
            info!(plugin_id = %plugin.id(), bytes = output.source_code.len(), "Plugin ok");
            Ok::<_, Error>(())
        }
    }))
    .await;

    manager.on_build_done(DEFAULT_COMPILER_ID).await;
    result.map(drop)
}

fn main() -> Result<(), Box<dyn core::error::Error>> {
    init_tracing()?;

    let args = Args::parse();
    let config = OffloadConfig::from_file(Path::new(&args.config_file))?;
    info!(
        pools = config.pools.len(),
        plugins = config.plugins.len(),
        "Config is valid"
    );
    if args.check {
        return Ok(());
    }

    #[allow(clippy::disallowed_methods)]
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(async move {
            background_spawn!("ctrl_c_listener", async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("User terminated process via SIGINT");
                    std::process::exit(130);
                }
            });
            inner_main(config).await
        })?;
    }
    Ok(())
}
