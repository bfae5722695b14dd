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

//! What the host build tool provides to the pool: compiler contexts for
//! resolving modules and per-request job contexts.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use offload_error::Error;
use offload_worker::protocol::{LoadedModule, SourceMap};

/// Module resolution with the `(context, request)` calling convention.
#[async_trait]
pub trait PathResolver: Send + Sync {
    async fn resolve(&self, context: &str, request: &str) -> Result<String, Error>;
}

/// Module resolution with the `(context, issuer, request)` calling
/// convention used by newer hosts.
#[async_trait]
pub trait IssuerPathResolver: Send + Sync {
    async fn resolve(&self, context: &str, issuer: &str, request: &str)
    -> Result<String, Error>;
}

/// The resolver a compiler context exposes, fixed when the context is
/// created.
#[derive(Clone)]
pub enum ResolverConvention {
    Standard(Arc<dyn PathResolver>),
    WithIssuer(Arc<dyn IssuerPathResolver>),
}

impl ResolverConvention {
    /// Resolves `request` from `context`. The issuer form passes the
    /// context as the issuer.
    pub async fn resolve(&self, context: &str, request: &str) -> Result<String, Error> {
        match self {
            Self::Standard(resolver) => resolver.resolve(context, request).await,
            Self::WithIssuer(resolver) => resolver.resolve(context, context, request).await,
        }
    }
}

impl fmt::Debug for ResolverConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(_) => f.write_str("Standard"),
            Self::WithIssuer(_) => f.write_str("WithIssuer"),
        }
    }
}

/// Host-side resource of one build configuration.
#[derive(Debug, Clone)]
pub struct CompilerContext {
    resolver: ResolverConvention,
}

impl CompilerContext {
    pub const fn new(resolver: ResolverConvention) -> Self {
        Self { resolver }
    }

    pub const fn with_resolver(resolver: Arc<dyn PathResolver>) -> Self {
        Self::new(ResolverConvention::Standard(resolver))
    }

    pub const fn with_issuer_resolver(resolver: Arc<dyn IssuerPathResolver>) -> Self {
        Self::new(ResolverConvention::WithIssuer(resolver))
    }

    pub const fn resolver(&self) -> &ResolverConvention {
        &self.resolver
    }
}

/// Host-side resource of one transformation request. Worker RPCs addressed
/// to the request's job id land here.
#[async_trait]
pub trait JobContext: Send + Sync {
    /// Marks the request's result as safe to cache.
    fn mark_cacheable(&self);

    fn emit_warning(&self, message: &str);

    fn emit_error(&self, message: &str);

    fn emit_file(&self, name: &str, contents: &str, source_map: Option<SourceMap>);

    fn add_dependency(&self, file: &str);

    fn add_context_dependency(&self, file: &str);

    fn clear_dependencies(&self);

    /// Loads and builds `file` through the host's own pipeline.
    async fn load_module(&self, file: &str) -> Result<LoadedModule, Error>;
}

/// One invocation of the offloading hook by the host.
#[derive(Clone)]
pub struct HookInvocation {
    /// Query attached to the hook, `?id=..&compilerId=..` or `?{...}`.
    pub query: String,
    pub source_code: String,
    pub source_map: Option<SourceMap>,
    pub use_source_map: bool,
    /// Directory of the resource.
    pub context: String,
    pub resource: String,
    pub resource_path: String,
    pub resource_query: String,
    pub target: String,
    /// Whether the host lets the hook complete asynchronously.
    pub supports_async: bool,
    pub job_context: Arc<dyn JobContext>,
}

impl fmt::Debug for HookInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookInvocation")
            .field("query", &self.query)
            .field("resource", &self.resource)
            .field("supports_async", &self.supports_async)
            .finish_non_exhaustive()
    }
}
