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

//! Messages exchanged between the host and its workers.
//!
//! Everything here derives serde so that an out-of-process transport can put
//! it on the wire as JSON; the in-process transport passes the values as-is.

use core::fmt;
use core::str::FromStr;

use offload_error::{Code, Error, ResultExt, make_err, make_input_err};
use serde::{Deserialize, Serialize};

/// Options a build configuration hands to every worker through
/// `WorkerPool::configure`. Opaque to the pool.
pub type CompilerOptions = serde_json::Value;

/// Id of the compiler context used when a payload does not name one.
pub const DEFAULT_COMPILER_ID: &str = "default";

/// Version 3 source map as produced by most JS tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

impl SourceMap {
    pub fn from_json(serialized: &str) -> Result<Self, Error> {
        serde_json::from_str(serialized).err_tip(|| "Failed to decode source map")
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).err_tip(|| "Failed to encode source map")
    }
}

/// A single transformation request as seen by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    /// Key of the job context on the host. Every job-scoped RPC issued while
    /// running this job must carry it.
    pub job_id: String,
    /// Build configuration the job belongs to.
    pub compiler_id: String,
    pub source_code: String,
    #[serde(default)]
    pub source_map: Option<SourceMap>,
    #[serde(default)]
    pub use_source_map: bool,
    /// Directory of the resource.
    pub context: String,
    /// Full loader request, `loader!loader!resource`.
    pub request: String,
    pub resource: String,
    pub resource_path: String,
    #[serde(default)]
    pub resource_query: String,
    #[serde(default)]
    pub target: String,
}

/// Result of a successful transformation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub source_code: String,
    #[serde(default)]
    pub source_map: Option<SourceMap>,
}

/// A nested module loaded by the host on behalf of a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedModule {
    pub source: String,
    #[serde(default)]
    pub source_map: Option<SourceMap>,
}

/// Operations that need a compiler context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilerOp {
    Resolve,
}

/// Operations that need an active job context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOp {
    EmitWarning,
    EmitError,
    EmitFile,
    AddDependency,
    AddContextDependency,
    ClearDependencies,
    LoadModule,
}

/// Every operation a worker may ask the host to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcOp {
    Compiler(CompilerOp),
    Job(JobOp),
}

impl RpcOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compiler(CompilerOp::Resolve) => "resolve",
            Self::Job(JobOp::EmitWarning) => "emitWarning",
            Self::Job(JobOp::EmitError) => "emitError",
            Self::Job(JobOp::EmitFile) => "emitFile",
            Self::Job(JobOp::AddDependency) => "addDependency",
            Self::Job(JobOp::AddContextDependency) => "addContextDependency",
            Self::Job(JobOp::ClearDependencies) => "clearDependencies",
            Self::Job(JobOp::LoadModule) => "loadModule",
        }
    }
}

impl fmt::Display for RpcOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RpcOp {
    type Err = Error;

    fn from_str(op_type: &str) -> Result<Self, Self::Err> {
        Ok(match op_type {
            "resolve" => Self::Compiler(CompilerOp::Resolve),
            "emitWarning" => Self::Job(JobOp::EmitWarning),
            "emitError" => Self::Job(JobOp::EmitError),
            "emitFile" => Self::Job(JobOp::EmitFile),
            "addDependency" => Self::Job(JobOp::AddDependency),
            "addContextDependency" => Self::Job(JobOp::AddContextDependency),
            "clearDependencies" => Self::Job(JobOp::ClearDependencies),
            "loadModule" => Self::Job(JobOp::LoadModule),
            _ => {
                return Err(make_err!(
                    Code::NotFound,
                    "Unrecognized RPC operation '{op_type}'"
                ));
            }
        })
    }
}

/// Arguments of an RPC. Which fields are required depends on the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    /// Serialized source map, decoded on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl RpcPayload {
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..Default::default()
        }
    }

    pub fn for_compiler(compiler_id: impl Into<String>) -> Self {
        Self {
            compiler_id: Some(compiler_id.into()),
            ..Default::default()
        }
    }

    /// Returns a required string field or an `InvalidArgument` error naming
    /// the field and the operation.
    pub fn require<'a>(
        field: &'a Option<String>,
        field_name: &str,
        op: RpcOp,
    ) -> Result<&'a str, Error> {
        field
            .as_deref()
            .ok_or_else(|| make_input_err!("RPC '{op}' requires field '{field_name}'"))
    }
}

/// Result of an RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RpcResponse {
    /// Fire-and-forget operations complete with no value.
    Done,
    Resolved { path: String },
    Module(LoadedModule),
}
