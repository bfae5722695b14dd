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

use async_trait::async_trait;
use offload_error::Error;

use crate::protocol::{CompilerOptions, JobOutput, JobPayload};

/// Unique identifier of a worker inside its pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Builds the id of the worker at `index`, prefixed with the pool id
    /// when the pool has one.
    pub fn new(pool_id: Option<&str>, index: usize) -> Self {
        match pool_id {
            Some(pool_id) => Self(format!("{pool_id}:{index}")),
            None => Self(index.to_string()),
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A persistent background worker. The transport behind it (task, thread,
/// process) is up to the implementation.
#[async_trait]
pub trait Worker: Send + Sync + fmt::Debug {
    fn id(&self) -> &WorkerId;

    /// Brings the worker up. Resolves once it is ready to accept jobs.
    async fn open(&self) -> Result<(), Error>;

    /// Shuts the worker down. Jobs still running on it fail.
    async fn close(&self) -> Result<(), Error>;

    fn is_open(&self) -> bool;

    /// Hands a build configuration's options to the worker. Jobs submitted
    /// for `owner_id` afterwards see these options.
    async fn configure(&self, owner_id: &str, options: &CompilerOptions) -> Result<(), Error>;

    /// Runs one job to completion.
    async fn dispatch(&self, job: JobPayload) -> Result<JobOutput, Error>;
}
