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

use serde::{Deserialize, Serialize};

use crate::plugins::PoolRefName;
use crate::serde_utils::{
    convert_numeric_with_shellexpand, convert_optional_string_with_shellexpand,
    convert_string_with_shellexpand,
};

/// Configuration of one worker pool. A pool may be shared by several
/// plugins and several build configurations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Name used by `PluginConfig::pool` to reference this pool.
    #[serde(deserialize_with = "convert_string_with_shellexpand")]
    pub name: PoolRefName,

    /// Number of persistent workers to create. Must be greater than zero;
    /// this is checked when the pool is constructed.
    #[serde(deserialize_with = "convert_numeric_with_shellexpand")]
    pub size: usize,

    /// Prefix for the worker ids. Only used to make logs easier to read.
    ///
    /// Default: None, workers are named by their index.
    #[serde(default, deserialize_with = "convert_optional_string_with_shellexpand")]
    pub id: Option<String>,

    /// Allow the pool and its workers to log lifecycle information at info
    /// level instead of debug level.
    ///
    /// Default: false
    #[serde(default)]
    pub verbose: bool,

    /// Log every worker assignment at debug level instead of trace level.
    ///
    /// Default: false
    #[serde(default)]
    pub debug: bool,
}

impl PoolConfig {
    pub fn new(name: impl Into<PoolRefName>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            id: None,
            verbose: false,
            debug: false,
        }
    }
}
