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

use crate::serde_utils::{convert_string_with_shellexpand, convert_vec_string_with_shellexpand};

/// Hook id used when neither the plugin nor the hook query names one.
pub const DEFAULT_PLUGIN_ID: &str = "1";

fn default_plugin_id() -> String {
    DEFAULT_PLUGIN_ID.to_string()
}

/// Name of a pool. Used when referencing a pool from `PluginConfig::pool`.
pub type PoolRefName = String;

/// Binds a hook id to a worker pool and a chain of loaders that the workers
/// run for every job submitted under that id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Id the host hook uses to find this plugin (`?id=<id>`).
    ///
    /// Default: "1"
    #[serde(
        default = "default_plugin_id",
        deserialize_with = "convert_string_with_shellexpand"
    )]
    pub id: String,

    /// Loaders the worker applies to each resource, first to last.
    ///
    /// Default: []
    #[serde(default, deserialize_with = "convert_vec_string_with_shellexpand")]
    pub loaders: Vec<String>,

    /// Pool the plugin submits its jobs to. Must reference a pool from
    /// `OffloadConfig::pools`.
    #[serde(deserialize_with = "convert_string_with_shellexpand")]
    pub pool: PoolRefName,
}
