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

pub mod plugins;
pub mod pools;
pub mod serde_utils;

use std::path::Path;

use offload_error::{Error, ResultExt, make_input_err};
use serde::{Deserialize, Serialize};

/// Root configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OffloadConfig {
    /// Worker pools. Several plugins may share one pool.
    pub pools: Vec<pools::PoolConfig>,

    /// Plugins, one per hook id.
    #[serde(default)]
    pub plugins: Vec<plugins::PluginConfig>,
}

impl OffloadConfig {
    /// Parses a JSON5 document and checks that every plugin refers to a
    /// declared pool and that pool names and plugin ids are unique.
    pub fn from_json5(contents: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json5::from_str(contents).err_tip(|| "Could not parse offload config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .err_tip(|| format!("Could not open config file {}", path.display()))?;
        Self::from_json5(&contents)
    }

    pub fn pool(&self, name: &str) -> Option<&pools::PoolConfig> {
        self.pools.iter().find(|pool| pool.name == name)
    }

    fn validate(&self) -> Result<(), Error> {
        for (index, pool) in self.pools.iter().enumerate() {
            if self.pools[..index].iter().any(|other| other.name == pool.name) {
                return Err(make_input_err!("Duplicate pool name '{}'", pool.name));
            }
        }
        for (index, plugin) in self.plugins.iter().enumerate() {
            if self.pool(&plugin.pool).is_none() {
                return Err(make_input_err!(
                    "Plugin '{}' references unknown pool '{}'",
                    plugin.id,
                    plugin.pool
                ));
            }
            if self.plugins[..index].iter().any(|other| other.id == plugin.id) {
                return Err(make_input_err!("Duplicate plugin id '{}'", plugin.id));
            }
        }
        Ok(())
    }
}
