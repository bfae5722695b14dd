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

/// A value with an explicit owner count. The value is dropped when the last
/// owner calls `reset` and is never reachable again afterwards.
#[derive(Debug)]
pub struct SharedHandle<T> {
    refs: usize,
    value: Option<T>,
}

impl<T> SharedHandle<T> {
    /// Wraps `value` with a single owner.
    pub const fn new(value: T) -> Self {
        Self {
            refs: 1,
            value: Some(value),
        }
    }

    /// Adds an owner. Returns false, and changes nothing, if the value was
    /// already discarded.
    pub fn lock(&mut self) -> bool {
        if self.value.is_none() {
            return false;
        }
        self.refs += 1;
        true
    }

    /// Removes an owner, dropping the value when none remain.
    pub fn reset(&mut self) {
        if self.refs == 0 {
            return;
        }
        self.refs -= 1;
        if self.refs == 0 {
            self.value = None;
        }
    }

    pub const fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Null-safe `get` for a handle that may not exist.
    pub fn safe_get(handle: Option<&Self>) -> Option<&T> {
        handle.and_then(Self::get)
    }

    pub const fn ref_count(&self) -> usize {
        self.refs
    }
}
