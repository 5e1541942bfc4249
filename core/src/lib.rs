/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Task, value and dependency-graph primitives shared by the scheduler and every execution
//! backend. Nothing in this crate spawns a thread; it only models the graph and validates it.

pub mod error;
pub mod graph;
pub mod preprocess;
pub mod task;
pub mod value;

#[cfg(test)]
mod property_tests;

pub use error::{DomainError, FatalError};
pub use graph::{cycle_detection, deps_cover, CycleReport};
pub use preprocess::{preprocess, DependencyGraph, PreprocessedGraph};
pub use task::{
    visit_placeholders, AbortFn, ActionFn, Command, InputNode, Placeholder, Task, TaskId, TaskStatus, TaskVariant,
};
pub use value::Value;
