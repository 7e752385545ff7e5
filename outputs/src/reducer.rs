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

//! Single pass over the event stream, building the state the resolver needs.

use std::{collections::HashMap, sync::Arc};

use bep_events::{BuildEvent, BuildEventStreamProvider, EventPayload, TargetCompleted};
use bep_intern::Interner;
use tracing::debug;

use crate::{
    store::{FileSetStore, NamedFileSet},
    BepError,
};

/// Bazel's exit code for an interrupted build.
const EXIT_INTERRUPTED: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    Success,
    Failure,
    Interrupted,
}

impl BuildResult {
    pub fn from_exit_code(code: i32) -> BuildResult {
        match code {
            0 => BuildResult::Success,
            EXIT_INTERRUPTED => BuildResult::Interrupted,
            _ => BuildResult::Failure,
        }
    }
}

impl Default for BuildResult {
    fn default() -> Self {
        BuildResult::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputGroupRecord {
    pub name: Arc<str>,
    pub file_sets: Vec<Arc<str>>,
    /// Some of the group's outputs were not produced.
    pub incomplete: bool,
}

/// A completed target as reported, before its file sets are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub label: Arc<str>,
    pub configuration_id: Option<Arc<str>>,
    pub success: bool,
    pub output_groups: Vec<OutputGroupRecord>,
}

impl TargetRecord {
    fn intern(target: &TargetCompleted, interner: &mut Interner) -> TargetRecord {
        TargetRecord {
            label: interner.intern(&target.label),
            configuration_id: target
                .configuration_id
                .as_ref()
                .map(|id| interner.intern(id)),
            success: target.success,
            output_groups: target
                .output_groups
                .iter()
                .map(|group| OutputGroupRecord {
                    name: interner.intern(&group.name),
                    file_sets: interner.intern_all(&group.file_sets),
                    incomplete: group.incomplete,
                })
                .collect(),
        }
    }

    pub fn has_file_sets(&self) -> bool {
        self.output_groups.iter().any(|g| !g.file_sets.is_empty())
    }
}

/// Everything gathered from one stream.
#[derive(Debug, Default)]
pub struct ReducedStream {
    pub build_id: Option<String>,
    pub start_time_millis: Option<i64>,
    pub command: Option<String>,
    pub local_exec_root: Option<String>,
    pub build_result: BuildResult,
    pub exit_code_name: Option<String>,
    /// A `BUILD_FINISHED` event was seen.
    pub finished: bool,
    pub last_message: bool,
    /// Configuration id to mnemonic.
    pub configurations: HashMap<Arc<str>, Arc<str>>,
    pub store: FileSetStore,
    pub targets: Vec<TargetRecord>,
    pub events: usize,
    pub bytes_consumed: u64,
}

impl ReducedStream {
    pub fn mnemonic(&self, configuration_id: &str) -> Option<&Arc<str>> {
        self.configurations.get(configuration_id)
    }
}

pub struct EventStreamReducer<'i> {
    interner: &'i mut Interner,
    state: ReducedStream,
}

impl<'i> EventStreamReducer<'i> {
    pub fn new(interner: &'i mut Interner) -> EventStreamReducer<'i> {
        EventStreamReducer {
            interner,
            state: ReducedStream::default(),
        }
    }

    pub fn consume(&mut self, event: BuildEvent) -> Result<(), BepError> {
        self.state.events += 1;
        self.state.last_message |= event.last_message;
        match event.payload {
            EventPayload::Started(started) => {
                self.state.build_id = started.uuid;
                self.state.start_time_millis = started.start_time_millis;
                self.state.command = started.command;
            }
            EventPayload::Workspace(workspace) => {
                if workspace.local_exec_root.is_some() {
                    self.state.local_exec_root = workspace.local_exec_root;
                }
            }
            EventPayload::Configuration(configuration) => {
                let id = self.interner.intern(&configuration.id);
                let mnemonic = self.interner.intern(&configuration.mnemonic);
                self.state.configurations.insert(id, mnemonic);
            }
            EventPayload::NamedSet(set) => {
                let set = NamedFileSet::intern(&set, self.interner);
                self.state.store.define(set)?;
            }
            EventPayload::TargetCompleted(target) => {
                let record = TargetRecord::intern(&target, self.interner);
                self.state.targets.push(record);
            }
            EventPayload::BuildFinished(finished) => {
                self.state.build_result = BuildResult::from_exit_code(finished.exit_code);
                self.state.exit_code_name = finished.exit_code_name;
                self.state.finished = true;
            }
            EventPayload::Other(kind) => {
                debug!(%kind, "ignoring event");
            }
        }
        Ok(())
    }

    pub fn finish(self, bytes_consumed: u64) -> Result<ReducedStream, BepError> {
        if self.state.events == 0 {
            return Err(BepError::EmptyStream);
        }
        let mut state = self.state;
        state.bytes_consumed = bytes_consumed;
        Ok(state)
    }
}

/// Drains `provider`, interning through `interner`.
pub fn reduce<P>(provider: &mut P, interner: &mut Interner) -> Result<ReducedStream, BepError>
where
    P: BuildEventStreamProvider + ?Sized,
{
    let mut reducer = EventStreamReducer::new(interner);
    while let Some(event) = provider.next()? {
        reducer.consume(event)?;
    }
    reducer.finish(provider.bytes_consumed())
}
