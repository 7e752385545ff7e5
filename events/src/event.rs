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

//! The subset of the build event protocol the output resolver understands.
//!
//! Everything here is plain owned data. Interning happens later, in the reducer, so these types
//! stay cheap to construct by hand in tests.

#[derive(Debug, Clone, PartialEq)]
pub struct BuildEvent {
    /// Set on the final event of a well-formed stream.
    pub last_message: bool,
    pub payload: EventPayload,
}

impl BuildEvent {
    pub fn new(payload: EventPayload) -> BuildEvent {
        BuildEvent {
            last_message: false,
            payload,
        }
    }

    pub fn last(mut self) -> BuildEvent {
        self.last_message = true;
        self
    }

    pub fn kind(&self) -> &str {
        self.payload.kind()
    }
}

impl From<EventPayload> for BuildEvent {
    fn from(payload: EventPayload) -> BuildEvent {
        BuildEvent::new(payload)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Started(Started),
    Workspace(WorkspaceInfo),
    Configuration(Configuration),
    NamedSet(NamedSetOfFiles),
    TargetCompleted(TargetCompleted),
    BuildFinished(BuildFinished),
    /// Any kind the resolver does not care about (progress, pattern, testResult, ...).
    Other(String),
}

impl EventPayload {
    pub fn kind(&self) -> &str {
        match self {
            EventPayload::Started(_) => kinds::STARTED,
            EventPayload::Workspace(_) => kinds::WORKSPACE,
            EventPayload::Configuration(_) => kinds::CONFIGURATION,
            EventPayload::NamedSet(_) => kinds::NAMED_SET,
            EventPayload::TargetCompleted(_) => kinds::TARGET_COMPLETED,
            EventPayload::BuildFinished(_) => kinds::BUILD_FINISHED,
            EventPayload::Other(kind) => kind,
        }
    }
}

/// Event kinds as they appear as the key of a JSON event's `id` object.
pub mod kinds {
    pub const STARTED: &str = "started";
    pub const WORKSPACE: &str = "workspace";
    pub const CONFIGURATION: &str = "configuration";
    pub const NAMED_SET: &str = "namedSet";
    pub const TARGET_COMPLETED: &str = "targetCompleted";
    pub const BUILD_FINISHED: &str = "buildFinished";
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Started {
    pub uuid: Option<String>,
    pub start_time_millis: Option<i64>,
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceInfo {
    pub local_exec_root: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    pub id: String,
    pub mnemonic: String,
}

/// One file reference inside a named set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct File {
    pub name: String,
    /// Absent for inline-contents and symlink-target files.
    pub uri: Option<String>,
    /// Output root segments, e.g. `["bazel-out", "k8-fastbuild", "bin"]`.
    pub path_prefix: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedSetOfFiles {
    pub id: String,
    pub files: Vec<File>,
    /// Ids of the named sets this one includes.
    pub file_sets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputGroup {
    pub name: String,
    pub file_sets: Vec<String>,
    pub incomplete: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetCompleted {
    pub label: String,
    pub configuration_id: Option<String>,
    pub success: bool,
    pub output_groups: Vec<OutputGroup>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildFinished {
    pub exit_code: i32,
    /// Symbolic exit code, e.g. `SUCCESS` or `BUILD_FAILURE`.
    pub exit_code_name: Option<String>,
}

impl File {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, uri: U) -> File {
        File {
            name: name.into(),
            uri: Some(uri.into()),
            path_prefix: vec![],
        }
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: Vec<S>) -> File {
        self.path_prefix = prefix.into_iter().map(Into::into).collect();
        self
    }
}
