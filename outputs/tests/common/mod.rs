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

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use bep_events::{
    BuildEvent, Configuration, EventPayload, File, NamedSetOfFiles, OutputGroup, TargetCompleted,
};

pub const EXEC_ROOT: &str = "/exec";

pub fn input_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("inputs")
        .join(name)
}

pub fn configuration(id: &str, mnemonic: &str) -> BuildEvent {
    EventPayload::Configuration(Configuration {
        id: id.to_owned(),
        mnemonic: mnemonic.to_owned(),
    })
    .into()
}

/// A file under `<exec root>/bazel-out/<mnemonic>/bin`, with the matching path prefix.
pub fn output_file(mnemonic: &str, name: &str) -> File {
    File::new(
        name,
        format!("file://{}/bazel-out/{}/bin/{}", EXEC_ROOT, mnemonic, name),
    )
    .with_prefix(vec!["bazel-out", mnemonic, "bin"])
}

pub fn named_set(id: &str, files: Vec<File>, children: &[&str]) -> BuildEvent {
    EventPayload::NamedSet(NamedSetOfFiles {
        id: id.to_owned(),
        files,
        file_sets: children.iter().map(|c| c.to_string()).collect(),
    })
    .into()
}

pub fn target(label: &str, configuration: &str, groups: &[(&str, &[&str])]) -> BuildEvent {
    EventPayload::TargetCompleted(TargetCompleted {
        label: label.to_owned(),
        configuration_id: Some(configuration.to_owned()),
        success: true,
        output_groups: groups
            .iter()
            .map(|(name, sets)| OutputGroup {
                name: name.to_string(),
                file_sets: sets.iter().map(|s| s.to_string()).collect(),
                incomplete: false,
            })
            .collect(),
    })
    .into()
}
